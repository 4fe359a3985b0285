//! Volume relay and group-volume computation.
//!
//! Individual volume goes through RenderingControl. Group volume only
//! exists for zone coordinators: the arithmetic mean over the coordinator
//! and every running device mastered by it, with unknown member volumes
//! fetched lazily and cached on the device.

use std::sync::Arc;

use crate::error::{BridgeError, BridgeResult};
use crate::renderer::registry::{DeviceRegistry, DeviceSlot, VOLUME_UNKNOWN};
use crate::renderer::services::{ServiceKind, ServiceRecord};
use crate::renderer::soap::{SoapError, SoapRequestBuilder, SoapTransport};
use crate::renderer::xml::first_element_text;

async fn rendering_get_volume(
    soap: &dyn SoapTransport,
    record: &ServiceRecord,
) -> BridgeResult<u8> {
    let response = SoapRequestBuilder::new(soap, record)
        .action("GetVolume")
        .instance_id()
        .arg("Channel", "Master")
        .send()
        .await?;

    first_element_text(&response, "CurrentVolume")
        .and_then(|v| v.parse::<u8>().ok())
        .map(|v| v.min(100))
        .ok_or_else(|| SoapError::Parse.into())
}

fn rendering_control(device: &Arc<DeviceSlot>) -> BridgeResult<ServiceRecord> {
    device
        .with_running(|state| {
            (
                state.services.get(ServiceKind::RenderingControl).cloned(),
                state.udn.clone(),
            )
        })
        .ok_or_else(|| BridgeError::RendererNotFound("device torn down".to_string()))
        .and_then(|(record, udn)| {
            record.ok_or(BridgeError::MissingService(udn, "RenderingControl"))
        })
}

/// Sets a renderer's volume (0-100, clamped) and caches the value.
pub async fn set_volume(
    soap: &dyn SoapTransport,
    device: &Arc<DeviceSlot>,
    volume: u8,
) -> BridgeResult<()> {
    let record = rendering_control(device)?;
    let clamped = volume.min(100);

    SoapRequestBuilder::new(soap, &record)
        .action("SetVolume")
        .instance_id()
        .arg("Channel", "Master")
        .arg("DesiredVolume", clamped.to_string())
        .send()
        .await?;

    device.with_running(|state| state.volume = i32::from(clamped));
    Ok(())
}

/// Fetches a renderer's volume and caches it.
pub async fn get_volume(soap: &dyn SoapTransport, device: &Arc<DeviceSlot>) -> BridgeResult<u8> {
    let record = rendering_control(device)?;
    let volume = rendering_get_volume(soap, &record).await?;
    device.with_running(|state| state.volume = i32::from(volume));
    Ok(volume)
}

/// Mutes or unmutes a renderer.
pub async fn set_mute(
    soap: &dyn SoapTransport,
    device: &Arc<DeviceSlot>,
    mute: bool,
) -> BridgeResult<()> {
    let record = rendering_control(device)?;

    SoapRequestBuilder::new(soap, &record)
        .action("SetMute")
        .instance_id()
        .arg("Channel", "Master")
        .arg("DesiredMute", if mute { "1" } else { "0" })
        .send()
        .await?;

    Ok(())
}

/// Computes the group volume of a zone coordinator.
///
/// Returns -1 when `coordinator` is not a group coordinator (no
/// GroupRenderingControl service). Otherwise: the truncated arithmetic mean
/// of the coordinator's and every mastered running device's volume, lazily
/// fetching members whose volume is still unknown.
pub async fn group_volume(
    soap: &dyn SoapTransport,
    registry: &DeviceRegistry,
    coordinator: &Arc<DeviceSlot>,
) -> BridgeResult<i32> {
    let is_coordinator = coordinator
        .with_running(|state| {
            state
                .services
                .is_populated(ServiceKind::GroupRenderingControl)
        })
        .ok_or_else(|| BridgeError::RendererNotFound("device torn down".to_string()))?;
    if !is_coordinator {
        return Ok(-1);
    }

    // Snapshot members under their locks, then do network fetches unlocked.
    struct Member {
        slot: Arc<DeviceSlot>,
        volume: i32,
        rendering: Option<ServiceRecord>,
    }

    let mut members: Vec<Member> = Vec::new();
    for slot in registry.slots() {
        let snapshot = slot.with_running(|state| {
            let in_group = slot.index == coordinator.index || state.master == coordinator.index;
            in_group.then(|| {
                (
                    state.volume,
                    state.services.get(ServiceKind::RenderingControl).cloned(),
                )
            })
        });
        if let Some(Some((volume, rendering))) = snapshot {
            members.push(Member {
                slot: Arc::clone(slot),
                volume,
                rendering,
            });
        }
    }

    let mut sum = 0f64;
    let mut count = 0u32;
    for member in &mut members {
        if member.volume == VOLUME_UNKNOWN {
            if let Some(record) = &member.rendering {
                match rendering_get_volume(soap, record).await {
                    Ok(volume) => {
                        member.volume = i32::from(volume);
                        member.slot.with_running(|state| state.volume = member.volume);
                    }
                    Err(e) => {
                        log::warn!("[Volume] GetVolume failed: {}", e);
                        continue;
                    }
                }
            } else {
                continue;
            }
        }
        sum += f64::from(member.volume);
        count += 1;
    }

    if count == 0 {
        return Ok(-1);
    }
    Ok((sum / f64::from(count)) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::services::ServiceTable;
    use crate::renderer::soap::SoapResult;
    use async_trait::async_trait;

    /// Canned transport: answers every GetVolume with a fixed value.
    struct FixedVolumeTransport {
        volume: u8,
    }

    #[async_trait]
    impl SoapTransport for FixedVolumeTransport {
        async fn invoke(
            &self,
            _control_url: &str,
            _service_type: &str,
            action: &str,
            _args: &[(&str, &str)],
        ) -> SoapResult<String> {
            assert_eq!(action, "GetVolume");
            Ok(format!(
                "<u:GetVolumeResponse><CurrentVolume>{}</CurrentVolume></u:GetVolumeResponse>",
                self.volume
            ))
        }
    }

    fn table(kinds: &[ServiceKind]) -> ServiceTable {
        let mut table = ServiceTable::new();
        for (i, kind) in kinds.iter().enumerate() {
            table.set(
                *kind,
                ServiceRecord {
                    service_type: format!("{}:1", kind.base_type()),
                    control_url: format!("http://10.0.0.{}/ctl/{}", i + 2, kind.name()),
                    ..Default::default()
                },
            );
        }
        table
    }

    #[tokio::test]
    async fn group_volume_is_mean_with_lazy_fetch() {
        let registry = DeviceRegistry::new();
        let soap = FixedVolumeTransport { volume: 50 };

        // A coordinates; B and C are mastered by A. C's volume is unknown
        // and gets fetched (50).
        let a = registry
            .insert_for_test(
                "uuid:A",
                table(&[
                    ServiceKind::RenderingControl,
                    ServiceKind::GroupRenderingControl,
                ]),
            )
            .unwrap();
        let b = registry
            .insert_for_test("uuid:B", table(&[ServiceKind::RenderingControl]))
            .unwrap();
        let c = registry
            .insert_for_test("uuid:C", table(&[ServiceKind::RenderingControl]))
            .unwrap();

        a.with_running(|s| s.volume = 40);
        b.with_running(|s| {
            s.volume = 60;
            s.master = a.index;
        });
        c.with_running(|s| s.master = a.index);

        let volume = group_volume(&soap, &registry, &a).await.unwrap();
        assert_eq!(volume, 50);

        // C's fetched volume is now cached.
        assert_eq!(c.with_running(|s| s.volume), Some(50));
    }

    #[tokio::test]
    async fn group_volume_without_group_service_is_minus_one() {
        let registry = DeviceRegistry::new();
        let soap = FixedVolumeTransport { volume: 50 };
        let solo = registry
            .insert_for_test("uuid:solo", table(&[ServiceKind::RenderingControl]))
            .unwrap();
        solo.with_running(|s| s.volume = 30);

        assert_eq!(group_volume(&soap, &registry, &solo).await.unwrap(), -1);
    }

    #[tokio::test]
    async fn group_volume_ignores_unrelated_devices() {
        let registry = DeviceRegistry::new();
        let soap = FixedVolumeTransport { volume: 99 };

        let a = registry
            .insert_for_test(
                "uuid:A",
                table(&[
                    ServiceKind::RenderingControl,
                    ServiceKind::GroupRenderingControl,
                ]),
            )
            .unwrap();
        let stranger = registry
            .insert_for_test("uuid:other", table(&[ServiceKind::RenderingControl]))
            .unwrap();

        a.with_running(|s| s.volume = 20);
        stranger.with_running(|s| s.volume = 80); // own master (self)

        assert_eq!(group_volume(&soap, &registry, &a).await.unwrap(), 20);
    }
}
