//! GENA NOTIFY dispatch.
//!
//! The RSP stack hands incoming notifications over as `(subscription id,
//! body)`. Dispatch looks the device up by SID, enters it through
//! `with_running` (events racing a teardown drop silently), mirrors the
//! values into device state, and relays typed events to the controller
//! side.

use crate::events::{BridgeEvent, EventBus};
use crate::renderer::events::{master_mute, master_volume, transport_state};
use crate::renderer::registry::DeviceRegistry;
use crate::renderer::services::ServiceKind;
use crate::renderer::xml::first_element_text;

/// Handles one incoming NOTIFY.
pub fn handle_notify(registry: &DeviceRegistry, bus: &EventBus, sid: &str, body: &str) {
    let Some((slot, kind)) = registry.find_by_subscription_id(sid) else {
        log::debug!("[GENA] notify for unknown sid {}, dropped", sid);
        return;
    };

    let events = slot
        .with_running(|state| {
            let udn = state.udn.clone();
            let mut events = Vec::new();

            match kind {
                ServiceKind::AVTransport => {
                    if let Some(transport) = transport_state(body) {
                        events.push(BridgeEvent::TransportState {
                            udn,
                            state: transport,
                        });
                    }
                }
                ServiceKind::RenderingControl => {
                    if let Some(volume) = master_volume(body) {
                        state.volume = i32::from(volume);
                        events.push(BridgeEvent::Volume {
                            udn: udn.clone(),
                            volume,
                        });
                    }
                    if let Some(muted) = master_mute(body) {
                        events.push(BridgeEvent::Mute { udn, muted });
                    }
                }
                ServiceKind::GroupRenderingControl => {
                    // Direct element content, no LastChange wrapper.
                    if let Some(volume) = first_element_text(body, "GroupVolume")
                        .and_then(|v| v.parse::<u8>().ok())
                        .map(|v| v.min(100))
                    {
                        state.volume = i32::from(volume);
                        events.push(BridgeEvent::Volume {
                            udn: udn.clone(),
                            volume,
                        });
                    }
                    if let Some(muted) =
                        first_element_text(body, "GroupMute").map(|v| v == "1")
                    {
                        events.push(BridgeEvent::Mute { udn, muted });
                    }
                }
                ServiceKind::Topology | ServiceKind::ConnectionManager => {
                    log::trace!("[GENA] {} notify ignored", kind.name());
                }
            }

            events
        })
        .unwrap_or_default();

    for event in events {
        bus.emit(event);
    }
}
