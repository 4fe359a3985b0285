//! Renderer device registry and lifecycle.
//!
//! Fixed-capacity registry owning one slot per renderer. Each slot carries
//! the per-device mutex that guards all mutable device state; event
//! callbacks go through [`DeviceSlot::with_running`] so nothing ever touches
//! a torn-down device. Insertion is the commit point of registration: a
//! device that fails construction never enters the registry, so teardown can
//! always assume a fully-initialized slot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::capabilities::{negotiate_codecs, SinkCapabilities};
use super::description::{parse_device_description, service_has_action};
use super::gena::GenaClient;
use super::services::{ServiceKind, ServiceTable};
use super::soap::{SoapRequestBuilder, SoapTransport};
use super::topology::{fetch_zone_groups, resolve_master};
use super::xml::first_element_text;
use crate::error::{BridgeError, BridgeResult};
use crate::protocol_constants::{
    GENA_RENEWAL_BUFFER_SECS, GENA_RENEWAL_CHECK_SECS, MAX_RENDERERS,
};
use crate::state::{BridgeConfig, PlaybackState};
use crate::stream::StreamMetadata;

/// Volume sentinel: not yet known.
pub const VOLUME_UNKNOWN: i32 = -1;

/// Mutable state of one renderer, guarded by the slot mutex.
#[derive(Default)]
pub struct DeviceState {
    running: bool,

    /// Stable unique device name, `uuid:` prefix included.
    pub udn: String,
    /// Display name (zone name when grouped, else friendly name).
    pub name: String,
    /// Base URL of the device description.
    pub base_url: String,
    /// Immutable after registration except for sid/timeout updates.
    pub services: ServiceTable,

    /// Playback state mirrored from the controller.
    pub playback: PlaybackState,
    /// Current track metadata (feeds ICY and transport URI metadata).
    pub metadata: StreamMetadata,
    /// Last known volume; [`VOLUME_UNKNOWN`] until fetched or evented.
    pub volume: i32,
    /// Registry slot of this device's group master; own index when self.
    pub master: usize,
    /// Negotiated codec tokens in controller preference order.
    pub codecs: Vec<&'static str>,
    /// Parsed sink capabilities, kept for per-track MIME selection.
    pub sink: SinkCapabilities,
    /// AVTransport advertises a Seek action.
    pub can_seek: bool,

    worker: Option<JoinHandle<()>>,
}

impl DeviceState {
    /// True between successful registration and teardown.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Locates the service owning an event URL within this device.
    #[must_use]
    pub fn service_by_event_url(&self, url: &str) -> Option<ServiceKind> {
        self.services
            .iter()
            .find(|(_, r)| r.event_url == url)
            .map(|(k, _)| k)
    }
}

/// One registry slot: index + the per-device mutex.
pub struct DeviceSlot {
    /// Position in the registry; doubles as the self-master value.
    pub index: usize,
    state: Mutex<DeviceState>,
}

impl DeviceSlot {
    /// Runs `f` on the device state if (and only if) the device is running.
    ///
    /// This is the universal pattern for event callbacks: look up the slot,
    /// enter through here, act, and the closure scope releases the lock.
    /// Events racing a teardown observe `None` and drop silently.
    pub fn with_running<R>(&self, f: impl FnOnce(&mut DeviceState) -> R) -> Option<R> {
        let mut state = self.state.lock();
        if !state.running {
            log::debug!("[Registry] slot {}: device has been removed", self.index);
            return None;
        }
        Some(f(&mut state))
    }
}

/// Fixed-capacity registry of renderer devices.
pub struct DeviceRegistry {
    slots: Vec<Arc<DeviceSlot>>,
    teardown: Arc<Notify>,
}

impl DeviceRegistry {
    /// Creates an empty registry with [`MAX_RENDERERS`] slots.
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            slots: (0..MAX_RENDERERS)
                .map(|index| {
                    Arc::new(DeviceSlot {
                        index,
                        state: Mutex::new(DeviceState::default()),
                    })
                })
                .collect(),
            teardown: Arc::new(Notify::new()),
        })
    }

    /// Process-wide condition used to wake device workers on teardown.
    #[must_use]
    pub fn teardown_notify(&self) -> Arc<Notify> {
        Arc::clone(&self.teardown)
    }

    fn find_running(
        &self,
        pred: impl Fn(&DeviceState) -> bool,
    ) -> Option<Arc<DeviceSlot>> {
        self.slots.iter().find_map(|slot| {
            let state = slot.state.lock();
            (state.running && pred(&state)).then(|| Arc::clone(slot))
        })
    }

    /// Looks up a running device by UDN.
    #[must_use]
    pub fn find_by_udn(&self, udn: &str) -> Option<Arc<DeviceSlot>> {
        self.find_running(|s| s.udn == udn)
    }

    /// Looks up a running device by any of its control URLs.
    #[must_use]
    pub fn find_by_control_url(&self, url: &str) -> Option<Arc<DeviceSlot>> {
        self.find_running(|s| s.services.iter().any(|(_, r)| r.control_url == url))
    }

    /// Looks up a running device (and the service kind) by subscription id.
    #[must_use]
    pub fn find_by_subscription_id(
        &self,
        sid: &str,
    ) -> Option<(Arc<DeviceSlot>, ServiceKind)> {
        for slot in &self.slots {
            let state = slot.state.lock();
            if !state.running {
                continue;
            }
            let kind = state
                .services
                .iter()
                .find(|(_, r)| !r.sid.is_empty() && r.sid == sid)
                .map(|(kind, _)| kind);
            if let Some(kind) = kind {
                return Some((Arc::clone(slot), kind));
            }
        }
        None
    }

    /// Returns a `(slot, udn)` snapshot of running devices, for the
    /// topology resolver.
    #[must_use]
    pub fn running_udns(&self) -> Vec<(usize, String)> {
        self.slots
            .iter()
            .filter_map(|slot| {
                let state = slot.state.lock();
                state.running.then(|| (slot.index, state.udn.clone()))
            })
            .collect()
    }

    /// Returns the slot at `index` (used to chase master back-references).
    #[must_use]
    pub fn slot(&self, index: usize) -> Option<&Arc<DeviceSlot>> {
        self.slots.get(index)
    }

    /// Iterates every slot. Callers filter on `is_running` themselves.
    pub(crate) fn slots(&self) -> &[Arc<DeviceSlot>] {
        &self.slots
    }

    /// Commits a fully-constructed device state into a vacant slot.
    ///
    /// `master` in the incoming state may be `usize::MAX` meaning "self";
    /// it is patched to the chosen slot index here.
    fn commit(&self, mut incoming: DeviceState) -> BridgeResult<Arc<DeviceSlot>> {
        for slot in &self.slots {
            let mut state = slot.state.lock();
            if state.running || state.worker.is_some() {
                continue;
            }
            incoming.running = true;
            if incoming.master == usize::MAX {
                incoming.master = slot.index;
            }
            *state = incoming;
            log::info!(
                "[Registry] slot {}: registered {} ({})",
                slot.index,
                state.name,
                state.udn
            );
            return Ok(Arc::clone(slot));
        }
        Err(BridgeError::RegistryFull)
    }

    /// Registers a renderer from its description document.
    ///
    /// Everything fallible happens before the commit; a renderer that cannot
    /// be registered leaves no trace. After commit, GENA subscriptions are
    /// created and the device worker is spawned.
    pub async fn register(
        self: &Arc<Self>,
        http: &reqwest::Client,
        soap: &dyn SoapTransport,
        gena: &Arc<GenaClient>,
        config: &BridgeConfig,
        location: &str,
        description_xml: &str,
        callback_url: &str,
    ) -> BridgeResult<Arc<DeviceSlot>> {
        let parsed = parse_device_description(description_xml, location)?;

        if let Some(existing) = self.find_by_udn(&parsed.udn) {
            log::debug!("[Registry] {} already registered", parsed.udn);
            return Ok(existing);
        }

        let Some(avt) = parsed.services.get(ServiceKind::AVTransport).cloned() else {
            return Err(BridgeError::MissingService(parsed.udn, "AVTransport"));
        };

        // Sink capabilities drive codec negotiation; a failed fetch only
        // means the forced list (if any) decides.
        let sink_info = match parsed.services.get(ServiceKind::ConnectionManager) {
            Some(cm) => match SoapRequestBuilder::new(soap, cm)
                .action("GetProtocolInfo")
                .send()
                .await
            {
                Ok(response) => first_element_text(&response, "Sink").unwrap_or_default(),
                Err(e) => {
                    log::warn!("[Registry] GetProtocolInfo failed for {}: {}", parsed.udn, e);
                    String::new()
                }
            },
            None => String::new(),
        };
        let sink = SinkCapabilities::parse(&sink_info, &config.forced_mimetypes);
        let codecs = negotiate_codecs(&config.codecs, &sink);
        log::info!("[Registry] {} codecs: {:?}", parsed.udn, codecs);

        let can_seek = service_has_action(http, &avt.scpd_url, "Seek").await;

        // Group topology: find our master if the device belongs to a zone.
        let mut master = usize::MAX;
        let mut name = parsed.friendly_name.clone();
        if let Some(topology) = parsed.services.get(ServiceKind::Topology) {
            match fetch_zone_groups(soap, topology).await {
                Ok(groups) => {
                    let resolution =
                        resolve_master(&parsed.udn, &groups, &self.running_udns());
                    if let Some(slot) = resolution.master_slot {
                        master = slot;
                    }
                    if let Some(zone_name) = resolution.zone_name {
                        name = zone_name;
                    }
                }
                Err(e) => {
                    log::warn!("[Registry] GetZoneGroupState failed for {}: {}", parsed.udn, e)
                }
            }
        }

        let slot = self.commit(DeviceState {
            running: false, // set by commit
            udn: parsed.udn,
            name,
            base_url: parsed.base_url,
            services: parsed.services,
            playback: PlaybackState::Stopped,
            metadata: StreamMetadata::default(),
            volume: VOLUME_UNKNOWN,
            master,
            codecs,
            sink,
            can_seek,
            worker: None,
        })?;

        self.subscribe_services(&slot, gena, callback_url).await;

        let worker = tokio::spawn(device_worker(
            Arc::clone(&slot),
            Arc::clone(gena),
            self.teardown_notify(),
        ));
        slot.with_running(|state| state.worker = Some(worker));

        Ok(slot)
    }

    /// Subscribes the eventable services of a freshly-committed device.
    async fn subscribe_services(
        &self,
        slot: &Arc<DeviceSlot>,
        gena: &Arc<GenaClient>,
        callback_url: &str,
    ) {
        const EVENTED: [ServiceKind; 4] = [
            ServiceKind::AVTransport,
            ServiceKind::RenderingControl,
            ServiceKind::GroupRenderingControl,
            ServiceKind::Topology,
        ];

        for kind in EVENTED {
            let Some(event_url) =
                slot.with_running(|s| s.services.get(kind).map(|r| r.event_url.clone()))
                    .flatten()
                    .filter(|u| !u.is_empty())
            else {
                continue;
            };

            match gena.subscribe(&event_url, callback_url).await {
                Ok(response) => {
                    slot.with_running(|s| {
                        if let Some(record) = s.services.get_mut(kind) {
                            record.sid = response.sid;
                            record.timeout_secs = response.timeout_secs;
                        }
                    });
                }
                Err(e) => {
                    log::warn!("[GENA] subscribe {} failed: {}", kind.name(), e);
                }
            }
        }
    }

    /// Tears a device down.
    ///
    /// Best-effort unsubscribes are fired asynchronously with nobody waiting
    /// on the outcome (gone renderers never answer), the running flag is
    /// cleared, sleepers are woken, and the worker is joined outside the
    /// lock.
    pub async fn delete(&self, slot: &Arc<DeviceSlot>, gena: &Arc<GenaClient>) {
        let (unsubscribes, worker) = {
            let mut state = slot.state.lock();
            let unsubscribes: Vec<(String, String)> = state
                .services
                .iter()
                .filter(|(_, r)| r.timeout_secs > 0 && !r.sid.is_empty())
                .map(|(_, r)| (r.event_url.clone(), r.sid.clone()))
                .collect();
            state.running = false;
            (unsubscribes, state.worker.take())
        };

        for (event_url, sid) in unsubscribes {
            let gena = Arc::clone(gena);
            tokio::spawn(async move {
                let _ = gena.unsubscribe(&event_url, &sid).await;
            });
        }

        // Kick up all sleepers so the worker notices the cleared flag.
        self.teardown.notify_waiters();

        if let Some(worker) = worker {
            if let Err(e) = worker.await {
                log::debug!("[Registry] slot {} worker join: {}", slot.index, e);
            }
        }

        log::info!("[Registry] slot {}: removed", slot.index);
    }

    /// Stops and tears down every running device.
    ///
    /// Playing or paused devices get a synchronous AVTransport Stop first;
    /// skipping it can leave the renderer pulling on a socket the process is
    /// about to close, which blocks shutdown.
    pub async fn flush_all(&self, soap: &dyn SoapTransport, gena: &Arc<GenaClient>) {
        for slot in &self.slots {
            let stop_via = {
                let state = slot.state.lock();
                if !state.running {
                    continue;
                }
                let needs_stop = matches!(
                    state.playback,
                    PlaybackState::Playing | PlaybackState::Paused
                );
                needs_stop
                    .then(|| state.services.get(ServiceKind::AVTransport).cloned())
                    .flatten()
            };

            if let Some(avt) = stop_via {
                if let Err(e) = SoapRequestBuilder::new(soap, &avt)
                    .action("Stop")
                    .instance_id()
                    .send()
                    .await
                {
                    log::warn!("[Registry] Stop during flush failed: {}", e);
                }
            }

            self.delete(slot, gena).await;
        }
    }

    /// Test-only commit of a minimal running device.
    #[cfg(test)]
    pub(crate) fn insert_for_test(
        &self,
        udn: &str,
        services: ServiceTable,
    ) -> BridgeResult<Arc<DeviceSlot>> {
        self.commit(DeviceState {
            udn: udn.to_string(),
            name: udn.to_string(),
            master: usize::MAX,
            volume: VOLUME_UNKNOWN,
            services,
            ..Default::default()
        })
    }
}

/// Per-device pump: renews GENA subscriptions ahead of expiry and exits when
/// the device stops running. Woken early by the registry teardown condition.
async fn device_worker(slot: Arc<DeviceSlot>, gena: Arc<GenaClient>, teardown: Arc<Notify>) {
    let mut deadlines: HashMap<ServiceKind, Instant> = HashMap::new();

    loop {
        tokio::select! {
            () = teardown.notified() => {}
            () = tokio::time::sleep(Duration::from_secs(GENA_RENEWAL_CHECK_SECS)) => {}
        }

        let now = Instant::now();
        let due = slot.with_running(|state| {
            let mut due = Vec::new();
            for (kind, record) in state.services.iter() {
                if record.timeout_secs == 0 || record.sid.is_empty() {
                    continue;
                }
                let deadline = *deadlines.entry(kind).or_insert_with(|| {
                    now + Duration::from_secs(
                        record.timeout_secs.saturating_sub(GENA_RENEWAL_BUFFER_SECS),
                    )
                });
                if now >= deadline {
                    due.push((kind, record.event_url.clone(), record.sid.clone()));
                }
            }
            due
        });

        let Some(due) = due else {
            break; // torn down
        };

        for (kind, event_url, sid) in due {
            match gena.renew(&event_url, &sid).await {
                Ok(timeout_secs) => {
                    deadlines.insert(
                        kind,
                        Instant::now()
                            + Duration::from_secs(
                                timeout_secs.saturating_sub(GENA_RENEWAL_BUFFER_SECS),
                            ),
                    );
                    slot.with_running(|state| {
                        if let Some(record) = state.services.get_mut(kind) {
                            record.timeout_secs = timeout_secs;
                        }
                    });
                }
                Err(e) => {
                    log::warn!("[GENA] renew {} failed: {}", kind.name(), e);
                }
            }
        }
    }

    log::debug!("[Registry] slot {} worker exiting", slot.index);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::services::ServiceRecord;

    fn table_with(kind: ServiceKind, control: &str, sid: &str, event: &str) -> ServiceTable {
        let mut table = ServiceTable::new();
        table.set(
            kind,
            ServiceRecord {
                service_type: format!("{}:1", kind.base_type()),
                control_url: control.to_string(),
                event_url: event.to_string(),
                sid: sid.to_string(),
                timeout_secs: if sid.is_empty() { 0 } else { 3600 },
                ..Default::default()
            },
        );
        table
    }

    #[test]
    fn lookups_only_see_running_devices() {
        let registry = DeviceRegistry::new();
        assert!(registry.find_by_udn("uuid:a").is_none());

        let table = table_with(
            ServiceKind::AVTransport,
            "http://10.0.0.2/avt/ctl",
            "uuid:sub-7",
            "http://10.0.0.2/avt/evt",
        );
        let slot = registry.insert_for_test("uuid:a", table).unwrap();

        assert_eq!(
            registry.find_by_udn("uuid:a").map(|s| s.index),
            Some(slot.index)
        );
        assert_eq!(
            registry
                .find_by_control_url("http://10.0.0.2/avt/ctl")
                .map(|s| s.index),
            Some(slot.index)
        );
        let (found, kind) = registry.find_by_subscription_id("uuid:sub-7").unwrap();
        assert_eq!(found.index, slot.index);
        assert_eq!(kind, ServiceKind::AVTransport);
        assert!(registry.find_by_subscription_id("uuid:other").is_none());
    }

    #[test]
    fn event_url_lookup_is_device_scoped() {
        let registry = DeviceRegistry::new();
        let table = table_with(
            ServiceKind::RenderingControl,
            "http://10.0.0.2/rc/ctl",
            "",
            "http://10.0.0.2/rc/evt",
        );
        let slot = registry.insert_for_test("uuid:a", table).unwrap();

        let kind = slot
            .with_running(|s| s.service_by_event_url("http://10.0.0.2/rc/evt"))
            .flatten();
        assert_eq!(kind, Some(ServiceKind::RenderingControl));
    }

    #[test]
    fn with_running_refuses_vacant_slot() {
        let registry = DeviceRegistry::new();
        let slot = Arc::clone(registry.slot(0).unwrap());
        assert!(slot.with_running(|_| ()).is_none());
    }

    #[test]
    fn commit_defaults_master_to_self() {
        let registry = DeviceRegistry::new();
        let slot = registry
            .insert_for_test("uuid:a", ServiceTable::new())
            .unwrap();
        let master = slot.with_running(|s| s.master).unwrap();
        assert_eq!(master, slot.index);
    }

    #[test]
    fn registry_capacity_is_bounded() {
        let registry = DeviceRegistry::new();
        for i in 0..MAX_RENDERERS {
            registry
                .insert_for_test(&format!("uuid:{i}"), ServiceTable::new())
                .unwrap();
        }
        assert!(matches!(
            registry.insert_for_test("uuid:overflow", ServiceTable::new()),
            Err(BridgeError::RegistryFull)
        ));
    }

    #[tokio::test]
    async fn delete_clears_running_and_drops_events() {
        let registry = DeviceRegistry::new();
        let gena = Arc::new(GenaClient::new(reqwest::Client::new()));
        let table = table_with(
            ServiceKind::AVTransport,
            "http://127.0.0.1:9/avt/ctl",
            "uuid:sub-9",
            "http://127.0.0.1:9/avt/evt",
        );
        let slot = registry.insert_for_test("uuid:gone", table).unwrap();

        registry.delete(&slot, &gena).await;

        assert!(slot.with_running(|_| ()).is_none());
        assert!(registry.find_by_subscription_id("uuid:sub-9").is_none());
        // Slot is reusable after teardown.
        let again = registry
            .insert_for_test("uuid:next", ServiceTable::new())
            .unwrap();
        assert_eq!(again.index, slot.index);
    }
}
