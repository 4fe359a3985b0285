//! Renderer UPnP service definitions.
//!
//! Single source of truth for the service kinds the bridge drives, plus the
//! per-device [`ServiceRecord`]/[`ServiceTable`] resolved from each device
//! description. Unlike fixed-firmware ecosystems, generic renderers place
//! control and event endpoints wherever they like, so every URL here comes
//! from the description walker rather than from well-known paths.

use serde::Serialize;

/// UPnP services used for control and event subscriptions.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ServiceKind {
    /// Transport control (set URI, play, pause, stop, seek).
    AVTransport,
    /// Media capability exchange (`GetProtocolInfo`).
    ConnectionManager,
    /// Individual renderer volume and mute control.
    RenderingControl,
    /// Group volume control (coordinator renderers only).
    GroupRenderingControl,
    /// Zone group topology and membership information.
    Topology,
}

impl ServiceKind {
    /// All known service kinds, in service-table slot order.
    pub const ALL: [ServiceKind; 5] = [
        Self::AVTransport,
        Self::ConnectionManager,
        Self::RenderingControl,
        Self::GroupRenderingControl,
        Self::Topology,
    ];

    /// Number of service-table slots.
    pub const COUNT: usize = Self::ALL.len();

    /// Returns the service type with the `:<version>` suffix removed, as it
    /// appears in device descriptions after version stripping.
    #[must_use]
    pub fn base_type(&self) -> &'static str {
        match self {
            Self::AVTransport => "urn:schemas-upnp-org:service:AVTransport",
            Self::ConnectionManager => "urn:schemas-upnp-org:service:ConnectionManager",
            Self::RenderingControl => "urn:schemas-upnp-org:service:RenderingControl",
            Self::GroupRenderingControl => "urn:schemas-upnp-org:service:GroupRenderingControl",
            Self::Topology => "urn:schemas-upnp-org:service:ZoneGroupTopology",
        }
    }

    /// Returns a human-readable name for this service.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::AVTransport => "AVTransport",
            Self::ConnectionManager => "ConnectionManager",
            Self::RenderingControl => "RenderingControl",
            Self::GroupRenderingControl => "GroupRenderingControl",
            Self::Topology => "ZoneGroupTopology",
        }
    }

    /// Maps a version-stripped service type to a kind.
    #[must_use]
    pub fn from_base_type(base: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.base_type() == base)
    }

    fn slot(&self) -> usize {
        Self::ALL
            .iter()
            .position(|k| k == self)
            .expect("kind is in ALL")
    }
}

/// One resolved service of a renderer.
///
/// Everything except `sid`/`timeout_secs` is immutable after registration.
#[derive(Debug, Clone, Default)]
pub struct ServiceRecord {
    /// Full service type including version (e.g. `...:AVTransport:1`).
    pub service_type: String,
    /// Service identifier from the description.
    pub service_id: String,
    /// Resolved SCPD document URL.
    pub scpd_url: String,
    /// Resolved control endpoint URL for SOAP requests.
    pub control_url: String,
    /// Resolved event subscription URL for GENA.
    pub event_url: String,
    /// Current GENA subscription id; empty when not subscribed.
    pub sid: String,
    /// Subscription timeout in seconds; 0 means not subscribed.
    pub timeout_secs: u64,
}

/// Fixed-size table of services, one slot per [`ServiceKind`].
#[derive(Debug, Clone, Default)]
pub struct ServiceTable {
    slots: [Option<ServiceRecord>; ServiceKind::COUNT],
}

impl ServiceTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the record for a kind, if that service was resolved.
    #[must_use]
    pub fn get(&self, kind: ServiceKind) -> Option<&ServiceRecord> {
        self.slots[kind.slot()].as_ref()
    }

    /// Mutable access, used for subscription id/timeout updates only.
    pub fn get_mut(&mut self, kind: ServiceKind) -> Option<&mut ServiceRecord> {
        self.slots[kind.slot()].as_mut()
    }

    /// Populates a slot. Called by the description walker during registration.
    pub fn set(&mut self, kind: ServiceKind, record: ServiceRecord) {
        self.slots[kind.slot()] = Some(record);
    }

    /// Returns true if the service was resolved from the description.
    #[must_use]
    pub fn is_populated(&self, kind: ServiceKind) -> bool {
        self.get(kind).is_some()
    }

    /// Iterates populated services in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (ServiceKind, &ServiceRecord)> {
        ServiceKind::ALL
            .iter()
            .filter_map(move |&k| self.get(k).map(|r| (k, r)))
    }

    /// Iterates populated services mutably in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ServiceKind, &mut ServiceRecord)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.as_mut().map(|r| (ServiceKind::ALL[i], r)))
    }
}
