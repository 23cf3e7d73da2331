use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Volume level, 0.0–1.0
pub type Volume = f64;

/// Server identity and backend capability flags
///
/// Fetched once when connecting; immutable for the session. Which backends
/// are declared decides which refresh tasks exist and which entities can be
/// synthesized at all.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerInfo {
    pub hostname: String,

    #[serde(default)]
    pub backends: Backends,

    #[serde(default)]
    pub api_version: Option<String>,
}

/// Backend capability flags declared by the server
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
pub struct Backends {
    /// Audio mixing backend (client list, volume/mute control)
    #[serde(default)]
    pub pulseaudio: bool,

    /// Service management backend (unit list, enable/disable/restart)
    #[serde(default)]
    pub systemd: bool,
}

/// One audio client as reported by the host
///
/// `id` is ephemeral: it changes on every reconnect and must never be used
/// as an identity anchor. `name` is the stable, human-assigned identity.
#[derive(Debug, Clone, Deserialize)]
pub struct AudioClient {
    #[serde(default)]
    pub id: u32,

    pub name: String,

    #[serde(default)]
    pub host: String,

    #[serde(default)]
    pub app: String,

    #[serde(default)]
    pub binary: String,

    #[serde(default)]
    pub user: String,

    #[serde(default)]
    pub backend: String,

    /// A corked client is connected but not producing audio
    #[serde(default = "default_corked")]
    pub corked: bool,

    #[serde(default)]
    pub volume: Volume,

    #[serde(default)]
    pub muted: bool,

    /// Free-form properties passed through from the audio backend
    #[serde(default)]
    pub props: BTreeMap<String, serde_json::Value>,
}

fn default_corked() -> bool {
    true
}

impl AudioClient {
    /// True when the client has an active, uncorked stream
    pub fn is_streaming(&self) -> bool {
        !self.corked
    }
}

/// Scope of a system service
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ServiceScope {
    System,
    User,
}

impl fmt::Display for ServiceScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceScope::System => write!(f, "system"),
            ServiceScope::User => write!(f, "user"),
        }
    }
}

/// Unit activation state as reported by the service backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActiveState {
    Active,
    Inactive,
    Failed,
    Activating,
    Deactivating,
}

impl Default for ActiveState {
    fn default() -> Self {
        ActiveState::Inactive
    }
}

/// One service unit as reported by the host
#[derive(Debug, Clone, Deserialize)]
pub struct Service {
    #[serde(default = "default_scope")]
    pub scope: ServiceScope,

    /// Unit name, e.g. "mpd.service"
    #[serde(rename = "name")]
    pub unit: String,

    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub running: bool,

    #[serde(default)]
    pub active_state: ActiveState,

    #[serde(default)]
    pub exists: bool,
}

fn default_scope() -> ServiceScope {
    ServiceScope::User
}

impl Service {
    /// Unit name without a trailing ".service", used to match audio clients
    pub fn unit_stem(&self) -> &str {
        self.unit.strip_suffix(".service").unwrap_or(&self.unit)
    }
}

/// Power actions the host allows
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PowerCapabilities {
    #[serde(default)]
    pub power_off: bool,

    #[serde(default)]
    pub reboot: bool,
}

/// Stable identifier of a logical entity
///
/// Keys survive reconnects and id churn: a service is keyed by scope+unit,
/// a remote client by the normalized form of its stable name. Once a key
/// exists it is never reused for a different underlying source.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKey {
    /// The aggregate receiver entity for the whole host
    Hub,

    /// A service-backed entity
    Service { scope: ServiceScope, unit: String },

    /// A standalone remote audio client
    Client { name: String },
}

impl EntityKey {
    /// Key for a service unit
    pub fn service(scope: ServiceScope, unit: impl Into<String>) -> Self {
        EntityKey::Service {
            scope,
            unit: unit.into(),
        }
    }

    /// Key for a remote client, from its normalized name
    pub fn client(name: impl Into<String>) -> Self {
        EntityKey::Client { name: name.into() }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKey::Hub => write!(f, "hub"),
            EntityKey::Service { scope, unit } => write!(f, "{}/{}", scope, unit),
            EntityKey::Client { name } => write!(f, "client:{}", name),
        }
    }
}

/// Observable playback/availability status of a logical entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackStatus {
    Playing,
    Idle,
    Off,
    /// Only reachable through a mapped external player
    Paused,
    /// The owning backend could not be reached this cycle
    Unavailable,
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PlaybackStatus::Playing => "playing",
            PlaybackStatus::Idle => "idle",
            PlaybackStatus::Off => "off",
            PlaybackStatus::Paused => "paused",
            PlaybackStatus::Unavailable => "unavailable",
        };
        write!(f, "{}", s)
    }
}

/// Commands that can be available on an entity
///
/// Native capabilities (volume, mute, service control) are decided by the
/// entity kind and its backend; transport capabilities appear only while a
/// mapped external player advertises them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    pub volume_set: bool,
    pub volume_mute: bool,
    pub turn_on_off: bool,
    pub play: bool,
    pub pause: bool,
    pub stop: bool,
    pub next_track: bool,
    pub previous_track: bool,
    pub seek: bool,
    pub select_source: bool,
    pub shuffle: bool,
    pub repeat: bool,
}

impl CapabilitySet {
    /// True when any transport capability is present
    pub fn has_transport(&self) -> bool {
        self.play
            || self.pause
            || self.stop
            || self.next_track
            || self.previous_track
            || self.seek
            || self.select_source
            || self.shuffle
            || self.repeat
    }
}

/// Fully-synthesized state of one logical entity
///
/// Recomputed from scratch on every refresh cycle, never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
    pub status: PlaybackStatus,
    pub volume: Option<Volume>,
    pub muted: Option<bool>,
    pub capabilities: CapabilitySet,
    pub attributes: BTreeMap<String, serde_json::Value>,
}

impl EntityState {
    /// State used before a backend has produced any data
    pub fn unavailable() -> Self {
        Self {
            status: PlaybackStatus::Unavailable,
            volume: None,
            muted: None,
            capabilities: CapabilitySet::default(),
            attributes: BTreeMap::new(),
        }
    }
}

/// Repeat mode of a mapped external player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepeatMode {
    Off,
    One,
    All,
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RepeatMode::Off => "off",
            RepeatMode::One => "one",
            RepeatMode::All => "all",
        };
        write!(f, "{}", s)
    }
}

/// A transport-level command forwarded verbatim to a mapped external player
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCommand {
    Play,
    Pause,
    Stop,
    NextTrack,
    PreviousTrack,
    /// Seek position in seconds
    Seek(f64),
    SelectSource(String),
    SetShuffle(bool),
    SetRepeat(RepeatMode),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_decodes_with_missing_fields() {
        let json = serde_json::json!({
            "id": 42,
            "name": "Tunnel for bobby@desktop",
            "host": "desktop"
        });
        let client: AudioClient = serde_json::from_value(json).unwrap();
        assert_eq!(client.name, "Tunnel for bobby@desktop");
        // Absent corked means "not known to be streaming"
        assert!(client.corked);
        assert!(!client.is_streaming());
        assert_eq!(client.volume, 0.0);
    }

    #[test]
    fn service_decodes_wire_name_as_unit() {
        let json = serde_json::json!({
            "scope": "user",
            "name": "mpd.service",
            "enabled": true,
            "running": true,
            "active_state": "active",
            "exists": true
        });
        let svc: Service = serde_json::from_value(json).unwrap();
        assert_eq!(svc.unit, "mpd.service");
        assert_eq!(svc.unit_stem(), "mpd");
        assert_eq!(svc.scope, ServiceScope::User);
        assert_eq!(svc.active_state, ActiveState::Active);
    }

    #[test]
    fn entity_key_display() {
        let svc = EntityKey::service(ServiceScope::User, "mpd.service");
        assert_eq!(svc.to_string(), "user/mpd.service");
        assert_eq!(EntityKey::client("tunnel_for_bobby_desktop").to_string(),
            "client:tunnel_for_bobby_desktop");
        assert_eq!(EntityKey::Hub.to_string(), "hub");
    }

    #[test]
    fn backends_default_to_absent() {
        let info: ServerInfo = serde_json::from_value(serde_json::json!({
            "hostname": "server1"
        }))
        .unwrap();
        assert!(!info.backends.pulseaudio);
        assert!(!info.backends.systemd);
    }
}
