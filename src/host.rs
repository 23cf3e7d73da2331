use crate::error::Result;
use crate::types::{AudioClient, PowerCapabilities, ServerInfo, Service, ServiceScope, Volume};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::fmt;

/// Action on a service unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
    Enable,
    Disable,
    Restart,
}

impl ServiceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceAction::Start => "start",
            ServiceAction::Stop => "stop",
            ServiceAction::Enable => "enable",
            ServiceAction::Disable => "disable",
            ServiceAction::Restart => "restart",
        }
    }
}

impl fmt::Display for ServiceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One message pushed by the host's event stream
///
/// Payloads are deliberately not carried: any backend update is treated as a
/// "refresh now" trigger and state is re-derived from a fresh full fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    /// The audio client list changed
    AudioUpdated,

    /// A service unit changed
    ServiceUpdated,

    /// Stream control message ("connected", "love" keepalive, "bye")
    Control(String),
}

impl HostEvent {
    /// Map a wire event type (and its data field) to a [`HostEvent`]
    ///
    /// Returns `None` for event types the core does not handle.
    pub fn from_wire(event_type: &str, data: &str) -> Option<Self> {
        match event_type {
            "audio.updated" => Some(HostEvent::AudioUpdated),
            "service.updated" => Some(HostEvent::ServiceUpdated),
            "server.info" => {
                // data is either a bare word or a JSON-quoted string
                let msg = serde_json::from_str::<String>(data)
                    .unwrap_or_else(|_| data.trim().to_string());
                Some(HostEvent::Control(msg))
            }
            _ => None,
        }
    }
}

/// Stream of host events from one subscription
pub type EventStream = BoxStream<'static, Result<HostEvent>>;

/// The upstream host contract the core depends on
///
/// Implemented over HTTP by [`crate::OdioClient`]; tests substitute their
/// own implementations. Commands are keyed by the stable client name, never
/// by the ephemeral client id.
#[async_trait]
pub trait HostApi: Send + Sync {
    /// Server identity and declared backends
    async fn server_info(&self) -> Result<ServerInfo>;

    /// Current audio client snapshot
    async fn audio_clients(&self) -> Result<Vec<AudioClient>>;

    /// Current service snapshot
    async fn services(&self) -> Result<Vec<Service>>;

    /// Set the server-level volume (0.0–1.0)
    async fn set_server_volume(&self, volume: Volume) -> Result<()>;

    /// Set the server-level mute state
    async fn set_server_muted(&self, muted: bool) -> Result<()>;

    /// Set one client's volume, keyed by stable name
    async fn set_client_volume(&self, name: &str, volume: Volume) -> Result<()>;

    /// Set one client's mute state, keyed by stable name
    async fn set_client_muted(&self, name: &str, muted: bool) -> Result<()>;

    /// Start/stop/enable/disable/restart a service unit
    async fn control_service(
        &self,
        action: ServiceAction,
        scope: ServiceScope,
        unit: &str,
    ) -> Result<()>;

    /// Power actions the host allows
    async fn power_capabilities(&self) -> Result<PowerCapabilities>;

    /// Power the host off
    async fn power_off(&self) -> Result<()>;

    /// Reboot the host
    async fn reboot(&self) -> Result<()>;

    /// Open the event-stream subscription for the given backends
    async fn events(&self, backends: &[&str]) -> Result<EventStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_events_map_to_triggers() {
        assert_eq!(
            HostEvent::from_wire("audio.updated", "[]"),
            Some(HostEvent::AudioUpdated)
        );
        assert_eq!(
            HostEvent::from_wire("service.updated", "{\"name\":\"mpd.service\"}"),
            Some(HostEvent::ServiceUpdated)
        );
        assert_eq!(HostEvent::from_wire("player.position", "12.5"), None);
    }

    #[test]
    fn control_data_unquotes() {
        assert_eq!(
            HostEvent::from_wire("server.info", "\"love\""),
            Some(HostEvent::Control("love".to_string()))
        );
        assert_eq!(
            HostEvent::from_wire("server.info", "connected"),
            Some(HostEvent::Control("connected".to_string()))
        );
    }
}
