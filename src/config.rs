use crate::types::EntityKey;
use std::collections::HashMap;
use std::time::Duration;

/// Default audio client poll interval
pub const DEFAULT_AUDIO_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default service poll interval (service enumeration is costly)
pub const DEFAULT_SERVICE_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Default heartbeat interval for the connectivity check
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default timeout for audio client polls
pub const DEFAULT_AUDIO_TIMEOUT: Duration = Duration::from_secs(10);

/// Default timeout for service polls
pub const DEFAULT_SERVICE_TIMEOUT: Duration = Duration::from_secs(15);

/// Default server-side keepalive interval plus a client-side grace buffer
pub const DEFAULT_EVENT_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(45);

/// Default event-stream reconnect backoff bounds
pub const DEFAULT_RECONNECT_BASE: Duration = Duration::from_secs(1);
pub const DEFAULT_RECONNECT_CAP: Duration = Duration::from_secs(300);

/// Configuration for one Odio host connection
///
/// Backend presence is not configured here: it is declared by the server at
/// startup (see [`crate::ServerInfo`]) and read-only for the session.
#[derive(Debug, Clone)]
pub struct OdioConfig {
    /// Base URL of the host API, e.g. "http://odio.local:8096"
    pub base_url: String,

    /// Poll cadence for the audio client list
    pub audio_poll_interval: Duration,

    /// Poll cadence for the service list
    pub service_poll_interval: Duration,

    /// Poll cadence for the connectivity heartbeat
    pub heartbeat_interval: Duration,

    /// Per-poll timeout for the audio backend
    pub audio_timeout: Duration,

    /// Per-poll timeout for the service backend
    pub service_timeout: Duration,

    /// Whether to hold a persistent event-stream subscription
    pub use_event_stream: bool,

    /// Reconnect when no event (including keepalives) arrives within this window
    pub event_keepalive_timeout: Duration,

    /// First reconnect delay after the event stream drops
    pub reconnect_base: Duration,

    /// Upper bound for the reconnect delay
    pub reconnect_cap: Duration,

    /// Initial entity mappings (logical key → external player id)
    pub mappings: HashMap<EntityKey, String>,
}

impl OdioConfig {
    /// Configuration with default cadences for the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            audio_poll_interval: DEFAULT_AUDIO_POLL_INTERVAL,
            service_poll_interval: DEFAULT_SERVICE_POLL_INTERVAL,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            audio_timeout: DEFAULT_AUDIO_TIMEOUT,
            service_timeout: DEFAULT_SERVICE_TIMEOUT,
            use_event_stream: true,
            event_keepalive_timeout: DEFAULT_EVENT_KEEPALIVE_TIMEOUT,
            reconnect_base: DEFAULT_RECONNECT_BASE,
            reconnect_cap: DEFAULT_RECONNECT_CAP,
            mappings: HashMap::new(),
        }
    }

    /// Set the initial mapping table
    pub fn with_mappings(mut self, mappings: HashMap<EntityKey, String>) -> Self {
        self.mappings = mappings;
        self
    }

    /// Override the audio poll interval
    pub fn with_audio_poll_interval(mut self, interval: Duration) -> Self {
        self.audio_poll_interval = interval;
        self
    }

    /// Override the service poll interval
    pub fn with_service_poll_interval(mut self, interval: Duration) -> Self {
        self.service_poll_interval = interval;
        self
    }

    /// Disable the persistent event-stream subscription (poll only)
    pub fn without_event_stream(mut self) -> Self {
        self.use_event_stream = false;
        self
    }
}
