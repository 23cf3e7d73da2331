use crate::client::OdioClient;
use crate::config::OdioConfig;
use crate::delegate::ExternalPlayer;
use crate::entity::{self, Entity, Hub};
use crate::error::Result;
use crate::host::HostApi;
use crate::mappings::MappingStore;
use crate::orchestrator::{self, Inner, Orchestrator, Shared};
use crate::subscription::UpdateReceiver;
use crate::types::{EntityKey, PowerCapabilities, ServerInfo};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, Notify};

/// Connection to one Odio host
///
/// `OdioRemote` fetches the server's identity and declared backends once,
/// performs an initial refresh of every enabled backend, then keeps the
/// entity snapshots current in the background (periodic polls plus the
/// event-stream subscription). Consumers read state through [`Hub`] and
/// [`Entity`] handles and learn about changes through [`subscribe`].
///
/// [`subscribe`]: OdioRemote::subscribe
pub struct OdioRemote {
    inner: Arc<Inner>,
    orchestrator: Orchestrator,
}

impl OdioRemote {
    /// Connect to the host configured in `config`
    ///
    /// Fetching the server info is the only fatal startup step; a backend
    /// that cannot be polled afterwards just synthesizes `unavailable`
    /// entities until it recovers.
    pub async fn connect(config: OdioConfig) -> Result<Self> {
        let api = Arc::new(OdioClient::from_config(&config)?);
        Self::connect_with(api, None, config).await
    }

    /// Connect through a custom [`HostApi`] implementation, optionally with
    /// an external player provider for capability delegation
    pub async fn connect_with(
        api: Arc<dyn HostApi>,
        external: Option<Arc<dyn ExternalPlayer>>,
        config: OdioConfig,
    ) -> Result<Self> {
        let server = api.server_info().await?;
        tracing::info!(
            "Connected to '{}' (pulseaudio={}, systemd={})",
            server.hostname,
            server.backends.pulseaudio,
            server.backends.systemd
        );

        let (update_tx, _) = broadcast::channel(64);
        let mappings = MappingStore::new(config.mappings.clone());
        let inner = Arc::new(Inner {
            api,
            external,
            server,
            mappings,
            config,
            shared: Mutex::new(Shared {
                reachable: true,
                ..Default::default()
            }),
            update_tx,
            audio_refresh: Notify::new(),
            service_refresh: Notify::new(),
        });

        // Initial refresh so consumers see data before the first interval
        if inner.server.backends.pulseaudio {
            orchestrator::poll_audio(&inner).await;
        }
        if inner.server.backends.systemd {
            orchestrator::poll_services(&inner).await;
        }
        inner.run_cycle();

        let orchestrator = Orchestrator::start(&inner);
        Ok(Self {
            inner,
            orchestrator,
        })
    }

    /// Server identity and declared backends (immutable for the session)
    pub fn server_info(&self) -> &ServerInfo {
        &self.inner.server
    }

    /// Whether the last heartbeat reached the API
    pub fn is_reachable(&self) -> bool {
        self.inner.shared.lock().unwrap().reachable
    }

    /// Handle for the aggregate hub entity
    pub fn hub(&self) -> Hub {
        Hub::new(self.inner.clone())
    }

    /// Handles for every known logical entity (services and remote clients)
    pub fn entities(&self) -> Vec<Entity> {
        entity::entity_keys(&self.inner)
            .into_iter()
            .map(|key| Entity::new(key, self.inner.clone()))
            .collect()
    }

    /// Handle for one logical entity, if it has been observed
    ///
    /// The hub is not addressable here; use [`hub`](OdioRemote::hub).
    pub fn entity(&self, key: &EntityKey) -> Option<Entity> {
        if matches!(key, EntityKey::Hub) {
            return None;
        }
        let known = self
            .inner
            .shared
            .lock()
            .unwrap()
            .states
            .contains_key(key);
        known.then(|| Entity::new(key.clone(), self.inner.clone()))
    }

    /// Subscribe to per-entity refresh notifications
    pub fn subscribe(&self) -> UpdateReceiver {
        UpdateReceiver::new(self.inner.update_tx.subscribe())
    }

    /// Current mapping table (logical key → external player id)
    pub fn mappings(&self) -> HashMap<EntityKey, String> {
        self.inner.mappings.snapshot()
    }

    /// Replace the mapping table
    ///
    /// Atomic with respect to in-flight synthesis: a running cycle sees the
    /// old or the new table in full. A fresh cycle runs immediately, so
    /// delegated attributes appear or disappear without waiting for the
    /// next poll.
    pub fn set_mappings(&self, mappings: HashMap<EntityKey, String>) {
        self.inner.mappings.replace(mappings);
        self.inner.run_cycle();
    }

    /// Request an immediate refresh of every enabled backend
    pub fn refresh(&self) {
        self.inner.audio_refresh.notify_one();
        self.inner.service_refresh.notify_one();
    }

    /// Power actions the host allows
    pub async fn power_capabilities(&self) -> Result<PowerCapabilities> {
        self.inner.api.power_capabilities().await
    }

    /// Power the host off
    pub async fn power_off(&self) -> Result<()> {
        self.inner.api.power_off().await
    }

    /// Reboot the host
    pub async fn reboot(&self) -> Result<()> {
        self.inner.api.reboot().await
    }

    /// Stop all background tasks and tear down the event-stream connection
    ///
    /// Deterministic: after this returns, no poll or reconnect fires.
    pub async fn shutdown(&mut self) {
        self.orchestrator.shutdown().await;
        tracing::info!("Disconnected from '{}'", self.inner.server.hostname);
    }
}
