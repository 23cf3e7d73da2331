use crate::delegate;
use crate::error::{OdioError, Result};
use crate::host::ServiceAction;
use crate::identity;
use crate::orchestrator::Inner;
use crate::types::{EntityKey, EntityState, RepeatMode, TransportCommand, Volume};
use std::sync::Arc;

/// Handle for one logical entity (a service or a standalone remote client)
///
/// Cheap to clone; reads always return the latest fully-synthesized
/// snapshot. Native commands (volume, mute, service control) go to the
/// host's API; transport commands are forwarded to the mapped external
/// player when one is configured.
#[derive(Clone)]
pub struct Entity {
    key: EntityKey,
    inner: Arc<Inner>,
}

impl Entity {
    pub(crate) fn new(key: EntityKey, inner: Arc<Inner>) -> Self {
        Self { key, inner }
    }

    /// Stable logical key of this entity
    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    /// Human-readable name
    pub fn display_name(&self) -> String {
        match &self.key {
            EntityKey::Hub => self.inner.server.hostname.clone(),
            EntityKey::Service { scope, unit } => format!("{} ({})", unit, scope),
            EntityKey::Client { name } => self
                .inner
                .shared
                .lock()
                .unwrap()
                .resolver
                .identity(name)
                .map(|i| i.name.clone())
                .unwrap_or_else(|| name.clone()),
        }
    }

    /// Latest synthesized state
    pub fn state(&self) -> EntityState {
        self.inner
            .shared
            .lock()
            .unwrap()
            .states
            .get(&self.key)
            .cloned()
            .unwrap_or_else(EntityState::unavailable)
    }

    // ========== Volume control (always native) ==========

    /// Set the volume (0.0–1.0)
    ///
    /// Always routed to the local audio backend, keyed by the stable client
    /// name, never to the mapped external player, so the mapped player's
    /// own volume is untouched.
    pub async fn set_volume(&self, volume: Volume) -> Result<()> {
        let name = self.audio_client_name()?;
        self.inner.api.set_client_volume(&name, volume).await
    }

    /// Set the mute state (always native, see [`set_volume`])
    ///
    /// [`set_volume`]: Entity::set_volume
    pub async fn set_muted(&self, muted: bool) -> Result<()> {
        let name = self.audio_client_name()?;
        self.inner.api.set_client_muted(&name, muted).await
    }

    // ========== Service lifecycle (never delegated) ==========

    /// Enable the underlying service
    pub async fn turn_on(&self) -> Result<()> {
        self.service_action(ServiceAction::Enable).await
    }

    /// Disable the underlying service
    pub async fn turn_off(&self) -> Result<()> {
        self.service_action(ServiceAction::Disable).await
    }

    /// Restart the underlying service
    pub async fn restart(&self) -> Result<()> {
        self.service_action(ServiceAction::Restart).await
    }

    /// Start the underlying service without enabling it
    pub async fn start(&self) -> Result<()> {
        self.service_action(ServiceAction::Start).await
    }

    /// Stop the underlying service without disabling it
    pub async fn stop(&self) -> Result<()> {
        self.service_action(ServiceAction::Stop).await
    }

    async fn service_action(&self, action: ServiceAction) -> Result<()> {
        let (scope, unit) = match &self.key {
            EntityKey::Service { scope, unit } => (*scope, unit.clone()),
            _ => {
                return Err(OdioError::Unsupported(
                    "service control is only available for service-backed entities",
                ))
            }
        };
        tracing::debug!("Service {} for {}/{}", action, scope, unit);
        self.inner.api.control_service(action, scope, &unit).await?;

        // No optimistic state mutation: request fresh snapshots and let the
        // next cycle confirm the new state.
        self.inner.service_refresh.notify_one();
        self.inner.audio_refresh.notify_one();
        Ok(())
    }

    // ========== Transport (delegated to the mapped player) ==========

    /// Send play to the mapped player
    pub async fn play(&self) -> Result<()> {
        self.transport(TransportCommand::Play).await
    }

    /// Send pause to the mapped player
    pub async fn pause(&self) -> Result<()> {
        self.transport(TransportCommand::Pause).await
    }

    /// Send stop to the mapped player
    pub async fn stop_playback(&self) -> Result<()> {
        self.transport(TransportCommand::Stop).await
    }

    /// Skip to the next track on the mapped player
    pub async fn next_track(&self) -> Result<()> {
        self.transport(TransportCommand::NextTrack).await
    }

    /// Skip to the previous track on the mapped player
    pub async fn previous_track(&self) -> Result<()> {
        self.transport(TransportCommand::PreviousTrack).await
    }

    /// Seek the mapped player to a position in seconds
    pub async fn seek(&self, position: f64) -> Result<()> {
        self.transport(TransportCommand::Seek(position)).await
    }

    /// Select an input source on the mapped player
    pub async fn select_source(&self, source: impl Into<String>) -> Result<()> {
        self.transport(TransportCommand::SelectSource(source.into()))
            .await
    }

    /// Set shuffle on the mapped player
    pub async fn set_shuffle(&self, shuffle: bool) -> Result<()> {
        self.transport(TransportCommand::SetShuffle(shuffle)).await
    }

    /// Set the repeat mode on the mapped player
    pub async fn set_repeat(&self, repeat: RepeatMode) -> Result<()> {
        self.transport(TransportCommand::SetRepeat(repeat)).await
    }

    async fn transport(&self, command: TransportCommand) -> Result<()> {
        let mapped = self.inner.mappings.get(&self.key).ok_or(OdioError::Unsupported(
            "transport commands require a mapped external player",
        ))?;
        let provider = self.inner.external.as_ref().ok_or(OdioError::Unsupported(
            "no external player provider configured",
        ))?;
        // Forward failures are a local degradation, not a caller error
        delegate::forward(provider.as_ref(), &mapped, command).await;
        Ok(())
    }

    /// The stable audio client name commands are keyed by
    fn audio_client_name(&self) -> Result<String> {
        let shared = self.inner.shared.lock().unwrap();
        match &self.key {
            EntityKey::Service { scope, unit } => shared
                .services
                .iter()
                .find(|s| s.scope == *scope && s.unit == *unit)
                .and_then(|s| identity::service_client(&shared.clients, s))
                .map(|c| c.name.clone())
                .ok_or_else(|| OdioError::NoAudioClient(self.key.to_string())),
            EntityKey::Client { name } => shared
                .resolver
                .identity(name)
                .map(|i| i.name.clone())
                .ok_or_else(|| OdioError::NoAudioClient(self.key.to_string())),
            EntityKey::Hub => Err(OdioError::NoAudioClient(self.key.to_string())),
        }
    }
}

/// Handle for the aggregate hub entity
///
/// Represents the host as a whole: its state aggregates every audio client,
/// and volume/mute commands go to the server-level endpoints.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<Inner>,
}

impl Hub {
    pub(crate) fn new(inner: Arc<Inner>) -> Self {
        Self { inner }
    }

    /// Latest synthesized hub state
    pub fn state(&self) -> EntityState {
        self.inner
            .shared
            .lock()
            .unwrap()
            .states
            .get(&EntityKey::Hub)
            .cloned()
            .unwrap_or_else(EntityState::unavailable)
    }

    /// Set the server-level volume (0.0–1.0)
    pub async fn set_volume(&self, volume: Volume) -> Result<()> {
        if !self.inner.server.backends.pulseaudio {
            return Err(OdioError::Unsupported("no audio backend on this host"));
        }
        self.inner.api.set_server_volume(volume).await
    }

    /// Set the server-level mute state
    pub async fn set_muted(&self, muted: bool) -> Result<()> {
        if !self.inner.server.backends.pulseaudio {
            return Err(OdioError::Unsupported("no audio backend on this host"));
        }
        self.inner.api.set_server_muted(muted).await
    }
}

/// List entity keys suitable for building handles (everything except the hub)
pub(crate) fn entity_keys(inner: &Inner) -> Vec<EntityKey> {
    inner
        .shared
        .lock()
        .unwrap()
        .states
        .keys()
        .filter(|k| !matches!(k, EntityKey::Hub))
        .cloned()
        .collect()
}
