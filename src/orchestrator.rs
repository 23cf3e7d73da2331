use crate::config::OdioConfig;
use crate::delegate::{self, ExternalPlayer};
use crate::host::HostApi;
use crate::identity::{self, IdentityResolver};
use crate::mappings::MappingStore;
use crate::synth;
use crate::types::{AudioClient, EntityKey, EntityState, ServerInfo, Service, ServiceScope};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, Notify};
use tokio::time::timeout;

/// Shared runtime context, created at connect time and passed by reference
/// to every task; torn down on shutdown.
pub(crate) struct Inner {
    pub(crate) api: Arc<dyn HostApi>,
    pub(crate) external: Option<Arc<dyn ExternalPlayer>>,
    pub(crate) config: OdioConfig,
    /// Immutable for the session; backend flags decide which tasks exist
    pub(crate) server: ServerInfo,
    pub(crate) mappings: MappingStore,
    pub(crate) shared: Mutex<Shared>,
    pub(crate) update_tx: broadcast::Sender<EntityKey>,
    pub(crate) audio_refresh: Notify,
    pub(crate) service_refresh: Notify,
}

/// Mutable state behind the context lock
#[derive(Default)]
pub(crate) struct Shared {
    pub(crate) resolver: IdentityResolver,
    /// Last successfully fetched snapshots; kept across failed polls
    pub(crate) clients: Vec<AudioClient>,
    pub(crate) services: Vec<Service>,
    /// Every service entity ever observed; keys are never dropped mid-session
    pub(crate) service_keys: BTreeSet<(ServiceScope, String)>,
    /// Whether the latest poll of each backend succeeded
    pub(crate) audio_ok: bool,
    pub(crate) services_ok: bool,
    /// Latest heartbeat result
    pub(crate) reachable: bool,
    /// Published entity states, replaced wholesale each cycle
    pub(crate) states: BTreeMap<EntityKey, EntityState>,
}

impl Inner {
    /// Backend names for the event-stream subscription
    pub(crate) fn subscribed_backends(&self) -> Vec<&'static str> {
        let mut backends = Vec::new();
        if self.server.backends.pulseaudio {
            backends.push("audio");
        }
        if self.server.backends.systemd {
            backends.push("systemd");
        }
        backends
    }

    /// Run one synthesis cycle: resolve identities, synthesize states,
    /// apply delegation, publish the full snapshot, notify changed keys.
    ///
    /// Ordering is strict and the whole pass runs under the context lock,
    /// so consumers only ever observe a fully-synthesized snapshot. The
    /// mapping table is read once up front: a concurrent reconfiguration
    /// is either entirely visible or entirely invisible to this pass.
    pub(crate) fn run_cycle(&self) {
        let mapping_view = self.mappings.snapshot();
        let provider = self.external.as_deref();

        let mut guard = self.shared.lock().unwrap();
        let Shared {
            resolver,
            clients,
            services,
            service_keys,
            audio_ok,
            services_ok,
            reachable,
            states,
        } = &mut *guard;

        // 1. Identity resolution
        resolver.observe(clients, &self.server.hostname, services);
        for svc in services.iter().filter(|s| s.exists) {
            service_keys.insert((svc.scope, svc.unit.clone()));
        }

        // 2 + 3. Synthesis with delegation overlay
        let mut next: BTreeMap<EntityKey, EntityState> = BTreeMap::new();

        next.insert(
            EntityKey::Hub,
            synth::hub_state(clients, *audio_ok, self.server.backends, *reachable),
        );

        if self.server.backends.systemd {
            for (scope, unit) in service_keys.iter() {
                let key = EntityKey::Service {
                    scope: *scope,
                    unit: unit.clone(),
                };
                let service = services
                    .iter()
                    .find(|s| s.scope == *scope && s.unit == *unit);
                let client = service.and_then(|s| identity::service_client(clients, s));
                let mapped = mapping_view.get(&key);
                let external = delegate::external_for(provider, mapped.map(String::as_str));
                next.insert(
                    key,
                    synth::service_state(
                        *scope,
                        unit,
                        service,
                        client,
                        *services_ok,
                        external.as_ref(),
                        mapped.map(String::as_str),
                    ),
                );
            }
        }

        if self.server.backends.pulseaudio {
            for (key_name, ident) in resolver.remote_clients() {
                let key = EntityKey::client(key_name);
                let client = if ident.connected {
                    clients.iter().find(|c| c.name == ident.name)
                } else {
                    None
                };
                let mapped = mapping_view.get(&key);
                let external = delegate::external_for(provider, mapped.map(String::as_str));
                next.insert(
                    key,
                    synth::client_state(
                        ident,
                        client,
                        *audio_ok,
                        &self.server.hostname,
                        external.as_ref(),
                        mapped.map(String::as_str),
                    ),
                );
            }
        }

        let changed: Vec<EntityKey> = next
            .iter()
            .filter(|&(key, state)| states.get(key) != Some(state))
            .map(|(key, _)| key.clone())
            .collect();
        *states = next;
        drop(guard);

        for key in changed {
            let _ = self.update_tx.send(key);
        }
    }
}

/// Poll the audio client list once and run a cycle
///
/// A failed or timed-out poll flags the audio backend unreachable for this
/// cycle only; the last good snapshot is kept for attribute continuity.
pub(crate) async fn poll_audio(inner: &Inner) {
    match timeout(inner.config.audio_timeout, inner.api.audio_clients()).await {
        Ok(Ok(clients)) => {
            tracing::debug!("Audio poll: {} clients", clients.len());
            let mut shared = inner.shared.lock().unwrap();
            shared.clients = clients;
            shared.audio_ok = true;
        }
        Ok(Err(e)) => {
            tracing::warn!("Audio poll failed: {}", e);
            inner.shared.lock().unwrap().audio_ok = false;
        }
        Err(_) => {
            tracing::warn!("Audio poll timed out");
            inner.shared.lock().unwrap().audio_ok = false;
        }
    }
    inner.run_cycle();
}

/// Poll the service list once and run a cycle
pub(crate) async fn poll_services(inner: &Inner) {
    match timeout(inner.config.service_timeout, inner.api.services()).await {
        Ok(Ok(services)) => {
            tracing::debug!("Service poll: {} units", services.len());
            let mut shared = inner.shared.lock().unwrap();
            shared.services = services;
            shared.services_ok = true;
        }
        Ok(Err(e)) => {
            tracing::warn!("Service poll failed: {}", e);
            inner.shared.lock().unwrap().services_ok = false;
        }
        Err(_) => {
            tracing::warn!("Service poll timed out");
            inner.shared.lock().unwrap().services_ok = false;
        }
    }
    inner.run_cycle();
}

/// Check API reachability once and run a cycle when it changed
async fn poll_heartbeat(inner: &Inner) {
    let reachable = timeout(inner.config.audio_timeout, inner.api.server_info())
        .await
        .map(|r| r.is_ok())
        .unwrap_or(false);

    let changed = {
        let mut shared = inner.shared.lock().unwrap();
        let changed = shared.reachable != reachable;
        shared.reachable = reachable;
        changed
    };
    if changed {
        tracing::info!(
            "API {} reachable",
            if reachable { "became" } else { "is no longer" }
        );
        inner.run_cycle();
    }
}

async fn run_audio_task(inner: Arc<Inner>, mut stop_rx: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                tracing::debug!("Audio poll task stopped");
                return;
            }
            _ = tokio::time::sleep(inner.config.audio_poll_interval) => {}
            _ = inner.audio_refresh.notified() => {
                tracing::debug!("Audio refresh requested");
            }
        }
        poll_audio(&inner).await;
    }
}

async fn run_service_task(inner: Arc<Inner>, mut stop_rx: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                tracing::debug!("Service poll task stopped");
                return;
            }
            _ = tokio::time::sleep(inner.config.service_poll_interval) => {}
            _ = inner.service_refresh.notified() => {
                tracing::debug!("Service refresh requested");
            }
        }
        poll_services(&inner).await;
    }
}

async fn run_heartbeat_task(inner: Arc<Inner>, mut stop_rx: broadcast::Receiver<()>) {
    loop {
        tokio::select! {
            _ = stop_rx.recv() => {
                tracing::debug!("Heartbeat task stopped");
                return;
            }
            _ = tokio::time::sleep(inner.config.heartbeat_interval) => {}
        }
        poll_heartbeat(&inner).await;
    }
}

/// Owns the background tasks: one poll loop per enabled backend, the
/// heartbeat, and the event-stream consumer.
pub(crate) struct Orchestrator {
    stop_tx: broadcast::Sender<()>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl Orchestrator {
    pub(crate) fn start(inner: &Arc<Inner>) -> Self {
        let (stop_tx, _) = broadcast::channel(1);
        let mut handles = Vec::new();

        if inner.server.backends.pulseaudio {
            handles.push(tokio::spawn(run_audio_task(
                inner.clone(),
                stop_tx.subscribe(),
            )));
        }
        if inner.server.backends.systemd {
            handles.push(tokio::spawn(run_service_task(
                inner.clone(),
                stop_tx.subscribe(),
            )));
        }
        handles.push(tokio::spawn(run_heartbeat_task(
            inner.clone(),
            stop_tx.subscribe(),
        )));
        if inner.config.use_event_stream && !inner.subscribed_backends().is_empty() {
            handles.push(tokio::spawn(crate::events::run_event_stream(
                inner.clone(),
                stop_tx.subscribe(),
            )));
        }

        Self { stop_tx, handles }
    }

    /// Stop every task; pending backoff timers and the event connection are
    /// dropped, so no callback fires after this returns.
    pub(crate) async fn shutdown(&mut self) {
        let _ = self.stop_tx.send(());
        for mut handle in self.handles.drain(..) {
            // Give each task a moment to stop gracefully, then force it
            if tokio::time::timeout(Duration::from_millis(500), &mut handle)
                .await
                .is_err()
            {
                handle.abort();
            }
        }
    }
}
