//! State synthesis: pure functions computing the observable state of each
//! logical entity from the latest records, backend reachability and the
//! mapped external player's snapshot.
//!
//! The machine is stateless between cycles; everything is recomputed from
//! scratch on every refresh. Precedence when signals conflict: native
//! backend signals decide `off`/`unavailable`, the mapped external status
//! decides transport-level states (`playing`/`paused`).

use crate::delegate::{self, ExternalSnapshot, ExternalStatus};
use crate::identity::ClientIdentity;
use crate::types::{
    AudioClient, Backends, CapabilitySet, EntityState, PlaybackStatus, Service, ServiceScope,
};
use serde_json::json;
use std::collections::BTreeMap;

fn map_external(status: ExternalStatus) -> PlaybackStatus {
    match status {
        ExternalStatus::Playing => PlaybackStatus::Playing,
        ExternalStatus::Paused => PlaybackStatus::Paused,
        ExternalStatus::Idle | ExternalStatus::On => PlaybackStatus::Idle,
        ExternalStatus::Off => PlaybackStatus::Off,
    }
}

/// Synthesize the state of a service-backed entity
pub(crate) fn service_state(
    scope: ServiceScope,
    unit: &str,
    service: Option<&Service>,
    client: Option<&AudioClient>,
    services_ok: bool,
    external: Option<&ExternalSnapshot>,
    mapped_id: Option<&str>,
) -> EntityState {
    let running = service.map(|s| s.running).unwrap_or(false);

    let status = if !services_ok {
        PlaybackStatus::Unavailable
    } else if !running {
        PlaybackStatus::Off
    } else if let Some(ext) = external.and_then(|e| e.status) {
        map_external(ext)
    } else if let Some(client) = client {
        if client.is_streaming() {
            PlaybackStatus::Playing
        } else {
            PlaybackStatus::Idle
        }
    } else {
        PlaybackStatus::Idle
    };

    let mut capabilities = CapabilitySet {
        turn_on_off: true,
        volume_mute: true,
        volume_set: client.is_some(),
        ..Default::default()
    };
    if let Some(external) = external {
        capabilities = delegate::delegated_capabilities(capabilities, &external.features);
    }

    let mut attributes = BTreeMap::new();
    attributes.insert("scope".to_string(), json!(scope.to_string()));
    attributes.insert("unit".to_string(), json!(unit));
    if let Some(service) = service {
        attributes.insert("enabled".to_string(), json!(service.enabled));
        attributes.insert("running".to_string(), json!(service.running));
        attributes.insert("active_state".to_string(), json!(service.active_state));
    }
    if let Some(client) = client {
        insert_client_attributes(&mut attributes, client);
    }
    if let Some(id) = mapped_id {
        attributes.insert("mapped_player".to_string(), json!(id));
    }
    if let Some(external) = external {
        attributes = delegate::merge_attributes(attributes, external);
    }

    EntityState {
        status,
        volume: client.map(|c| c.volume),
        muted: client.map(|c| c.muted),
        capabilities,
        attributes,
    }
}

/// Synthesize the state of a standalone remote client entity
pub(crate) fn client_state(
    identity: &ClientIdentity,
    client: Option<&AudioClient>,
    audio_ok: bool,
    server_hostname: &str,
    external: Option<&ExternalSnapshot>,
    mapped_id: Option<&str>,
) -> EntityState {
    let status = if !audio_ok {
        PlaybackStatus::Unavailable
    } else if client.is_none() {
        PlaybackStatus::Off
    } else if let Some(ext) = external.and_then(|e| e.status) {
        map_external(ext)
    } else if client.map(|c| c.is_streaming()).unwrap_or(false) {
        PlaybackStatus::Playing
    } else {
        PlaybackStatus::Idle
    };

    let mut capabilities = CapabilitySet {
        volume_set: true,
        volume_mute: true,
        ..Default::default()
    };
    if let Some(external) = external {
        capabilities = delegate::delegated_capabilities(capabilities, &external.features);
    }

    let mut attributes = BTreeMap::new();
    attributes.insert("client_name".to_string(), json!(identity.name));
    attributes.insert("remote_host".to_string(), json!(identity.host));
    attributes.insert("server_hostname".to_string(), json!(server_hostname));
    attributes.insert(
        "connection".to_string(),
        json!(if client.is_some() { "connected" } else { "disconnected" }),
    );
    if let Some(client) = client {
        insert_client_attributes(&mut attributes, client);
        // Backend props passthrough for diagnostics
        if let Some(peer) = client.props.get("native-protocol.peer") {
            attributes.insert("connection_peer".to_string(), json!(peer));
        }
        if let Some(host) = client.props.get("application.process.host") {
            attributes.insert("remote_host".to_string(), json!(host));
        }
        if let Some(version) = client.props.get("application.version") {
            attributes.insert("app_version".to_string(), json!(version));
        }
    }
    if let Some(id) = mapped_id {
        attributes.insert("mapped_player".to_string(), json!(id));
    }
    if let Some(external) = external {
        attributes = delegate::merge_attributes(attributes, external);
    }

    EntityState {
        status,
        volume: client.map(|c| c.volume),
        muted: client.map(|c| c.muted),
        capabilities,
        attributes,
    }
}

/// Synthesize the aggregate hub state
pub(crate) fn hub_state(
    clients: &[AudioClient],
    audio_ok: bool,
    backends: Backends,
    api_reachable: bool,
) -> EntityState {
    let status = if !backends.pulseaudio {
        PlaybackStatus::Off
    } else if !audio_ok {
        // An outright audio poll failure outranks every other signal
        PlaybackStatus::Unavailable
    } else if clients.iter().any(|c| c.is_streaming()) {
        PlaybackStatus::Playing
    } else if !clients.is_empty() {
        PlaybackStatus::Idle
    } else {
        PlaybackStatus::Off
    };

    let volume = if backends.pulseaudio && !clients.is_empty() {
        Some(clients.iter().map(|c| c.volume).sum::<f64>() / clients.len() as f64)
    } else {
        None
    };
    let muted = if backends.pulseaudio {
        Some(clients.iter().any(|c| c.muted))
    } else {
        None
    };

    let capabilities = CapabilitySet {
        volume_set: backends.pulseaudio,
        volume_mute: backends.pulseaudio,
        ..Default::default()
    };

    let mut attributes = BTreeMap::new();
    attributes.insert("backends".to_string(), json!(backends));
    attributes.insert("api_reachable".to_string(), json!(api_reachable));
    if backends.pulseaudio {
        attributes.insert("active_clients".to_string(), json!(clients.len()));
        attributes.insert(
            "playing_clients".to_string(),
            json!(clients.iter().filter(|c| c.is_streaming()).count()),
        );
    }

    EntityState {
        status,
        volume,
        muted,
        capabilities,
        attributes,
    }
}

fn insert_client_attributes(
    attributes: &mut BTreeMap<String, serde_json::Value>,
    client: &AudioClient,
) {
    attributes.insert("client_id".to_string(), json!(client.id));
    attributes.insert("app".to_string(), json!(client.app));
    attributes.insert("backend".to_string(), json!(client.backend));
    attributes.insert("user".to_string(), json!(client.user));
    attributes.insert("host".to_string(), json!(client.host));
    attributes.insert("corked".to_string(), json!(client.corked));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delegate::ExternalFeatures;
    use crate::types::ActiveState;

    fn service(running: bool) -> Service {
        Service {
            scope: ServiceScope::User,
            unit: "mpd.service".to_string(),
            enabled: true,
            running,
            active_state: if running { ActiveState::Active } else { ActiveState::Inactive },
            exists: true,
        }
    }

    fn audio_client(name: &str, corked: bool) -> AudioClient {
        serde_json::from_value(serde_json::json!({
            "id": 7, "name": name, "host": "server1", "app": name,
            "corked": corked, "volume": 0.4, "muted": false
        }))
        .unwrap()
    }

    fn external(status: ExternalStatus) -> ExternalSnapshot {
        ExternalSnapshot {
            status: Some(status),
            features: ExternalFeatures { play: true, pause: true, ..Default::default() },
            ..Default::default()
        }
    }

    #[test]
    fn active_service_with_uncorked_client_is_playing() {
        let svc = service(true);
        let client = audio_client("mpd", false);
        let state = service_state(
            ServiceScope::User, "mpd.service", Some(&svc), Some(&client), true, None, None,
        );
        assert_eq!(state.status, PlaybackStatus::Playing);
        assert_eq!(state.volume, Some(0.4));
    }

    #[test]
    fn active_service_with_corked_client_is_idle() {
        let svc = service(true);
        let client = audio_client("mpd", true);
        let state = service_state(
            ServiceScope::User, "mpd.service", Some(&svc), Some(&client), true, None, None,
        );
        assert_eq!(state.status, PlaybackStatus::Idle);
    }

    #[test]
    fn paused_is_unreachable_without_a_mapping() {
        // Whatever the native signals say, no mapping means no Paused
        let svc = service(true);
        let corked = audio_client("mpd", true);
        let uncorked = audio_client("mpd", false);
        for client in [None, Some(&corked), Some(&uncorked)] {
            let state = service_state(
                ServiceScope::User, "mpd.service", Some(&svc), client, true, None, None,
            );
            assert_ne!(state.status, PlaybackStatus::Paused);
        }

        let identity = ClientIdentity {
            name: "Tunnel for bobby@desktop".to_string(),
            host: "desktop".to_string(),
            connected: true,
        };
        for client in [None, Some(&corked)] {
            let state = client_state(&identity, client, true, "server1", None, None);
            assert_ne!(state.status, PlaybackStatus::Paused);
        }
    }

    #[test]
    fn mapped_paused_state_is_surfaced() {
        let svc = service(true);
        let client = audio_client("mpd", false);
        let ext = external(ExternalStatus::Paused);
        let state = service_state(
            ServiceScope::User,
            "mpd.service",
            Some(&svc),
            Some(&client),
            true,
            Some(&ext),
            Some("media_player.living_room"),
        );
        assert_eq!(state.status, PlaybackStatus::Paused);
        assert!(state.capabilities.play && state.capabilities.pause);
        assert_eq!(state.attributes["mapped_player"], json!("media_player.living_room"));
    }

    #[test]
    fn stopped_service_is_off_even_when_mapped_player_plays() {
        // Native signals stay authoritative for off
        let svc = service(false);
        let ext = external(ExternalStatus::Playing);
        let state = service_state(
            ServiceScope::User, "mpd.service", Some(&svc), None, true, Some(&ext), Some("x"),
        );
        assert_eq!(state.status, PlaybackStatus::Off);
    }

    #[test]
    fn unreachable_service_backend_synthesizes_unavailable() {
        let svc = service(true);
        let state = service_state(
            ServiceScope::User, "mpd.service", Some(&svc), None, false, None, None,
        );
        assert_eq!(state.status, PlaybackStatus::Unavailable);
    }

    #[test]
    fn disconnected_client_is_off_but_keeps_identity_attributes() {
        let identity = ClientIdentity {
            name: "Tunnel for bobby@desktop".to_string(),
            host: "desktop".to_string(),
            connected: false,
        };
        let state = client_state(&identity, None, true, "server1", None, None);
        assert_eq!(state.status, PlaybackStatus::Off);
        assert_eq!(state.attributes["connection"], json!("disconnected"));
        assert_eq!(state.attributes["client_name"], json!("Tunnel for bobby@desktop"));
        assert_eq!(state.volume, None);
    }

    #[test]
    fn hub_prefers_unavailable_over_everything() {
        let clients = vec![audio_client("mpd", false)];
        let backends = Backends { pulseaudio: true, systemd: true };
        let state = hub_state(&clients, false, backends, false);
        assert_eq!(state.status, PlaybackStatus::Unavailable);
    }

    #[test]
    fn hub_aggregates_children() {
        let backends = Backends { pulseaudio: true, systemd: false };

        let state = hub_state(&[], true, backends, true);
        assert_eq!(state.status, PlaybackStatus::Off);
        assert_eq!(state.volume, None);

        let idle = vec![audio_client("a", true), audio_client("b", true)];
        let state = hub_state(&idle, true, backends, true);
        assert_eq!(state.status, PlaybackStatus::Idle);

        let mixed = vec![audio_client("a", true), audio_client("b", false)];
        let state = hub_state(&mixed, true, backends, true);
        assert_eq!(state.status, PlaybackStatus::Playing);
        assert_eq!(state.volume, Some(0.4));
        assert_eq!(state.attributes["playing_clients"], json!(1));
    }

    #[test]
    fn absent_audio_backend_means_hub_off() {
        let backends = Backends { pulseaudio: false, systemd: true };
        let state = hub_state(&[], true, backends, true);
        assert_eq!(state.status, PlaybackStatus::Off);
        assert!(!state.capabilities.volume_set);
    }
}
