use crate::types::{AudioClient, Service};
use std::collections::BTreeMap;

/// Tracked identity of one remote client
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    /// Stable human-assigned name, exactly as the host reports it
    pub name: String,

    /// Host the client connects from
    pub host: String,

    /// Whether the client appeared in the latest snapshot
    pub connected: bool,
}

/// Maps ephemeral audio client records to stable logical keys
///
/// Client `id`s are reassigned on every reconnect; the only stability anchor
/// is the client name. The resolver keeps one entry per ever-seen remote
/// client name for the lifetime of the process: a name missing from a
/// snapshot is marked disconnected, never forgotten, so the entity stays
/// visible with a status reflecting the lost connection.
#[derive(Debug, Default)]
pub struct IdentityResolver {
    remote: BTreeMap<String, ClientIdentity>,
}

impl IdentityResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalized logical key for a client name
    ///
    /// Lowercased, with every run of characters outside `[a-z0-9_]`
    /// collapsed to a single underscore and edges trimmed.
    pub fn normalize_name(name: &str) -> String {
        let mut key = String::with_capacity(name.len());
        let mut last_was_sep = true;
        for c in name.to_lowercase().chars() {
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' {
                key.push(c);
                last_was_sep = false;
            } else if !last_was_sep {
                key.push('_');
                last_was_sep = true;
            }
        }
        key.trim_matches('_').to_string()
    }

    /// Ingest one client snapshot
    ///
    /// Classifies each record, creates keys for newly-seen remote clients
    /// and flips `connected` for known ones. Records with a blank name are
    /// rejected: the name is the sole stability anchor and an empty one
    /// cannot be deduplicated safely.
    pub fn observe(&mut self, clients: &[AudioClient], hostname: &str, services: &[Service]) {
        let mut seen: Vec<&str> = Vec::new();

        for client in clients {
            if client.name.trim().is_empty() {
                tracing::warn!(
                    "Rejecting audio client with empty name (id={}, host={})",
                    client.id,
                    client.host
                );
                continue;
            }
            if !is_remote(client, hostname, services) {
                continue;
            }

            let key = Self::normalize_name(&client.name);
            if key.is_empty() {
                tracing::warn!("Rejecting audio client '{}': name normalizes to nothing", client.name);
                continue;
            }

            let entry = self.remote.entry(key.clone()).or_insert_with(|| {
                tracing::debug!("New remote client '{}' (key {})", client.name, key);
                ClientIdentity {
                    name: client.name.clone(),
                    host: client.host.clone(),
                    connected: true,
                }
            });
            entry.connected = true;
            entry.host = client.host.clone();
            seen.push(client.name.as_str());
        }

        for identity in self.remote.values_mut() {
            if !seen.contains(&identity.name.as_str()) {
                identity.connected = false;
            }
        }
    }

    /// All ever-seen remote clients, keyed by logical key
    pub fn remote_clients(&self) -> impl Iterator<Item = (&str, &ClientIdentity)> {
        self.remote.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Identity for one logical key, if ever seen
    pub fn identity(&self, key: &str) -> Option<&ClientIdentity> {
        self.remote.get(key)
    }
}

/// The audio client owned by a service, if one is connected
///
/// A client belongs to a service when the unit stem matches its name, app
/// or binary exactly (case-insensitive).
pub fn service_client<'a>(clients: &'a [AudioClient], service: &Service) -> Option<&'a AudioClient> {
    let stem = service.unit_stem().to_lowercase();
    clients.iter().find(|c| client_matches_stem(c, &stem))
}

fn client_matches_stem(client: &AudioClient, stem: &str) -> bool {
    client.name.to_lowercase() == stem
        || client.app.to_lowercase() == stem
        || client.binary.to_lowercase() == stem
}

fn is_remote(client: &AudioClient, hostname: &str, services: &[Service]) -> bool {
    if client.host.is_empty() || client.host == hostname {
        return false;
    }
    // Service-owned clients fold into the service entity instead
    !services.iter().any(|svc| {
        svc.exists && client_matches_stem(client, &svc.unit_stem().to_lowercase())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActiveState, ServiceScope};

    fn client(id: u32, name: &str, host: &str) -> AudioClient {
        serde_json::from_value(serde_json::json!({
            "id": id, "name": name, "host": host
        }))
        .unwrap()
    }

    fn service(unit: &str) -> Service {
        Service {
            scope: ServiceScope::User,
            unit: unit.to_string(),
            enabled: true,
            running: true,
            active_state: ActiveState::Active,
            exists: true,
        }
    }

    #[test]
    fn normalization_collapses_and_trims() {
        assert_eq!(
            IdentityResolver::normalize_name("Tunnel for bobby@desktop"),
            "tunnel_for_bobby_desktop"
        );
        assert_eq!(IdentityResolver::normalize_name("MPD"), "mpd");
        assert_eq!(IdentityResolver::normalize_name("--weird--"), "weird");
    }

    #[test]
    fn same_name_resolves_to_same_key_across_id_churn() {
        let mut resolver = IdentityResolver::new();

        resolver.observe(&[client(17, "Tunnel for bobby@desktop", "desktop")], "server1", &[]);
        let keys1: Vec<_> = resolver.remote_clients().map(|(k, _)| k.to_string()).collect();

        // Reconnect: new ephemeral id, same name
        resolver.observe(&[client(93, "Tunnel for bobby@desktop", "desktop")], "server1", &[]);
        let keys2: Vec<_> = resolver.remote_clients().map(|(k, _)| k.to_string()).collect();

        assert_eq!(keys1, keys2);
        assert_eq!(keys1, vec!["tunnel_for_bobby_desktop"]);
    }

    #[test]
    fn local_clients_are_not_remote() {
        let mut resolver = IdentityResolver::new();
        resolver.observe(&[client(1, "mpd", "server1")], "server1", &[]);
        assert_eq!(resolver.remote_clients().count(), 0);
    }

    #[test]
    fn service_owned_clients_fold_into_the_service() {
        let mut resolver = IdentityResolver::new();
        // Remote host, but matches the mpd.service stem
        resolver.observe(&[client(1, "mpd", "nas")], "server1", &[service("mpd.service")]);
        assert_eq!(resolver.remote_clients().count(), 0);
    }

    #[test]
    fn disconnected_clients_are_kept_not_removed() {
        let mut resolver = IdentityResolver::new();
        resolver.observe(&[client(1, "Tunnel for bobby@desktop", "desktop")], "server1", &[]);
        resolver.observe(&[], "server1", &[]);

        let identity = resolver.identity("tunnel_for_bobby_desktop").unwrap();
        assert!(!identity.connected);
        assert_eq!(identity.name, "Tunnel for bobby@desktop");

        // And it reconnects in place
        resolver.observe(&[client(2, "Tunnel for bobby@desktop", "desktop")], "server1", &[]);
        assert!(resolver.identity("tunnel_for_bobby_desktop").unwrap().connected);
    }

    #[test]
    fn blank_names_are_rejected() {
        let mut resolver = IdentityResolver::new();
        resolver.observe(&[client(1, "   ", "desktop")], "server1", &[]);
        assert_eq!(resolver.remote_clients().count(), 0);
    }

    #[test]
    fn service_client_matches_on_stem() {
        let clients = vec![
            client(1, "spotifyd", "server1"),
            client(2, "Tunnel for bobby@desktop", "desktop"),
        ];
        let owned = service_client(&clients, &service("spotifyd.service")).unwrap();
        assert_eq!(owned.id, 1);
        assert!(service_client(&clients, &service("snapclient.service")).is_none());
    }
}
