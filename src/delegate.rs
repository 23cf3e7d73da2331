use crate::error::Result;
use crate::types::{CapabilitySet, TransportCommand};
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Transport-level status reported by an external player
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalStatus {
    Playing,
    Paused,
    Idle,
    On,
    Off,
}

/// Transport capabilities advertised by an external player
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExternalFeatures {
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

/// Observed state of a mapped external player for one synthesis pass
///
/// `volume` and `muted` are informational only: the local audio backend is
/// always authoritative for both, so they are never merged into the
/// synthesized state.
#[derive(Debug, Clone, Default)]
pub struct ExternalSnapshot {
    pub status: Option<ExternalStatus>,
    pub volume: Option<f64>,
    pub muted: Option<bool>,
    pub features: ExternalFeatures,
    pub attributes: BTreeMap<String, serde_json::Value>,
}

/// The external player boundary
///
/// Implemented by the embedding control surface. `snapshot` reads the
/// currently-observed state of one of its players; `send` forwards a
/// transport command to it. A `None` snapshot means the mapped target does
/// not exist (or cannot be read) this cycle; the delegator then hides the
/// delegated capabilities and keeps native behavior intact.
#[async_trait]
pub trait ExternalPlayer: Send + Sync {
    fn snapshot(&self, entity_id: &str) -> Option<ExternalSnapshot>;

    async fn send(&self, entity_id: &str, command: TransportCommand) -> Result<()>;
}

/// Resolve the external snapshot for a mapped entity, if any
pub(crate) fn external_for(
    provider: Option<&dyn ExternalPlayer>,
    mapped_id: Option<&str>,
) -> Option<ExternalSnapshot> {
    let provider = provider?;
    let id = mapped_id?;
    match provider.snapshot(id) {
        Some(snapshot) => Some(snapshot),
        None => {
            tracing::debug!("Mapped player '{}' not readable, using native state only", id);
            None
        }
    }
}

/// Add the external player's advertised transport capabilities to the
/// entity's native set
pub(crate) fn delegated_capabilities(
    mut base: CapabilitySet,
    features: &ExternalFeatures,
) -> CapabilitySet {
    base.play |= features.play;
    base.pause |= features.pause;
    base.stop |= features.stop;
    base.next_track |= features.next_track;
    base.previous_track |= features.previous_track;
    base.seek |= features.seek;
    base.select_source |= features.select_source;
    base.shuffle |= features.shuffle;
    base.repeat |= features.repeat;
    base
}

/// Merge delegated attributes under the locally-derived ones
///
/// `local` entries win every collision: volume, mute and service fields stay
/// authoritative no matter what the external player reports.
pub(crate) fn merge_attributes(
    local: BTreeMap<String, serde_json::Value>,
    external: &ExternalSnapshot,
) -> BTreeMap<String, serde_json::Value> {
    let mut merged = external.attributes.clone();
    for (k, v) in local {
        merged.insert(k, v);
    }
    merged
}

/// Forward one transport command to the mapped player
///
/// Forwarding failures are a local degradation, not a caller error: they
/// are logged and swallowed, and the capability disappears on the next
/// cycle if the target stays unreadable.
pub(crate) async fn forward(
    provider: &dyn ExternalPlayer,
    entity_id: &str,
    command: TransportCommand,
) {
    tracing::debug!("Forwarding {:?} to {}", command, entity_id);
    if let Err(e) = provider.send(entity_id, command).await {
        tracing::warn!("Failed to forward command to {}: {}", entity_id, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn local_attributes_win_collisions() {
        let mut external = ExternalSnapshot::default();
        external.attributes.insert("media_title".into(), json!("Song"));
        external.attributes.insert("volume".into(), json!(0.9));

        let local = BTreeMap::from([
            ("volume".to_string(), json!(0.4)),
            ("scope".to_string(), json!("user")),
        ]);

        let merged = merge_attributes(local, &external);
        assert_eq!(merged["volume"], json!(0.4));
        assert_eq!(merged["media_title"], json!("Song"));
        assert_eq!(merged["scope"], json!("user"));
    }

    #[test]
    fn delegated_capabilities_extend_native_ones() {
        let native = CapabilitySet {
            volume_set: true,
            volume_mute: true,
            turn_on_off: true,
            ..Default::default()
        };
        let features = ExternalFeatures {
            play: true,
            pause: true,
            next_track: true,
            ..Default::default()
        };

        let merged = delegated_capabilities(native, &features);
        assert!(merged.volume_set && merged.volume_mute && merged.turn_on_off);
        assert!(merged.play && merged.pause && merged.next_track);
        assert!(!merged.seek && !merged.shuffle);
    }

    #[test]
    fn missing_target_degrades_to_none() {
        struct NoPlayers;

        #[async_trait]
        impl ExternalPlayer for NoPlayers {
            fn snapshot(&self, _entity_id: &str) -> Option<ExternalSnapshot> {
                None
            }
            async fn send(&self, _entity_id: &str, _command: TransportCommand) -> Result<()> {
                Ok(())
            }
        }

        let provider = NoPlayers;
        assert!(external_for(Some(&provider), Some("media_player.gone")).is_none());
        assert!(external_for(None, Some("media_player.x")).is_none());
        assert!(external_for(Some(&provider), None).is_none());
    }
}
