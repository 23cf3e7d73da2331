//! Rust library for monitoring and controlling an Odio multimedia host
//!
//! This library connects to an Odio host's HTTP API and synthesizes a small
//! set of stable device representations from its live telemetry. It
//! supports:
//!
//! - A hub entity aggregating the host's audio state
//! - One entity per managed service unit (mpd, shairport-sync, ...)
//! - One entity per standalone remote audio client, with identities that
//!   survive reconnects and id churn
//! - Server and per-client volume/mute control
//! - Service enable/disable/start/stop/restart
//! - Optional capability delegation: a mapped external player lends its
//!   transport controls and metadata to a local entity
//! - Push updates over the host's event stream, with polling fallback
//!
//! # Quick Start
//!
//! ```no_run
//! use odio_remote::{OdioConfig, OdioRemote};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut remote = OdioRemote::connect(OdioConfig::new("http://odio.local:8096")).await?;
//!
//!     println!("Host: {}", remote.server_info().hostname);
//!     for entity in remote.entities() {
//!         let state = entity.state();
//!         println!("{}: {}", entity.display_name(), state.status);
//!     }
//!
//!     // Watch for changes
//!     let mut updates = remote.subscribe();
//!     if let Ok(key) = updates.recv().await {
//!         println!("Changed: {}", key);
//!     }
//!
//!     // Control the hub
//!     remote.hub().set_volume(0.4).await?;
//!
//!     remote.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! # Delegation
//!
//! A logical entity can be mapped to an external, fully-featured player
//! owned by the embedding control surface. While mapped, the entity exposes
//! the player's transport controls and metadata on top of its own state;
//! its volume/mute control and service lifecycle always stay native:
//!
//! ```no_run
//! use std::collections::HashMap;
//! use odio_remote::{EntityKey, OdioRemote, ServiceScope};
//!
//! # async fn example(remote: &OdioRemote) {
//! remote.set_mappings(HashMap::from([(
//!     EntityKey::service(ServiceScope::User, "mpd.service"),
//!     "media_player.living_room".to_string(),
//! )]));
//! # }
//! ```
//!
//! # Architecture
//!
//! The library is organized into several layers:
//!
//! - **Client**: HTTP/SSE access to the host API (`OdioClient`, swappable
//!   through the `HostApi` trait)
//! - **Orchestrator**: per-backend polling, the event-stream subscription
//!   and the synthesis cycle
//! - **Identity**: stable logical keys for reconnect-churned client records
//! - **Synthesis**: per-entity state computation
//! - **Delegation**: capability overlay from mapped external players
//! - **Entity**: consumer-facing handles and update subscriptions

mod client;
mod config;
mod delegate;
mod entity;
mod error;
mod events;
mod host;
mod identity;
mod mappings;
mod orchestrator;
mod remote;
mod subscription;
mod synth;
mod types;

// Public exports
pub use client::OdioClient;
pub use config::OdioConfig;
pub use delegate::{ExternalFeatures, ExternalPlayer, ExternalSnapshot, ExternalStatus};
pub use entity::{Entity, Hub};
pub use error::{OdioError, Result};
pub use host::{EventStream, HostApi, HostEvent, ServiceAction};
pub use remote::OdioRemote;
pub use subscription::UpdateReceiver;
pub use types::{
    ActiveState, AudioClient, Backends, CapabilitySet, EntityKey, EntityState, PlaybackStatus,
    PowerCapabilities, RepeatMode, ServerInfo, Service, ServiceScope, TransportCommand, Volume,
};
