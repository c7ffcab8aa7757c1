//! # workspace-rtm
//!
//! Real-time workspace mirror client.
//!
//! The client bootstraps from a one-shot snapshot call, keeps an in-process
//! mirror of the workspace (team, users, channels, groups, DM sessions,
//! bots) consistent with events pushed over a long-lived WebSocket, and
//! sends commands over the same connection with per-command
//! acknowledgment.
//!
//! ## Architecture
//!
//! ```text
//! Caller
//!     │
//!     ├── RtmClient (client.rs): lifecycle, reads, send, subscriptions
//!     │
//!     ├── SnapshotFetcher (api/) ── ApiClient ── HTTP `rtm.start`
//!     ├── Transport (transport/) ── WebSocket │ in-memory
//!     │
//!     ├── FrameDispatcher (rtm/) ── EntityMirror (domain/)
//!     ├── SendCorrelator (rtm/)
//!     │
//!     └── Handlers + EventBus (rtm/, domain/) ── subscribers
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use workspace_rtm::{ClientConfig, RtmClient};
//!
//! # async fn run() -> Result<(), workspace_rtm::RtmError> {
//! let config = ClientConfig::new("https://slack.com/api/", "xoxb-token");
//! let client = RtmClient::from_config(&config)?;
//! client.connect().await?;
//! client.on("channel_archive", |event| {
//!     println!("archived: {:?}", event.str_field("channel"));
//! });
//! client.send_message("C024BE91L", "hello")?.await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod rtm;
pub mod transport;

pub use client::{ConnectionState, RtmClient};
pub use config::ClientConfig;
pub use error::{EntityKind, ErrorKind, RtmError};
