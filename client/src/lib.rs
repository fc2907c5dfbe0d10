//! # Server Telemetry Client Library
//!
//! This library keeps a dashboard's view of its game servers live. For every
//! server the viewer can see, it holds one WebSocket connection to the hosting
//! panel's daemon and projects the frames it receives into two maps the UI
//! renders from: the coarse server status and the latest CPU/memory/disk
//! figures.
//!
//! ## Module Organization
//!
//! ### Registry Module (`registry`)
//! Owns the connection handles:
//! - One handle per monitored server id, reconciled against the visible set
//! - Teardown of handles whose server left the set
//! - Disposal of everything when the owning view goes away
//!
//! ### Lifecycle Module (`lifecycle`)
//! Runs one connection through its states:
//! - Credential fetch (Connecting)
//! - Transport open and auth frame sent, waiting for the daemon (Authenticating)
//! - Stats requested, frames consumed (Streaming)
//! - Fixed-delay reconnect after any closure (Closed)
//!
//! ### Store Module (`store`)
//! The shared status and metrics maps, plus per-handle connection state.
//! Writes are accepted only from the live generation of a handle.
//!
//! ### Backend and Transport Modules (`backend`, `transport`)
//! The two external collaborators behind traits: the REST endpoint handing
//! out one-time credentials and the WebSocket carrying the frames.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use client::{ConnectionRegistry, PanelCredentials, TelemetryConfig, WebSocketConnector};
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut registry = ConnectionRegistry::new(
//!         PanelCredentials::new("https://dash.example.com/api"),
//!         WebSocketConnector::new().with_origin("https://panel.example.com"),
//!         TelemetryConfig::default(),
//!     );
//!
//!     // Called whenever the list of visible servers changes
//!     registry.reconcile(["a1b2c3d4", "e5f6a7b8"]);
//!
//!     // Read on every render tick
//!     let statuses = registry.store().statuses();
//!     let metrics = registry.store().metrics();
//!     println!("{:?} {:?}", statuses, metrics);
//!
//!     registry.dispose_all();
//! }
//! ```
//!
//! ## Failure Handling
//!
//! Connection problems never reach the caller of `reconcile`. Each handle
//! logs the failure and retries after the configured delay for as long as
//! its server stays monitored; the UI simply keeps showing the last known
//! (or default `offline`) values.

pub mod backend;
pub mod config;
pub mod error;
mod lifecycle;
pub mod registry;
pub mod store;
pub mod transport;

pub use backend::{CredentialSource, PanelCredentials};
pub use config::TelemetryConfig;
pub use error::TelemetryError;
pub use registry::{ConnectionHandle, ConnectionRegistry};
pub use store::{ConnectionPhase, ConnectionState, TelemetryStore};
pub use transport::{Connector, Transport, WebSocketConnector, WebSocketTransport};
