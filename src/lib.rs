//! # Cell Relay
//!
//! Shares short-lived, versioned code cells between the nodes of a class
//! session. One node is the **authority** and keeps the cells in Redis;
//! every other node is a **relay** that forwards reads to the authority
//! over HTTP. A node's role is not configured up front: it is decided per
//! request from whether the acting principal has an upstream pointer.
//!
//! ## Architecture
//!
//! ```text
//! writes ───────────────────────────────► CellStore ──► Redis
//! reads  ──► RoleRouter ──(Local)───────► CellStore
//!                  └──────(Remote)──────► Forwarder ──► authority (HTTP)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use cell_relay::{AppState, CellStore, Config, Forwarder, InMemoryConfigProvider};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let store = CellStore::in_memory();
//!     let forwarder = Forwarder::new(&config.upstream)?;
//!     let pointers = Arc::new(InMemoryConfigProvider::new());
//!     let state = Arc::new(AppState::new(config, store, forwarder, pointers));
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8888").await?;
//!     cell_relay::server::serve(state, listener, async {}).await?;
//!     Ok(())
//! }
//! ```

/// Configuration loaded from the environment.
pub mod config;
/// Error types and result aliases for the application.
pub mod error;
/// Per-principal upstream pointers and their stores.
pub mod pointer;
/// Per-request local/remote read dispatch.
pub mod routing;
/// HTTP handlers, router and server lifecycle.
pub mod server;
/// Cell storage: key derivation, backends and the cell store.
pub mod storage;
/// Forwarding of reads to the authority.
pub mod upstream;

pub use config::Config;
pub use error::{AppError, AppResult, RelayError, RelayResult};
pub use pointer::{ConfigProvider, FileConfigProvider, InMemoryConfigProvider, UpstreamPointer};
pub use routing::{RoleRouter, RoutingDecision};
pub use server::{AppState, SharedState};
pub use storage::{CellStore, InMemoryBackend, KvBackend, RedisBackend, UpdateOutcome};
pub use upstream::{Forwarder, ReadRequest, UpstreamTarget};
