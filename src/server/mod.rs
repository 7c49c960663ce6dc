//! HTTP surface for the cell relay.
//!
//! This module provides:
//! - Shared application state
//! - axum handlers for cell writes, routed reads and pointer management
//! - Router construction and serving with graceful shutdown

mod handlers;
mod http;

pub use handlers::*;
pub use http::{build_router, serve};

use std::sync::Arc;

use crate::config::Config;
use crate::pointer::ConfigProvider;
use crate::routing::RoleRouter;
use crate::storage::CellStore;
use crate::upstream::Forwarder;

/// Application state shared across handlers.
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Local cell store, used directly by writes.
    pub store: CellStore,
    /// Read dispatcher.
    pub router: RoleRouter,
    /// Per-principal upstream pointers.
    pub pointers: Arc<dyn ConfigProvider>,
}

impl AppState {
    /// Create new application state
    pub fn new(
        config: Config,
        store: CellStore,
        forwarder: Forwarder,
        pointers: Arc<dyn ConfigProvider>,
    ) -> Self {
        let router = RoleRouter::new(store.clone(), forwarder, Arc::clone(&pointers));
        Self {
            config,
            store,
            router,
            pointers,
        }
    }

    /// Principal every request acts for.
    pub fn principal(&self) -> &str {
        &self.config.server.principal
    }
}

/// Shared application state type
pub type SharedState = Arc<AppState>;
