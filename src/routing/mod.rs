//! Per-request role resolution.
//!
//! A node has no fixed role. For every read, [`RoleRouter`] looks up the
//! principal's pointer: a usable pointer makes this node a relay for the
//! request, anything else makes it the authority. Writes never pass through
//! here.

use serde_json::{json, Value};
use std::sync::Arc;
use tracing::debug;

use crate::error::{RelayError, RelayResult};
use crate::pointer::{ConfigProvider, UpstreamPointer};
use crate::storage::CellStore;
use crate::upstream::{Forwarder, ReadRequest, UpstreamTarget};

/// How one read request is served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingDecision {
    /// Serve from the local cell store
    Local,
    /// Forward to the authority at `upstream_address`
    Remote {
        upstream_address: String,
        credential: Option<String>,
    },
}

impl RoutingDecision {
    /// Decide from pointer state alone. A missing pointer or a blank address is local.
    pub fn from_pointer(pointer: Option<&UpstreamPointer>) -> Self {
        match pointer {
            Some(p) if !p.upstream_address.trim().is_empty() => Self::Remote {
                upstream_address: p.upstream_address.clone(),
                credential: p.credential.clone(),
            },
            _ => Self::Local,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote { .. })
    }
}

/// Dispatches reads to the local store or to the upstream authority.
#[derive(Clone)]
pub struct RoleRouter {
    store: CellStore,
    forwarder: Forwarder,
    pointers: Arc<dyn ConfigProvider>,
}

impl RoleRouter {
    pub fn new(store: CellStore, forwarder: Forwarder, pointers: Arc<dyn ConfigProvider>) -> Self {
        Self {
            store,
            forwarder,
            pointers,
        }
    }

    /// Resolve the routing decision for `principal` from its current pointer.
    pub async fn decide(&self, principal: &str) -> RelayResult<RoutingDecision> {
        let pointer = self.pointers.get(principal).await?;
        let decision = RoutingDecision::from_pointer(pointer.as_ref());
        debug!(principal = %principal, remote = decision.is_remote(), "Routing decision");
        Ok(decision)
    }

    /// Read one cell, locally or through the authority.
    ///
    /// Locally the body is `{status:"success", data}`; upstream bodies are
    /// passed through unchanged.
    pub async fn get_cell(
        &self,
        principal: &str,
        session_id: &str,
        cell_id: &str,
        timestamp: &str,
    ) -> RelayResult<Value> {
        match self.decide(principal).await? {
            RoutingDecision::Local => {
                match self.store.get(session_id, cell_id, timestamp).await? {
                    Some(content) => Ok(json!({ "status": "success", "data": content })),
                    None => Err(RelayError::not_found("Cell not found")),
                }
            }
            RoutingDecision::Remote {
                upstream_address,
                credential,
            } => {
                let target = UpstreamTarget::new(upstream_address, credential);
                let request = ReadRequest::cell(session_id, cell_id, timestamp);
                Ok(self.forwarder.forward(&target, &request).await?)
            }
        }
    }

    /// List cell ids for a session, or for every session when `session_id` is `None`.
    pub async fn list_cell_ids(
        &self,
        principal: &str,
        session_id: Option<&str>,
    ) -> RelayResult<Value> {
        match self.decide(principal).await? {
            RoutingDecision::Local => {
                let ids = self.store.list_cell_ids(session_id).await?;
                Ok(json!({ "status": "success", "data": ids }))
            }
            RoutingDecision::Remote {
                upstream_address,
                credential,
            } => {
                let target = UpstreamTarget::new(upstream_address, credential);
                let request = ReadRequest::cell_ids(session_id);
                Ok(self.forwarder.forward(&target, &request).await?)
            }
        }
    }

    /// Probe the configured authority.
    ///
    /// Fails with [`RelayError::NotConfigured`] when no usable pointer exists.
    pub async fn test_connection(&self, principal: &str) -> RelayResult<String> {
        match self.decide(principal).await? {
            RoutingDecision::Local => Err(RelayError::NotConfigured {
                message: "No upstream server configured".to_string(),
            }),
            RoutingDecision::Remote {
                upstream_address,
                credential,
            } => {
                let target = UpstreamTarget::new(upstream_address.clone(), credential);
                self.forwarder.probe(&target).await?;
                Ok(upstream_address)
            }
        }
    }

    /// The local store
    pub fn store(&self) -> &CellStore {
        &self.store
    }
}
