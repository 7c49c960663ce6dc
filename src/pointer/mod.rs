//! Per-principal upstream pointers.
//!
//! A pointer names the authority a relay forwards reads to, plus an optional
//! bearer credential. Its presence is what turns a node into a relay for
//! that principal; see [`crate::routing`].

mod file;

pub use file::FileConfigProvider;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::error::{PointerError, PointerResult};

/// Stored upstream configuration for one principal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamPointer {
    /// Base URL of the authority, without a trailing slash.
    pub upstream_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    /// Unix seconds of the last change.
    pub updated_at: i64,
}

impl UpstreamPointer {
    /// Validate and normalize a pointer from user input.
    ///
    /// The address must be an http(s) URL with a host and no embedded
    /// user or password. A trailing `/` is dropped and an empty credential
    /// is stored as none.
    pub fn new(upstream_address: &str, credential: Option<String>) -> PointerResult<Self> {
        validate_upstream_address(upstream_address)?;
        Ok(Self {
            upstream_address: upstream_address.trim_end_matches('/').to_string(),
            credential: credential.filter(|c| !c.is_empty()),
            updated_at: chrono::Utc::now().timestamp(),
        })
    }

    /// Masked view that never exposes the credential.
    pub fn masked(&self) -> MaskedPointer {
        MaskedPointer {
            upstream_address: Some(self.upstream_address.clone()),
            has_credential: self.credential.is_some(),
        }
    }
}

/// Pointer as shown to callers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskedPointer {
    pub upstream_address: Option<String>,
    pub has_credential: bool,
}

/// Check that an upstream address is usable.
pub fn validate_upstream_address(address: &str) -> PointerResult<()> {
    if address.trim().is_empty() {
        return Err(PointerError::InvalidUrl {
            reason: "upstream_address is required".to_string(),
        });
    }

    let url = reqwest::Url::parse(address).map_err(|_| PointerError::InvalidUrl {
        reason: "Invalid URL format".to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(PointerError::InvalidUrl {
            reason: "URL must use http:// or https:// scheme".to_string(),
        });
    }
    if url.host_str().map_or(true, str::is_empty) {
        return Err(PointerError::InvalidUrl {
            reason: "URL must include a hostname".to_string(),
        });
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(PointerError::InvalidUrl {
            reason: "URL must not contain embedded credentials (user:pass@host)".to_string(),
        });
    }
    Ok(())
}

/// Source of per-principal pointers.
#[async_trait]
pub trait ConfigProvider: Send + Sync {
    /// The principal's pointer, if one is stored.
    async fn get(&self, principal: &str) -> PointerResult<Option<UpstreamPointer>>;

    async fn set(&self, principal: &str, pointer: &UpstreamPointer) -> PointerResult<()>;

    /// Remove the principal's pointer. Removing a missing pointer succeeds.
    async fn delete(&self, principal: &str) -> PointerResult<()>;
}

/// Process-local pointer store.
#[derive(Default)]
pub struct InMemoryConfigProvider {
    pointers: RwLock<HashMap<String, UpstreamPointer>>,
}

impl InMemoryConfigProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConfigProvider for InMemoryConfigProvider {
    async fn get(&self, principal: &str) -> PointerResult<Option<UpstreamPointer>> {
        Ok(self.pointers.read().await.get(principal).cloned())
    }

    async fn set(&self, principal: &str, pointer: &UpstreamPointer) -> PointerResult<()> {
        self.pointers
            .write()
            .await
            .insert(principal.to_string(), pointer.clone());
        Ok(())
    }

    async fn delete(&self, principal: &str) -> PointerResult<()> {
        self.pointers.write().await.remove(principal);
        Ok(())
    }
}
