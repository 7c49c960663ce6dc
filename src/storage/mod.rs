//! Cell storage on a shared key-value backend.
//!
//! [`CellStore`] is the only component that talks to the backend. It owns
//! key derivation (see [`keys`]), the current/legacy lookup fallback,
//! session-scoped enumeration and orphan reclamation. Backends implement the
//! small [`KvBackend`] trait: [`RedisBackend`] for deployments and
//! [`InMemoryBackend`] for tests and single-node use.

pub mod keys;
mod memory;
mod redis;

pub use self::memory::InMemoryBackend;
pub use self::redis::{PooledConnection, RedisBackend, RedisPool};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::StorageResult;
use keys::{candidate_keys, current_key, scan_pattern, KeyGeneration, StorageKey};

/// Hash field holding the cell identifier.
pub const FIELD_CELL_ID: &str = "cell_id";
/// Hash field holding the caller-supplied version marker.
pub const FIELD_TIMESTAMP: &str = "timestamp";
/// Hash field holding the cell content.
pub const FIELD_DATA: &str = "data";

/// One page of a cursor scan. A returned cursor of `0` ends the scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanPage {
    pub cursor: u64,
    pub keys: Vec<String>,
}

/// Minimal hash-record key-value interface the cell store needs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// All fields of the hash at `key`; empty when the key does not exist.
    async fn hash_get_all(&self, key: &str) -> StorageResult<HashMap<String, String>>;

    /// Set the given fields in one atomic write.
    async fn hash_set(&self, key: &str, fields: Vec<(String, String)>) -> StorageResult<()>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Remove `key`, returning how many keys were removed.
    async fn delete(&self, key: &str) -> StorageResult<u64>;

    /// One bounded page of keys matching a glob `pattern`, starting at `cursor`.
    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> StorageResult<ScanPage>;

    async fn key_count(&self) -> StorageResult<u64>;

    /// Remove every key.
    async fn flush(&self) -> StorageResult<()>;

    /// Release backend resources. Later calls fail.
    async fn close(&self);
}

/// A stored cell as held in a backend hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellRecord {
    pub cell_id: String,
    pub timestamp: String,
    pub data: String,
}

impl CellRecord {
    /// Create a new record
    pub fn new(
        cell_id: impl Into<String>,
        data: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            cell_id: cell_id.into(),
            timestamp: timestamp.into(),
            data: data.into(),
        }
    }

    /// Rebuild a record from hash fields. `None` when the hash is empty.
    ///
    /// Missing fields read as empty strings, matching how partially written
    /// hashes have always been served.
    pub fn from_fields(mut fields: HashMap<String, String>) -> Option<Self> {
        if fields.is_empty() {
            return None;
        }
        Some(Self {
            cell_id: fields.remove(FIELD_CELL_ID).unwrap_or_default(),
            timestamp: fields.remove(FIELD_TIMESTAMP).unwrap_or_default(),
            data: fields.remove(FIELD_DATA).unwrap_or_default(),
        })
    }

    /// All fields, ready for a single hash write.
    pub fn to_fields(&self) -> Vec<(String, String)> {
        vec![
            (FIELD_CELL_ID.to_string(), self.cell_id.clone()),
            (FIELD_TIMESTAMP.to_string(), self.timestamp.clone()),
            (FIELD_DATA.to_string(), self.data.clone()),
        ]
    }
}

/// How an update was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The current-generation record was overwritten in place.
    Updated,
    /// Only a legacy record existed; the cell now lives under the current key.
    Migrated,
    /// No record existed; the update was applied as an insert.
    Inserted,
}

/// Session-scoped cell store.
///
/// Cheap to clone; clones share the backend.
#[derive(Clone)]
pub struct CellStore {
    backend: Arc<dyn KvBackend>,
    scan_batch_size: usize,
}

impl CellStore {
    /// Create a store over the given backend
    pub fn new(backend: Arc<dyn KvBackend>, scan_batch_size: usize) -> Self {
        Self {
            backend,
            scan_batch_size: scan_batch_size.max(1),
        }
    }

    /// Store over a fresh in-memory backend.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryBackend::new()), 100)
    }

    /// Write a cell under its current-generation key, replacing any existing record.
    pub async fn add(
        &self,
        session_id: &str,
        cell_id: &str,
        content: &str,
        timestamp: &str,
    ) -> StorageResult<()> {
        let key = current_key(session_id, cell_id);
        let record = CellRecord::new(cell_id, content, timestamp);

        self.backend.hash_set(&key, record.to_fields()).await?;

        debug!(
            session_id = %session_id,
            cell_id = %cell_id,
            content_len = content.len(),
            "Cell stored"
        );
        Ok(())
    }

    /// Content of a cell, looked up under the current key and then the legacy key.
    ///
    /// `timestamp` is part of the lookup contract but never selects a version.
    pub async fn get(
        &self,
        session_id: &str,
        cell_id: &str,
        _timestamp: &str,
    ) -> StorageResult<Option<String>> {
        for candidate in candidate_keys(session_id, cell_id) {
            let fields = self.backend.hash_get_all(&candidate.key).await?;
            if let Some(record) = CellRecord::from_fields(fields) {
                debug!(
                    session_id = %session_id,
                    cell_id = %cell_id,
                    generation = ?candidate.generation,
                    "Cell found"
                );
                return Ok(Some(record.data));
            }
        }
        Ok(None)
    }

    /// Replace a cell's content and timestamp, inserting it when absent.
    pub async fn update(
        &self,
        session_id: &str,
        cell_id: &str,
        content: &str,
        timestamp: &str,
    ) -> StorageResult<UpdateOutcome> {
        let outcome = match self.resolve_key(session_id, cell_id).await? {
            Some(StorageKey {
                key,
                generation: KeyGeneration::Current,
            }) => {
                // Full record: a concurrent delete must not leave a hash without cell_id.
                let record = CellRecord::new(cell_id, content, timestamp);
                self.backend.hash_set(&key, record.to_fields()).await?;
                UpdateOutcome::Updated
            }
            Some(StorageKey {
                generation: KeyGeneration::Legacy,
                ..
            }) => {
                // The legacy record is left in place and becomes an orphan.
                let record = CellRecord::new(cell_id, content, timestamp);
                self.backend
                    .hash_set(&current_key(session_id, cell_id), record.to_fields())
                    .await?;
                UpdateOutcome::Migrated
            }
            None => {
                self.add(session_id, cell_id, content, timestamp).await?;
                UpdateOutcome::Inserted
            }
        };

        debug!(
            session_id = %session_id,
            cell_id = %cell_id,
            outcome = ?outcome,
            "Cell updated"
        );
        Ok(outcome)
    }

    /// Delete a cell, trying the current key first and the legacy key second.
    ///
    /// Returns `true` when a record was removed.
    pub async fn delete(
        &self,
        session_id: &str,
        cell_id: &str,
        _timestamp: &str,
    ) -> StorageResult<bool> {
        for candidate in candidate_keys(session_id, cell_id) {
            if self.backend.delete(&candidate.key).await? > 0 {
                debug!(
                    session_id = %session_id,
                    cell_id = %cell_id,
                    generation = ?candidate.generation,
                    "Cell deleted"
                );
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Ids of stored cells, scoped to a session or across the whole keyspace.
    ///
    /// A session scope covers current-generation keys only. The global scope
    /// visits every key, so legacy records are included there.
    pub async fn list_cell_ids(&self, session_id: Option<&str>) -> StorageResult<BTreeSet<String>> {
        let records = self.scan_records(&scan_pattern(session_id)).await?;

        let ids: BTreeSet<String> = records
            .into_iter()
            .map(|(_, record)| record.cell_id)
            .filter(|id| !id.is_empty())
            .collect();

        debug!(session_id = ?session_id, count = ids.len(), "Listed cell ids");
        Ok(ids)
    }

    /// Delete every current-generation record of a session whose id is not in `valid_ids`.
    ///
    /// Returns how many records were actually removed. Legacy records are not touched.
    pub async fn reclaim_orphans(
        &self,
        session_id: &str,
        valid_ids: &HashSet<String>,
    ) -> StorageResult<u64> {
        let records = self.scan_records(&scan_pattern(Some(session_id))).await?;

        let mut deleted = 0;
        for (key, record) in records {
            if record.cell_id.is_empty() || valid_ids.contains(&record.cell_id) {
                continue;
            }
            if self.backend.delete(&key).await? > 0 {
                deleted += 1;
            }
        }

        info!(
            session_id = %session_id,
            valid = valid_ids.len(),
            deleted = deleted,
            "Orphan cells reclaimed"
        );
        Ok(deleted)
    }

    /// Remove every record in the backend, whatever its session or generation.
    ///
    /// Returns the number of keys present beforehand. Irreversible.
    pub async fn reset_all(&self) -> StorageResult<u64> {
        let count = self.backend.key_count().await?;
        self.backend.flush().await?;

        warn!(deleted = count, "All cells cleared");
        Ok(count)
    }

    /// Release the backend. The store is unusable afterwards.
    pub async fn close(&self) {
        self.backend.close().await;
        info!("Cell store closed");
    }

    /// Key the cell currently lives under, current generation first.
    async fn resolve_key(
        &self,
        session_id: &str,
        cell_id: &str,
    ) -> StorageResult<Option<StorageKey>> {
        for candidate in candidate_keys(session_id, cell_id) {
            if self.backend.exists(&candidate.key).await? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    /// Read every record matching `pattern` in bounded scan batches.
    ///
    /// A failed scan aborts the call; a failed read of a single key is logged
    /// and the key skipped.
    async fn scan_records(&self, pattern: &str) -> StorageResult<Vec<(String, CellRecord)>> {
        let mut records = Vec::new();
        let mut cursor = 0;

        loop {
            let page = self
                .backend
                .scan(cursor, pattern, self.scan_batch_size)
                .await?;

            for key in page.keys {
                match self.backend.hash_get_all(&key).await {
                    Ok(fields) => {
                        if let Some(record) = CellRecord::from_fields(fields) {
                            records.push((key, record));
                        }
                    }
                    Err(e) => {
                        warn!(key = %key, error = %e, "Skipping unreadable key during scan");
                    }
                }
            }

            cursor = page.cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(records)
    }
}
