use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::{KvBackend, ScanPage};
use crate::error::{StorageError, StorageResult};

/// Process-local backend holding hashes in a sorted map.
///
/// Scan cursors are offsets into the sorted list of matching keys, so keys
/// removed between pages can shift later pages.
#[derive(Default)]
pub struct InMemoryBackend {
    entries: RwLock<BTreeMap<String, HashMap<String, String>>>,
    closed: AtomicBool,
}

impl InMemoryBackend {
    /// Create an empty backend
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::PoolClosed);
        }
        Ok(())
    }
}

/// Redis-style glob match over `*`, `?` and `\`-escapes.
///
/// Character classes (`[...]`) are not supported; [`super::keys::scan_pattern`]
/// escapes them, so they only ever reach here as literals.
pub(crate) fn glob_match(pattern: &str, candidate: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let candidate: Vec<char> = candidate.chars().collect();
    let (mut p, mut c) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while c < candidate.len() {
        let step = match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, c));
                p += 1;
                continue;
            }
            Some('?') => Some(1),
            Some('\\') if pattern.get(p + 1) == Some(&candidate[c]) => Some(2),
            Some('\\') => None,
            Some(ch) if *ch == candidate[c] => Some(1),
            _ => None,
        };

        match (step, backtrack) {
            (Some(width), _) => {
                p += width;
                c += 1;
            }
            (None, Some((star_p, star_c))) => {
                p = star_p + 1;
                c = star_c + 1;
                backtrack = Some((star_p, star_c + 1));
            }
            (None, None) => return false,
        }
    }

    pattern[p..].iter().all(|ch| *ch == '*')
}

#[async_trait]
impl KvBackend for InMemoryBackend {
    async fn hash_get_all(&self, key: &str) -> StorageResult<HashMap<String, String>> {
        self.ensure_open()?;
        Ok(self
            .entries
            .read()
            .await
            .get(key)
            .cloned()
            .unwrap_or_default())
    }

    async fn hash_set(&self, key: &str, fields: Vec<(String, String)>) -> StorageResult<()> {
        self.ensure_open()?;
        let mut entries = self.entries.write().await;
        let hash = entries.entry(key.to_string()).or_default();
        hash.extend(fields);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        self.ensure_open()?;
        Ok(self.entries.read().await.contains_key(key))
    }

    async fn delete(&self, key: &str) -> StorageResult<u64> {
        self.ensure_open()?;
        Ok(self.entries.write().await.remove(key).map_or(0, |_| 1))
    }

    async fn scan(&self, cursor: u64, pattern: &str, count: usize) -> StorageResult<ScanPage> {
        self.ensure_open()?;
        let entries = self.entries.read().await;
        let start = cursor as usize;

        let matching: Vec<&String> = entries.keys().filter(|k| glob_match(pattern, k)).collect();
        let keys: Vec<String> = matching
            .iter()
            .skip(start)
            .take(count.max(1))
            .map(|k| (*k).clone())
            .collect();

        let next = start + keys.len();
        Ok(ScanPage {
            cursor: if next >= matching.len() { 0 } else { next as u64 },
            keys,
        })
    }

    async fn key_count(&self) -> StorageResult<u64> {
        self.ensure_open()?;
        Ok(self.entries.read().await.len() as u64)
    }

    async fn flush(&self) -> StorageResult<()> {
        self.ensure_open()?;
        self.entries.write().await.clear();
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
