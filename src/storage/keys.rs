//! Storage key derivation.
//!
//! Two key generations coexist in the backend:
//!
//! - **Current**: `cs:{session_id}:{md5(cell_id)}`. All cells of a session
//!   share the `cs:{session_id}:` prefix and can be enumerated with a pattern
//!   scan.
//! - **Legacy**: `md5("{session_id}:{cell_id}")`. Flat and not
//!   enumerable per session; only read so that older records stay visible.
//!
//! Both generations hash with MD5 hex so keys written by earlier deployments
//! sharing the backend resolve to the same entries.

use md5::{Digest, Md5};

/// Namespace prefix for current-generation keys.
pub const KEY_PREFIX: &str = "cs";

/// Key generation a stored record lives under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyGeneration {
    Current,
    Legacy,
}

/// A derived backend key together with its generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageKey {
    pub key: String,
    pub generation: KeyGeneration,
}

fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

/// Current-generation key. The session id is kept raw so the prefix is scannable.
pub fn current_key(session_id: &str, cell_id: &str) -> String {
    format!("{}:{}:{}", KEY_PREFIX, session_id, md5_hex(cell_id))
}

/// Legacy key, hashed over `session_id:cell_id`.
pub fn legacy_key(session_id: &str, cell_id: &str) -> String {
    md5_hex(&format!("{}:{}", session_id, cell_id))
}

/// Keys to consult for a cell, in lookup order.
pub fn candidate_keys(session_id: &str, cell_id: &str) -> [StorageKey; 2] {
    [
        StorageKey {
            key: current_key(session_id, cell_id),
            generation: KeyGeneration::Current,
        },
        StorageKey {
            key: legacy_key(session_id, cell_id),
            generation: KeyGeneration::Legacy,
        },
    ]
}

/// Scan pattern for all current-generation keys of a session, or every key.
///
/// Glob metacharacters in the session id are escaped so it matches literally.
pub fn scan_pattern(session_id: Option<&str>) -> String {
    match session_id {
        Some(session) => format!("{}:{}:*", KEY_PREFIX, escape_glob(session)),
        None => "*".to_string(),
    }
}

fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for ch in literal.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_key_shape() {
        let key = current_key("AB12CD", "c1");
        assert!(key.starts_with("cs:AB12CD:"));
        assert_eq!(key.len(), "cs:AB12CD:".len() + 32);
    }

    #[test]
    fn test_current_key_is_deterministic() {
        assert_eq!(current_key("AB12CD", "c1"), current_key("AB12CD", "c1"));
        assert_ne!(current_key("AB12CD", "c1"), current_key("AB12CD", "c2"));
        assert_ne!(current_key("AB12CD", "c1"), current_key("XY98ZW", "c1"));
    }

    #[test]
    fn test_legacy_key_has_no_session_prefix() {
        let key = legacy_key("AB12CD", "c1");
        assert_eq!(key.len(), 32);
        assert!(!key.starts_with("cs:"));
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_legacy_key_hashes_joined_pair() {
        assert_eq!(legacy_key("AB12CD", "c1"), md5_hex("AB12CD:c1"));
    }

    #[test]
    fn test_keys_match_previously_written_records() {
        assert_eq!(
            legacy_key("AB12CD", "c1"),
            "35bd9696691ef10b7197238bde817632"
        );
        assert_eq!(
            current_key("AB12CD", "c1"),
            "cs:AB12CD:a9f7e97965d6cf799a529102a973b8b9"
        );
        assert_eq!(
            current_key("AB12CD", "c2"),
            "cs:AB12CD:9ab62b5ef34a985438bfdf7ee0102229"
        );
    }

    #[test]
    fn test_candidate_order() {
        let [first, second] = candidate_keys("AB12CD", "c1");
        assert_eq!(first.generation, KeyGeneration::Current);
        assert_eq!(second.generation, KeyGeneration::Legacy);
        assert_eq!(first.key, current_key("AB12CD", "c1"));
        assert_eq!(second.key, legacy_key("AB12CD", "c1"));
    }

    #[test]
    fn test_scan_pattern() {
        assert_eq!(scan_pattern(Some("AB12CD")), "cs:AB12CD:*");
        assert_eq!(scan_pattern(None), "*");
    }

    #[test]
    fn test_scan_pattern_escapes_session_metacharacters() {
        assert_eq!(scan_pattern(Some("AB*?")), "cs:AB\\*\\?:*");
        assert_eq!(scan_pattern(Some("[x]")), "cs:\\[x\\]:*");
    }
}
