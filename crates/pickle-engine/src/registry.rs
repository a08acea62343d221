//! The soft-delete registry.
//!
//! Logically deleted archives are recorded in a single versioned object at
//! `_pickle/deleted`. The body is line-oriented for forensic recovery: one
//! base64url (no padding) encoded data key per line, CRLF-separated. The
//! parser trims whitespace and silently drops lines that do not decode, so a
//! hand-edited or partially damaged registry still loads.

use std::collections::BTreeSet;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tracing::warn;

/// The set of soft-deleted data keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletionRegistry {
    keys: BTreeSet<String>,
}

impl DeletionRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a stored registry body.
    #[must_use]
    pub fn parse(body: &str) -> Self {
        let mut keys = BTreeSet::new();
        for line in body.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match URL_SAFE_NO_PAD
                .decode(line)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
            {
                Some(key) => {
                    keys.insert(key);
                }
                None => warn!(line, "dropping unparseable deletion registry line"),
            }
        }
        Self { keys }
    }

    /// Serialize to the stored body format.
    #[must_use]
    pub fn serialize(&self) -> String {
        self.keys
            .iter()
            .map(|key| URL_SAFE_NO_PAD.encode(key))
            .collect::<Vec<_>>()
            .join("\r\n")
    }

    /// Whether a data key is marked deleted.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    /// Mark a data key deleted. Returns false if it was already marked.
    pub fn insert(&mut self, key: impl Into<String>) -> bool {
        self.keys.insert(key.into())
    }

    /// Unmark a data key. Returns false if it was not marked.
    pub fn remove(&mut self, key: &str) -> bool {
        self.keys.remove(key)
    }

    /// Keep only the keys the predicate accepts. Returns whether anything
    /// was dropped.
    pub fn retain(&mut self, keep: impl FnMut(&String) -> bool) -> bool {
        let before = self.keys.len();
        self.keys.retain(keep);
        self.keys.len() != before
    }

    /// Iterate the marked keys in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.keys.iter()
    }

    /// Number of marked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Whether no key is marked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
