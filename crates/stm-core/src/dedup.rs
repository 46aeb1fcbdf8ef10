//! Content deduplication.
//!
//! The index maps a normalized-content hash to the entry that owns it, and
//! remembers which hashes have already gone to long-term memory. It is
//! not synchronized on its own: [`crate::store::EntryStore`] keeps it under the
//! same lock as the entries so that check-then-insert is one atomic step.

use std::collections::HashMap;

use sha2::{Digest, Sha256};

use crate::config::DedupScope;
use crate::types::{ContentHash, EntryId, RecordId};

/// Canonical form of a piece of content: trimmed, whitespace runs collapsed to
/// a single space, lowercased.
pub fn normalize(content: &str) -> String {
    content
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Hex SHA-256 of canonical content.
pub fn hash(canonical: &str) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    ContentHash::from_hex(hex::encode(hasher.finalize()))
}

/// Key under which a hash is registered. Session-scoped keys carry the session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DedupKey {
    session_id: Option<String>,
    hash: ContentHash,
}

/// A hash that reached long-term memory.
#[derive(Debug, Clone)]
struct Promotion {
    session_id: String,
    record_id: RecordId,
}

/// Hash -> owning entry index.
#[derive(Debug, Default)]
pub struct DeduplicationIndex {
    scope: DedupScope,
    owners: HashMap<DedupKey, EntryId>,
    /// Promoted content, kept after the promoting entry is gone
    promoted: HashMap<DedupKey, Promotion>,
}

impl DeduplicationIndex {
    pub fn new(scope: DedupScope) -> Self {
        Self {
            scope,
            owners: HashMap::new(),
            promoted: HashMap::new(),
        }
    }

    pub fn scope(&self) -> DedupScope {
        self.scope
    }

    fn key(&self, session_id: &str, hash: &ContentHash) -> DedupKey {
        DedupKey {
            session_id: match self.scope {
                DedupScope::Session => Some(session_id.to_string()),
                DedupScope::Global => None,
            },
            hash: hash.clone(),
        }
    }

    /// Whether the hash is registered for this session (or globally).
    ///
    /// Registration says nothing about liveness: the owner may have expired
    /// without being swept. [`crate::store::EntryStore`] checks the owner
    /// before treating new content as a duplicate.
    pub fn seen(&self, session_id: &str, hash: &ContentHash) -> bool {
        self.owners.contains_key(&self.key(session_id, hash))
    }

    /// The entry currently owning the hash.
    pub fn owner(&self, session_id: &str, hash: &ContentHash) -> Option<EntryId> {
        self.owners.get(&self.key(session_id, hash)).copied()
    }

    /// Register `entry_id` as the owner of the hash. Re-recording is a no-op
    /// apart from replacing the owner.
    pub fn record(&mut self, session_id: &str, hash: &ContentHash, entry_id: EntryId) {
        let key = self.key(session_id, hash);
        self.owners.insert(key, entry_id);
    }

    /// Drop the hash regardless of owner.
    pub fn forget(&mut self, session_id: &str, hash: &ContentHash) {
        let key = self.key(session_id, hash);
        self.owners.remove(&key);
    }

    /// Drop the hash only if `entry_id` still owns it.
    ///
    /// Returns true when something was removed.
    pub fn forget_entry(&mut self, session_id: &str, hash: &ContentHash, entry_id: EntryId) -> bool {
        let key = self.key(session_id, hash);
        if self.owners.get(&key) == Some(&entry_id) {
            self.owners.remove(&key);
            true
        } else {
            false
        }
    }

    /// Remember that content reached long-term memory as `record_id`.
    pub fn record_promotion(&mut self, session_id: &str, hash: &ContentHash, record_id: RecordId) {
        let key = self.key(session_id, hash);
        self.promoted.entry(key).or_insert_with(|| Promotion {
            session_id: session_id.to_string(),
            record_id,
        });
    }

    /// Record id under which this content was promoted, if it was.
    pub fn promoted_record(&self, session_id: &str, hash: &ContentHash) -> Option<&RecordId> {
        self.promoted
            .get(&self.key(session_id, hash))
            .map(|p| &p.record_id)
    }

    /// Drop the promotion history of a session. Returns the number dropped.
    pub fn forget_promotions(&mut self, session_id: &str) -> usize {
        let before = self.promoted.len();
        self.promoted.retain(|_, p| p.session_id != session_id);
        before - self.promoted.len()
    }

    /// Number of promoted hashes.
    pub fn promoted_len(&self) -> usize {
        self.promoted.len()
    }

    /// Number of registered hashes.
    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
