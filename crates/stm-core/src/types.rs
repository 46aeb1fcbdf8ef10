//! Core types for the short-term memory engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StmError;

// ─────────────────────────────────────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// Identifier of a short-term memory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    /// Generate a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for EntryId {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| format!("Invalid entry id {}: {}", s, e))
    }
}

/// Identifier assigned by the long-term store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hex SHA-256 digest of normalized content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    pub(crate) fn from_hex(hex: String) -> Self {
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Entries
// ─────────────────────────────────────────────────────────────────────────────

/// A short-term memory entry.
///
/// Everything except `promoted` and `ltm_record_id` is fixed at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryEntry {
    pub id: EntryId,
    pub session_id: String,
    /// Normalized content
    pub content: String,
    pub content_hash: ContentHash,
    /// Importance score (0.0 - 1.0)
    pub importance: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub promoted: bool,
    pub ltm_record_id: Option<RecordId>,
    /// Caller-supplied metadata, forwarded to long-term memory on promotion
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl MemoryEntry {
    /// Whether the entry is past its expiry at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Time left before expiry, zero once expired.
    pub fn remaining_ttl(&self, now: DateTime<Utc>) -> std::time::Duration {
        (self.expires_at - now).to_std().unwrap_or_default()
    }
}

/// Outcome of a `remember` call.
#[derive(Debug, Clone)]
pub enum Remembered {
    /// The entry was stored.
    Stored(MemoryEntry),
    /// A live entry with the same normalized content already exists.
    Duplicate { existing_id: EntryId },
}

impl Remembered {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Remembered::Duplicate { .. })
    }

    /// The stored entry, if any.
    pub fn entry(&self) -> Option<&MemoryEntry> {
        match self {
            Remembered::Stored(entry) => Some(entry),
            Remembered::Duplicate { .. } => None,
        }
    }

    pub fn into_entry(self) -> Option<MemoryEntry> {
        match self {
            Remembered::Stored(entry) => Some(entry),
            Remembered::Duplicate { .. } => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Promotion
// ─────────────────────────────────────────────────────────────────────────────

/// Request submitted to the long-term store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LongTermRecord {
    pub content: String,
    pub importance: f64,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl LongTermRecord {
    /// Build the record for a short-term entry.
    pub fn from_entry(entry: &MemoryEntry) -> Self {
        let mut metadata = entry.metadata.clone();
        metadata.insert("source".into(), "stm_promotion".into());
        metadata.insert("session_id".into(), entry.session_id.clone().into());
        metadata.insert("stm_entry_id".into(), entry.id.to_string().into());
        metadata.insert("created_at".into(), entry.created_at.to_rfc3339().into());
        metadata.insert("importance".into(), entry.importance.into());

        Self {
            content: entry.content.clone(),
            importance: entry.importance,
            metadata,
        }
    }
}

/// Result of promoting a single entry.
#[derive(Debug)]
pub enum PromotionOutcome {
    /// Submitted to the long-term store in this call.
    Promoted { record_id: RecordId },
    /// Promoted earlier; nothing was submitted.
    AlreadyPromoted { record_id: RecordId },
    /// Not promoted; the entry is unchanged and can be retried.
    Failed { reason: StmError },
}

impl PromotionOutcome {
    /// Promoted now or earlier.
    pub fn is_success(&self) -> bool {
        !matches!(self, PromotionOutcome::Failed { .. })
    }

    pub fn record_id(&self) -> Option<&RecordId> {
        match self {
            PromotionOutcome::Promoted { record_id }
            | PromotionOutcome::AlreadyPromoted { record_id } => Some(record_id),
            PromotionOutcome::Failed { .. } => None,
        }
    }
}
