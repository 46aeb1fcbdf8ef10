//! In-memory, TTL-governed entry store.
//!
//! All state (entries, per-session membership, the dedup index and the
//! promotion ledger) sits behind one `RwLock`. Every operation is a single
//! short critical section and no lock is held across an `.await`, so readers
//! see each entry either fully present or fully absent.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::config::DedupScope;
use crate::dedup::DeduplicationIndex;
use crate::error::{StmError, StmResult};
use crate::types::{ContentHash, EntryId, MemoryEntry, RecordId};

/// Result of an insert.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(EntryId),
    /// A live, unpromoted entry with the same content hash exists in scope.
    Duplicate { existing_id: EntryId },
}

/// Result of claiming an entry for promotion.
#[derive(Debug, Clone)]
pub enum PromotionClaim {
    /// The caller now owns the promotion of this entry.
    Claimed(MemoryEntry),
    /// The entry was promoted before; nothing to do.
    AlreadyPromoted(RecordId),
}

#[derive(Debug)]
struct StoredEntry {
    entry: MemoryEntry,
    /// Insertion order, newest highest
    seq: u64,
}

/// A recorded promotion.
#[derive(Debug, Clone)]
struct LedgerEntry {
    session_id: String,
    record_id: RecordId,
}

#[derive(Debug)]
struct StoreState {
    entries: HashMap<EntryId, StoredEntry>,
    sessions: HashMap<String, HashSet<EntryId>>,
    dedup: DeduplicationIndex,
    /// Entries whose long-term submission is in flight
    in_flight: HashSet<EntryId>,
    /// Every promotion recorded, kept after the entry is gone. Grows until
    /// pruned with `EntryStore::forget_promotions`.
    ledger: HashMap<EntryId, LedgerEntry>,
    next_seq: u64,
}

impl StoreState {
    fn remove(&mut self, id: &EntryId) -> Option<StoredEntry> {
        let stored = self.entries.remove(id)?;
        let entry = &stored.entry;

        if let Some(ids) = self.sessions.get_mut(&entry.session_id) {
            ids.remove(id);
            if ids.is_empty() {
                self.sessions.remove(&entry.session_id);
            }
        }
        self.dedup
            .forget_entry(&entry.session_id, &entry.content_hash, entry.id);

        Some(stored)
    }

    /// Record `record_id` against an entry and take it out of the dedup
    /// index. The entry itself may already be gone.
    fn mark_promoted(
        &mut self,
        id: &EntryId,
        session_id: &str,
        content_hash: &ContentHash,
        record_id: RecordId,
    ) {
        self.ledger.insert(
            *id,
            LedgerEntry {
                session_id: session_id.to_string(),
                record_id: record_id.clone(),
            },
        );
        if let Some(stored) = self.entries.get_mut(id) {
            stored.entry.promoted = true;
            stored.entry.ltm_record_id = Some(record_id);
        }
        self.dedup.forget_entry(session_id, content_hash, *id);
    }

    fn live_in_session(&self, session_id: &str, now: DateTime<Utc>) -> Vec<&StoredEntry> {
        let Some(ids) = self.sessions.get(session_id) else {
            return Vec::new();
        };

        ids.iter()
            .filter_map(|id| self.entries.get(id))
            .filter(|stored| !stored.entry.is_expired(now))
            .collect()
    }
}

/// Rank order: importance descending, then newest first.
fn rank(a: &StoredEntry, b: &StoredEntry) -> Ordering {
    b.entry
        .importance
        .total_cmp(&a.entry.importance)
        .then_with(|| b.entry.created_at.cmp(&a.entry.created_at))
        .then_with(|| b.seq.cmp(&a.seq))
}

/// Session-partitioned entry container.
#[derive(Debug)]
pub struct EntryStore {
    state: RwLock<StoreState>,
}

impl Default for EntryStore {
    fn default() -> Self {
        Self::new(DedupScope::default())
    }
}

impl EntryStore {
    /// Create an empty store.
    pub fn new(scope: DedupScope) -> Self {
        Self {
            state: RwLock::new(StoreState {
                entries: HashMap::new(),
                sessions: HashMap::new(),
                dedup: DeduplicationIndex::new(scope),
                in_flight: HashSet::new(),
                ledger: HashMap::new(),
                next_seq: 0,
            }),
        }
    }

    /// Deduplication scope in effect.
    pub fn dedup_scope(&self) -> DedupScope {
        self.state.read().dedup.scope()
    }

    /// Insert an entry unless a live duplicate exists.
    ///
    /// The dedup check and the insert happen under one write lock. A hash
    /// owned by an expired (not yet swept) entry does not block the insert:
    /// the stale entry is evicted first.
    pub fn insert(&self, entry: MemoryEntry, now: DateTime<Utc>) -> StmResult<InsertOutcome> {
        if entry.session_id.is_empty() {
            return Err(StmError::invalid_input("session_id", "must not be empty"));
        }
        if entry.expires_at <= entry.created_at {
            return Err(StmError::invalid_input(
                "expires_at",
                "must be later than created_at",
            ));
        }

        let mut guard = self.state.write();
        let state = &mut *guard;

        if state.entries.contains_key(&entry.id) {
            return Err(StmError::invalid_input(
                "id",
                format!("entry {} already exists", entry.id),
            ));
        }

        if let Some(owner) = state.dedup.owner(&entry.session_id, &entry.content_hash) {
            // (expired, promoted) of the current owner
            let owner_state = state
                .entries
                .get(&owner)
                .map(|existing| (existing.entry.is_expired(now), existing.entry.promoted));

            match owner_state {
                Some((true, _)) => {
                    tracing::debug!(entry_id = %owner, "Evicting expired duplicate before insert");
                    state.remove(&owner);
                }
                Some((false, false)) => {
                    return Ok(InsertOutcome::Duplicate { existing_id: owner });
                }
                _ => {
                    // Owner is gone or promoted; the registration is stale
                    state.dedup.forget(&entry.session_id, &entry.content_hash);
                }
            }
        }

        let id = entry.id;
        let seq = state.next_seq;
        state.next_seq += 1;

        state
            .dedup
            .record(&entry.session_id, &entry.content_hash, id);
        state
            .sessions
            .entry(entry.session_id.clone())
            .or_default()
            .insert(id);

        tracing::debug!(
            entry_id = %id,
            session_id = %entry.session_id,
            importance = entry.importance,
            "Stored short-term entry"
        );
        state.entries.insert(id, StoredEntry { entry, seq });

        Ok(InsertOutcome::Inserted(id))
    }

    /// Live entries of a session, importance descending, newest first on ties.
    pub fn get(&self, session_id: &str, now: DateTime<Utc>) -> Vec<MemoryEntry> {
        let state = self.state.read();
        let mut live = state.live_in_session(session_id, now);
        live.sort_by(|a, b| rank(a, b));
        live.into_iter().map(|stored| stored.entry.clone()).collect()
    }

    /// Look up a single entry, expired or not.
    pub fn get_entry(&self, id: &EntryId) -> Option<MemoryEntry> {
        self.state.read().entries.get(id).map(|s| s.entry.clone())
    }

    /// Remove every entry with `expires_at <= now`.
    pub fn evict_expired(&self, now: DateTime<Utc>) -> usize {
        let mut state = self.state.write();

        let expired: Vec<EntryId> = state
            .entries
            .values()
            .filter(|stored| stored.entry.is_expired(now))
            .map(|stored| stored.entry.id)
            .collect();

        for id in &expired {
            state.remove(id);
        }

        if !expired.is_empty() {
            tracing::info!(evicted = expired.len(), "Evicted expired short-term entries");
        }
        expired.len()
    }

    /// Remove an entry. Removing an unknown id is a no-op.
    pub fn remove(&self, id: &EntryId) -> bool {
        let removed = self.state.write().remove(id).is_some();
        if removed {
            tracing::debug!(entry_id = %id, "Removed short-term entry");
        }
        removed
    }

    /// Remove every entry of a session.
    pub fn clear_session(&self, session_id: &str) -> usize {
        let mut state = self.state.write();
        let ids: Vec<EntryId> = state
            .sessions
            .get(session_id)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default();

        for id in &ids {
            state.remove(id);
        }

        if !ids.is_empty() {
            tracing::debug!(session_id = %session_id, removed = ids.len(), "Cleared session");
        }
        ids.len()
    }

    /// Total stored entries, including expired ones not yet swept.
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().entries.is_empty()
    }

    /// Sessions that currently hold entries.
    pub fn session_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.read().sessions.keys().cloned().collect();
        ids.sort();
        ids
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Promotion ledger
    // ─────────────────────────────────────────────────────────────────────────

    /// Record id of a past promotion, even if the entry has since been removed.
    pub fn promotion_record(&self, id: &EntryId) -> Option<RecordId> {
        self.state.read().ledger.get(id).map(|l| l.record_id.clone())
    }

    /// Live, unpromoted entries at or above `threshold` whose content has not
    /// reached long-term memory yet, in `get` order.
    pub fn promotion_candidates(
        &self,
        session_id: &str,
        threshold: f64,
        now: DateTime<Utc>,
    ) -> Vec<MemoryEntry> {
        let state = self.state.read();
        let mut live: Vec<&StoredEntry> = state
            .live_in_session(session_id, now)
            .into_iter()
            .filter(|stored| {
                let entry = &stored.entry;
                !entry.promoted
                    && entry.importance >= threshold
                    && state
                        .dedup
                        .promoted_record(&entry.session_id, &entry.content_hash)
                        .is_none()
            })
            .collect();
        live.sort_by(|a, b| rank(a, b));
        live.into_iter().map(|stored| stored.entry.clone()).collect()
    }

    /// Drop the promotion history of a session: entry ledger and promoted
    /// content. Afterwards the same content may be promoted again.
    pub fn forget_promotions(&self, session_id: &str) -> usize {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let before = state.ledger.len();
        state.ledger.retain(|_, l| l.session_id != session_id);
        let removed = before - state.ledger.len();
        state.dedup.forget_promotions(session_id);

        tracing::debug!(session_id = %session_id, removed, "Forgot promotion history");
        removed
    }

    /// Number of recorded promotions.
    pub fn ledger_len(&self) -> usize {
        self.state.read().ledger.len()
    }

    /// Take ownership of an entry's promotion.
    ///
    /// Content that already reached long-term memory through an earlier entry
    /// is not submitted again: the entry is marked with the original record
    /// and `AlreadyPromoted` is returned. Fails with `NotFound` for unknown or
    /// expired entries and with `PromotionInProgress` if another caller holds
    /// the claim.
    pub fn claim_for_promotion(&self, id: &EntryId, now: DateTime<Utc>) -> StmResult<PromotionClaim> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        if let Some(ledger) = state.ledger.get(id) {
            return Ok(PromotionClaim::AlreadyPromoted(ledger.record_id.clone()));
        }

        let entry = match state.entries.get(id) {
            Some(stored) if !stored.entry.is_expired(now) => stored.entry.clone(),
            _ => return Err(StmError::not_found("MemoryEntry", id.to_string())),
        };

        if let Some(record_id) = state
            .dedup
            .promoted_record(&entry.session_id, &entry.content_hash)
            .cloned()
        {
            tracing::debug!(
                entry_id = %id,
                record_id = %record_id,
                "Content already promoted by an earlier entry"
            );
            state.mark_promoted(id, &entry.session_id, &entry.content_hash, record_id.clone());
            return Ok(PromotionClaim::AlreadyPromoted(record_id));
        }

        if !state.in_flight.insert(*id) {
            return Err(StmError::PromotionInProgress { id: id.to_string() });
        }

        Ok(PromotionClaim::Claimed(entry))
    }

    /// Record a successful promotion of a claimed entry and release the claim.
    ///
    /// The entry leaves the dedup index and its content is remembered as
    /// promoted, even if the entry was removed while in flight. With `remove`
    /// the entry also leaves the store. Returns the entry as it stands
    /// afterwards.
    pub fn complete_promotion(
        &self,
        claimed: &MemoryEntry,
        record_id: RecordId,
        remove: bool,
    ) -> Option<MemoryEntry> {
        let mut guard = self.state.write();
        let state = &mut *guard;
        let id = &claimed.id;

        state.in_flight.remove(id);
        state
            .dedup
            .record_promotion(&claimed.session_id, &claimed.content_hash, record_id.clone());
        state.mark_promoted(id, &claimed.session_id, &claimed.content_hash, record_id);

        if remove {
            state.remove(id).map(|stored| stored.entry)
        } else {
            state.entries.get(id).map(|stored| stored.entry.clone())
        }
    }

    /// Give up a claim without recording anything.
    pub fn release_claim(&self, id: &EntryId) {
        self.state.write().in_flight.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dedup::{hash, normalize};
    use crate::types::ContentHash;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn create_test_entry(session: &str, content: &str, importance: f64, created: i64, ttl: i64) -> MemoryEntry {
        let content = normalize(content);
        let content_hash: ContentHash = hash(&content);
        MemoryEntry {
            id: EntryId::new(),
            session_id: session.into(),
            content,
            content_hash,
            importance,
            created_at: at(created),
            expires_at: at(created + ttl),
            promoted: false,
            ltm_record_id: None,
            metadata: serde_json::Map::new(),
        }
    }

    fn inserted(outcome: StmResult<InsertOutcome>) -> EntryId {
        match outcome.unwrap() {
            InsertOutcome::Inserted(id) => id,
            other => panic!("expected insert, got {:?}", other),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Insert Tests
    // ─────────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_insert_and_get() {
        let store = EntryStore::default();
        let id = inserted(store.insert(create_test_entry("s1", "hello", 0.5, 0, 60), at(0)));

        let entries = store.get("s1", at(1));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id);
        assert_eq!(store.get_entry(&id).unwrap().content, "hello");
        assert!(store.get("s2", at(1)).is_empty());
    }

    #[test]
    fn test_insert_rejects_duplicate() {
        let store = EntryStore::default();
        let first = inserted(store.insert(create_test_entry("s1", "Same  text", 0.5, 0, 60), at(0)));

        let outcome = store
            .insert(create_test_entry("s1", "same text", 0.5, 1, 60), at(1))
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Duplicate { existing_id: first });
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_same_content_in_other_session_is_not_duplicate() {
        let store = EntryStore::new(DedupScope::Session);
        inserted(store.insert(create_test_entry("s1", "same text", 0.5, 0, 60), at(0)));
        inserted(store.insert(create_test_entry("s2", "same text", 0.5, 0, 60), at(0)));
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_global_scope_rejects_across_sessions() {
        let store = EntryStore::new(DedupScope::Global);
        let first = inserted(store.insert(create_test_entry("s1", "same text", 0.5, 0, 60), at(0)));

        let outcome = store
            .insert(create_test_entry("s2", "same text", 0.5, 0, 60), at(0))
            .unwrap();
        assert_eq!(outcome, InsertOutcome::Duplicate { existing_id: first });
    }

    #[test]
    fn test_expired_owner_does_not_block_insert() {
        let store = EntryStore::default();
        let old = inserted(store.insert(create_test_entry("s1", "same text", 0.5, 0, 60), at(0)));

        let new = inserted(store.insert(create_test_entry("s1", "same text", 0.5, 61, 60), at(61)));
        assert_ne!(old, new);
        assert!(store.get_entry(&old).is_none());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_insert_validation() {
        let store = EntryStore::default();

        let entry = create_test_entry("", "x", 0.5, 0, 60);
        assert!(matches!(store.insert(entry, at(0)), Err(StmError::InvalidInput { .. })));

        let entry = create_test_entry("s1", "x", 0.5, 10, 0);
        assert!(matches!(store.insert(entry, at(0)), Err(StmError::InvalidInput { .. })));

        let entry = create_test_entry("s1", "x", 0.5, 0, 60);
        let copy = MemoryEntry {
            content: "y".into(),
            content_hash: hash("y"),
            ..entry.clone()
        };
        inserted(store.insert(entry, at(0)));
        assert!(matches!(store.insert(copy, at(0)), Err(StmError::InvalidInput { .. })));
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Ordering Tests
    // ─────────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_get_orders_by_importance_then_newest() {
        let store = EntryStore::default();
        let low = inserted(store.insert(create_test_entry("s1", "low", 0.2, 0, 600), at(0)));
        let old_mid = inserted(store.insert(create_test_entry("s1", "old mid", 0.5, 1, 600), at(1)));
        let new_mid = inserted(store.insert(create_test_entry("s1", "new mid", 0.5, 5, 600), at(5)));
        let high = inserted(store.insert(create_test_entry("s1", "high", 0.9, 2, 600), at(2)));

        let ids: Vec<EntryId> = store.get("s1", at(10)).into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![high, new_mid, old_mid, low]);
    }

    #[test]
    fn test_get_same_timestamp_ties_use_insertion_order() {
        let store = EntryStore::default();
        let first = inserted(store.insert(create_test_entry("s1", "a", 0.5, 0, 600), at(0)));
        let second = inserted(store.insert(create_test_entry("s1", "b", 0.5, 0, 600), at(0)));

        let ids: Vec<EntryId> = store.get("s1", at(1)).into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[test]
    fn test_get_sorted_property() {
        let store = EntryStore::default();
        for i in 0..40i64 {
            let importance = ((i * 7) % 5) as f64 / 4.0;
            store
                .insert(create_test_entry("s1", &format!("entry {}", i), importance, i % 6, 600), at(i))
                .unwrap();
        }

        let entries = store.get("s1", at(50));
        assert_eq!(entries.len(), 40);
        for pair in entries.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(
                a.importance > b.importance
                    || (a.importance == b.importance && a.created_at >= b.created_at)
            );
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Expiry Tests
    // ─────────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_get_hides_expired_entries() {
        let store = EntryStore::default();
        inserted(store.insert(create_test_entry("s1", "short", 0.5, 0, 10), at(0)));
        inserted(store.insert(create_test_entry("s1", "long", 0.5, 0, 100), at(0)));

        let entries = store.get("s1", at(10));
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].content, "long");
        // Still physically present until swept
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_evict_expired_removes_all_and_only_expired() {
        let store = EntryStore::default();
        let mut survivors = Vec::new();
        for i in 0..20i64 {
            let ttl = 5 + i;
            let id = inserted(store.insert(create_test_entry("s1", &format!("e{}", i), 0.5, 0, ttl), at(0)));
            if ttl > 15 {
                survivors.push(id);
            }
        }

        let evicted = store.evict_expired(at(15));
        assert_eq!(evicted, 20 - survivors.len());
        assert_eq!(store.len(), survivors.len());
        for id in &survivors {
            assert!(store.get_entry(id).is_some());
        }
        assert!(store.get("s1", at(15)).iter().all(|e| e.expires_at > at(15)));
    }

    #[test]
    fn test_evict_forgets_hashes() {
        let store = EntryStore::default();
        inserted(store.insert(create_test_entry("s1", "again", 0.5, 0, 10), at(0)));
        assert_eq!(store.evict_expired(at(10)), 1);
        assert!(store.session_ids().is_empty());

        inserted(store.insert(create_test_entry("s1", "again", 0.5, 10, 10), at(10)));
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Removal Tests
    // ─────────────────────────────────────────────────────────────────────────────

    #[test]
    fn test_remove_is_idempotent() {
        let store = EntryStore::default();
        let id = inserted(store.insert(create_test_entry("s1", "x", 0.5, 0, 60), at(0)));

        assert!(store.remove(&id));
        assert!(!store.remove(&id));
        assert!(!store.remove(&EntryId::new()));
        assert!(store.is_empty());

        // Content can be stored again once removed
        inserted(store.insert(create_test_entry("s1", "x", 0.5, 1, 60), at(1)));
    }

    #[test]
    fn test_clear_session() {
        let store = EntryStore::default();
        inserted(store.insert(create_test_entry("s1", "a", 0.5, 0, 60), at(0)));
        inserted(store.insert(create_test_entry("s1", "b", 0.5, 0, 60), at(0)));
        inserted(store.insert(create_test_entry("s2", "a", 0.5, 0, 60), at(0)));

        assert_eq!(store.clear_session("s1"), 2);
        assert_eq!(store.clear_session("s1"), 0);
        assert_eq!(store.session_ids(), vec!["s2".to_string()]);
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Promotion Ledger Tests
    // ─────────────────────────────────────────────────────────────────────────────

    fn claimed(store: &EntryStore, id: &EntryId, now: DateTime<Utc>) -> MemoryEntry {
        match store.claim_for_promotion(id, now).unwrap() {
            PromotionClaim::Claimed(entry) => entry,
            other => panic!("expected claim, got {:?}", other),
        }
    }

    #[test]
    fn test_claim_and_complete() {
        let store = EntryStore::default();
        let id = inserted(store.insert(create_test_entry("s1", "x", 0.9, 0, 60), at(0)));

        let claim = claimed(&store, &id, at(1));
        assert!(matches!(
            store.claim_for_promotion(&id, at(1)),
            Err(StmError::PromotionInProgress { .. })
        ));

        let entry = store
            .complete_promotion(&claim, RecordId::new("r1"), false)
            .unwrap();
        assert!(entry.promoted);
        assert_eq!(entry.ltm_record_id, Some(RecordId::new("r1")));

        match store.claim_for_promotion(&id, at(2)).unwrap() {
            PromotionClaim::AlreadyPromoted(record) => assert_eq!(record.as_str(), "r1"),
            other => panic!("unexpected claim {:?}", other),
        }
    }

    #[test]
    fn test_promoted_entry_leaves_dedup_index() {
        let store = EntryStore::default();
        let id = inserted(store.insert(create_test_entry("s1", "x", 0.9, 0, 60), at(0)));
        let claim = claimed(&store, &id, at(0));
        store.complete_promotion(&claim, RecordId::new("r1"), false);

        // Re-noting promoted content creates a fresh entry
        let again = inserted(store.insert(create_test_entry("s1", "x", 0.9, 1, 60), at(1)));
        assert_ne!(again, id);
        assert_eq!(store.len(), 2);
        assert!(store.get_entry(&id).unwrap().promoted);
    }

    #[test]
    fn test_complete_with_removal_keeps_ledger() {
        let store = EntryStore::default();
        let id = inserted(store.insert(create_test_entry("s1", "x", 0.9, 0, 60), at(0)));
        let claim = claimed(&store, &id, at(0));

        let entry = store
            .complete_promotion(&claim, RecordId::new("r1"), true)
            .unwrap();
        assert!(entry.promoted);
        assert!(store.get_entry(&id).is_none());
        assert_eq!(store.promotion_record(&id), Some(RecordId::new("r1")));
    }

    #[test]
    fn test_renoted_content_is_not_claimed_again() {
        let store = EntryStore::default();
        let first = inserted(store.insert(create_test_entry("s1", "urgent", 0.9, 0, 60), at(0)));
        let claim = claimed(&store, &first, at(0));
        store.complete_promotion(&claim, RecordId::new("r1"), false);

        let again = inserted(store.insert(create_test_entry("s1", "Urgent", 0.9, 1, 60), at(1)));
        assert!(store.promotion_candidates("s1", 0.8, at(1)).is_empty());

        match store.claim_for_promotion(&again, at(1)).unwrap() {
            PromotionClaim::AlreadyPromoted(record) => assert_eq!(record.as_str(), "r1"),
            other => panic!("unexpected claim {:?}", other),
        }
        let entry = store.get_entry(&again).unwrap();
        assert!(entry.promoted);
        assert_eq!(entry.ltm_record_id, Some(RecordId::new("r1")));
        assert_eq!(store.promotion_record(&again), Some(RecordId::new("r1")));
    }

    #[test]
    fn test_completion_after_removal_still_recorded() {
        let store = EntryStore::default();
        let id = inserted(store.insert(create_test_entry("s1", "urgent", 0.9, 0, 60), at(0)));
        let claim = claimed(&store, &id, at(0));

        // Removed while the long-term call was in flight
        assert!(store.remove(&id));
        assert!(store.complete_promotion(&claim, RecordId::new("r1"), false).is_none());
        assert_eq!(store.promotion_record(&id), Some(RecordId::new("r1")));

        let again = inserted(store.insert(create_test_entry("s1", "urgent", 0.9, 1, 60), at(1)));
        assert!(matches!(
            store.claim_for_promotion(&again, at(1)).unwrap(),
            PromotionClaim::AlreadyPromoted(_)
        ));
    }

    #[test]
    fn test_promotion_candidates() {
        let store = EntryStore::default();
        let high = inserted(store.insert(create_test_entry("s1", "high", 0.9, 0, 60), at(0)));
        let mid = inserted(store.insert(create_test_entry("s1", "mid", 0.6, 0, 60), at(0)));
        inserted(store.insert(create_test_entry("s1", "expired", 0.95, 0, 5), at(0)));
        inserted(store.insert(create_test_entry("s2", "other", 0.9, 0, 60), at(0)));

        let ids: Vec<EntryId> = store
            .promotion_candidates("s1", 0.5, at(10))
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![high, mid]);

        let claim = claimed(&store, &high, at(10));
        store.complete_promotion(&claim, RecordId::new("r1"), false);
        let ids: Vec<EntryId> = store
            .promotion_candidates("s1", 0.5, at(10))
            .into_iter()
            .map(|e| e.id)
            .collect();
        assert_eq!(ids, vec![mid]);
    }

    #[test]
    fn test_forget_promotions() {
        let store = EntryStore::default();
        let a = inserted(store.insert(create_test_entry("s1", "urgent", 0.9, 0, 60), at(0)));
        let b = inserted(store.insert(create_test_entry("s2", "urgent", 0.9, 0, 60), at(0)));
        for id in [a, b] {
            let claim = claimed(&store, &id, at(0));
            store.complete_promotion(&claim, RecordId::new(id.to_string()), true);
        }
        assert_eq!(store.ledger_len(), 2);

        assert_eq!(store.forget_promotions("s1"), 1);
        assert_eq!(store.ledger_len(), 1);
        assert!(store.promotion_record(&a).is_none());
        assert!(store.promotion_record(&b).is_some());

        // s1 content may go to long-term memory again
        let again = inserted(store.insert(create_test_entry("s1", "urgent", 0.9, 1, 60), at(1)));
        assert_eq!(store.promotion_candidates("s1", 0.8, at(1)).len(), 1);
        assert!(matches!(
            store.claim_for_promotion(&again, at(1)).unwrap(),
            PromotionClaim::Claimed(_)
        ));
    }

    #[test]
    fn test_release_claim_allows_retry() {
        let store = EntryStore::default();
        let id = inserted(store.insert(create_test_entry("s1", "x", 0.9, 0, 60), at(0)));

        store.claim_for_promotion(&id, at(0)).unwrap();
        store.release_claim(&id);
        assert!(matches!(
            store.claim_for_promotion(&id, at(0)).unwrap(),
            PromotionClaim::Claimed(_)
        ));
    }

    #[test]
    fn test_claim_unknown_or_expired() {
        let store = EntryStore::default();
        let err = store.claim_for_promotion(&EntryId::new(), at(0)).unwrap_err();
        assert!(err.is_not_found());

        let id = inserted(store.insert(create_test_entry("s1", "x", 0.9, 0, 60), at(0)));
        let err = store.claim_for_promotion(&id, at(60)).unwrap_err();
        assert!(err.is_not_found());
    }
}
