//! Promotion of short-term entries into long-term memory.
//!
//! ```text
//! ┌──────────────┐   claim    ┌──────────────┐  store_record  ┌──────────────┐
//! │  EntryStore  │──────────▶│   Pipeline   │──────────────▶│ LongTermStore │
//! │  (locked)    │◀──────────│ (no lock held)│◀──────────────│  (timeout)    │
//! └──────────────┘  complete  └──────────────┘    RecordId    └──────────────┘
//! ```
//!
//! The store lock is only held to claim the entry and, afterwards, to record
//! the outcome. A failed or timed-out submission leaves the entry unpromoted
//! so it can be retried.

use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::config::PromotionConfig;
use crate::error::{StmError, StmResult};
use crate::ltm::LongTermStore;
use crate::store::{EntryStore, PromotionClaim};
use crate::types::{EntryId, LongTermRecord, MemoryEntry, PromotionOutcome};

/// Options for a promotion run.
#[derive(Debug, Clone, Default)]
pub struct PromoteOptions {
    /// Minimum importance, overriding the configured threshold.
    pub threshold: Option<f64>,
    /// Per-entry timeout, overriding the configured one.
    pub timeout: Option<Duration>,
}

impl PromoteOptions {
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = Some(threshold);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Outcome for one entry of a batch.
#[derive(Debug)]
pub struct EntryPromotion {
    pub entry_id: EntryId,
    pub outcome: PromotionOutcome,
}

/// Per-entry results of a batch promotion.
#[derive(Debug, Default)]
pub struct PromotionReport {
    pub outcomes: Vec<EntryPromotion>,
}

impl PromotionReport {
    /// Entries submitted in this run.
    pub fn promoted_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, PromotionOutcome::Promoted { .. }))
            .count()
    }

    /// Entries that were already promoted.
    pub fn already_promoted_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o.outcome, PromotionOutcome::AlreadyPromoted { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }

    /// Entries that failed, with the reason.
    pub fn failures(&self) -> impl Iterator<Item = (&EntryId, &StmError)> {
        self.outcomes.iter().filter_map(|o| match &o.outcome {
            PromotionOutcome::Failed { reason } => Some((&o.entry_id, reason)),
            _ => None,
        })
    }

    /// Check if every candidate ended up promoted.
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.outcome.is_success())
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

/// Releases a promotion claim unless disarmed, so a cancelled or failed
/// submission never leaves an entry stuck in flight.
struct ClaimGuard<'a> {
    store: &'a EntryStore,
    id: EntryId,
    armed: bool,
}

impl ClaimGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.store.release_claim(&self.id);
        }
    }
}

/// Selects promotable entries and submits them to long-term memory.
pub struct PromotionPipeline {
    store: Arc<EntryStore>,
    ltm: Arc<dyn LongTermStore>,
    clock: Arc<dyn Clock>,
    config: PromotionConfig,
}

impl PromotionPipeline {
    pub fn new(
        store: Arc<EntryStore>,
        ltm: Arc<dyn LongTermStore>,
        clock: Arc<dyn Clock>,
        config: PromotionConfig,
    ) -> Self {
        Self {
            store,
            ltm,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &PromotionConfig {
        &self.config
    }

    /// Whether an entry clears the configured threshold.
    pub fn qualifies(&self, entry: &MemoryEntry) -> bool {
        !entry.promoted && entry.importance >= self.config.threshold
    }

    /// Live, unpromoted entries at or above the threshold, in recall order.
    ///
    /// Entries whose content already reached long-term memory through an
    /// earlier entry are skipped.
    pub fn select_candidates(
        &self,
        session_id: &str,
        threshold: Option<f64>,
    ) -> StmResult<Vec<MemoryEntry>> {
        let threshold = threshold.unwrap_or(self.config.threshold);
        if !(0.0..=1.0).contains(&threshold) {
            return Err(StmError::invalid_input(
                "threshold",
                format!("{} is not between 0 and 1", threshold),
            ));
        }

        Ok(self
            .store
            .promotion_candidates(session_id, threshold, self.clock.now()))
    }

    /// Promote one entry.
    ///
    /// Already-promoted entries, and entries whose content was promoted
    /// before, report success without touching the long-term store.
    pub async fn promote(&self, id: &EntryId, timeout: Option<Duration>) -> PromotionOutcome {
        let entry = match self.store.claim_for_promotion(id, self.clock.now()) {
            Ok(PromotionClaim::Claimed(entry)) => entry,
            Ok(PromotionClaim::AlreadyPromoted(record_id)) => {
                tracing::debug!(entry_id = %id, record_id = %record_id, "Entry already promoted");
                return PromotionOutcome::AlreadyPromoted { record_id };
            }
            Err(reason) => return PromotionOutcome::Failed { reason },
        };

        let guard = ClaimGuard {
            store: &self.store,
            id: *id,
            armed: true,
        };

        let record = LongTermRecord::from_entry(&entry);
        let timeout = timeout.unwrap_or_else(|| self.config.timeout());

        match tokio::time::timeout(timeout, self.ltm.store_record(&record)).await {
            Ok(Ok(record_id)) => {
                guard.disarm();
                self.store.complete_promotion(
                    &entry,
                    record_id.clone(),
                    self.config.remove_after_promotion,
                );
                tracing::info!(
                    entry_id = %id,
                    session_id = %entry.session_id,
                    record_id = %record_id,
                    importance = entry.importance,
                    "Promoted entry to long-term memory"
                );
                PromotionOutcome::Promoted { record_id }
            }
            Ok(Err(e)) => {
                tracing::warn!(entry_id = %id, error = %e, "Long-term store rejected promotion");
                PromotionOutcome::Failed { reason: e.into() }
            }
            Err(_) => {
                tracing::warn!(
                    entry_id = %id,
                    timeout_ms = timeout.as_millis() as u64,
                    "Long-term store timed out"
                );
                PromotionOutcome::Failed {
                    reason: StmError::external(format!(
                        "timed out after {}ms",
                        timeout.as_millis()
                    )),
                }
            }
        }
    }

    /// Promote every candidate of a session independently.
    pub async fn promote_all(
        &self,
        session_id: &str,
        options: &PromoteOptions,
    ) -> StmResult<PromotionReport> {
        let candidates = self.select_candidates(session_id, options.threshold)?;
        let mut report = PromotionReport::default();

        for entry in candidates {
            let outcome = self.promote(&entry.id, options.timeout).await;
            report.outcomes.push(EntryPromotion {
                entry_id: entry.id,
                outcome,
            });
        }

        if !report.is_empty() {
            tracing::info!(
                session_id = %session_id,
                promoted = report.promoted_count(),
                failed = report.failed_count(),
                "Promotion run finished"
            );
        }
        Ok(report)
    }
}
