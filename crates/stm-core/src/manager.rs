//! The short-term memory facade.
//!
//! [`MemoryManager`] owns the entry store, the scoring engine, the promotion
//! pipeline and the optional background sweeper. It is `Send + Sync`; share it
//! through an `Arc`.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::clock::{Clock, SystemClock};
use crate::config::{MAX_TTL_SECS, PromotionMode, StmConfig};
use crate::conversation::{self, ConversationTurn};
use crate::dedup;
use crate::error::{StmError, StmResult};
use crate::ltm::LongTermStore;
use crate::promotion::{PromoteOptions, PromotionPipeline, PromotionReport};
use crate::scoring::{ScoringContext, ScoringEngine};
use crate::store::{EntryStore, InsertOutcome};
use crate::sweeper::Sweeper;
use crate::types::{EntryId, MemoryEntry, PromotionOutcome, Remembered};

/// Per-call options for [`MemoryManager::remember_with`].
#[derive(Debug, Clone, Default)]
pub struct RememberOptions {
    /// Time to live; the configured default when `None`.
    pub ttl: Option<Duration>,
    pub context: ScoringContext,
    /// Forwarded to long-term memory on promotion.
    pub metadata: Map<String, Value>,
}

impl RememberOptions {
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Mark the entry as explicitly requested by the user.
    pub fn explicit(mut self) -> Self {
        self.context.explicit_request = true;
        self
    }

    pub fn with_conversation_length(mut self, turns: usize) -> Self {
        self.context.conversation_length = turns;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Summary of a session's live entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub session_id: String,
    pub entries: usize,
    pub promoted: usize,
    pub min_importance: Option<f64>,
    pub max_importance: Option<f64>,
    pub mean_importance: Option<f64>,
    /// Mean content length in characters
    pub mean_content_length: Option<f64>,
}

/// Short-term memory engine.
pub struct MemoryManager {
    config: StmConfig,
    store: Arc<EntryStore>,
    scoring: ScoringEngine,
    pipeline: PromotionPipeline,
    sweeper: Sweeper,
    clock: Arc<dyn Clock>,
}

impl MemoryManager {
    /// Create a manager on the system clock.
    pub fn new(config: StmConfig, ltm: Arc<dyn LongTermStore>) -> StmResult<Self> {
        Self::with_clock(config, ltm, Arc::new(SystemClock))
    }

    /// Create a manager on the given clock.
    pub fn with_clock(
        config: StmConfig,
        ltm: Arc<dyn LongTermStore>,
        clock: Arc<dyn Clock>,
    ) -> StmResult<Self> {
        config.validate()?;
        let scoring = ScoringEngine::from_config(&config.scoring)?;

        let store = Arc::new(EntryStore::new(config.dedup_scope));
        let pipeline = PromotionPipeline::new(
            Arc::clone(&store),
            ltm,
            Arc::clone(&clock),
            config.promotion.clone(),
        );
        let sweeper = Sweeper::new(Arc::clone(&store), Arc::clone(&clock));

        tracing::debug!(
            default_ttl_secs = config.default_ttl_secs,
            dedup_scope = %config.dedup_scope,
            threshold = config.promotion.threshold,
            "Created memory manager"
        );

        Ok(Self {
            config,
            store,
            scoring,
            pipeline,
            sweeper,
            clock,
        })
    }

    pub fn config(&self) -> &StmConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<EntryStore> {
        &self.store
    }

    pub fn scoring(&self) -> &ScoringEngine {
        &self.scoring
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writing
    // ─────────────────────────────────────────────────────────────────────────

    /// Remember `content` for a session.
    pub async fn remember(
        &self,
        session_id: &str,
        content: &str,
        ttl: Option<Duration>,
    ) -> StmResult<Remembered> {
        let options = RememberOptions {
            ttl,
            ..Default::default()
        };
        self.remember_with(session_id, content, options).await
    }

    /// Remember `content` with explicit options.
    ///
    /// Content is normalized, scored, then inserted. In
    /// [`PromotionMode::OnInsert`] a qualifying entry is promoted before this
    /// returns; a failed promotion is logged and leaves the entry stored.
    pub async fn remember_with(
        &self,
        session_id: &str,
        content: &str,
        options: RememberOptions,
    ) -> StmResult<Remembered> {
        check_session(session_id)?;

        let normalized = dedup::normalize(content);
        if normalized.is_empty() {
            return Err(StmError::invalid_input("content", "must not be empty"));
        }

        let ttl = options.ttl.unwrap_or_else(|| self.config.default_ttl());
        if ttl.is_zero() {
            return Err(StmError::invalid_input("ttl", "must be greater than 0"));
        }
        if ttl > Duration::from_secs(MAX_TTL_SECS) {
            return Err(StmError::invalid_input(
                "ttl",
                format!("must be at most {}s", MAX_TTL_SECS),
            ));
        }

        let now = self.clock.now();
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or_else(|| StmError::invalid_input("ttl", format!("{:?} is out of range", ttl)))?;

        let importance = self
            .scoring
            .score_with_context(&normalized, &options.context);

        let entry = MemoryEntry {
            id: EntryId::new(),
            session_id: session_id.to_string(),
            content_hash: dedup::hash(&normalized),
            content: normalized,
            importance,
            created_at: now,
            expires_at,
            promoted: false,
            ltm_record_id: None,
            metadata: options.metadata,
        };

        match self.store.insert(entry.clone(), now)? {
            InsertOutcome::Duplicate { existing_id } => {
                tracing::debug!(
                    session_id = %session_id,
                    existing_id = %existing_id,
                    "Skipped duplicate content"
                );
                Ok(Remembered::Duplicate { existing_id })
            }
            InsertOutcome::Inserted(_) => {
                if self.config.promotion.mode == PromotionMode::OnInsert
                    && self.pipeline.qualifies(&entry)
                {
                    return Ok(Remembered::Stored(self.promote_on_insert(entry).await));
                }
                Ok(Remembered::Stored(entry))
            }
        }
    }

    async fn promote_on_insert(&self, mut entry: MemoryEntry) -> MemoryEntry {
        match self.pipeline.promote(&entry.id, None).await {
            PromotionOutcome::Promoted { record_id }
            | PromotionOutcome::AlreadyPromoted { record_id } => {
                entry.promoted = true;
                entry.ltm_record_id = Some(record_id);
            }
            PromotionOutcome::Failed { reason } => {
                tracing::warn!(
                    entry_id = %entry.id,
                    error = %reason,
                    "Promotion on insert failed; entry kept for retry"
                );
            }
        }
        entry
    }

    /// Remember one user/assistant exchange.
    ///
    /// The turn is scored with the session's conversation length, counting
    /// this turn.
    pub async fn remember_turn(
        &self,
        session_id: &str,
        user: &str,
        assistant: &str,
    ) -> StmResult<Remembered> {
        if user.trim().is_empty() && assistant.trim().is_empty() {
            return Err(StmError::invalid_input("turn", "user and assistant are both empty"));
        }
        check_session(session_id)?;

        let turns = self
            .store
            .get(session_id, self.clock.now())
            .iter()
            .filter(|entry| conversation::is_turn(entry))
            .count();

        let options = RememberOptions {
            metadata: conversation::turn_metadata(user, assistant),
            ..Default::default()
        }
        .with_conversation_length(turns + 1);

        self.remember_with(session_id, &conversation::format_turn(user, assistant), options)
            .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reading
    // ─────────────────────────────────────────────────────────────────────────

    /// Live entries of a session, most important first, newest first on ties.
    pub fn recall(&self, session_id: &str, limit: Option<usize>) -> StmResult<Vec<MemoryEntry>> {
        check_session(session_id)?;

        let now = self.clock.now();
        if self.config.sweep.lazy_on_read {
            self.store.evict_expired(now);
        }

        let mut entries = self.store.get(session_id, now);
        if let Some(limit) = limit {
            entries.truncate(limit);
        }
        Ok(entries)
    }

    /// Live entries whose content contains `query`, ignoring case and
    /// whitespace differences.
    pub fn search(
        &self,
        session_id: &str,
        query: &str,
        limit: Option<usize>,
    ) -> StmResult<Vec<MemoryEntry>> {
        let needle = dedup::normalize(query);
        let mut matches: Vec<MemoryEntry> = self
            .recall(session_id, None)?
            .into_iter()
            .filter(|entry| entry.content.contains(&needle))
            .collect();

        if let Some(limit) = limit {
            matches.truncate(limit);
        }
        Ok(matches)
    }

    /// A live entry by id.
    pub fn get(&self, id: &EntryId) -> StmResult<MemoryEntry> {
        self.store
            .get_entry(id)
            .filter(|entry| !entry.is_expired(self.clock.now()))
            .ok_or_else(|| StmError::not_found("MemoryEntry", id.to_string()))
    }

    /// The last `last_n` conversation turns of a session, oldest first.
    pub fn conversation_context(
        &self,
        session_id: &str,
        last_n: usize,
    ) -> StmResult<Vec<ConversationTurn>> {
        let entries = self.recall(session_id, None)?;
        Ok(conversation::recent_turns(&entries, last_n))
    }

    /// Summary of a session's live entries.
    pub fn stats(&self, session_id: &str) -> StmResult<SessionStats> {
        let entries = self.recall(session_id, None)?;

        let count = entries.len();
        let mut stats = SessionStats {
            session_id: session_id.to_string(),
            entries: count,
            promoted: entries.iter().filter(|e| e.promoted).count(),
            min_importance: None,
            max_importance: None,
            mean_importance: None,
            mean_content_length: None,
        };
        if count == 0 {
            return Ok(stats);
        }

        let importances = entries.iter().map(|e| e.importance);
        stats.min_importance = importances.clone().reduce(f64::min);
        stats.max_importance = importances.clone().reduce(f64::max);
        stats.mean_importance = Some(importances.sum::<f64>() / count as f64);
        stats.mean_content_length = Some(
            entries
                .iter()
                .map(|e| e.content.chars().count() as f64)
                .sum::<f64>()
                / count as f64,
        );
        Ok(stats)
    }

    /// Sessions that currently hold entries.
    pub fn session_ids(&self) -> Vec<String> {
        self.store.session_ids()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Removal
    // ─────────────────────────────────────────────────────────────────────────

    /// Evict every expired entry. Returns the number evicted.
    pub fn sweep(&self) -> usize {
        self.store.evict_expired(self.clock.now())
    }

    /// Remove an entry. Unknown ids are a no-op.
    pub fn forget(&self, id: &EntryId) -> bool {
        self.store.remove(id)
    }

    /// Remove every entry of a session.
    pub fn clear_session(&self, session_id: &str) -> usize {
        self.store.clear_session(session_id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Promotion
    // ─────────────────────────────────────────────────────────────────────────

    /// Promote every qualifying entry of a session.
    pub async fn promote(
        &self,
        session_id: &str,
        options: PromoteOptions,
    ) -> StmResult<PromotionReport> {
        check_session(session_id)?;
        self.pipeline.promote_all(session_id, &options).await
    }

    /// Drop the promotion history of a session so its content may be
    /// promoted again. Returns the number of ledger records dropped.
    pub fn forget_promotions(&self, session_id: &str) -> usize {
        self.store.forget_promotions(session_id)
    }

    /// Promote one entry regardless of its score.
    pub async fn promote_entry(&self, id: &EntryId, timeout: Option<Duration>) -> PromotionOutcome {
        self.pipeline.promote(id, timeout).await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Start the background sweeper if `sweep.interval_secs` is set.
    ///
    /// Returns true if a sweeper was started by this call.
    pub fn start_sweeper(&self) -> StmResult<bool> {
        match self.config.sweep.interval() {
            Some(every) => self.sweeper.start(every),
            None => Ok(false),
        }
    }

    pub fn is_sweeper_running(&self) -> bool {
        self.sweeper.is_running()
    }

    /// Stop background work. Safe to call more than once.
    pub fn shutdown(&self) {
        if self.sweeper.stop() {
            tracing::info!("Memory manager shut down");
        }
    }
}

fn check_session(session_id: &str) -> StmResult<()> {
    if session_id.trim().is_empty() {
        return Err(StmError::invalid_input("session_id", "must not be empty"));
    }
    Ok(())
}
