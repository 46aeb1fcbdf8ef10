//! stm-core - Short-term memory engine for AI agents
//!
//! Ephemeral, per-session memory with automatic expiry, content
//! deduplication, importance scoring, and selective promotion of entries into
//! an external long-term memory (LTM) store.
//!
//! - **scoring**: keyword/urgency importance heuristics
//! - **dedup**: normalized content hashes, scoped per session or globally
//! - **store**: TTL-governed entry container with ranked retrieval
//! - **promotion**: candidate selection and hand-off to LTM
//! - **ltm**: the long-term store contract plus an in-process reference store
//! - **sweeper**: optional background eviction task
//! - **conversation**: user/assistant turns stored as entries
//! - **manager**: the facade callers hold
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stm_core::{InMemoryLongTermStore, MemoryManager, PromoteOptions, Remembered, StmConfig};
//!
//! async fn example() -> stm_core::StmResult<()> {
//!     let ltm = Arc::new(InMemoryLongTermStore::new());
//!     let manager = MemoryManager::new(StmConfig::default(), ltm)?;
//!
//!     if let Remembered::Stored(entry) = manager.remember("s1", "urgent: server down", None).await? {
//!         println!("stored {} with importance {:.2}", entry.id, entry.importance);
//!     }
//!
//!     let top = manager.recall("s1", Some(5))?;
//!     let report = manager.promote("s1", PromoteOptions::default()).await?;
//!     println!("{} recalled, {} promoted", top.len(), report.promoted_count());
//!     Ok(())
//! }
//! ```

pub mod clock;
pub mod config;
pub mod conversation;
pub mod dedup;
pub mod error;
pub mod ltm;
pub mod manager;
pub mod promotion;
pub mod scoring;
pub mod store;
pub mod sweeper;
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ConfigValidationError, DedupScope, MAX_TTL_SECS, PromotionConfig, PromotionMode, ScoringConfig,
    StmConfig, SweepConfig,
};
pub use conversation::ConversationTurn;
pub use error::{StmError, StmResult};
pub use ltm::{InMemoryLongTermStore, LongTermStore, LtmError, StoredRecord};
pub use manager::{MemoryManager, RememberOptions, SessionStats};
pub use promotion::{PromoteOptions, PromotionPipeline, PromotionReport};
pub use scoring::{KeywordWeights, ScoringContext, ScoringEngine};
pub use store::{EntryStore, InsertOutcome};
pub use sweeper::Sweeper;
pub use types::{
    ContentHash, EntryId, LongTermRecord, MemoryEntry, PromotionOutcome, RecordId, Remembered,
};
