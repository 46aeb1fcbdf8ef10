//! Long-term memory collaborator.
//!
//! The engine needs exactly one thing from long-term memory: a place to submit
//! promoted entries. Embedding, vector storage and similarity search all live
//! behind [`LongTermStore`] and are none of this crate's business.

mod memory;

pub use memory::{InMemoryLongTermStore, StoredRecord};

use async_trait::async_trait;
use thiserror::Error;

use crate::error::StmError;
use crate::types::{LongTermRecord, RecordId};

/// Errors reported by a long-term store.
#[derive(Error, Debug)]
pub enum LtmError {
    /// The store could not be reached or failed transiently.
    #[error("long-term store unavailable: {0}")]
    Unavailable(String),

    /// The store refused the record.
    #[error("record rejected: {0}")]
    Rejected(String),

    /// The operation is not implemented by this backend.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<LtmError> for StmError {
    fn from(err: LtmError) -> Self {
        StmError::external(err.to_string())
    }
}

/// Contract the engine requires from long-term memory.
#[async_trait]
pub trait LongTermStore: Send + Sync {
    /// Persist a record and return its id.
    async fn store_record(&self, record: &LongTermRecord) -> Result<RecordId, LtmError>;

    /// Dump every record as JSON, for backup.
    async fn export_all(&self) -> Result<serde_json::Value, LtmError> {
        Err(LtmError::Unsupported("export_all"))
    }

    /// Load records produced by [`LongTermStore::export_all`]. Returns the
    /// number of records imported.
    async fn import_all(&self, _dump: serde_json::Value) -> Result<usize, LtmError> {
        Err(LtmError::Unsupported("import_all"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StoreOnly;

    #[async_trait]
    impl LongTermStore for StoreOnly {
        async fn store_record(&self, _record: &LongTermRecord) -> Result<RecordId, LtmError> {
            Ok(RecordId::new("fixed"))
        }
    }

    #[tokio::test]
    async fn test_backup_is_optional() {
        let store = StoreOnly;
        assert!(matches!(
            store.export_all().await,
            Err(LtmError::Unsupported("export_all"))
        ));
        assert!(matches!(
            store.import_all(serde_json::json!([])).await,
            Err(LtmError::Unsupported("import_all"))
        ));
    }

    #[tokio::test]
    async fn test_records_are_nameable() {
        let store = InMemoryLongTermStore::new();
        let record = LongTermRecord {
            content: "urgent: server down".into(),
            importance: 0.95,
            metadata: serde_json::Map::new(),
        };
        let id = store.store_record(&record).await.unwrap();

        let records: Vec<StoredRecord> = store.records().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert_eq!(records[0].record, record);
    }

    #[test]
    fn test_ltm_error_maps_to_external() {
        let err: StmError = LtmError::Unavailable("connection refused".into()).into();
        assert!(matches!(err, StmError::ExternalStoreUnavailable { .. }));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("connection refused"));
    }
}
