//! In-process long-term store.
//!
//! Keeps records in a vector and assigns UUID ids. No embeddings, no search:
//! it exists so the engine can run (and be tested) without a vector database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{LongTermStore, LtmError};
use crate::types::{LongTermRecord, RecordId};

/// A record as held by [`InMemoryLongTermStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecord {
    pub id: RecordId,
    #[serde(flatten)]
    pub record: LongTermRecord,
    pub stored_at: DateTime<Utc>,
}

/// Long-term store backed by process memory.
#[derive(Debug, Default)]
pub struct InMemoryLongTermStore {
    records: RwLock<Vec<StoredRecord>>,
}

impl InMemoryLongTermStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records, oldest first.
    pub async fn records(&self) -> Vec<StoredRecord> {
        self.records.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl LongTermStore for InMemoryLongTermStore {
    async fn store_record(&self, record: &LongTermRecord) -> Result<RecordId, LtmError> {
        if record.content.trim().is_empty() {
            return Err(LtmError::Rejected("content is empty".into()));
        }

        let id = RecordId::new(Uuid::new_v4().to_string());
        let mut records = self.records.write().await;
        records.push(StoredRecord {
            id: id.clone(),
            record: record.clone(),
            stored_at: Utc::now(),
        });

        tracing::debug!(record_id = %id, total = records.len(), "Stored long-term record");
        Ok(id)
    }

    async fn export_all(&self) -> Result<serde_json::Value, LtmError> {
        let records = self.records.read().await;
        Ok(serde_json::to_value(&*records)?)
    }

    async fn import_all(&self, dump: serde_json::Value) -> Result<usize, LtmError> {
        let incoming: Vec<StoredRecord> = serde_json::from_value(dump)?;
        let mut records = self.records.write().await;

        let mut imported = 0;
        for record in incoming {
            if records.iter().any(|r| r.id == record.id) {
                continue;
            }
            records.push(record);
            imported += 1;
        }

        tracing::info!(imported, "Imported long-term records");
        Ok(imported)
    }
}
