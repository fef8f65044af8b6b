use tracing::{debug, info};
use trendtap_store::{DocumentCollection, StoreError};

use crate::record::IngestedRecord;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    Stored { doc_id: String },
    /// The store refused the write; the record is gone and was logged once.
    Dropped { reason: String },
}

/// Writes records into one collection.
pub struct RecordSink<C> {
    collection: C,
}

impl<C: DocumentCollection> RecordSink<C> {
    pub fn new(collection: C) -> Self {
        Self { collection }
    }

    pub fn collection(&self) -> &C {
        &self.collection
    }

    /// Insert one record. Operational store failures are logged and reported
    /// as [`InsertOutcome::Dropped`]; every other failure is returned.
    pub async fn insert(&self, record: &IngestedRecord) -> Result<InsertOutcome, StoreError> {
        let doc = serde_json::to_value(record)
            .map_err(|e| StoreError::InvalidDocument(e.to_string()))?;

        match self.collection.insert_one(&doc).await {
            Ok(doc_id) => {
                debug!(
                    collection=%self.collection.name(),
                    record_id=%record.id(),
                    doc_id=%doc_id,
                    "sink.insert.stored"
                );
                Ok(InsertOutcome::Stored { doc_id })
            }
            Err(err) if err.is_operational() => {
                info!(
                    collection=%self.collection.name(),
                    record_id=%record.id(),
                    error=%err,
                    "sink.insert.dropped"
                );
                Ok(InsertOutcome::Dropped {
                    reason: err.to_string(),
                })
            }
            Err(err) => Err(err),
        }
    }
}
