//! Drives one search from the first page to exhaustion.
//!
//! States: fetching → storing → fetching for every item, and
//! fetching → sleeping → fetching when the source is rate limited. The sleep
//! is `reset_in + rate_limit_buffer` and the same cursor is advanced again
//! afterwards, so no page is requested twice unless it was refused.
use std::time::Duration;

use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info};
use trendtap_social::twitter::extract::status_url;
use trendtap_social::twitter::{Fetch, ResultType, SearchApi, SearchCursor, SearchRequest, SocialError};
use trendtap_store::{DocumentCollection, StoreError};

use crate::record::{to_record, TransformError};
use crate::sink::{InsertOutcome, RecordSink};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("search source failed: {0}")]
    Source(#[from] SocialError),
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error("store failed: {0}")]
    Store(#[from] StoreError),
}

/// Loop-wide knobs, fixed when the loop is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSettings {
    /// Added on top of the server's reset window before resuming.
    pub rate_limit_buffer: Duration,
    /// Stop after this many items; `None` runs until the source is exhausted.
    pub max_items: Option<u64>,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            rate_limit_buffer: Duration::from_secs(1),
            max_items: None,
        }
    }
}

/// What to search for and how to tag the resulting records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestQuery {
    pub topic: String,
    pub result_type: ResultType,
    pub batch_size: u32,
    pub classification_code: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub fetched: u64,
    pub stored: u64,
    pub dropped: u64,
    pub pages: u64,
    pub rate_limit_waits: u64,
    pub slept: Duration,
}

pub struct IngestLoop<A, C> {
    api: A,
    sink: RecordSink<C>,
    settings: IngestSettings,
}

impl<A, C> IngestLoop<A, C>
where
    A: SearchApi,
    C: DocumentCollection,
{
    pub fn new(api: A, collection: C, settings: IngestSettings) -> Self {
        Self {
            api,
            sink: RecordSink::new(collection),
            settings,
        }
    }

    pub fn settings(&self) -> &IngestSettings {
        &self.settings
    }

    pub fn sink(&self) -> &RecordSink<C> {
        &self.sink
    }

    /// Search for `query.topic` and store every result.
    ///
    /// Returns once the source runs out of pages or `max_items` is reached.
    /// Rate limits are waited out; dropped records are counted. Any other
    /// failure ends the run.
    pub async fn run(&self, query: &IngestQuery) -> Result<IngestSummary, IngestError> {
        let request = SearchRequest::new(query.topic.clone(), query.result_type, query.batch_size)?;
        let mut cursor = SearchCursor::new(&self.api, request);
        let mut summary = IngestSummary::default();

        info!(
            topic=%query.topic,
            result_type=%query.result_type,
            batch_size=query.batch_size,
            classification_code=%query.classification_code,
            collection=%self.sink.collection().name(),
            "ingest.start"
        );

        loop {
            if let Some(max) = self.settings.max_items {
                if summary.fetched >= max {
                    info!(max_items = max, "ingest.max_items_reached");
                    break;
                }
            }

            match cursor.next().await? {
                Fetch::Item(tweet) => {
                    summary.fetched += 1;
                    let record = to_record(&tweet, &query.topic, &query.classification_code)?;
                    match self.sink.insert(&record).await? {
                        InsertOutcome::Stored { doc_id } => {
                            summary.stored += 1;
                            debug!(
                                record_id=%record.id(),
                                doc_id=%doc_id,
                                url=%status_url(&tweet),
                                "ingest.record.stored"
                            );
                        }
                        InsertOutcome::Dropped { .. } => summary.dropped += 1,
                    }
                }
                Fetch::RateLimited { reset_in } => {
                    let wait = reset_in + self.settings.rate_limit_buffer;
                    info!(
                        reset_in_secs = reset_in.as_secs(),
                        sleep_secs = wait.as_secs(),
                        next_token = ?cursor.next_token(),
                        "ingest.rate_limited"
                    );
                    summary.rate_limit_waits += 1;
                    summary.slept += wait;
                    sleep(wait).await;
                }
                Fetch::Exhausted => {
                    info!("ingest.source_exhausted");
                    break;
                }
            }
        }

        summary.pages = cursor.pages_fetched();
        info!(
            fetched = summary.fetched,
            stored = summary.stored,
            dropped = summary.dropped,
            pages = summary.pages,
            rate_limit_waits = summary.rate_limit_waits,
            slept_secs = summary.slept.as_secs(),
            "ingest.finished"
        );
        Ok(summary)
    }
}
