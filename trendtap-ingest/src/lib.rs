//! The ingestion loop: search → transform → store, sleeping through rate limits.
//!
//! - [`record`]: the fixed-field [`IngestedRecord`] and the pure [`to_record`] transform
//! - [`sink`]: single-record inserts that drop (and log) writes the store refuses
//! - [`pipeline`]: [`IngestLoop`], which drives a search cursor to exhaustion
pub mod pipeline;
pub mod record;
pub mod sink;

pub use pipeline::{IngestError, IngestLoop, IngestQuery, IngestSettings, IngestSummary};
pub use record::{to_record, IngestedRecord, TransformError};
pub use sink::{InsertOutcome, RecordSink};
