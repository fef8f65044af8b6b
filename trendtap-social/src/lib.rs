//! Social network clients and extractors used by trendtap.
//!
//! Only the Twitter/X pipeline is implemented: a recent-search client, the
//! [`twitter::SearchApi`] seam the ingestion loop depends on, and a resumable
//! [`twitter::SearchCursor`] that owns pagination state.
pub mod twitter;
