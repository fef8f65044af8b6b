//! Helpers shared by every trendtap crate.
//!
//! - [`observability`]: process-wide `tracing` setup with a rolling file sink
pub mod observability;
