//! Async access to persisted sensor streams and the analyzer that runs the
//! statistical components over them. Storage sits behind the `StreamStore`
//! trait; everything above it is storage-agnostic.

pub mod access;
pub mod interpret;
pub mod orchestrate;
pub mod storage;

pub use access::{discover_streams, fetch_range, fetch_recent, infer_kind, StreamKind};
pub use orchestrate::{PatternReport, SmoothedSeries, StatsSummary, StreamAnalyzer};
pub use storage::{MemoryStreamStore, PgStreamStore, StreamStore};
