#![doc = r#"
strata: Embedded Multi-Resolution Time-Series Storage

This crate provides an append-only, multi-resolution time-series store for
Rust applications. A series tracks any number of named scalar signals, keeps
the finest data in dense on-disk chunks, and maintains coarser archives
automatically through cascading rollups on insert. It supports:
- Dense, gap-filled storage (brief dropouts are carried forward, longer gaps
  are explicit nulls)
- Automatic rollups (total/count/min/max) across a ladder of resolutions
- Per-resolution retention, reclaimed in whole chunks on write
- Average / maximum / minimum / raw-rollup window queries
- Whole-object MessagePack persistence under one directory per series

See the README for usage examples and more details.
"#]
// Declare modules
mod archive;
mod chunk;
pub mod error;
mod persistence;
pub mod series;
pub mod telemetry;
pub mod types;

/// Main entry point: one multi-resolution time series on disk.
pub use crate::series::Series;
/// Runtime (non-persisted) options for creating or opening a series.
pub use crate::series::SeriesOptions;
/// Error type for series operations.
pub use crate::error::SeriesError;
/// Structured event hook for observability.
pub use crate::telemetry::{SeriesEvent, SeriesEventListener};
/// Persisted series configuration.
pub use crate::types::{ArchiveConfig, SeriesConfig};
/// Four-field reduction of one coarse interval.
pub use crate::types::Rollup;
/// Type alias for a timestamp (seconds since epoch).
pub use crate::types::Timestamp;
/// Type alias for a signal value (f64).
pub use crate::types::Value;

// Well-known resolutions, in seconds. Each is divisible by all smaller ones,
// which is what the rollup cascade requires of a series' archive ladder.
pub const SECOND: i64 = 1;
pub const TEN_SECOND: i64 = 10;
pub const THIRTY_SECOND: i64 = 30;
pub const MINUTE: i64 = 60;
pub const FIVE_MINUTE: i64 = 5 * MINUTE;
pub const TEN_MINUTE: i64 = 10 * MINUTE;
pub const THIRTY_MINUTE: i64 = 30 * MINUTE;
pub const HOUR: i64 = 60 * MINUTE;
pub const SIX_HOUR: i64 = 6 * HOUR;
pub const TWELVE_HOUR: i64 = 12 * HOUR;
pub const DAY: i64 = 24 * HOUR;

/// Slots per chunk; a chunk spans `CHUNK_SIZE_SLOTS * resolution` seconds.
pub const CHUNK_SIZE_SLOTS: i64 = 2000;
