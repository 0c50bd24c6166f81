use std::path::PathBuf;
use std::sync::Arc;

/// Structured, in-process event hook for observability.
///
/// This crate is a library; emitting logs directly (e.g. `println!`) is not
/// acceptable for production. Instead, callers can provide an implementation
/// that forwards these events to `tracing`, `log`, metrics, or custom sinks.
pub trait SeriesEventListener: std::fmt::Debug + Send + Sync + 'static {
    fn on_event(&self, event: SeriesEvent);
}

/// Structured events emitted by the storage engine.
#[derive(Debug, Clone)]
pub enum SeriesEvent {
    ChunkPersisted { path: PathBuf },
    ChunkPersistFailed { path: PathBuf, error: String },
    ChunkFaulted { path: PathBuf },
    ChunkExpired { path: PathBuf },

    HeaderPersisted { resolution: i64 },

    RollupApplied { resolution: i64, timestamp: i64 },
}

#[derive(Debug)]
pub struct NoopEventListener;

impl SeriesEventListener for NoopEventListener {
    #[inline]
    fn on_event(&self, _event: SeriesEvent) {}
}

pub fn noop_event_listener() -> Arc<dyn SeriesEventListener> {
    Arc::new(NoopEventListener)
}
