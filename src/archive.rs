use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::error::SeriesError;
use crate::persistence::{read_object, write_object};
use crate::telemetry::{SeriesEvent, SeriesEventListener};
use crate::types::{Payload, Timestamp};

const HEADER_FILE: &str = "archive";

/// Persisted archive header. Field names are part of the on-disk format.
///
/// `dir` is recorded for inspection but ignored on open: the archive always
/// uses the directory it was opened from, so a relocated series still opens.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ArchiveHeader {
    interval: i64,
    chunk_size: i64,
    dir: String,
    retention: i64,
    start_time: Timestamp,
    end_time: Timestamp,
    last_write: Timestamp,
}

/// Storage for one resolution: an ordered run of chunks plus a header file.
///
/// On disk, an archive is one directory holding the `archive` header and one
/// file per chunk, named by the chunk's start time in seconds. In memory, the
/// `chunks` list normally holds just the tail chunk (plus any predecessors
/// not yet persisted); older chunks are faulted back in from disk on demand
/// during reads. A single exclusive lock serializes appends, reads, and
/// persistence.
#[derive(Debug)]
pub(crate) struct Archive {
    dir: PathBuf,
    interval: i64,
    chunk_span: i64,
    retention: i64,
    state: Mutex<ArchiveState>,
    events: Arc<dyn SeriesEventListener>,
}

#[derive(Debug)]
struct ArchiveState {
    /// Oldest still-retained sample timestamp, 0 while empty.
    start_time: Timestamp,
    /// Newest sample timestamp, 0 while empty.
    end_time: Timestamp,
    chunks: Vec<Chunk>,
    /// `end_time` as of the last successful persist.
    last_persisted_end: Timestamp,
}

impl Archive {
    /// Creates an empty archive in `dir` and persists its header right away,
    /// so an empty archive is already resumable.
    pub(crate) fn new<P: AsRef<Path>>(
        dir: P,
        interval: i64,
        retention: i64,
        chunk_span: i64,
        events: Arc<dyn SeriesEventListener>,
    ) -> Result<Self, SeriesError> {
        let archive = Archive {
            dir: dir.as_ref().to_path_buf(),
            interval,
            chunk_span,
            retention,
            state: Mutex::new(ArchiveState {
                start_time: 0,
                end_time: 0,
                chunks: Vec::new(),
                last_persisted_end: 0,
            }),
            events,
        };
        {
            let state = archive.state.lock()?;
            archive.write_header(&state)?;
        }
        Ok(archive)
    }

    /// Opens an existing archive. Only the tail chunk is loaded eagerly;
    /// anything older is read on demand.
    pub(crate) fn open<P: AsRef<Path>>(
        dir: P,
        events: Arc<dyn SeriesEventListener>,
    ) -> Result<Self, SeriesError> {
        let dir = dir.as_ref().to_path_buf();
        let header: ArchiveHeader = read_object(dir.join(HEADER_FILE))?;

        let mut chunks = Vec::new();
        if header.end_time > 0 {
            let tail_start = header.end_time - header.end_time % header.chunk_size;
            let mut tail: Chunk = read_object(dir.join(tail_start.to_string()))?;
            tail.restore_tag_index();
            chunks.push(tail);
        }

        Ok(Archive {
            dir,
            interval: header.interval,
            chunk_span: header.chunk_size,
            retention: header.retention,
            state: Mutex::new(ArchiveState {
                start_time: header.start_time,
                end_time: header.end_time,
                chunks,
                last_persisted_end: header.last_write,
            }),
            events,
        })
    }

    pub(crate) fn interval(&self) -> i64 {
        self.interval
    }

    pub(crate) fn end_time(&self) -> Timestamp {
        self.state.lock().map(|s| s.end_time).unwrap_or(0)
    }

    /// Appends `values` at `ts` (rounded up to the resolution), rolling over
    /// to a fresh chunk when the tail's span is exhausted.
    pub(crate) fn append(
        &self,
        values: &HashMap<String, Payload>,
        ts: Timestamp,
    ) -> Result<(), SeriesError> {
        let ts = self.ts_norm(ts);
        let mut state = self.state.lock()?;

        let needs_new = match state.chunks.last() {
            None => true,
            Some(tail) => ts > self.chunk_end(tail.start_time),
        };
        if needs_new {
            if let Some(tail) = state.chunks.last_mut() {
                // Finalize the outgoing tail: fill it to the end of its own
                // span, never beyond, regardless of how far `ts` jumped.
                if !tail.is_empty() && tail.end_time < self.chunk_end(tail.start_time) {
                    let bound = tail.start_time + self.chunk_span;
                    tail.fill_to(bound);
                }
            }
            let chunk = Chunk::new(self.interval, self.chunk_floor(ts));
            state.chunks.push(chunk);
        }

        if let Some(tail) = state.chunks.last_mut() {
            tail.append(values, ts);
        }

        state.end_time = ts;
        if state.start_time == 0 {
            state.start_time = ts;
        }
        Ok(())
    }

    /// The tail chunk's latest mapping and timestamp, or `(None, 0)`.
    pub(crate) fn latest(&self) -> (Option<HashMap<String, Payload>>, Timestamp) {
        match self.state.lock() {
            Ok(state) => match state.chunks.last() {
                Some(tail) => (tail.latest(), tail.end_time),
                None => (None, 0),
            },
            Err(_) => (None, 0),
        }
    }

    /// Reads `[start, end)` (both rounded up to the resolution) as per-signal
    /// dense arrays plus the timestamp vector.
    ///
    /// Chunks are taken from memory when present, otherwise faulted in from
    /// disk. A missing chunk file contributes nulls rather than an error:
    /// retention may legitimately have removed it.
    pub(crate) fn get_data(
        &self,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<(HashMap<String, Vec<Option<Payload>>>, Vec<Timestamp>), SeriesError> {
        let start = self.ts_norm(start);
        let end = self.ts_norm(end);
        if end <= start {
            return Ok((HashMap::new(), Vec::new()));
        }
        let len = ((end - start) / self.interval) as usize;

        let state = self.state.lock()?;

        let mut stamps = Vec::with_capacity(len);
        let mut t = start;
        for _ in 0..len {
            stamps.push(t);
            t += self.interval;
        }

        let mut data: HashMap<String, Vec<Option<Payload>>> = HashMap::new();
        let mut offset = 0usize;
        let mut chunk_start = self.chunk_floor(start);
        while chunk_start < end {
            let clamp_start = chunk_start.max(start);
            let clamp_end = (chunk_start + self.chunk_span).min(end);

            let loaded;
            let chunk = match state.chunks.iter().find(|c| c.start_time == chunk_start) {
                Some(c) => Some(c),
                None => match self.read_chunk(chunk_start)? {
                    Some(c) => {
                        loaded = c;
                        Some(&loaded)
                    }
                    None => None,
                },
            };

            if let Some(chunk) = chunk {
                let (chunk_data, _) = chunk.get_data(clamp_start, clamp_end);
                for (key, ticks) in chunk_data {
                    let series = data.entry(key).or_insert_with(|| vec![None; len]);
                    for (j, v) in ticks.into_iter().enumerate() {
                        if offset + j < len {
                            series[offset + j] = v;
                        }
                    }
                }
            }

            offset += ((clamp_end - clamp_start) / self.interval) as usize;
            chunk_start += self.chunk_span;
        }

        Ok((data, stamps))
    }

    /// Persists dirty chunks and the header, releases all but the tail chunk
    /// from memory, and exercises retention.
    ///
    /// A failed chunk write aborts before the header advances and leaves the
    /// dirty flags set, so the next call retries the same chunks.
    pub(crate) fn write(&self) -> Result<(), SeriesError> {
        let mut state = self.state.lock()?;

        if state.end_time > state.last_persisted_end {
            for chunk in state.chunks.iter_mut().filter(|c| c.dirty) {
                let path = self.dir.join(chunk.start_time.to_string());
                match write_object(&path, &*chunk) {
                    Ok(()) => {
                        chunk.dirty = false;
                        self.events.on_event(SeriesEvent::ChunkPersisted { path });
                    }
                    Err(e) => {
                        self.events.on_event(SeriesEvent::ChunkPersistFailed {
                            path,
                            error: e.to_string(),
                        });
                        return Err(e);
                    }
                }
            }

            // Older chunks are on disk now; queries fault them back in.
            let tail_index = state.chunks.len().saturating_sub(1);
            state.chunks.drain(..tail_index);

            self.exercise_retention(&mut state);
            state.last_persisted_end = state.end_time;
        }

        self.write_header(&state)
    }

    /// Deletes whole chunks that fell out of the retention window, advancing
    /// `start_time` one chunk span at a time from its chunk floor. Deletion
    /// failures never fail the write.
    fn exercise_retention(&self, state: &mut ArchiveState) {
        while state.end_time - state.start_time > self.retention {
            let chunk_start = self.chunk_floor(state.start_time);
            let path = self.dir.join(chunk_start.to_string());
            if fs::remove_file(&path).is_ok() {
                self.events.on_event(SeriesEvent::ChunkExpired { path });
            }
            state.start_time = chunk_start + self.chunk_span;
        }
    }

    fn write_header(&self, state: &ArchiveState) -> Result<(), SeriesError> {
        let header = ArchiveHeader {
            interval: self.interval,
            chunk_size: self.chunk_span,
            dir: self.dir.to_string_lossy().into_owned(),
            retention: self.retention,
            start_time: state.start_time,
            end_time: state.end_time,
            last_write: state.last_persisted_end,
        };
        write_object(self.dir.join(HEADER_FILE), &header)?;
        self.events.on_event(SeriesEvent::HeaderPersisted {
            resolution: self.interval,
        });
        Ok(())
    }

    fn read_chunk(&self, start: Timestamp) -> Result<Option<Chunk>, SeriesError> {
        let path = self.dir.join(start.to_string());
        let mut chunk: Chunk = match read_object(&path) {
            Ok(c) => c,
            Err(SeriesError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(None)
            }
            Err(e) => return Err(e),
        };
        chunk.restore_tag_index();
        self.events.on_event(SeriesEvent::ChunkFaulted { path });
        Ok(Some(chunk))
    }

    /// Rounds up to the nearest resolution.
    fn ts_norm(&self, ts: Timestamp) -> Timestamp {
        let down = ts - ts % self.interval;
        if down < ts {
            down + self.interval
        } else {
            down
        }
    }

    fn chunk_floor(&self, ts: Timestamp) -> Timestamp {
        ts - ts % self.chunk_span
    }

    /// Timestamp of the last slot in the chunk containing `ts`.
    fn chunk_end(&self, ts: Timestamp) -> Timestamp {
        self.chunk_floor(ts) + self.chunk_span - self.interval
    }
}
