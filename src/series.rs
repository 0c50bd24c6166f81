use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rayon::prelude::*;

use crate::archive::Archive;
use crate::error::SeriesError;
use crate::persistence::{read_object, write_object};
use crate::telemetry::{noop_event_listener, SeriesEvent, SeriesEventListener};
use crate::types::{Payload, Rollup, SeriesConfig, Timestamp, Value};
use crate::CHUNK_SIZE_SLOTS;

const CONFIG_FILE: &str = "config";

/// Runtime options that are not part of the persisted configuration.
#[derive(Debug, Clone)]
pub struct SeriesOptions {
    /// Structured event hook for observability (no-op by default).
    pub event_listener: Arc<dyn SeriesEventListener>,
}

impl Default for SeriesOptions {
    fn default() -> Self {
        SeriesOptions {
            event_listener: noop_event_listener(),
        }
    }
}

/// An append-only, multi-resolution time series rooted at one directory.
///
/// A series tracks an open-ended set of named signals over a ladder of
/// archives of strictly increasing resolution. Writers feed timestamped
/// samples into the finest archive; each append that crosses a coarser
/// interval boundary reduces the just-closed window into a [`Rollup`] and
/// cascades it up the ladder. Readers ask for a contiguous window at exactly
/// one configured resolution and get dense, gap-filled sequences back.
///
/// Data reaches disk only through [`Series::write`], which the caller invokes
/// at its own cadence; retention is exercised as part of that same call. A
/// series is safe to share between threads, but not between processes.
#[derive(Debug)]
pub struct Series {
    archives: Vec<Archive>,
    config: SeriesConfig,
    events: Arc<dyn SeriesEventListener>,
    last_written: AtomicI64,
}

impl Series {
    /// Constructs a new series in `dir` with the given configuration.
    ///
    /// At least one archive must be provided. With multiple archives, each
    /// resolution must be a multiple of the previous one; rollups are then
    /// maintained automatically as data is inserted. The configuration is
    /// persisted into the directory so the series can be reopened later.
    pub fn create<P: AsRef<Path>>(dir: P, config: SeriesConfig) -> Result<Self, SeriesError> {
        Self::create_with(dir, config, SeriesOptions::default())
    }

    /// Like [`Series::create`], with explicit runtime options.
    pub fn create_with<P: AsRef<Path>>(
        dir: P,
        mut config: SeriesConfig,
        options: SeriesOptions,
    ) -> Result<Self, SeriesError> {
        if config.archives.is_empty() {
            return Err(SeriesError::Config(
                "config must specify at least one archive".to_string(),
            ));
        }
        config.archives.sort_by_key(|a| a.resolution);

        let dir = dir.as_ref();
        // The archive directory creations below surface real failures.
        let _ = fs::create_dir_all(dir);

        let mut archives = Vec::with_capacity(config.archives.len());
        let mut last = 1i64;
        for (i, cfg) in config.archives.iter().enumerate() {
            if cfg.resolution <= 0 {
                return Err(SeriesError::Config(format!(
                    "archive resolution must be positive, got {}",
                    cfg.resolution
                )));
            }
            if i > 0 && cfg.resolution <= last {
                return Err(SeriesError::Config(
                    "archive resolutions must be strictly ascending".to_string(),
                ));
            }
            if cfg.resolution % last != 0 {
                return Err(SeriesError::Config(
                    "each archive resolution must be divisible by all smaller ones".to_string(),
                ));
            }
            if cfg.retention < cfg.resolution {
                return Err(SeriesError::Config(format!(
                    "archive retention {} is shorter than its resolution {}",
                    cfg.retention, cfg.resolution
                )));
            }
            last = cfg.resolution;

            let sub = dir.join(cfg.resolution.to_string());
            fs::create_dir(&sub)?;
            archives.push(Archive::new(
                &sub,
                cfg.resolution,
                cfg.retention,
                CHUNK_SIZE_SLOTS * cfg.resolution,
                options.event_listener.clone(),
            )?);
        }

        write_object(dir.join(CONFIG_FILE), &config)?;

        Ok(Series {
            archives,
            config,
            events: options.event_listener,
            last_written: AtomicI64::new(0),
        })
    }

    /// Opens an existing series in `dir`.
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, SeriesError> {
        Self::open_with(dir, SeriesOptions::default())
    }

    /// Like [`Series::open`], with explicit runtime options.
    pub fn open_with<P: AsRef<Path>>(
        dir: P,
        options: SeriesOptions,
    ) -> Result<Self, SeriesError> {
        let dir = dir.as_ref();
        let config: SeriesConfig = read_object(dir.join(CONFIG_FILE))?;

        let mut archives = Vec::with_capacity(config.archives.len());
        for cfg in &config.archives {
            archives.push(Archive::open(
                dir.join(cfg.resolution.to_string()),
                options.event_listener.clone(),
            )?);
        }

        Ok(Series {
            archives,
            config,
            events: options.event_listener,
            last_written: AtomicI64::new(0),
        })
    }

    /// Adds a single key-value pair at the given timestamp. The timestamp is
    /// normalized up to a multiple of the series' base resolution.
    pub fn add_value(&self, key: &str, value: Value, timestamp: Timestamp) -> Result<(), SeriesError> {
        let mut values = HashMap::with_capacity(1);
        values.insert(key.to_string(), value);
        self.add_values(&values, timestamp)
    }

    /// Adds multiple key-value pairs at the given timestamp, then cascades
    /// rollups up the archive ladder.
    ///
    /// For each coarser archive in turn, if the append crossed that archive's
    /// interval boundary (judged against the base archive's end time from
    /// before this append), the just-closed window is read back from the next
    /// finer archive, reduced per signal into a rollup, and appended at the
    /// window's right edge. The cascade stops at the first archive whose
    /// boundary was not crossed.
    pub fn add_values(
        &self,
        values: &HashMap<String, Value>,
        timestamp: Timestamp,
    ) -> Result<(), SeriesError> {
        let prev_end = self.base().end_time();

        let payloads: HashMap<String, Payload> = values
            .iter()
            .map(|(k, &v)| (k.clone(), Payload::Raw(v)))
            .collect();
        self.base().append(&payloads, timestamp)?;

        for (i, archive) in self.archives.iter().enumerate().skip(1) {
            let interval = archive.interval();
            if timestamp / interval == prev_end / interval {
                // done rolling up
                break;
            }

            let rollup_end = timestamp - timestamp % interval;
            let rollup_start = rollup_end - interval;

            let source = &self.archives[i - 1];
            let (data, _) = source.get_data(rollup_start, rollup_end)?;

            let rollups = if i == 1 {
                reduce_raw(data)
            } else {
                reduce_rollups(data)
            };

            archive.append(&rollups, rollup_end)?;
            self.events.on_event(SeriesEvent::RollupApplied {
                resolution: interval,
                timestamp: rollup_end,
            });
        }

        Ok(())
    }

    /// The latest key-value pairs in the base archive and their timestamp.
    pub fn latest(&self) -> (HashMap<String, Value>, Timestamp) {
        let (data, ts) = self.base().latest();
        let vals = data
            .map(|map| {
                map.into_iter()
                    .filter_map(|(k, v)| v.as_raw().map(|v| (k, v)))
                    .collect()
            })
            .unwrap_or_default();
        (vals, ts)
    }

    /// Average value series for all keys over `[start, end)` at `resolution`,
    /// which must match one configured archive exactly.
    ///
    /// At the base resolution, raw values are returned with gaps replaced by
    /// the configured default. At coarser resolutions each slot's rollup is
    /// averaged; empty rollups report 0.0.
    pub fn averages(
        &self,
        start: Timestamp,
        end: Timestamp,
        resolution: i64,
    ) -> Result<(HashMap<String, Vec<f64>>, Vec<Timestamp>), SeriesError> {
        self.walk_data(start, end, resolution, |r| {
            if r.count > 0 {
                r.total / r.count as f64
            } else {
                0.0
            }
        })
    }

    /// Maximum value series for all keys. See [`Series::averages`].
    pub fn maximums(
        &self,
        start: Timestamp,
        end: Timestamp,
        resolution: i64,
    ) -> Result<(HashMap<String, Vec<f64>>, Vec<Timestamp>), SeriesError> {
        self.walk_data(start, end, resolution, |r| {
            if r.count > 0 {
                r.max
            } else {
                0.0
            }
        })
    }

    /// Minimum value series for all keys. See [`Series::averages`].
    pub fn minimums(
        &self,
        start: Timestamp,
        end: Timestamp,
        resolution: i64,
    ) -> Result<(HashMap<String, Vec<f64>>, Vec<Timestamp>), SeriesError> {
        self.walk_data(start, end, resolution, |r| {
            if r.count > 0 {
                r.min
            } else {
                0.0
            }
        })
    }

    /// Raw rollup records from a coarse archive. Slots with no data come back
    /// as empty rollups (`count == 0`).
    pub fn rollups(
        &self,
        start: Timestamp,
        end: Timestamp,
        resolution: i64,
    ) -> Result<(HashMap<String, Vec<Rollup>>, Vec<Timestamp>), SeriesError> {
        if resolution == self.base().interval() {
            return Err(SeriesError::RollupsFromBase);
        }
        let archive = self.archives[1..]
            .iter()
            .find(|a| a.interval() == resolution)
            .ok_or(SeriesError::NoMatchingArchive(resolution))?;

        let (data, stamps) = archive.get_data(start, end)?;
        let vals = data
            .into_iter()
            .map(|(key, ticks)| {
                let rollups = ticks
                    .into_iter()
                    .map(|slot| match slot {
                        Some(Payload::Rollup(r)) => r,
                        _ => Rollup::default(),
                    })
                    .collect();
                (key, rollups)
            })
            .collect();
        Ok((vals, stamps))
    }

    /// Writes every archive to disk in order (finest first) and exercises
    /// retention. The first failure aborts and is surfaced; dirty state stays
    /// in memory for the next attempt.
    pub fn write(&self) -> Result<(), SeriesError> {
        for archive in &self.archives {
            archive.write()?;
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs() as i64;
        self.last_written.store(now, Ordering::Relaxed);
        Ok(())
    }

    /// Wall-clock seconds of the last successful [`Series::write`], 0 if none
    /// has happened in this process.
    pub fn last_written(&self) -> Timestamp {
        self.last_written.load(Ordering::Relaxed)
    }

    /// The configuration this series was created with.
    pub fn config(&self) -> &SeriesConfig {
        &self.config
    }

    fn base(&self) -> &Archive {
        &self.archives[0]
    }

    fn walk_data<F>(
        &self,
        start: Timestamp,
        end: Timestamp,
        resolution: i64,
        aggregate: F,
    ) -> Result<(HashMap<String, Vec<f64>>, Vec<Timestamp>), SeriesError>
    where
        F: Fn(&Rollup) -> f64 + Sync,
    {
        let span = end - start;
        let mut len = span / resolution;
        if span % resolution > 0 {
            len += 1;
        }
        let len = len.max(0) as usize;

        if resolution == self.base().interval() {
            let (data, stamps) = self.base().get_data(start, end)?;
            let default = self.config.default_value;
            let vals = data
                .into_par_iter()
                .map(|(key, ticks)| {
                    let mut out = vec![default; len];
                    for (slot, tick) in out.iter_mut().zip(ticks) {
                        if let Some(Payload::Raw(v)) = tick {
                            *slot = v;
                        }
                    }
                    (key, out)
                })
                .collect();
            Ok((vals, stamps))
        } else {
            let (data, stamps) = self.rollups(start, end, resolution)?;
            let vals = data
                .into_par_iter()
                .map(|(key, rollups)| {
                    let mut out = vec![0.0; len];
                    for (slot, r) in out.iter_mut().zip(&rollups) {
                        *slot = aggregate(r);
                    }
                    (key, out)
                })
                .collect();
            Ok((vals, stamps))
        }
    }
}

/// Reduces one closed window of raw samples into a rollup per signal. Gaps
/// are skipped; a signal whose window is all gaps still yields an empty
/// rollup.
fn reduce_raw(data: HashMap<String, Vec<Option<Payload>>>) -> HashMap<String, Payload> {
    data.into_iter()
        .map(|(key, ticks)| {
            let mut r = Rollup::default();
            let mut first = true;
            for payload in ticks.into_iter().flatten() {
                if let Payload::Raw(val) = payload {
                    r.count += 1;
                    r.total += val;
                    if first || val > r.max {
                        r.max = val;
                    }
                    if first || val < r.min {
                        r.min = val;
                    }
                    first = false;
                }
            }
            (key, Payload::Rollup(r))
        })
        .collect()
}

/// Reduces one closed window of finer rollups into a coarser rollup per
/// signal: totals and counts add, min of mins, max of maxes.
fn reduce_rollups(data: HashMap<String, Vec<Option<Payload>>>) -> HashMap<String, Payload> {
    data.into_iter()
        .map(|(key, ticks)| {
            let mut r = Rollup::default();
            let mut first = true;
            for payload in ticks.into_iter().flatten() {
                if let Payload::Rollup(v) = payload {
                    r.count += v.count;
                    r.total += v.total;
                    if first || v.max > r.max {
                        r.max = v.max;
                    }
                    if first || v.min < r.min {
                        r.min = v.min;
                    }
                    first = false;
                }
            }
            (key, Payload::Rollup(r))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ArchiveConfig;
    use tempfile::tempdir;

    #[test]
    fn reduce_raw_skips_gaps() {
        let mut data = HashMap::new();
        data.insert(
            "val".to_string(),
            vec![
                Some(Payload::Raw(3.0)),
                None,
                Some(Payload::Raw(1.0)),
                Some(Payload::Raw(4.0)),
            ],
        );
        let out = reduce_raw(data);
        match &out["val"] {
            Payload::Rollup(r) => {
                assert_eq!(r.count, 3);
                assert_eq!(r.total, 8.0);
                assert_eq!(r.min, 1.0);
                assert_eq!(r.max, 4.0);
            }
            other => panic!("expected rollup, got {:?}", other),
        }
    }

    #[test]
    fn reduce_raw_all_gaps_is_empty_rollup() {
        let mut data = HashMap::new();
        data.insert("val".to_string(), vec![None, None]);
        let out = reduce_raw(data);
        assert_eq!(out["val"], Payload::Rollup(Rollup::default()));
    }

    #[test]
    fn reduce_rollups_merges_bounds() {
        let mut data = HashMap::new();
        data.insert(
            "val".to_string(),
            vec![
                Some(Payload::Rollup(Rollup {
                    total: 10.0,
                    count: 4,
                    min: 1.0,
                    max: 5.0,
                })),
                None,
                Some(Payload::Rollup(Rollup {
                    total: 6.0,
                    count: 2,
                    min: 2.0,
                    max: 4.0,
                })),
            ],
        );
        let out = reduce_rollups(data);
        match &out["val"] {
            Payload::Rollup(r) => {
                assert_eq!(r.count, 6);
                assert_eq!(r.total, 16.0);
                assert_eq!(r.min, 1.0);
                assert_eq!(r.max, 5.0);
            }
            other => panic!("expected rollup, got {:?}", other),
        }
    }

    #[test]
    fn create_sorts_archives_by_resolution() {
        let dir = tempdir().unwrap();
        let series = Series::create(
            dir.path().join("s"),
            SeriesConfig {
                archives: vec![
                    ArchiveConfig { resolution: 60, retention: 86400 },
                    ArchiveConfig { resolution: 1, retention: 3600 },
                ],
                default_value: 0.0,
            },
        )
        .unwrap();
        assert_eq!(series.config().archives[0].resolution, 1);
        assert_eq!(series.config().archives[1].resolution, 60);
        assert_eq!(series.base().interval(), 1);
    }
}
