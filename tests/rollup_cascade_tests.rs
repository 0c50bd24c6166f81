use strata::{ArchiveConfig, Rollup, Series, SeriesConfig, DAY, HOUR, MINUTE, SECOND};
use tempfile::tempdir;

fn minute_series(dir: &std::path::Path) -> Series {
    Series::create(
        dir.join("s"),
        SeriesConfig {
            archives: vec![
                ArchiveConfig { resolution: SECOND, retention: HOUR },
                ArchiveConfig { resolution: MINUTE, retention: DAY },
            ],
            default_value: 0.0,
        },
    )
    .unwrap()
}

#[test]
fn rollup_counts_totals_and_bounds() {
    let dir = tempdir().unwrap();
    let series = minute_series(dir.path());

    // Five samples inside the minute window [1560631980, 1560632040), then
    // one more past the boundary to close it.
    let values = [3.0, 1.0, 4.0, 1.0, 5.0];
    for (i, v) in values.iter().enumerate() {
        series.add_value("val", *v, 1_560_631_990 + i as i64).unwrap();
    }
    series.add_value("val", 9.0, 1_560_632_041).unwrap();

    let (d, ts) = series
        .rollups(1_560_632_000, 1_560_632_041, MINUTE)
        .unwrap();
    assert_eq!(ts, vec![1_560_632_040]);
    let r = d["val"][0];
    assert_eq!(r.count, 5);
    assert_eq!(r.total, 14.0);
    assert_eq!(r.min, 1.0);
    assert_eq!(r.max, 5.0);

    let (d, _) = series
        .averages(1_560_632_000, 1_560_632_041, MINUTE)
        .unwrap();
    assert!((d["val"][0] - 2.8).abs() < 1e-12);
    let (d, _) = series
        .maximums(1_560_632_000, 1_560_632_041, MINUTE)
        .unwrap();
    assert_eq!(d["val"][0], 5.0);
    let (d, _) = series
        .minimums(1_560_632_000, 1_560_632_041, MINUTE)
        .unwrap();
    assert_eq!(d["val"][0], 1.0);
}

#[test]
fn two_level_cascade_is_additive() {
    let dir = tempdir().unwrap();
    let series = Series::create(
        dir.path().join("s"),
        SeriesConfig {
            archives: vec![
                ArchiveConfig { resolution: 1, retention: HOUR },
                ArchiveConfig { resolution: 10, retention: HOUR },
                ArchiveConfig { resolution: 100, retention: DAY },
            ],
            default_value: 0.0,
        },
    )
    .unwrap();

    let start = 1_000_000i64; // aligned to all three resolutions
    for t in start..=start + 250 {
        series.add_value("val", 1.0, t).unwrap();
    }

    // Ten-second rollups: each closed window holds ten 1.0 samples.
    let (d, ts) = series.rollups(start + 100, start + 200, 10).unwrap();
    assert_eq!(ts.len(), 10);
    assert_eq!(ts[0], start + 100);
    let mut summed = 0i64;
    for r in &d["val"] {
        assert_eq!(r.count, 10);
        assert_eq!(r.total, 10.0);
        summed += r.count;
    }

    // The hundred-second rollup closing at start+200 reduces exactly those
    // ten finer rollups: counts and totals add, bounds are preserved.
    let (d, ts) = series.rollups(start + 100, start + 201, 100).unwrap();
    assert_eq!(ts, vec![start + 100, start + 200]);
    let r = d["val"][1];
    assert_eq!(r.count, summed);
    assert_eq!(r.total, 100.0);
    assert_eq!(r.min, 1.0);
    assert_eq!(r.max, 1.0);

    // The first hundred-second window was still partially below the very
    // first ten-second rollup, so its count is one window short.
    let r = d["val"][0];
    assert_eq!(r.count, 90);
    assert_eq!(r.total, 90.0);
}

#[test]
fn empty_windows_read_as_zero() {
    let dir = tempdir().unwrap();
    let series = minute_series(dir.path());

    let t = 1_560_631_980i64; // minute-aligned
    for i in 0..120 {
        series.add_value("val", i as f64, t + i).unwrap();
    }
    // Jump far enough that the skipped minutes become explicit nulls.
    series.add_value("val", 500.0, t + 360).unwrap();

    let (d, ts) = series.averages(t, t + 420, MINUTE).unwrap();
    assert_eq!(ts.len(), 7);
    assert_eq!(ts[0], t);
    // Only the first minute was ever rolled up; its window held 0..=59.
    assert_eq!(d["val"][1], 29.5);
    // Slots whose windows carry no data report 0.0, not the default.
    assert_eq!(d["val"][2], 0.0);
    assert_eq!(d["val"][3], 0.0);
    assert_eq!(d["val"][4], 0.0);
    assert_eq!(d["val"][5], 0.0);
    assert_eq!(d["val"][6], 0.0);

    let (d, _) = series.rollups(t, t + 420, MINUTE).unwrap();
    assert_eq!(d["val"][3], Rollup::default());
}

#[test]
fn brief_rollup_gaps_fill_forward() {
    let dir = tempdir().unwrap();
    let series = minute_series(dir.path());

    let t = 1_560_631_980i64; // minute-aligned
    for i in 0..120 {
        series.add_value("val", 1.0, t + i).unwrap();
    }
    // Two missing minute slots: the last rollup is carried forward into them.
    series.add_value("val", 1.0, t + 240).unwrap();

    let (d, ts) = series.rollups(t + 60, t + 241, MINUTE).unwrap();
    assert_eq!(ts, vec![t + 60, t + 120, t + 180, t + 240]);
    assert_eq!(d["val"][0].count, 60);
    assert_eq!(d["val"][1].count, 60);
    assert_eq!(d["val"][2].count, 60);
    // The window closing at t+240 held no samples.
    assert_eq!(d["val"][3].count, 0);
}

#[test]
fn first_append_rolls_up_only_empty_windows() {
    let dir = tempdir().unwrap();
    let series = minute_series(dir.path());

    series.add_value("val", 42.0, 1_560_632_038).unwrap();

    // The cascade ran (prev_end was 0) but the closed window below the sample
    // holds nothing, so no signal appears at the coarse resolution.
    let (d, ts) = series
        .rollups(1_560_631_920, 1_560_632_041, MINUTE)
        .unwrap();
    assert_eq!(ts.len(), 3);
    assert!(d.is_empty());

    // The base sample itself is intact.
    let (latest, ts) = series.latest();
    assert_eq!(latest["val"], 42.0);
    assert_eq!(ts, 1_560_632_038);
}

#[test]
fn cascade_stops_at_unchanged_boundaries() {
    let dir = tempdir().unwrap();
    let series = Series::create(
        dir.path().join("s"),
        SeriesConfig {
            archives: vec![
                ArchiveConfig { resolution: 1, retention: HOUR },
                ArchiveConfig { resolution: 10, retention: HOUR },
                ArchiveConfig { resolution: 100, retention: DAY },
            ],
            default_value: 0.0,
        },
    )
    .unwrap();

    let start = 1_000_000i64;
    for t in start..start + 15 {
        series.add_value("val", 2.0, t).unwrap();
    }

    // One ten-second boundary was crossed (at start+10); no hundred-second
    // boundary was, so that archive saw only the initial empty window.
    let (d, ts) = series.rollups(start, start + 20, 10).unwrap();
    assert_eq!(ts, vec![start, start + 10]);
    assert_eq!(d["val"][0].count, 0);
    assert_eq!(d["val"][1].count, 10);

    let (d, _) = series.rollups(start, start + 101, 100).unwrap();
    assert!(d.is_empty());
}
