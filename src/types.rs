use serde::{Deserialize, Serialize};

/// Timestamp type (seconds since epoch).
pub type Timestamp = i64;

/// Value type.
pub type Value = f64;

/// Payload stored in one chunk slot for one signal.
///
/// Base archives hold raw observations; coarser archives hold rollup records.
/// The variant is tagged in the serialized form, so a reader never has to
/// guess which archive a chunk file came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Raw(Value),
    Rollup(Rollup),
}

impl Payload {
    pub(crate) fn as_raw(&self) -> Option<Value> {
        match self {
            Payload::Raw(v) => Some(*v),
            Payload::Rollup(_) => None,
        }
    }
}

/// A reduction of the samples falling into one coarse interval.
///
/// `count == 0` marks an empty rollup: `min` and `max` carry no information
/// and aggregate queries report zero for the slot instead.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Rollup {
    pub total: f64,
    pub count: i64,
    pub min: f64,
    pub max: f64,
}

/// Resolution and retention for one archive, in seconds. Use the crate-level
/// constants (`SECOND`, `TEN_SECOND`, ...) to keep resolutions evenly
/// divisible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ArchiveConfig {
    pub resolution: i64,
    pub retention: i64,
}

/// One or more `ArchiveConfig`s is required. `default_value` is the value to
/// report for missing data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SeriesConfig {
    pub archives: Vec<ArchiveConfig>,
    pub default_value: f64,
}
