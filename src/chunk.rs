use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{Payload, Timestamp};

/// One slot per resolution step. `None` is an explicit gap; otherwise the map
/// goes from chunk-local tag index to payload.
pub(crate) type Slot = Option<HashMap<u32, Payload>>;

/// A fixed-span, dense run of slots at one resolution.
///
/// Timestamps are normalized so every slot aligns to the resolution and no
/// slot is missing (gaps are materialized), which means slots don't have to
/// carry timestamps: the slot at index `i` holds `start_time + i * resolution`.
/// Signal names are interned into a chunk-local tag table, so slot maps store
/// small integers instead of repeated strings. Tag indices are assigned in
/// insertion order and are only meaningful within this chunk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub(crate) struct Chunk {
    pub(crate) start_time: Timestamp,
    pub(crate) end_time: Timestamp,
    resolution: i64,
    data: Vec<Slot>,
    tags: Vec<String>,
    #[serde(skip)]
    tag_index: HashMap<String, u32>,
    #[serde(skip)]
    pub(crate) dirty: bool,
}

impl Chunk {
    pub(crate) fn new(resolution: i64, start_time: Timestamp) -> Self {
        Chunk {
            start_time,
            end_time: 0,
            resolution,
            data: Vec::new(),
            tags: Vec::new(),
            tag_index: HashMap::new(),
            dirty: true,
        }
    }

    /// Rebuilds the name -> index map after a chunk is decoded from disk.
    /// Only the tag table itself is persisted.
    pub(crate) fn restore_tag_index(&mut self) {
        self.tag_index = self
            .tags
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i as u32))
            .collect();
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.end_time == 0
    }

    fn latest_raw(&self) -> Option<&HashMap<u32, Payload>> {
        self.data.last().and_then(|slot| slot.as_ref())
    }

    /// The mapping stored at the highest slot, re-keyed by signal name, or
    /// `None` if the chunk is empty or its tail slot is a gap.
    pub(crate) fn latest(&self) -> Option<HashMap<String, Payload>> {
        let raw = self.latest_raw()?;
        Some(
            raw.iter()
                .map(|(&idx, v)| (self.tags[idx as usize].clone(), v.clone()))
                .collect(),
        )
    }

    /// Appends `values` at `ts`. The caller guarantees `ts` is a multiple of
    /// the resolution and lies inside this chunk's span.
    ///
    /// Samples older than the current end are dropped (out-of-order writes
    /// into closed slots are not supported); a sample at exactly the current
    /// end merges into the tail slot, overwriting only the tags it names.
    pub(crate) fn append(&mut self, values: &HashMap<String, Payload>, ts: Timestamp) {
        if !self.is_empty() {
            if ts < self.end_time {
                return;
            }
            if ts == self.end_time {
                let interned = self.intern(values);
                if let Some(slot) = self.data.last_mut() {
                    match slot {
                        Some(map) => map.extend(interned),
                        None => *slot = Some(interned),
                    }
                }
                self.dirty = true;
                return;
            }
            if ts > self.end_time + self.resolution {
                self.fill_to(ts);
            }
        } else if ts > self.start_time {
            // The first sample lands mid-chunk: everything before it is a gap.
            let mut t = self.start_time;
            while t < ts {
                self.data.push(None);
                t += self.resolution;
            }
        }

        let interned = self.intern(values);
        self.data.push(Some(interned));
        self.end_time = ts;
        self.dirty = true;
    }

    /// Fills the slots between the current end and `target` (exclusive).
    ///
    /// For brief dropouts (fewer than 3 missing slots) the tail slot is
    /// copied forward; longer gaps become explicit nulls.
    pub(crate) fn fill_to(&mut self, target: Timestamp) {
        let missing = (target - self.end_time) / self.resolution - 1;
        let fill = if missing < 3 {
            self.latest_raw().cloned()
        } else {
            None
        };

        let mut ts = self.end_time + self.resolution;
        while ts < target {
            self.data.push(fill.clone());
            self.end_time = ts;
            self.dirty = true;
            ts += self.resolution;
        }
    }

    /// Extracts `[start, end)` as per-signal dense arrays aligned to `start`,
    /// plus the matching timestamp vector. Positions outside the populated
    /// range and explicit gaps come back as `None`.
    pub(crate) fn get_data(
        &self,
        start: Timestamp,
        end: Timestamp,
    ) -> (HashMap<String, Vec<Option<Payload>>>, Vec<Timestamp>) {
        let len = ((end - start) / self.resolution).max(0) as usize;

        let mut by_tag: HashMap<u32, Vec<Option<Payload>>> = HashMap::new();
        let mut stamps = Vec::with_capacity(len);

        let mut ts = start;
        for i in 0..len {
            let idx = (ts - self.start_time) / self.resolution;
            if idx >= 0 && (idx as usize) < self.data.len() {
                if let Some(slot) = &self.data[idx as usize] {
                    for (&tag, val) in slot {
                        let series = by_tag.entry(tag).or_insert_with(|| vec![None; len]);
                        series[i] = Some(val.clone());
                    }
                }
            }
            stamps.push(ts);
            ts += self.resolution;
        }

        let resolved = by_tag
            .into_iter()
            .map(|(tag, series)| (self.tags[tag as usize].clone(), series))
            .collect();
        (resolved, stamps)
    }

    fn intern(&mut self, values: &HashMap<String, Payload>) -> HashMap<u32, Payload> {
        values
            .iter()
            .map(|(name, val)| (self.intern_tag(name), val.clone()))
            .collect()
    }

    fn intern_tag(&mut self, name: &str) -> u32 {
        if let Some(&idx) = self.tag_index.get(name) {
            return idx;
        }
        let idx = self.tags.len() as u32;
        self.tags.push(name.to_string());
        self.tag_index.insert(name.to_string(), idx);
        idx
    }
}
