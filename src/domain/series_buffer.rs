// Per-unit record buffer with ordering correction and retention
use super::telemetry::{CanonicalRecord, MetricValue};
use super::unit::Catalog;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Status vocabulary used for preset smoothing and optimistic patches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusClassifier {
    pub active: BTreeSet<String>,
    pub inactive: BTreeSet<String>,
    pub started: String,
    pub stopped: String,
}

impl Default for StatusClassifier {
    fn default() -> Self {
        let set = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            active: set(&["running", "drying", "heating", "cooling", "starting"]),
            inactive: set(&["idle", "stopped", "finished", "offline", "error"]),
            started: "starting".to_string(),
            stopped: "idle".to_string(),
        }
    }
}

impl StatusClassifier {
    pub fn is_active(&self, status: &str) -> bool {
        self.active.contains(&status.to_ascii_lowercase())
    }

    pub fn is_inactive(&self, status: &str) -> bool {
        self.inactive.contains(&status.to_ascii_lowercase())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    pub max_records: usize,
    pub max_age_ms: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_records: 5000,
            max_age_ms: 24 * 60 * 60 * 1000,
        }
    }
}

/// Most recent derived view of a unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UnitSnapshot {
    pub status: Option<String>,
    pub metrics: BTreeMap<String, MetricValue>,
    pub last_update_ms: Option<i64>,
    pub preset_id: Option<i64>,
    pub preset_name: Option<String>,
}

/// Result of offering one record to a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Duplicate,
    InOrder,
    Replaced,
    OutOfOrder,
}

#[derive(Debug, Clone)]
pub struct SeriesBuffer {
    unit_id: i64,
    records: Vec<CanonicalRecord>,
    snapshot: UnitSnapshot,
    unsorted: bool,
    /// Newest timestamp admitted since the last clear; the ordering reference.
    latest_ms: Option<i64>,
}

impl SeriesBuffer {
    pub fn new(unit_id: i64) -> Self {
        Self {
            unit_id,
            records: Vec::new(),
            snapshot: UnitSnapshot::default(),
            unsorted: false,
            latest_ms: None,
        }
    }

    pub fn unit_id(&self) -> i64 {
        self.unit_id
    }

    pub fn records(&self) -> &[CanonicalRecord] {
        &self.records
    }

    pub fn snapshot(&self) -> &UnitSnapshot {
        &self.snapshot
    }

    pub fn needs_fixup(&self) -> bool {
        self.unsorted
    }

    /// Drop stored records but keep the snapshot, so preset smoothing survives a history swap.
    pub fn clear_records(&mut self) {
        self.records.clear();
        self.unsorted = false;
        self.latest_ms = None;
    }

    /// Forget everything about the unit.
    pub fn reset(&mut self) {
        self.clear_records();
        self.snapshot = UnitSnapshot::default();
    }

    fn is_duplicate(&self, record: &CanonicalRecord) -> bool {
        self.records.last().is_some_and(|last| {
            last.record_id == record.record_id
                || (last.timestamp_ms == record.timestamp_ms && last.status == record.status)
        })
    }

    /// Append a record, flagging the buffer for a post-batch sort when it arrives late.
    pub fn admit(
        &mut self,
        record: CanonicalRecord,
        catalog: &Catalog,
        classifier: &StatusClassifier,
    ) -> Admission {
        if self.is_duplicate(&record) {
            return Admission::Duplicate;
        }

        // Compare against the newest record seen, not the last one appended:
        // after a late arrival the tail of the vector is no longer the newest.
        let admission = match self.latest_ms {
            Some(ts) if record.timestamp_ms < ts => Admission::OutOfOrder,
            Some(ts) if record.timestamp_ms == ts => Admission::Replaced,
            _ => Admission::InOrder,
        };

        match admission {
            Admission::OutOfOrder => {
                self.unsorted = true;
                self.records.push(record);
            }
            Admission::Replaced => {
                self.promote(&record, catalog, classifier);
                match self.records.last_mut() {
                    Some(last) if last.timestamp_ms == record.timestamp_ms => *last = record,
                    // The newest record sits behind late arrivals; finalize collapses the pair.
                    _ => {
                        self.unsorted = true;
                        self.records.push(record);
                    }
                }
            }
            _ => {
                self.latest_ms = Some(record.timestamp_ms);
                self.promote(&record, catalog, classifier);
                self.records.push(record);
            }
        }
        admission
    }

    fn promote(&mut self, record: &CanonicalRecord, catalog: &Catalog, classifier: &StatusClassifier) {
        let snapshot = &mut self.snapshot;
        snapshot.status = Some(record.status.clone());
        snapshot.metrics = record.metrics.clone();
        snapshot.last_update_ms = Some(record.timestamp_ms);

        match record.preset_id {
            Some(preset_id) => {
                let known = catalog.preset_name(preset_id).map(str::to_string);
                if known.is_some() || snapshot.preset_id != Some(preset_id) {
                    snapshot.preset_name = known;
                }
                snapshot.preset_id = Some(preset_id);
            }
            None if classifier.is_inactive(&record.status) => {
                snapshot.preset_id = None;
                snapshot.preset_name = None;
            }
            // A transient null while running is noise; keep what we had.
            None => {}
        }
    }

    /// Optimistically overwrite status and preset ahead of server confirmation.
    pub fn patch(&mut self, status: &str, preset_id: Option<i64>, preset_name: Option<String>) {
        self.snapshot.status = Some(status.to_string());
        self.snapshot.preset_id = preset_id;
        self.snapshot.preset_name = preset_name;
    }

    /// Prune records older than the retention age once the buffer outgrows its cap.
    ///
    /// The newest record always survives. Run once per batch, after `finalize`.
    pub fn enforce_retention(&mut self, policy: &RetentionPolicy, now_ms: i64) -> usize {
        if self.records.len() <= policy.max_records {
            return 0;
        }

        let cutoff = now_ms - policy.max_age_ms;
        if self.records.iter().all(|r| r.timestamp_ms >= cutoff) {
            return 0;
        }
        let newest = self
            .records
            .iter()
            .max_by_key(|r| r.timestamp_ms)
            .cloned();
        let before = self.records.len();
        self.records.retain(|r| r.timestamp_ms >= cutoff);

        if self.records.is_empty() {
            self.records.extend(newest);
        }
        before - self.records.len()
    }

    /// Sort, collapse equal timestamps (last arrival wins) and rebuild the snapshot.
    pub fn finalize(&mut self, catalog: &Catalog, classifier: &StatusClassifier) {
        if !self.unsorted {
            return;
        }
        self.unsorted = false;

        // Stable sort keeps arrival order within equal timestamps.
        self.records.sort_by_key(|r| r.timestamp_ms);

        let mut collapsed: Vec<CanonicalRecord> = Vec::with_capacity(self.records.len());
        for record in self.records.drain(..) {
            match collapsed.last_mut() {
                Some(last) if last.timestamp_ms == record.timestamp_ms => *last = record,
                _ => collapsed.push(record),
            }
        }
        self.records = collapsed;

        if let Some(last) = self.records.last().cloned() {
            self.promote(&last, catalog, classifier);
        }
    }

    /// Records at or after `start_ms`; falls back to the newest record when the window excludes all.
    pub fn window(&self, start_ms: Option<i64>) -> Vec<CanonicalRecord> {
        let Some(start) = start_ms else {
            return self.records.clone();
        };

        let first_inside = self.records.partition_point(|r| r.timestamp_ms < start);
        let inside = &self.records[first_inside..];
        if inside.is_empty() {
            self.records.last().cloned().into_iter().collect()
        } else {
            inside.to_vec()
        }
    }
}
