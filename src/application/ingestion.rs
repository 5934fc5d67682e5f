// Ingestion pipeline - normalizes push batches and routes them into per-unit buffers
use crate::application::projection::ProjectionEmitter;
use crate::application::store::{lock_store, SharedStore, TelemetryStore};
use crate::domain::normalize::normalize;
use crate::domain::series_buffer::{Admission, RetentionPolicy, StatusClassifier};
use crate::domain::telemetry::RawRecord;
use crate::domain::unit::{Catalog, CatalogDiff};
use std::collections::BTreeSet;

/// Counters describing what happened to one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub accepted: usize,
    pub duplicates: usize,
    pub malformed: usize,
    pub unknown_unit: usize,
    pub pruned: usize,
    pub reordered_units: usize,
}

#[derive(Clone)]
pub struct IngestionPipeline {
    store: SharedStore,
    emitter: ProjectionEmitter,
    retention: RetentionPolicy,
    classifier: StatusClassifier,
}

impl IngestionPipeline {
    pub fn new(
        store: SharedStore,
        emitter: ProjectionEmitter,
        retention: RetentionPolicy,
        classifier: StatusClassifier,
    ) -> Self {
        Self {
            store,
            emitter,
            retention,
            classifier,
        }
    }

    pub fn emitter(&self) -> &ProjectionEmitter {
        &self.emitter
    }

    pub fn classifier(&self) -> &StatusClassifier {
        &self.classifier
    }

    pub fn ingest(&self, batch: Vec<RawRecord>, replace_history: bool) -> IngestReport {
        self.ingest_at(batch, replace_history, chrono::Utc::now().timestamp_millis())
    }

    /// Ingest one batch; the whole batch is applied under a single lock.
    pub fn ingest_at(&self, batch: Vec<RawRecord>, replace_history: bool, now_ms: i64) -> IngestReport {
        let report = {
            let mut store = lock_store(&self.store);
            ingest_into(&mut store, batch, replace_history, now_ms, &self.retention, &self.classifier)
        };

        tracing::debug!(
            accepted = report.accepted,
            duplicates = report.duplicates,
            malformed = report.malformed,
            unknown_unit = report.unknown_unit,
            pruned = report.pruned,
            reordered = report.reordered_units,
            replace_history,
            "ingested batch"
        );

        self.emitter.mark_dirty();
        report
    }

    /// Clear every buffer ahead of a new session.
    ///
    /// The projection is not marked dirty, so the last emitted view
    /// stays up until the new session's history arrives.
    pub fn reset(&self) {
        lock_store(&self.store).reset_all();
    }

    pub fn apply_catalog(&self, catalog: Catalog) -> CatalogDiff {
        lock_store(&self.store).apply_catalog(catalog)
    }

    /// Optimistically patch a unit's status and preset. Returns false for unknown units.
    pub fn patch_unit(&self, unit_id: i64, status: &str, preset_id: Option<i64>) -> bool {
        let patched = {
            let mut store = lock_store(&self.store);
            let preset_name = preset_id
                .and_then(|id| store.catalog().preset_name(id))
                .map(str::to_string);
            match store.buffer_mut(unit_id) {
                Some(buffer) => {
                    buffer.patch(status, preset_id, preset_name);
                    true
                }
                None => false,
            }
        };
        if patched {
            self.emitter.mark_dirty();
        }
        patched
    }
}

pub fn ingest_into(
    store: &mut TelemetryStore,
    batch: Vec<RawRecord>,
    replace_history: bool,
    now_ms: i64,
    retention: &RetentionPolicy,
    classifier: &StatusClassifier,
) -> IngestReport {
    let mut report = IngestReport::default();
    // Units that received at least one valid record in this batch. A history
    // replace clears a unit on its first valid record, so a batch of garbage
    // never empties a unit that had data.
    let mut touched: BTreeSet<i64> = BTreeSet::new();

    for raw in batch {
        let Some(record) = normalize(raw) else {
            report.malformed += 1;
            continue;
        };
        if !store.catalog().admits(record.unit_id) {
            report.unknown_unit += 1;
            continue;
        }

        let unit_id = record.unit_id;
        let (buffer, catalog) = store.entry(unit_id);
        if touched.insert(unit_id) && replace_history {
            buffer.clear_records();
        }
        match buffer.admit(record, catalog, classifier) {
            Admission::Duplicate => report.duplicates += 1,
            _ => report.accepted += 1,
        }
    }

    let (buffers, catalog) = store.split_mut();
    for buffer in buffers.values_mut().filter(|b| b.needs_fixup()) {
        buffer.finalize(catalog, classifier);
        report.reordered_units += 1;
    }

    for unit_id in touched {
        if let Some(buffer) = store.buffer_mut(unit_id) {
            report.pruned += buffer.enforce_retention(retention, now_ms);
        }
    }

    report
}
