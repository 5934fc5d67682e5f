// Owned telemetry state: per-unit buffers plus the catalog they are checked against
use crate::domain::series_buffer::SeriesBuffer;
use crate::domain::unit::{Catalog, CatalogDiff};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct TelemetryStore {
    buffers: BTreeMap<i64, SeriesBuffer>,
    catalog: Catalog,
}

impl TelemetryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn buffer(&self, unit_id: i64) -> Option<&SeriesBuffer> {
        self.buffers.get(&unit_id)
    }

    pub fn buffers(&self) -> impl Iterator<Item = &SeriesBuffer> {
        self.buffers.values()
    }

    pub(crate) fn buffer_mut(&mut self, unit_id: i64) -> Option<&mut SeriesBuffer> {
        self.buffers.get_mut(&unit_id)
    }

    /// Split borrow so a buffer can be mutated while the catalog is read.
    pub(crate) fn entry(&mut self, unit_id: i64) -> (&mut SeriesBuffer, &Catalog) {
        let buffer = self
            .buffers
            .entry(unit_id)
            .or_insert_with(|| SeriesBuffer::new(unit_id));
        (buffer, &self.catalog)
    }

    pub(crate) fn split_mut(&mut self) -> (&mut BTreeMap<i64, SeriesBuffer>, &Catalog) {
        (&mut self.buffers, &self.catalog)
    }

    pub(crate) fn reset_all(&mut self) {
        for buffer in self.buffers.values_mut() {
            buffer.reset();
        }
    }

    /// Install a fresh catalog: placeholders for new units, removal of vanished ones.
    pub(crate) fn apply_catalog(&mut self, next: Catalog) -> CatalogDiff {
        let diff = self.catalog.replace(next);
        for unit_id in self.catalog.unit_ids().collect::<Vec<_>>() {
            self.buffers
                .entry(unit_id)
                .or_insert_with(|| SeriesBuffer::new(unit_id));
        }
        self.retain_known();
        diff
    }

    /// Drop buffers for units the catalog no longer lists.
    pub(crate) fn retain_known(&mut self) -> usize {
        if !self.catalog.is_loaded() {
            return 0;
        }
        let before = self.buffers.len();
        let catalog = &self.catalog;
        self.buffers.retain(|unit_id, _| catalog.contains_unit(*unit_id));
        before - self.buffers.len()
    }
}

pub type SharedStore = Arc<Mutex<TelemetryStore>>;

pub fn shared_store() -> SharedStore {
    Arc::new(Mutex::new(TelemetryStore::new()))
}

/// Lock the store, recovering the data if a previous holder panicked.
pub fn lock_store(store: &SharedStore) -> MutexGuard<'_, TelemetryStore> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
