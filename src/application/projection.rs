// Projection emitter - throttled, windowed view over all unit buffers
use crate::application::store::{lock_store, SharedStore, TelemetryStore};
use crate::domain::series_buffer::UnitSnapshot;
use crate::domain::telemetry::CanonicalRecord;
use crate::domain::unit::Preset;
use crate::domain::window::TimeRangeKey;
use futures::Stream;
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnitView {
    pub unit_id: i64,
    pub name: Option<String>,
    #[serde(flatten)]
    pub snapshot: UnitSnapshot,
    /// Presets that can be started on this unit.
    pub presets: Vec<Preset>,
    pub records: Vec<CanonicalRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProjectionSnapshot {
    pub generated_at_ms: i64,
    pub window: TimeRangeKey,
    pub units: Vec<UnitView>,
}

impl ProjectionSnapshot {
    pub fn unit(&self, unit_id: i64) -> Option<&UnitView> {
        self.units.iter().find(|u| u.unit_id == unit_id)
    }
}

/// Build the windowed view, hard-syncing the buffer map with the catalog first.
pub fn project(store: &mut TelemetryStore, window: TimeRangeKey, now_ms: i64) -> ProjectionSnapshot {
    store.retain_known();

    let start_ms = window.window_start_ms(now_ms);
    let catalog = store.catalog();
    let unit_ids: Vec<i64> = if catalog.is_loaded() {
        catalog.unit_ids().collect()
    } else {
        store.buffers().map(|b| b.unit_id()).collect()
    };

    let units = unit_ids
        .into_iter()
        .map(|unit_id| {
            let buffer = store.buffer(unit_id);
            UnitView {
                unit_id,
                name: catalog.unit_name(unit_id).map(str::to_string),
                snapshot: buffer.map(|b| b.snapshot().clone()).unwrap_or_default(),
                presets: catalog.presets_for_unit(unit_id).cloned().collect(),
                records: buffer.map(|b| b.window(start_ms)).unwrap_or_default(),
            }
        })
        .collect();

    ProjectionSnapshot {
        generated_at_ms: now_ms,
        window,
        units,
    }
}

#[derive(Debug, Default)]
struct Throttle {
    armed: bool,
    epoch: u64,
}

struct EmitterInner {
    store: SharedStore,
    window: Mutex<TimeRangeKey>,
    throttle: Duration,
    timer: Mutex<Throttle>,
    tx: watch::Sender<Arc<ProjectionSnapshot>>,
}

#[derive(Clone)]
pub struct ProjectionEmitter {
    inner: Arc<EmitterInner>,
}

impl ProjectionEmitter {
    pub fn new(store: SharedStore, window: TimeRangeKey, throttle: Duration) -> Self {
        let (tx, _) = watch::channel(Arc::new(ProjectionSnapshot {
            window,
            ..Default::default()
        }));
        Self {
            inner: Arc::new(EmitterInner {
                store,
                window: Mutex::new(window),
                throttle,
                timer: Mutex::new(Throttle::default()),
                tx,
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ProjectionSnapshot>> {
        self.inner.tx.subscribe()
    }

    /// Stream of snapshots, starting with the current one.
    pub fn snapshots(&self) -> impl Stream<Item = Arc<ProjectionSnapshot>> + use<> {
        WatchStream::new(self.subscribe())
    }

    pub fn current(&self) -> Arc<ProjectionSnapshot> {
        self.inner.tx.borrow().clone()
    }

    pub fn window(&self) -> TimeRangeKey {
        *self.inner.window.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_window(&self, window: TimeRangeKey) {
        *self.inner.window.lock().unwrap_or_else(|e| e.into_inner()) = window;
    }

    /// Schedule a recomputation; marks within one throttle period coalesce.
    pub fn mark_dirty(&self) {
        let epoch = {
            let mut timer = self.inner.timer.lock().unwrap_or_else(|e| e.into_inner());
            if timer.armed {
                return;
            }
            timer.armed = true;
            timer.epoch += 1;
            timer.epoch
        };

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            self.flush();
            return;
        };

        let emitter = self.clone();
        let delay = self.inner.throttle;
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            emitter.fire(epoch);
        });
    }

    fn fire(&self, epoch: u64) {
        {
            let mut timer = self.inner.timer.lock().unwrap_or_else(|e| e.into_inner());
            if !timer.armed || timer.epoch != epoch {
                return;
            }
            timer.armed = false;
        }
        self.recompute();
    }

    /// Recompute now, cancelling any pending throttled emission.
    pub fn flush(&self) {
        self.inner.timer.lock().unwrap_or_else(|e| e.into_inner()).armed = false;
        self.recompute();
    }

    fn recompute(&self) {
        let window = self.window();
        let now_ms = chrono::Utc::now().timestamp_millis();
        let snapshot = {
            let mut store = lock_store(&self.inner.store);
            project(&mut store, window, now_ms)
        };
        tracing::trace!(units = snapshot.units.len(), %window, "projection recomputed");
        self.inner.tx.send_replace(Arc::new(snapshot));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::store::shared_store;
    use crate::domain::series_buffer::StatusClassifier;
    use crate::domain::unit::{Catalog, Unit};
    use std::collections::BTreeMap;

    fn record(unit_id: i64, id: i64, ts: i64) -> CanonicalRecord {
        CanonicalRecord {
            unit_id,
            record_id: id,
            timestamp_ms: ts,
            status: "running".to_string(),
            metrics: BTreeMap::new(),
            preset_id: None,
        }
    }

    fn seed(store: &mut TelemetryStore, unit_id: i64, timestamps: &[i64]) {
        let classifier = StatusClassifier::default();
        for (i, ts) in timestamps.iter().enumerate() {
            let (buffer, catalog) = store.entry(unit_id);
            buffer.admit(record(unit_id, i as i64, *ts), catalog, &classifier);
        }
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let mut store = TelemetryStore::new();
        let now = 1_000_000;
        let start = now - 300_000;
        seed(&mut store, 1, &[start - 1, start, start + 1]);

        let snapshot = project(&mut store, TimeRangeKey::FiveMinutes, now);
        let ts: Vec<i64> = snapshot.units[0].records.iter().map(|r| r.timestamp_ms).collect();
        assert_eq!(ts, vec![start, start + 1]);
    }

    #[test]
    fn test_stale_unit_keeps_latest_record() {
        let mut store = TelemetryStore::new();
        seed(&mut store, 1, &[10, 20]);

        let snapshot = project(&mut store, TimeRangeKey::OneMinute, 10_000_000);
        assert_eq!(snapshot.units[0].records.len(), 1);
        assert_eq!(snapshot.units[0].records[0].timestamp_ms, 20);
    }

    #[test]
    fn test_catalog_hard_sync() {
        let mut store = TelemetryStore::new();
        seed(&mut store, 1, &[10]);
        seed(&mut store, 2, &[10]);
        store.apply_catalog(Catalog::new(
            vec![Unit::new(2, "South"), Unit::new(3, "West")],
            vec![Preset {
                id: 5,
                name: "Standard".to_string(),
                unit_ids: vec![2],
            }],
        ));

        let snapshot = project(&mut store, TimeRangeKey::All, 100);
        let ids: Vec<i64> = snapshot.units.iter().map(|u| u.unit_id).collect();
        assert_eq!(ids, vec![2, 3]);
        assert_eq!(snapshot.unit(2).unwrap().name.as_deref(), Some("South"));
        assert!(snapshot.unit(3).unwrap().records.is_empty());
        assert!(store.buffer(1).is_none());

        let linked: Vec<i64> = snapshot.unit(2).unwrap().presets.iter().map(|p| p.id).collect();
        assert_eq!(linked, vec![5]);
        assert!(snapshot.unit(3).unwrap().presets.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_marks_coalesce_into_one_emission() {
        let store = shared_store();
        seed(&mut lock_store(&store), 1, &[10]);
        let emitter = ProjectionEmitter::new(store, TimeRangeKey::All, Duration::from_millis(400));
        let mut rx = emitter.subscribe();

        for _ in 0..5 {
            emitter.mark_dirty();
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(!rx.has_changed().unwrap());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_bypasses_throttle() {
        let store = shared_store();
        seed(&mut lock_store(&store), 4, &[10]);
        let emitter = ProjectionEmitter::new(store, TimeRangeKey::All, Duration::from_millis(400));
        let mut rx = emitter.subscribe();

        emitter.mark_dirty();
        emitter.flush();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().units.len(), 1);

        // The timer armed before the flush must not emit again.
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(!rx.has_changed().unwrap());
    }
}
