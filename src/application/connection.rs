// Connection manager - one live push session at a time, kept alive with backoff
use crate::application::catalog_sync::CatalogSync;
use crate::application::ingestion::IngestionPipeline;
use crate::application::transport::{PushConnection, PushTransport};
use crate::domain::session::{ConnectionState, SessionConfig};
use crate::domain::window::TimeRangeKey;
use crate::infrastructure::feed_url::FeedEndpoints;
use crate::infrastructure::wire::decode_frame;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_ms: 1_000,
            max_ms: 15_000,
        }
    }
}

impl BackoffPolicy {
    /// `min(base * 2^attempts, max)`
    pub fn delay(&self, attempts: u32) -> Duration {
        let factor = 1u64.checked_shl(attempts).unwrap_or(u64::MAX);
        Duration::from_millis(self.base_ms.saturating_mul(factor).min(self.max_ms))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    Connect,
    Opened,
    ClosedByPeer,
    TransportFailed,
    RetryScheduled,
    RetryDue,
    Disconnect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    OpenTransport,
    ScheduleRetry(Duration),
    CancelRetry,
    CloseTransport,
}

/// Pure connection state machine; side effects are returned, never performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    pub state: ConnectionState,
    pub attempts: u32,
    pub desired: bool,
    pub backoff: BackoffPolicy,
}

impl Lifecycle {
    pub fn new(backoff: BackoffPolicy) -> Self {
        Self {
            state: ConnectionState::Closed,
            attempts: 0,
            desired: false,
            backoff,
        }
    }

    pub fn step(&self, event: LifecycleEvent) -> (Lifecycle, Vec<Effect>) {
        let mut next = *self;
        let effects = match event {
            LifecycleEvent::Connect => {
                next.desired = true;
                next.attempts = 0;
                next.state = ConnectionState::Connecting;
                vec![Effect::OpenTransport]
            }
            LifecycleEvent::Opened if self.desired && self.state == ConnectionState::Connecting => {
                next.state = ConnectionState::Open;
                next.attempts = 0;
                vec![]
            }
            LifecycleEvent::Opened => vec![Effect::CloseTransport],
            LifecycleEvent::ClosedByPeer | LifecycleEvent::TransportFailed => {
                next.state = if event == LifecycleEvent::ClosedByPeer {
                    ConnectionState::Closed
                } else {
                    ConnectionState::Error
                };
                if self.desired {
                    vec![Effect::ScheduleRetry(self.backoff.delay(self.attempts))]
                } else {
                    vec![]
                }
            }
            LifecycleEvent::RetryScheduled
                if self.desired
                    && matches!(self.state, ConnectionState::Closed | ConnectionState::Error) =>
            {
                next.state = ConnectionState::Reconnecting;
                next.attempts = self.attempts.saturating_add(1);
                vec![]
            }
            LifecycleEvent::RetryDue if self.desired && self.state == ConnectionState::Reconnecting => {
                next.state = ConnectionState::Connecting;
                vec![Effect::OpenTransport]
            }
            LifecycleEvent::RetryScheduled | LifecycleEvent::RetryDue => vec![],
            LifecycleEvent::Disconnect => {
                next.desired = false;
                next.attempts = 0;
                next.state = ConnectionState::Closed;
                vec![Effect::CancelRetry, Effect::CloseTransport]
            }
        };
        (next, effects)
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub backoff: BackoffPolicy,
    pub close_timeout_ms: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            close_timeout_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub attempts: u32,
    pub session_id: u64,
}

struct ActiveSession {
    id: u64,
    config: SessionConfig,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    catalog_task: JoinHandle<()>,
}

pub struct ConnectionManager {
    transport: Arc<dyn PushTransport>,
    pipeline: IngestionPipeline,
    catalog_sync: Arc<CatalogSync>,
    feed: FeedEndpoints,
    settings: ConnectionSettings,
    generation: Arc<AtomicU64>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    session: Mutex<Option<ActiveSession>>,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn PushTransport>,
        pipeline: IngestionPipeline,
        catalog_sync: Arc<CatalogSync>,
        feed: FeedEndpoints,
        settings: ConnectionSettings,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus {
            state: ConnectionState::Closed,
            attempts: 0,
            session_id: 0,
        });
        Self {
            transport,
            pipeline,
            catalog_sync,
            feed,
            settings,
            generation: Arc::new(AtomicU64::new(0)),
            status: Arc::new(status),
            session: Mutex::new(None),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub async fn current_config(&self) -> Option<SessionConfig> {
        self.session.lock().await.as_ref().map(|s| s.config.clone())
    }

    /// Establish a session for `config`, replacing any session with different parameters.
    pub async fn connect(&self, config: SessionConfig) -> anyhow::Result<()> {
        let url = self
            .feed
            .url_for(&config, chrono::Utc::now().timestamp_millis())?;

        let mut slot = self.session.lock().await;
        if let Some(active) = slot.as_ref() {
            let state = self.status().state;
            if active.config == config && state != ConnectionState::Closed && state != ConnectionState::Error {
                tracing::debug!(session = active.id, ?state, "session already established");
                return Ok(());
            }
        }
        if let Some(active) = slot.take() {
            self.generation.fetch_add(1, Ordering::SeqCst);
            self.teardown(active).await;
        }

        self.pipeline.reset();
        self.pipeline.emitter().set_window(config.window);

        let id = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (shutdown, shutdown_rx) = watch::channel(false);
        tracing::info!(session = id, %url, "opening push session");

        // Published before the runner is scheduled so a repeated connect sees it.
        self.status.send_replace(ConnectionStatus {
            state: ConnectionState::Connecting,
            attempts: 0,
            session_id: id,
        });

        let runner = SessionRunner {
            id,
            url,
            transport: self.transport.clone(),
            pipeline: self.pipeline.clone(),
            generation: self.generation.clone(),
            status: self.status.clone(),
            lifecycle: Lifecycle::new(self.settings.backoff),
        };
        let task = tokio::spawn(runner.run(shutdown_rx.clone()));
        let catalog_task = self.catalog_sync.clone().spawn(shutdown_rx);

        *slot = Some(ActiveSession {
            id,
            config,
            shutdown,
            task,
            catalog_task,
        });
        Ok(())
    }

    /// Stop the active session; resolves once the close is confirmed or the timeout elapses.
    pub async fn disconnect(&self, clear_data: bool) {
        let mut slot = self.session.lock().await;
        let session_id = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(active) = slot.take() {
            self.teardown(active).await;
        }

        if clear_data {
            self.pipeline.reset();
            self.pipeline.emitter().flush();
        }
        self.status.send_replace(ConnectionStatus {
            state: ConnectionState::Closed,
            attempts: 0,
            session_id,
        });
    }

    /// Swap the time window. Buffers are kept until the new history replaces them.
    pub async fn set_window(&self, window: TimeRangeKey) -> anyhow::Result<()> {
        let Some(config) = self.current_config().await else {
            self.pipeline.emitter().set_window(window);
            return Ok(());
        };
        self.disconnect(false).await;
        self.connect(config.with_window(window)).await
    }

    async fn teardown(&self, mut active: ActiveSession) {
        let _ = active.shutdown.send(true);
        active.catalog_task.abort();

        let timeout = Duration::from_millis(self.settings.close_timeout_ms);
        match tokio::time::timeout(timeout, &mut active.task).await {
            Ok(_) => tracing::debug!(session = active.id, "session closed"),
            Err(_) => {
                tracing::warn!(session = active.id, "close not confirmed within {:?}, proceeding", timeout);
                active.task.abort();
            }
        }
    }
}

enum Step {
    Frame(anyhow::Result<Option<String>>),
    Shutdown,
}

/// Drives one session's lifecycle on its own task.
struct SessionRunner {
    id: u64,
    url: String,
    transport: Arc<dyn PushTransport>,
    pipeline: IngestionPipeline,
    generation: Arc<AtomicU64>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    lifecycle: Lifecycle,
}

impl SessionRunner {
    fn is_current(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.id
    }

    fn apply(&mut self, event: LifecycleEvent) -> Vec<Effect> {
        let (next, effects) = self.lifecycle.step(event);
        if next.state != self.lifecycle.state {
            tracing::info!(session = self.id, from = ?self.lifecycle.state, to = ?next.state, "connection state");
        }
        self.lifecycle = next;

        if self.is_current() {
            self.status.send_replace(ConnectionStatus {
                state: next.state,
                attempts: next.attempts,
                session_id: self.id,
            });
        }
        effects
    }

    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut effects = self.apply(LifecycleEvent::Connect);

        while !effects.is_empty() {
            let mut next = Vec::new();
            for effect in effects {
                match effect {
                    Effect::OpenTransport => match self.run_connection(&mut shutdown).await {
                        Some(event) => next.extend(self.apply(event)),
                        None => return,
                    },
                    Effect::ScheduleRetry(delay) => {
                        next.extend(self.apply(LifecycleEvent::RetryScheduled));
                        tracing::debug!(session = self.id, ?delay, "reconnect scheduled");
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = shutdown.changed() => return,
                        }
                        if !self.is_current() {
                            return;
                        }
                        next.extend(self.apply(LifecycleEvent::RetryDue));
                    }
                    Effect::CancelRetry | Effect::CloseTransport => return,
                }
            }
            effects = next;
        }
    }

    /// One connection attempt; returns the event that ended it, or `None` on shutdown.
    async fn run_connection(&mut self, shutdown: &mut watch::Receiver<bool>) -> Option<LifecycleEvent> {
        let opened = tokio::select! {
            result = self.transport.open(&self.url) => result,
            _ = shutdown.changed() => return None,
        };

        let mut connection = match opened {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!(session = self.id, "Push connection failed: {:#}", e);
                return Some(LifecycleEvent::TransportFailed);
            }
        };

        if !self.is_current() {
            close_quietly(connection.as_mut()).await;
            return None;
        }
        self.apply(LifecycleEvent::Opened);

        loop {
            let step = tokio::select! {
                frame = connection.next_frame() => Step::Frame(frame),
                _ = shutdown.changed() => Step::Shutdown,
            };

            match step {
                Step::Frame(Ok(Some(text))) => self.handle_frame(&text),
                Step::Frame(Ok(None)) => return Some(LifecycleEvent::ClosedByPeer),
                Step::Frame(Err(e)) => {
                    tracing::warn!(session = self.id, "Push connection dropped: {:#}", e);
                    return Some(LifecycleEvent::TransportFailed);
                }
                Step::Shutdown => {
                    close_quietly(connection.as_mut()).await;
                    return None;
                }
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        if !self.is_current() {
            return;
        }
        match decode_frame(text) {
            Ok(frame) => {
                if frame.dropped > 0 {
                    tracing::debug!(session = self.id, dropped = frame.dropped, "dropped undecodable records");
                }
                let replace = frame.envelope.is_history();
                self.pipeline.ingest(frame.envelope.into_records(), replace);
            }
            Err(e) => tracing::debug!(session = self.id, "Ignoring push frame: {}", e),
        }
    }
}

async fn close_quietly(connection: &mut dyn PushConnection) {
    if let Err(e) = connection.close().await {
        tracing::debug!("Push connection close failed: {:#}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::catalog_repository::CatalogRepository;
    use crate::application::catalog_sync::CatalogSettings;
    use crate::application::projection::ProjectionEmitter;
    use crate::application::store::shared_store;
    use crate::domain::series_buffer::{RetentionPolicy, StatusClassifier};
    use crate::domain::unit::{Preset, Unit};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::mpsc;

    #[test]
    fn test_backoff_delays_grow_and_cap() {
        let mut machine = Lifecycle::new(BackoffPolicy::default());
        let (next, effects) = machine.step(LifecycleEvent::Connect);
        assert_eq!(effects, vec![Effect::OpenTransport]);
        machine = next;

        let mut delays = Vec::new();
        for _ in 0..5 {
            let (next, effects) = machine.step(LifecycleEvent::TransportFailed);
            assert_eq!(next.state, ConnectionState::Error);
            match effects.as_slice() {
                [Effect::ScheduleRetry(delay)] => delays.push(delay.as_millis()),
                other => panic!("unexpected effects {other:?}"),
            }
            let (next, _) = next.step(LifecycleEvent::RetryScheduled);
            assert_eq!(next.state, ConnectionState::Reconnecting);
            let (next, effects) = next.step(LifecycleEvent::RetryDue);
            assert_eq!(next.state, ConnectionState::Connecting);
            assert_eq!(effects, vec![Effect::OpenTransport]);
            machine = next;
        }

        assert_eq!(delays, vec![1_000, 2_000, 4_000, 8_000, 15_000]);
    }

    #[test]
    fn test_open_resets_backoff() {
        let machine = Lifecycle::new(BackoffPolicy::default());
        let (machine, _) = machine.step(LifecycleEvent::Connect);
        let (machine, _) = machine.step(LifecycleEvent::ClosedByPeer);
        let (machine, _) = machine.step(LifecycleEvent::RetryScheduled);
        let (machine, _) = machine.step(LifecycleEvent::RetryDue);
        assert_eq!(machine.attempts, 1);

        let (machine, _) = machine.step(LifecycleEvent::Opened);
        assert_eq!(machine.state, ConnectionState::Open);
        assert_eq!(machine.attempts, 0);

        let (_, effects) = machine.step(LifecycleEvent::TransportFailed);
        assert_eq!(effects, vec![Effect::ScheduleRetry(Duration::from_millis(1_000))]);
    }

    #[test]
    fn test_no_retry_after_user_disconnect() {
        let machine = Lifecycle::new(BackoffPolicy::default());
        let (machine, _) = machine.step(LifecycleEvent::Connect);
        let (machine, effects) = machine.step(LifecycleEvent::Disconnect);
        assert_eq!(effects, vec![Effect::CancelRetry, Effect::CloseTransport]);

        let (machine, effects) = machine.step(LifecycleEvent::TransportFailed);
        assert!(effects.is_empty());
        let (machine, effects) = machine.step(LifecycleEvent::RetryDue);
        assert!(effects.is_empty());
        assert_eq!(machine.state, ConnectionState::Error);

        let (_, effects) = machine.step(LifecycleEvent::Opened);
        assert_eq!(effects, vec![Effect::CloseTransport]);
    }

    /// Transport whose connections are fed frames through channels.
    struct ScriptedTransport {
        opened: StdMutex<Vec<String>>,
        feeds: StdMutex<VecDeque<anyhow::Result<mpsc::UnboundedReceiver<String>>>>,
    }

    impl ScriptedTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                opened: StdMutex::new(Vec::new()),
                feeds: StdMutex::new(VecDeque::new()),
            })
        }

        fn push_feed(&self) -> mpsc::UnboundedSender<String> {
            let (tx, rx) = mpsc::unbounded_channel();
            self.feeds.lock().unwrap().push_back(Ok(rx));
            tx
        }

        fn push_failure(&self) {
            self.feeds.lock().unwrap().push_back(Err(anyhow::anyhow!("connection refused")));
        }

        fn opened(&self) -> Vec<String> {
            self.opened.lock().unwrap().clone()
        }
    }

    struct ChannelConnection {
        rx: mpsc::UnboundedReceiver<String>,
    }

    #[async_trait]
    impl PushConnection for ChannelConnection {
        async fn next_frame(&mut self) -> anyhow::Result<Option<String>> {
            Ok(self.rx.recv().await)
        }

        async fn close(&mut self) -> anyhow::Result<()> {
            self.rx.close();
            Ok(())
        }
    }

    #[async_trait]
    impl PushTransport for ScriptedTransport {
        async fn open(&self, url: &str) -> anyhow::Result<Box<dyn PushConnection>> {
            self.opened.lock().unwrap().push(url.to_string());
            let next = self.feeds.lock().unwrap().pop_front();
            match next {
                Some(Ok(rx)) => Ok(Box::new(ChannelConnection { rx })),
                Some(Err(e)) => Err(e),
                None => Err(anyhow::anyhow!("no feed scripted")),
            }
        }
    }

    /// Transport whose connections never deliver a frame and never confirm a close.
    #[derive(Default)]
    struct StuckTransport {
        opened: AtomicUsize,
        dropped: Arc<AtomicUsize>,
    }

    struct StuckConnection {
        dropped: Arc<AtomicUsize>,
    }

    impl Drop for StuckConnection {
        fn drop(&mut self) {
            self.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl PushConnection for StuckConnection {
        async fn next_frame(&mut self) -> anyhow::Result<Option<String>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> anyhow::Result<()> {
            std::future::pending().await
        }
    }

    #[async_trait]
    impl PushTransport for StuckTransport {
        async fn open(&self, _url: &str) -> anyhow::Result<Box<dyn PushConnection>> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(StuckConnection {
                dropped: self.dropped.clone(),
            }))
        }
    }

    struct StaticCatalog;

    #[async_trait]
    impl CatalogRepository for StaticCatalog {
        async fn list_units(&self) -> anyhow::Result<Vec<Unit>> {
            Ok(vec![Unit::new(1, "North"), Unit::new(2, "South")])
        }

        async fn list_presets(&self) -> anyhow::Result<Vec<Preset>> {
            Ok(vec![])
        }

        async fn start_preset(&self, _unit_id: i64, _preset_id: i64) -> anyhow::Result<()> {
            Ok(())
        }

        async fn stop_preset(&self, _unit_id: i64) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn manager(transport: Arc<dyn PushTransport>) -> (ConnectionManager, ProjectionEmitter) {
        let store = shared_store();
        let emitter = ProjectionEmitter::new(store.clone(), TimeRangeKey::All, Duration::from_millis(400));
        let pipeline = IngestionPipeline::new(
            store,
            emitter.clone(),
            RetentionPolicy::default(),
            StatusClassifier::default(),
        );
        let catalog_sync = Arc::new(CatalogSync::new(
            Arc::new(StaticCatalog),
            pipeline.clone(),
            CatalogSettings::default(),
        ));
        let feed = FeedEndpoints::new("ws://feed.test", "/ws/telemetry", "/ws/units/${unit_id}/telemetry");
        let manager = ConnectionManager::new(transport, pipeline, catalog_sync, feed, ConnectionSettings::default());
        (manager, emitter)
    }

    const HISTORY: &str = r#"{"history":[
        {"unit_id":1,"id":1,"timestamp":"2024-05-01T10:00:00","status":"running","metrics":{"temperature":40.0}},
        {"unit_id":1,"id":2,"timestamp":"2024-05-01T10:00:05","status":"running","metrics":{"temperature":41.0}}
    ]}"#;

    #[tokio::test(start_paused = true)]
    async fn test_session_ingests_history_and_appends() {
        let transport = ScriptedTransport::new();
        let feed = transport.push_feed();
        let (manager, emitter) = manager(transport.clone());
        let mut projections = emitter.subscribe();

        manager.connect(SessionConfig::all_units(TimeRangeKey::All)).await.unwrap();
        feed.send(HISTORY.to_string()).unwrap();
        feed.send(r#"[{"unit_id":1,"id":3,"timestamp":"2024-05-01T10:00:10Z","status":"idle"}]"#.to_string())
            .unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(manager.status().state, ConnectionState::Open);
        projections.changed().await.unwrap();
        let snapshot = emitter.current();
        let north = snapshot.unit(1).unwrap();
        assert_eq!(north.records.len(), 3);
        assert_eq!(north.snapshot.status.as_deref(), Some("idle"));
        assert_eq!(transport.opened(), vec!["ws://feed.test/ws/telemetry".to_string()]);

        manager.disconnect(true).await;
        assert_eq!(manager.status().state, ConnectionState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnects_with_backoff_after_failures() {
        let transport = ScriptedTransport::new();
        transport.push_failure();
        transport.push_failure();
        let _feed = transport.push_feed();
        let (manager, _emitter) = manager(transport.clone());

        let started = tokio::time::Instant::now();
        manager.connect(SessionConfig::all_units(TimeRangeKey::All)).await.unwrap();

        let mut status = manager.subscribe_status();
        while status.borrow_and_update().state != ConnectionState::Open {
            status.changed().await.unwrap();
        }
        assert_eq!(transport.opened().len(), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(3_000));
        assert_eq!(manager.status().attempts, 0);

        manager.disconnect(false).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_config_change_cancels_stale_retry() {
        let transport = ScriptedTransport::new();
        transport.push_failure();
        let (manager, _emitter) = manager(transport.clone());

        manager.connect(SessionConfig::all_units(TimeRangeKey::All)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(manager.status().state, ConnectionState::Reconnecting);

        let _feed = transport.push_feed();
        manager
            .connect(SessionConfig::single_unit(2, TimeRangeKey::All))
            .await
            .unwrap();

        // Well past the first session's retry: nothing may reopen the old feed.
        tokio::time::sleep(Duration::from_secs(30)).await;
        let opened = transport.opened();
        assert_eq!(opened.len(), 2);
        assert_eq!(opened[1], "ws://feed.test/ws/units/2/telemetry");
        assert_eq!(manager.status().state, ConnectionState::Open);

        manager.disconnect(false).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_equal_config_is_noop() {
        let transport = ScriptedTransport::new();
        let _feed = transport.push_feed();
        let (manager, _emitter) = manager(transport.clone());
        let config = SessionConfig::all_units(TimeRangeKey::All);

        manager.connect(config.clone()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        manager.connect(config).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(transport.opened().len(), 1);
        manager.disconnect(false).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_connect_before_runner_starts_is_noop() {
        let transport = ScriptedTransport::new();
        let _feed = transport.push_feed();
        let (manager, _emitter) = manager(transport.clone());
        let config = SessionConfig::all_units(TimeRangeKey::All);

        manager.connect(config.clone()).await.unwrap();
        let status = manager.status();
        assert_eq!(status.state, ConnectionState::Connecting);
        assert_ne!(status.session_id, 0);

        manager.connect(config).await.unwrap();
        assert_eq!(manager.status().session_id, status.session_id);

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(transport.opened().len(), 1);
        assert_eq!(manager.status().state, ConnectionState::Open);
        manager.disconnect(false).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_change_keeps_projection_until_new_history() {
        let transport = ScriptedTransport::new();
        let old_feed = transport.push_feed();
        let (manager, emitter) = manager(transport.clone());

        manager.connect(SessionConfig::all_units(TimeRangeKey::All)).await.unwrap();
        old_feed.send(HISTORY.to_string()).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(emitter.current().unit(1).unwrap().records.len(), 2);

        let new_feed = transport.push_feed();
        manager.set_window(TimeRangeKey::FiveMinutes).await.unwrap();

        assert!(old_feed.is_closed());
        assert_eq!(
            manager.current_config().await.map(|c| c.window),
            Some(TimeRangeKey::FiveMinutes)
        );

        // Nothing new has arrived yet: the last emission is still on screen.
        tokio::time::sleep(Duration::from_millis(500)).await;
        let opened = transport.opened();
        assert_eq!(opened.len(), 2);
        assert!(opened[1].starts_with("ws://feed.test/ws/telemetry?start_time="));
        let held = emitter.current();
        assert_eq!(held.window, TimeRangeKey::All);
        assert_eq!(held.unit(1).unwrap().records.len(), 2);

        new_feed
            .send(
                r#"{"history":[{"unit_id":1,"id":7,"timestamp":"2024-05-01T11:00:00Z","status":"idle"}]}"#
                    .to_string(),
            )
            .unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        let replaced = emitter.current();
        assert_eq!(replaced.window, TimeRangeKey::FiveMinutes);
        let records = &replaced.unit(1).unwrap().records;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record_id, 7);

        manager.disconnect(false).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_teardown_gives_up_on_unconfirmed_close() {
        let transport = Arc::new(StuckTransport::default());
        let (manager, _emitter) = manager(transport.clone());

        manager.connect(SessionConfig::all_units(TimeRangeKey::All)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(manager.status().state, ConnectionState::Open);

        let started = tokio::time::Instant::now();
        manager
            .connect(SessionConfig::single_unit(2, TimeRangeKey::All))
            .await
            .unwrap();
        assert_eq!(started.elapsed(), Duration::from_millis(1_000));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(transport.dropped.load(Ordering::SeqCst), 1);
        assert_eq!(transport.opened.load(Ordering::SeqCst), 2);
        assert_eq!(manager.status().state, ConnectionState::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_with_clear_emits_empty_units() {
        let transport = ScriptedTransport::new();
        let feed = transport.push_feed();
        let (manager, emitter) = manager(transport.clone());
        let mut projections = emitter.subscribe();

        manager.connect(SessionConfig::all_units(TimeRangeKey::All)).await.unwrap();
        feed.send(HISTORY.to_string()).unwrap();
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(emitter.current().unit(1).unwrap().records.len(), 2);
        projections.borrow_and_update();

        manager.disconnect(true).await;

        assert!(projections.has_changed().unwrap());
        let cleared = projections.borrow_and_update().clone();
        assert!(!cleared.units.is_empty());
        assert!(cleared.units.iter().all(|u| u.records.is_empty() && u.snapshot.status.is_none()));
        assert_eq!(manager.status().state, ConnectionState::Closed);
    }
}
