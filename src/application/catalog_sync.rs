// Catalog sync - keeps the known units/presets in line with the server
use crate::application::catalog_repository::CatalogRepository;
use crate::application::ingestion::IngestionPipeline;
use crate::domain::unit::{Catalog, CatalogDiff};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    pub poll_interval_secs: u64,
    pub initial_attempts: u32,
    pub initial_retry_delay_ms: u64,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: 15,
            initial_attempts: 5,
            initial_retry_delay_ms: 2_000,
        }
    }
}

pub struct CatalogSync {
    repository: Arc<dyn CatalogRepository>,
    pipeline: IngestionPipeline,
    settings: CatalogSettings,
}

impl CatalogSync {
    pub fn new(
        repository: Arc<dyn CatalogRepository>,
        pipeline: IngestionPipeline,
        settings: CatalogSettings,
    ) -> Self {
        Self {
            repository,
            pipeline,
            settings,
        }
    }

    /// Fetch units and presets once and apply them.
    pub async fn refresh(&self) -> anyhow::Result<CatalogDiff> {
        let units = self.repository.list_units().await?;
        let presets = self.repository.list_presets().await?;
        let diff = self.pipeline.apply_catalog(Catalog::new(units, presets));

        if !diff.is_empty() {
            tracing::info!(
                added = diff.added.len(),
                removed = diff.removed.len(),
                renamed = diff.renamed.len(),
                presets_changed = diff.presets_changed,
                "catalog changed"
            );
            self.pipeline.emitter().flush();
        }
        Ok(diff)
    }

    /// First load after connect, retried a bounded number of times.
    pub async fn load_initial(&self) -> anyhow::Result<CatalogDiff> {
        let attempts = self.settings.initial_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.refresh().await {
                Ok(diff) => return Ok(diff),
                Err(e) if attempt < attempts => {
                    tracing::warn!("Catalog load attempt {}/{} failed: {:#}", attempt, attempts, e);
                    attempt += 1;
                    tokio::time::sleep(Duration::from_millis(self.settings.initial_retry_delay_ms)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Initial load followed by periodic polling until `shutdown` fires.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            if let Err(e) = self.load_initial().await {
                tracing::warn!("Initial catalog load failed, waiting for next poll: {:#}", e);
            }

            let period = Duration::from_secs(self.settings.poll_interval_secs.max(1));
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.changed() => break,
                }
                if let Err(e) = self.refresh().await {
                    tracing::debug!("Catalog poll failed: {:#}", e);
                }
            }
        })
    }
}
