// Unit control service - start/stop presets with an optimistic local patch
use crate::application::catalog_repository::CatalogRepository;
use crate::application::ingestion::IngestionPipeline;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum ControlError {
    #[error("unit {0} is not known")]
    UnknownUnit(i64),
    #[error("control request rejected: {0:#}")]
    Rejected(anyhow::Error),
}

#[derive(Clone)]
pub struct UnitControlService {
    repository: Arc<dyn CatalogRepository>,
    pipeline: IngestionPipeline,
}

impl UnitControlService {
    pub fn new(repository: Arc<dyn CatalogRepository>, pipeline: IngestionPipeline) -> Self {
        Self {
            repository,
            pipeline,
        }
    }

    /// Patch the unit as started, then ask the server to run `preset_id`.
    ///
    /// A failed request leaves the patch in place; the next record corrects it.
    pub async fn set_active_preset(&self, unit_id: i64, preset_id: i64) -> Result<(), ControlError> {
        let started = self.pipeline.classifier().started.clone();
        if !self.pipeline.patch_unit(unit_id, &started, Some(preset_id)) {
            return Err(ControlError::UnknownUnit(unit_id));
        }

        self.repository
            .start_preset(unit_id, preset_id)
            .await
            .map_err(|e| {
                tracing::warn!("Start preset {} on unit {} failed: {:#}", preset_id, unit_id, e);
                ControlError::Rejected(e)
            })
    }

    pub async fn clear_active_preset(&self, unit_id: i64) -> Result<(), ControlError> {
        let stopped = self.pipeline.classifier().stopped.clone();
        if !self.pipeline.patch_unit(unit_id, &stopped, None) {
            return Err(ControlError::UnknownUnit(unit_id));
        }

        self.repository.stop_preset(unit_id).await.map_err(|e| {
            tracing::warn!("Stop preset on unit {} failed: {:#}", unit_id, e);
            ControlError::Rejected(e)
        })
    }
}
