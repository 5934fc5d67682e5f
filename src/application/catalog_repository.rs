// Repository trait for the unit/preset catalog and control actions
use crate::domain::unit::{Preset, Unit};
use async_trait::async_trait;

#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// List all known units
    async fn list_units(&self) -> anyhow::Result<Vec<Unit>>;

    /// List all known presets with the units they are linked to
    async fn list_presets(&self) -> anyhow::Result<Vec<Preset>>;

    /// Make `preset_id` the active preset of a unit
    async fn start_preset(&self, unit_id: i64, preset_id: i64) -> anyhow::Result<()>;

    /// Clear the active preset of a unit
    async fn stop_preset(&self, unit_id: i64) -> anyhow::Result<()>;
}
