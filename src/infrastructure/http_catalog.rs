// REST catalog repository implementation
use crate::application::catalog_repository::CatalogRepository;
use crate::domain::unit::{Preset, Unit};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

#[derive(Debug, Clone)]
pub struct HttpCatalogRepository {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct StartPresetRequest {
    preset_id: i64,
}

impl HttpCatalogRepository {
    pub fn new(base_url: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.url(path);
        let response = self
            .client
            .get(&url)
            .header("Accept", "application/json")
            .send()
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("GET {} failed with status {}: {}", url, status, body);
        }

        response
            .json::<T>()
            .await
            .with_context(|| format!("Failed to parse response from {}", url))
    }

    async fn expect_success(response: reqwest::Response, what: &str) -> Result<()> {
        if response.status().is_success() {
            return Ok(());
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::bail!("{} failed with status {}: {}", what, status, body)
    }
}

#[async_trait]
impl CatalogRepository for HttpCatalogRepository {
    async fn list_units(&self) -> Result<Vec<Unit>> {
        let units: Vec<Unit> = self.get_json("/units").await?;
        tracing::debug!("Fetched {} units", units.len());
        Ok(units)
    }

    async fn list_presets(&self) -> Result<Vec<Preset>> {
        let presets: Vec<Preset> = self.get_json("/presets").await?;
        tracing::debug!("Fetched {} presets", presets.len());
        Ok(presets)
    }

    async fn start_preset(&self, unit_id: i64, preset_id: i64) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("/units/{}/preset", unit_id)))
            .json(&StartPresetRequest { preset_id })
            .send()
            .await
            .context("Failed to send start request")?;
        Self::expect_success(response, "Start preset").await
    }

    async fn stop_preset(&self, unit_id: i64) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/units/{}/preset", unit_id)))
            .send()
            .await
            .context("Failed to send stop request")?;
        Self::expect_success(response, "Stop preset").await
    }
}
