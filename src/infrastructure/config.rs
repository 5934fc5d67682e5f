use crate::application::catalog_sync::CatalogSettings;
use crate::application::connection::ConnectionSettings;
use crate::domain::series_buffer::{RetentionPolicy, StatusClassifier};
use crate::domain::session::SessionConfig;
use crate::domain::window::{PointBudgets, TimeRangeKey};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ClientConfig {
    pub server: ServerSettings,
    pub session: Option<SessionConfig>,
    pub connection: ConnectionSettings,
    pub catalog: CatalogSettings,
    pub projection: ProjectionSettings,
    pub retention: RetentionPolicy,
    pub point_budgets: PointBudgets,
    pub status: StatusClassifier,
    pub http: HttpSettings,
}

impl ClientConfig {
    /// Session to open at startup; all units over the last hour unless configured.
    pub fn initial_session(&self) -> SessionConfig {
        self.session
            .clone()
            .unwrap_or_else(|| SessionConfig::all_units(TimeRangeKey::default()))
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub ws_url: String,
    pub api_url: String,
    pub all_units_path: String,
    pub unit_path: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            ws_url: "ws://localhost:8000".to_string(),
            api_url: "http://localhost:8000/api".to_string(),
            all_units_path: "/ws/telemetry".to_string(),
            unit_path: "/ws/units/${unit_id}/telemetry".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ProjectionSettings {
    pub throttle_ms: u64,
}

impl Default for ProjectionSettings {
    fn default() -> Self {
        Self { throttle_ms: 400 }
    }
}

impl ProjectionSettings {
    pub fn throttle(&self) -> Duration {
        Duration::from_millis(self.throttle_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HttpSettings {
    pub bind: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8090".to_string(),
        }
    }
}

/// Load `config/client.*` (optional) overlaid with `LIVE_TELEMETRY__*` environment variables.
pub fn load_client_config() -> anyhow::Result<ClientConfig> {
    let settings = config::Config::builder()
        .add_source(config::File::with_name("config/client").required(false))
        .add_source(
            config::Environment::with_prefix("LIVE_TELEMETRY")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Replace `${name}` placeholders in a template string
pub fn prepare_template(template: &str, vars: &HashMap<String, String>) -> String {
    let mut result = template.to_string();
    for (key, value) in vars {
        let placeholder = format!("${{{}}}", key);
        result = result.replace(&placeholder, value);
    }
    result
}
