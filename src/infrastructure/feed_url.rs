// Push feed URL construction
use crate::domain::session::{SessionConfig, SessionMode};
use crate::infrastructure::config::prepare_template;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FeedUrlError {
    #[error("single-unit session without a unit id")]
    MissingUnit,
    #[error("window start {0} is out of range")]
    InvalidStart(i64),
}

#[derive(Debug, Clone)]
pub struct FeedEndpoints {
    base_url: String,
    all_path: String,
    unit_path: String,
}

impl FeedEndpoints {
    pub fn new(base_url: impl Into<String>, all_path: impl Into<String>, unit_path: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            all_path: all_path.into(),
            unit_path: unit_path.into(),
        }
    }

    /// URL for `config`, with `start_time` derived from the window ending at `now_ms`.
    pub fn url_for(&self, config: &SessionConfig, now_ms: i64) -> Result<String, FeedUrlError> {
        let path = match config.mode {
            SessionMode::All => self.all_path.clone(),
            SessionMode::Single => {
                let unit_id = config.unit_id.ok_or(FeedUrlError::MissingUnit)?;
                let mut vars = HashMap::new();
                vars.insert("unit_id".to_string(), unit_id.to_string());
                prepare_template(&self.unit_path, &vars)
            }
        };

        let mut params = Vec::new();
        if let Some(start_ms) = config.window.window_start_ms(now_ms) {
            let start = DateTime::<Utc>::from_timestamp_millis(start_ms)
                .ok_or(FeedUrlError::InvalidStart(start_ms))?;
            let iso = start.to_rfc3339_opts(SecondsFormat::Millis, true);
            params.push(format!("start_time={}", urlencoding::encode(&iso)));
        }
        if let Some(limit) = config.log_limit {
            params.push(format!("limit={}", limit));
        }

        let mut url = format!("{}{}", self.base_url, path);
        if !params.is_empty() {
            url.push('?');
            url.push_str(&params.join("&"));
        }
        Ok(url)
    }
}
