// Session domain model
use super::window::TimeRangeKey;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    All,
    Single,
}

/// Parameters that require a fresh connection when they change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub mode: SessionMode,
    #[serde(default)]
    pub unit_id: Option<i64>,
    #[serde(default)]
    pub window: TimeRangeKey,
    #[serde(default)]
    pub log_limit: Option<u32>,
}

impl SessionConfig {
    pub fn all_units(window: TimeRangeKey) -> Self {
        Self {
            mode: SessionMode::All,
            unit_id: None,
            window,
            log_limit: None,
        }
    }

    pub fn single_unit(unit_id: i64, window: TimeRangeKey) -> Self {
        Self {
            mode: SessionMode::Single,
            unit_id: Some(unit_id),
            window,
            log_limit: None,
        }
    }

    pub fn with_log_limit(mut self, limit: u32) -> Self {
        self.log_limit = Some(limit);
        self
    }

    pub fn with_window(mut self, window: TimeRangeKey) -> Self {
        self.window = window;
        self
    }

    /// True when `next` is this session with only a different window.
    pub fn differs_only_in_window(&self, next: &SessionConfig) -> bool {
        self.window != next.window && self.clone().with_window(next.window) == *next
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Connecting,
    Open,
    Reconnecting,
    Closed,
    Error,
}
