// Telemetry data domain models
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeSeriesPoint {
    pub time_ms: i64,
    pub value: f64,
}

impl TimeSeriesPoint {
    pub fn new(time_ms: i64, value: f64) -> Self {
        Self { time_ms, value }
    }
}

/// A single metric reading; flags chart as 0/1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Flag(bool),
    Number(f64),
}

impl MetricValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            MetricValue::Number(v) => v,
            MetricValue::Flag(true) => 1.0,
            MetricValue::Flag(false) => 0.0,
        }
    }
}

/// Record as it arrives on the push feed, before normalization.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawRecord {
    pub unit_id: i64,
    pub id: i64,
    pub timestamp: String,
    pub status: String,
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricValue>,
    #[serde(default)]
    pub preset_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    pub unit_id: i64,
    pub record_id: i64,
    pub timestamp_ms: i64,
    pub status: String,
    pub metrics: BTreeMap<String, MetricValue>,
    pub preset_id: Option<i64>,
}

impl CanonicalRecord {
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).map(MetricValue::as_f64)
    }
}
