// Chart series built from a unit's projected records
use crate::application::projection::UnitView;
use crate::domain::downsample::{reduce, reduce_paired, PairedPoint};
use crate::domain::telemetry::TimeSeriesPoint;
use crate::domain::window::{PointBudgets, TimeRangeKey};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub metric: String,
    /// `(x, y)` pairs: epoch milliseconds and value.
    pub points: Vec<(i64, f64)>,
}

impl ChartSeries {
    fn new(metric: &str, points: Vec<TimeSeriesPoint>) -> Self {
        Self {
            metric: metric.to_string(),
            points: points.into_iter().map(|p| (p.time_ms, p.value)).collect(),
        }
    }
}

pub fn metric_points(view: &UnitView, metric: &str) -> Vec<TimeSeriesPoint> {
    view.records
        .iter()
        .filter_map(|r| r.metric(metric).map(|v| TimeSeriesPoint::new(r.timestamp_ms, v)))
        .collect()
}

/// Series for `metrics`, reduced to the window's point budget.
///
/// Exactly two metrics are reduced together so their timestamps stay aligned.
pub fn build_chart(
    view: &UnitView,
    metrics: &[&str],
    window: TimeRangeKey,
    budgets: &PointBudgets,
) -> Vec<ChartSeries> {
    let limit = budgets.limit_for(window);

    if let [first, second] = metrics {
        let paired: Vec<PairedPoint> = view
            .records
            .iter()
            .filter_map(|r| {
                Some(PairedPoint {
                    time_ms: r.timestamp_ms,
                    first: r.metric(first)?,
                    second: r.metric(second)?,
                })
            })
            .collect();
        let (a, b) = reduce_paired(&paired, limit);
        return vec![ChartSeries::new(first, a), ChartSeries::new(second, b)];
    }

    metrics
        .iter()
        .map(|metric| ChartSeries::new(metric, reduce(&metric_points(view, metric), limit)))
        .collect()
}
