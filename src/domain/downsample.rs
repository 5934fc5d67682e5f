// Point-count reduction for charting
//
// Mild over-count uses stride sampling; heavier compression switches to
// largest-triangle bucket selection, which keeps local extrema.
use super::telemetry::TimeSeriesPoint;

/// Below this over-count ratio stride sampling is used.
pub const STRIDE_THRESHOLD: f64 = 1.6;

/// Two metrics sampled at the same instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PairedPoint {
    pub time_ms: i64,
    pub first: f64,
    pub second: f64,
}

/// Reduce `points` to at most `limit` entries, keeping the first and last point.
pub fn reduce(points: &[TimeSeriesPoint], limit: usize) -> Vec<TimeSeriesPoint> {
    select_indices(points.len(), limit, |i| points[i].time_ms as f64, |i| points[i].value)
        .into_iter()
        .map(|i| points[i])
        .collect()
}

/// Reduce two aligned series with one shared selection.
///
/// Selection runs on the average of both series after min-max normalization,
/// so the outputs share exactly the same timestamps.
pub fn reduce_paired(
    points: &[PairedPoint],
    limit: usize,
) -> (Vec<TimeSeriesPoint>, Vec<TimeSeriesPoint>) {
    let first = Normalizer::over(points.iter().map(|p| p.first));
    let second = Normalizer::over(points.iter().map(|p| p.second));
    let combined: Vec<f64> = points
        .iter()
        .map(|p| (first.apply(p.first) + second.apply(p.second)) / 2.0)
        .collect();

    let indices = select_indices(points.len(), limit, |i| points[i].time_ms as f64, |i| combined[i]);
    let pick = |value: fn(&PairedPoint) -> f64| {
        indices
            .iter()
            .map(|&i| TimeSeriesPoint::new(points[i].time_ms, value(&points[i])))
            .collect::<Vec<_>>()
    };
    (pick(|p| p.first), pick(|p| p.second))
}

struct Normalizer {
    min: f64,
    span: f64,
}

impl Normalizer {
    fn over(values: impl Iterator<Item = f64>) -> Self {
        let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        Self {
            min,
            span: max - min,
        }
    }

    fn apply(&self, value: f64) -> f64 {
        if self.span > 0.0 && self.span.is_finite() {
            (value - self.min) / self.span
        } else {
            0.5
        }
    }
}

/// Index selection shared by the single and paired variants.
fn select_indices(
    len: usize,
    limit: usize,
    x: impl Fn(usize) -> f64,
    y: impl Fn(usize) -> f64,
) -> Vec<usize> {
    if len <= limit {
        return (0..len).collect();
    }
    if limit <= 2 {
        return if len == 1 { vec![0] } else { vec![0, len - 1] };
    }

    let factor = len as f64 / limit as f64;
    if factor < STRIDE_THRESHOLD {
        stride_indices(len, factor.ceil() as usize)
    } else {
        triangle_indices(len, limit, x, y)
    }
}

fn stride_indices(len: usize, stride: usize) -> Vec<usize> {
    let mut picked: Vec<usize> = (0..len).step_by(stride.max(1)).collect();
    if picked.last() != Some(&(len - 1)) {
        picked.push(len - 1);
    }
    picked
}

fn triangle_indices(
    len: usize,
    limit: usize,
    x: impl Fn(usize) -> f64,
    y: impl Fn(usize) -> f64,
) -> Vec<usize> {
    let mut picked = Vec::with_capacity(limit);
    picked.push(0);

    // Interior points are split into limit - 2 buckets.
    let every = (len - 2) as f64 / (limit - 2) as f64;
    let mut anchor = 0usize;

    for bucket in 0..limit - 2 {
        let start = (bucket as f64 * every).floor() as usize + 1;
        let end = (((bucket + 1) as f64 * every).floor() as usize + 1).min(len - 1);

        let next_start = end;
        let next_end = (((bucket + 2) as f64 * every).floor() as usize + 1).min(len);
        let (avg_x, avg_y) = if next_start < next_end {
            let count = (next_end - next_start) as f64;
            let sum_x: f64 = (next_start..next_end).map(&x).sum();
            let sum_y: f64 = (next_start..next_end).map(&y).sum();
            (sum_x / count, sum_y / count)
        } else {
            (x(len - 1), y(len - 1))
        };

        let anchor_x = x(anchor);
        let anchor_y = y(anchor);
        let mut best = start;
        let mut best_area = f64::NEG_INFINITY;
        for i in start..end.max(start + 1) {
            let area = ((anchor_x - avg_x) * (y(i) - anchor_y)
                - (anchor_x - x(i)) * (avg_y - anchor_y))
                .abs();
            if area > best_area {
                best_area = area;
                best = i;
            }
        }

        picked.push(best);
        anchor = best;
    }

    picked.push(len - 1);
    picked
}
