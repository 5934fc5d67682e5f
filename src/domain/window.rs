// Time window domain model - symbolic ranges and per-range point budgets
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const MINUTE_MS: i64 = 60_000;
const HOUR_MS: i64 = 60 * MINUTE_MS;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeRangeKey {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "5m")]
    FiveMinutes,
    #[serde(rename = "15m")]
    FifteenMinutes,
    #[serde(rename = "30m")]
    ThirtyMinutes,
    #[serde(rename = "1h")]
    #[default]
    OneHour,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "12h")]
    TwelveHours,
    #[serde(rename = "24h")]
    TwentyFourHours,
    #[serde(rename = "all")]
    All,
}

impl TimeRangeKey {
    pub const ALL_KEYS: [TimeRangeKey; 9] = [
        TimeRangeKey::OneMinute,
        TimeRangeKey::FiveMinutes,
        TimeRangeKey::FifteenMinutes,
        TimeRangeKey::ThirtyMinutes,
        TimeRangeKey::OneHour,
        TimeRangeKey::SixHours,
        TimeRangeKey::TwelveHours,
        TimeRangeKey::TwentyFourHours,
        TimeRangeKey::All,
    ];

    /// Window length in milliseconds; `None` means unbounded.
    pub fn duration_ms(self) -> Option<i64> {
        match self {
            TimeRangeKey::OneMinute => Some(MINUTE_MS),
            TimeRangeKey::FiveMinutes => Some(5 * MINUTE_MS),
            TimeRangeKey::FifteenMinutes => Some(15 * MINUTE_MS),
            TimeRangeKey::ThirtyMinutes => Some(30 * MINUTE_MS),
            TimeRangeKey::OneHour => Some(HOUR_MS),
            TimeRangeKey::SixHours => Some(6 * HOUR_MS),
            TimeRangeKey::TwelveHours => Some(12 * HOUR_MS),
            TimeRangeKey::TwentyFourHours => Some(24 * HOUR_MS),
            TimeRangeKey::All => None,
        }
    }

    /// Inclusive lower bound of the window ending at `now_ms`.
    pub fn window_start_ms(self, now_ms: i64) -> Option<i64> {
        self.duration_ms().map(|d| now_ms - d)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeRangeKey::OneMinute => "1m",
            TimeRangeKey::FiveMinutes => "5m",
            TimeRangeKey::FifteenMinutes => "15m",
            TimeRangeKey::ThirtyMinutes => "30m",
            TimeRangeKey::OneHour => "1h",
            TimeRangeKey::SixHours => "6h",
            TimeRangeKey::TwelveHours => "12h",
            TimeRangeKey::TwentyFourHours => "24h",
            TimeRangeKey::All => "all",
        }
    }
}

impl fmt::Display for TimeRangeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown time range key: {0}")]
pub struct WindowKeyError(pub String);

impl FromStr for TimeRangeKey {
    type Err = WindowKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        TimeRangeKey::ALL_KEYS
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| WindowKeyError(s.to_string()))
    }
}

/// Maximum chart points per window key.
///
/// Narrow windows get denser budgets; wide windows get the smallest one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PointBudgets {
    #[serde(rename = "1m")]
    pub one_minute: usize,
    #[serde(rename = "5m")]
    pub five_minutes: usize,
    #[serde(rename = "15m")]
    pub fifteen_minutes: usize,
    #[serde(rename = "30m")]
    pub thirty_minutes: usize,
    #[serde(rename = "1h")]
    pub one_hour: usize,
    #[serde(rename = "6h")]
    pub six_hours: usize,
    #[serde(rename = "12h")]
    pub twelve_hours: usize,
    #[serde(rename = "24h")]
    pub twenty_four_hours: usize,
    pub all: usize,
}

impl Default for PointBudgets {
    fn default() -> Self {
        Self {
            one_minute: 500,
            five_minutes: 400,
            fifteen_minutes: 400,
            thirty_minutes: 350,
            one_hour: 300,
            six_hours: 250,
            twelve_hours: 200,
            twenty_four_hours: 200,
            all: 150,
        }
    }
}

impl PointBudgets {
    pub fn limit_for(&self, key: TimeRangeKey) -> usize {
        match key {
            TimeRangeKey::OneMinute => self.one_minute,
            TimeRangeKey::FiveMinutes => self.five_minutes,
            TimeRangeKey::FifteenMinutes => self.fifteen_minutes,
            TimeRangeKey::ThirtyMinutes => self.thirty_minutes,
            TimeRangeKey::OneHour => self.one_hour,
            TimeRangeKey::SixHours => self.six_hours,
            TimeRangeKey::TwelveHours => self.twelve_hours,
            TimeRangeKey::TwentyFourHours => self.twenty_four_hours,
            TimeRangeKey::All => self.all,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durations() {
        assert_eq!(TimeRangeKey::FiveMinutes.duration_ms(), Some(300_000));
        assert_eq!(TimeRangeKey::TwentyFourHours.duration_ms(), Some(86_400_000));
        assert_eq!(TimeRangeKey::All.duration_ms(), None);
        assert_eq!(TimeRangeKey::OneMinute.window_start_ms(100_000), Some(40_000));
        assert_eq!(TimeRangeKey::All.window_start_ms(100_000), None);
    }

    #[test]
    fn test_parse_keys() {
        assert_eq!("5m".parse::<TimeRangeKey>().unwrap(), TimeRangeKey::FiveMinutes);
        assert_eq!(" ALL ".parse::<TimeRangeKey>().unwrap(), TimeRangeKey::All);
        assert!("2w".parse::<TimeRangeKey>().is_err());

        let key: TimeRangeKey = serde_json::from_str("\"12h\"").unwrap();
        assert_eq!(key, TimeRangeKey::TwelveHours);
    }

    #[test]
    fn test_default_is_one_hour() {
        assert_eq!(TimeRangeKey::default(), TimeRangeKey::OneHour);
        assert_eq!(TimeRangeKey::default().duration_ms(), Some(3_600_000));
    }

    #[test]
    fn test_budgets_shrink_with_width() {
        let budgets = PointBudgets::default();
        assert_eq!(budgets.limit_for(TimeRangeKey::FiveMinutes), 400);
        assert!(budgets.limit_for(TimeRangeKey::OneMinute) >= budgets.limit_for(TimeRangeKey::OneHour));
        let smallest = TimeRangeKey::ALL_KEYS
            .iter()
            .map(|k| budgets.limit_for(*k))
            .min()
            .unwrap();
        assert_eq!(budgets.limit_for(TimeRangeKey::All), smallest);
    }
}
