// Record normalization - resolves wire timestamps into absolute epoch milliseconds
use super::telemetry::{CanonicalRecord, RawRecord};
use chrono::DateTime;

/// Convert a raw record into its canonical form.
///
/// Returns `None` when the timestamp cannot be resolved; such records are dropped.
pub fn normalize(raw: RawRecord) -> Option<CanonicalRecord> {
    let timestamp_ms = parse_timestamp(&raw.timestamp)?;
    Some(CanonicalRecord {
        unit_id: raw.unit_id,
        record_id: raw.id,
        timestamp_ms,
        status: raw.status,
        metrics: raw.metrics,
        preset_id: raw.preset_id,
    })
}

/// Parse an ISO-8601 timestamp, reading zone-less values as UTC.
pub fn parse_timestamp(input: &str) -> Option<i64> {
    let trimmed = input.trim();
    let (date, time) = split_date_time(trimmed)?;

    let candidate = if has_zone_marker(time) {
        format!("{}T{}", date, time)
    } else {
        format!("{}T{}Z", date, time)
    };

    DateTime::parse_from_rfc3339(&candidate)
        .ok()
        .map(|dt| dt.timestamp_millis())
}

fn split_date_time(value: &str) -> Option<(&str, &str)> {
    let idx = value.find(['T', 't', ' '])?;
    let (date, rest) = value.split_at(idx);
    Some((date, &rest[1..]))
}

fn has_zone_marker(time: &str) -> bool {
    time.ends_with(['Z', 'z']) || time.contains(['+', '-'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn raw(timestamp: &str) -> RawRecord {
        RawRecord {
            unit_id: 1,
            id: 10,
            timestamp: timestamp.to_string(),
            status: "running".to_string(),
            metrics: BTreeMap::new(),
            preset_id: Some(4),
        }
    }

    #[test]
    fn test_naive_timestamp_is_utc() {
        let naive = parse_timestamp("2024-05-01T10:00:00").unwrap();
        let explicit = parse_timestamp("2024-05-01T10:00:00Z").unwrap();
        assert_eq!(naive, explicit);
        assert_eq!(explicit, 1_714_557_600_000);
    }

    #[test]
    fn test_offsets_and_fractions() {
        let offset = parse_timestamp("2024-05-01T12:00:00+02:00").unwrap();
        assert_eq!(offset, 1_714_557_600_000);

        let fractional = parse_timestamp("2024-05-01 10:00:00.250").unwrap();
        assert_eq!(fractional, 1_714_557_600_250);

        let negative = parse_timestamp("2024-05-01T05:00:00-05:00").unwrap();
        assert_eq!(negative, 1_714_557_600_000);
    }

    #[test]
    fn test_unparseable_timestamps() {
        assert_eq!(parse_timestamp(""), None);
        assert_eq!(parse_timestamp("yesterday"), None);
        assert_eq!(parse_timestamp("2024-05-01"), None);
        assert_eq!(parse_timestamp("2024-13-01T10:00:00"), None);
    }

    #[test]
    fn test_normalize_keeps_fields() {
        let record = normalize(raw("2024-05-01T10:00:00")).unwrap();
        assert_eq!(record.record_id, 10);
        assert_eq!(record.timestamp_ms, 1_714_557_600_000);
        assert_eq!(record.preset_id, Some(4));

        assert!(normalize(raw("not a time")).is_none());
    }
}
