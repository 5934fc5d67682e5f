// Push frame decoding - the only place that inspects raw message shapes
use crate::domain::telemetry::RawRecord;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Full history for the current window; replaces what the units hold.
    History(Vec<RawRecord>),
    /// Incremental records appended to what is already held.
    Append(Vec<RawRecord>),
}

impl Envelope {
    pub fn is_history(&self) -> bool {
        matches!(self, Envelope::History(_))
    }

    pub fn into_records(self) -> Vec<RawRecord> {
        match self {
            Envelope::History(records) | Envelope::Append(records) => records,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedFrame {
    pub envelope: Envelope,
    /// Entries that were present but did not deserialize as records.
    pub dropped: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unrecognised frame shape")]
    UnknownShape,
    #[error("unknown envelope kind: {0}")]
    UnknownKind(String),
}

/// Decode a text frame.
///
/// Accepts the tagged form `{"kind": "history"|"append", "records": [...]}`
/// as well as the older `{"history": [...]}` object and bare record arrays.
pub fn decode_frame(text: &str) -> Result<DecodedFrame, WireError> {
    let value: Value = serde_json::from_str(text)?;

    let (history, items) = match value {
        Value::Array(items) => (false, items),
        Value::Object(mut map) => match map.get("kind").and_then(Value::as_str) {
            Some(kind) => {
                let history = match kind {
                    "history" => true,
                    "append" => false,
                    other => return Err(WireError::UnknownKind(other.to_string())),
                };
                match map.remove("records") {
                    Some(Value::Array(items)) => (history, items),
                    _ => return Err(WireError::UnknownShape),
                }
            }
            None => match map.remove("history") {
                Some(Value::Array(items)) => (true, items),
                _ => return Err(WireError::UnknownShape),
            },
        },
        _ => return Err(WireError::UnknownShape),
    };

    let total = items.len();
    let records: Vec<RawRecord> = items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect();
    let dropped = total - records.len();

    let envelope = if history {
        Envelope::History(records)
    } else {
        Envelope::Append(records)
    };
    Ok(DecodedFrame { envelope, dropped })
}
