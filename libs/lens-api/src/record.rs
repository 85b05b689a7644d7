use serde::{Deserialize, Serialize};

/// One consumed record, as handed to the presentation layer.
///
/// Immutable once appended to a buffer. A record whose payload could not
/// be decoded against the active schema still arrives: `payload` then holds
/// a lossy text fallback and `decode_error` carries the reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// `"{partition}-{offset}"`, unique within one buffer.
    pub id: String,
    pub partition: i32,
    /// May be empty.
    pub key: String,
    pub offset: i64,
    pub payload: String,
    /// RFC 3339, empty when the broker supplied no timestamp.
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decode_error: Option<String>,
}

impl Record {
    pub fn new(
        partition: i32,
        offset: i64,
        key: impl Into<String>,
        payload: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            id: record_id(partition, offset),
            partition,
            key: key.into(),
            offset,
            payload: payload.into(),
            timestamp: timestamp.into(),
            decode_error: None,
        }
    }

    /// Attach a decode-failure annotation.
    pub fn with_decode_error(mut self, message: impl Into<String>) -> Self {
        self.decode_error = Some(message.into());
        self
    }

    pub fn has_decode_error(&self) -> bool {
        self.decode_error.is_some()
    }
}

pub fn record_id(partition: i32, offset: i64) -> String {
    format!("{partition}-{offset}")
}

/// Render broker milliseconds as RFC 3339 (UTC). Out-of-range values
/// render as an empty string.
pub fn format_timestamp_ms(ms: i64) -> String {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default()
}
