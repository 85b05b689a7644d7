use std::io::BufRead;
use std::path::Path;

use base64::Engine;
use serde::Deserialize;

use lens_engine::{MemoryBackend, StoredMessage};

use crate::error::CliError;

/// One line of a record dump.
#[derive(Debug, Deserialize)]
struct DumpLine {
    topic: String,
    #[serde(default)]
    partition: i32,
    #[serde(default)]
    key: String,
    /// Text payload.
    #[serde(default)]
    payload: Option<String>,
    /// Binary payload, standard base64.
    #[serde(default)]
    payload_b64: Option<String>,
    #[serde(default)]
    ts_ms: Option<i64>,
    #[serde(default)]
    decode_error: Option<String>,
}

impl DumpLine {
    fn into_message(self) -> Result<(String, i32, StoredMessage), String> {
        let mut decode_error = self.decode_error;
        let payload = match (self.payload, self.payload_b64) {
            (Some(text), None) => text,
            (None, Some(b64)) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(b64.trim())
                    .map_err(|e| format!("payload_b64: {e}"))?;
                match String::from_utf8(bytes) {
                    Ok(text) => text,
                    Err(e) => {
                        decode_error.get_or_insert_with(|| "payload is not valid UTF-8".into());
                        String::from_utf8_lossy(e.as_bytes()).into_owned()
                    }
                }
            }
            (None, None) => String::new(),
            (Some(_), Some(_)) => return Err("both payload and payload_b64 given".into()),
        };
        Ok((
            self.topic,
            self.partition,
            StoredMessage {
                key: self.key,
                payload,
                ts_ms: self.ts_ms,
                decode_error,
            },
        ))
    }
}

/// Load a JSON-lines dump into `backend`. Blank lines are skipped.
/// Returns the number of messages loaded.
pub fn load(path: &Path, backend: &MemoryBackend) -> Result<usize, CliError> {
    let display = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|e| CliError::Dump {
        path: display.clone(),
        line: 0,
        detail: e.to_string(),
    })?;

    let mut loaded = 0;
    for (idx, line) in std::io::BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let dump_err = |detail: String| CliError::Dump {
            path: display.clone(),
            line: idx + 1,
            detail,
        };
        let parsed: DumpLine = serde_json::from_str(&line).map_err(|e| dump_err(e.to_string()))?;
        if parsed.partition < 0 {
            return Err(dump_err(format!("negative partition {}", parsed.partition)));
        }
        let (topic, partition, message) = parsed.into_message().map_err(dump_err)?;
        backend.append(&topic, partition, message);
        loaded += 1;
    }
    tracing::info!(path = %path.display(), records = loaded, "dump loaded");
    Ok(loaded)
}
