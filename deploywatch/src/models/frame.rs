//! Inbound frame decoding
//!
//! Backends push either a JSON record `{logs, status}` or bare text lines,
//! without negotiating which. Every frame is parsed as JSON first and falls
//! back to plain text.

use serde::Deserialize;
use serde_json::Value;

use crate::errors::ObserverError;

/// Payload as delivered by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawFrame {
    Text(String),
    Binary(Vec<u8>),
}

/// A decoded inbound frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Full snapshot record. `logs` replaces the visible buffer when present.
    Structured {
        logs: Option<Vec<String>>,
        status: Option<String>,
    },

    /// One trimmed, non-empty line of output
    PlainText { text: String },
}

#[derive(Deserialize)]
struct StructuredRecord {
    #[serde(default)]
    logs: Option<Vec<String>>,
    #[serde(default)]
    status: Option<String>,
}

impl Frame {
    /// Decode a text payload.
    ///
    /// Returns `Ok(None)` for blank payloads. A JSON object that carries a
    /// `logs` or `status` key of the wrong shape is ambiguous and rejected.
    pub fn decode(raw: &str) -> Result<Option<Frame>, ObserverError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
            if map.contains_key("logs") || map.contains_key("status") {
                let record: StructuredRecord = serde_json::from_value(Value::Object(map))
                    .map_err(|e| ObserverError::DecodeError(format!("malformed record: {}", e)))?;
                return Ok(Some(Frame::Structured {
                    logs: record.logs,
                    status: record.status,
                }));
            }
        }

        Ok(Some(Frame::PlainText {
            text: trimmed.to_string(),
        }))
    }

    /// Decode whatever a transport delivered
    pub fn decode_raw(raw: &RawFrame) -> Result<Option<Frame>, ObserverError> {
        match raw {
            RawFrame::Text(text) => Self::decode(text),
            RawFrame::Binary(bytes) => {
                let text = std::str::from_utf8(bytes)
                    .map_err(|e| ObserverError::DecodeError(format!("binary frame: {}", e)))?;
                Self::decode(text)
            }
        }
    }
}
