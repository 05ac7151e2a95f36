//! Log line model

use serde::{Deserialize, Serialize};

/// Display classification of a log line.
///
/// Only used for styling; status transitions never depend on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineClass {
    #[default]
    Normal,
    Warning,
    Error,
    SuccessMarker,
}

impl LineClass {
    /// Classify by case-insensitive substring, first match wins
    pub fn of(text: &str) -> Self {
        let lower = text.to_lowercase();
        if lower.contains("error") {
            LineClass::Error
        } else if lower.contains("warn") {
            LineClass::Warning
        } else if lower.contains("success") || lower.contains('✓') {
            LineClass::SuccessMarker
        } else {
            LineClass::Normal
        }
    }
}

/// One unit of build output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLine {
    /// Ingestion order within the session, assigned by the buffer
    pub sequence: u64,

    /// Raw content
    pub text: String,

    /// Display classification
    pub class: LineClass,
}

impl LogLine {
    pub fn new(sequence: u64, text: String) -> Self {
        let class = LineClass::of(&text);
        Self {
            sequence,
            text,
            class,
        }
    }
}
