//! Ordered log line buffer

use crate::models::log_line::LogLine;

/// Result of a full-replace reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Replacement {
    /// Lines kept from the previous contents (a prefix)
    pub retained: usize,

    /// Lines added after the retained prefix
    pub appended: Vec<LogLine>,
}

impl Replacement {
    /// True when the buffer ended up exactly as before
    pub fn is_noop(&self, previous_len: usize) -> bool {
        self.appended.is_empty() && self.retained == previous_len
    }
}

/// Append-only ordered sequence of log lines.
///
/// Sequence numbers are strictly increasing and never reused, even when a
/// replace discards a suffix. Only `reset` restarts numbering.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer {
    lines: Vec<LogLine>,
    next_sequence: u64,
}

fn is_blank(text: &str) -> bool {
    text.trim().is_empty()
}

impl LogBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Append one line. Blank input is dropped.
    pub fn append(&mut self, text: impl Into<String>) -> Option<LogLine> {
        let text = text.into();
        if is_blank(&text) {
            return None;
        }
        let line = LogLine::new(self.next_sequence, text);
        self.next_sequence += 1;
        self.lines.push(line.clone());
        Some(line)
    }

    /// Append each non-blank text in order
    pub fn append_many<I, S>(&mut self, texts: I) -> Vec<LogLine>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        texts
            .into_iter()
            .filter_map(|text| self.append(text))
            .collect()
    }

    /// Treat `texts` as the complete authoritative contents.
    ///
    /// The common prefix keeps its sequence numbers; everything after the
    /// first divergence is dropped and re-appended.
    pub fn replace_all<I, S>(&mut self, texts: I) -> Replacement
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let incoming: Vec<String> = texts
            .into_iter()
            .map(Into::into)
            .filter(|text| !is_blank(text))
            .collect();

        let retained = self
            .lines
            .iter()
            .zip(incoming.iter())
            .take_while(|(line, text)| line.text == **text)
            .count();

        self.lines.truncate(retained);
        let appended = self.append_many(incoming.into_iter().skip(retained));

        Replacement { retained, appended }
    }

    /// Ordered copy of the current lines
    pub fn snapshot(&self) -> Vec<LogLine> {
        self.lines.clone()
    }

    pub fn lines(&self) -> &[LogLine] {
        &self.lines
    }

    /// Drop everything and restart numbering
    pub fn reset(&mut self) {
        self.lines.clear();
        self.next_sequence = 0;
    }
}
