//! Terminal rendering of a deployment view

use colored::Colorize;

use crate::models::log_line::{LineClass, LogLine};
use crate::models::status::DeploymentStatus;
use crate::observe::view::ViewState;

/// Format one line with its 1-based position in the view
pub fn format_line(number: usize, line: &LogLine) -> String {
    let text = match line.class {
        LineClass::Error => line.text.red().to_string(),
        LineClass::Warning => line.text.yellow().to_string(),
        LineClass::SuccessMarker => line.text.green().to_string(),
        LineClass::Normal => line.text.clone(),
    };
    format!("{} {}", format!("{:>4}", number).dimmed(), text)
}

/// Format the closing summary of a watch run
pub fn format_summary(state: &ViewState) -> String {
    let headline = state.status.headline();
    let mut output = match state.status {
        DeploymentStatus::Success => format!("{} {}", "✓".green(), headline.green().bold()),
        DeploymentStatus::Failed => format!("{} {}", "✗".red(), headline.red().bold()),
        _ => headline.yellow().to_string(),
    };

    if let Some(message) = state.error_message() {
        output.push_str(&format!("\n{}", message.red()));
    }
    if let Some(url) = &state.artifact_url {
        output.push_str(&format!("\nLive at {}", url.cyan().underline()));
    }
    output
}

/// Prints each line of a changing view exactly once
#[derive(Debug, Default)]
pub struct LinePrinter {
    last_sequence: Option<u64>,
}

impl LinePrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Format the lines of `state` not printed yet.
    ///
    /// Sequence numbers only grow within a session, so anything above the
    /// last printed one is new even after a poll replaced the tail.
    pub fn render_new(&mut self, state: &ViewState) -> Vec<String> {
        let mut output = Vec::new();
        for (index, line) in state.lines.iter().enumerate() {
            if self.last_sequence.is_some_and(|last| line.sequence <= last) {
                continue;
            }
            output.push(format_line(index + 1, line));
            self.last_sequence = Some(line.sequence);
        }
        output
    }
}
