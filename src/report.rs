//! Rendering poll reports for stdout.

use anyhow::Context;
use anyhow::Result;

use crate::config::OutputFormat;
use crate::domain::PollReport;

/// Render the events of a poll as output lines.
///
/// Polls without logins or awoken users render nothing.
pub fn render_events(report: &PollReport, format: OutputFormat) -> Result<Vec<String>> {
    if !report.has_events() {
        return Ok(Vec::new());
    }

    match format {
        OutputFormat::Text => {
            let logins = report
                .new_logins
                .iter()
                .map(|user| format!("[LOGIN] | user={user}"));
            let active = report
                .newly_active
                .iter()
                .map(|user| format!("[ACTIVE] | user={user}"));
            Ok(logins.chain(active).collect())
        }
        OutputFormat::Json => {
            let line = serde_json::to_string(report).context("Failed to serialize poll report")?;
            Ok(vec![line])
        }
    }
}
