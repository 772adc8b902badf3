//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying run outcomes and
//! stored state to the user in various formats.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::dispatch::ProvisionOutcome;
use crate::persist::VersionMeta;
use crate::status::RunState;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// One stored version together with its resource kind, for display.
#[derive(Debug, Clone)]
pub struct VersionRow {
    /// Resource kind label.
    pub kind: String,
    /// Resource name.
    pub name: String,
    /// Version bookkeeping.
    pub meta: VersionMeta,
}

/// Run step row for table display.
#[derive(Tabled)]
struct StepRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Result")]
    result: String,
}

/// Stored resource row for table display.
#[derive(Tabled)]
struct StateRow {
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Version")]
    version: u32,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Since")]
    since: String,
}

#[derive(Serialize)]
struct OutcomeJson {
    run_id: String,
    state: String,
    steps: Vec<StepJson>,
    warnings: Vec<String>,
    error: Option<String>,
}

#[derive(Serialize)]
struct StepJson {
    resource: String,
    result: String,
}

#[derive(Serialize)]
struct VersionJson {
    kind: String,
    name: String,
    entity_id: String,
    version: u32,
    current: bool,
    deleted: bool,
    deletion_reason: Option<String>,
    valid_from: String,
    valid_to: Option<String>,
    run_id: String,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a run outcome for display.
    #[must_use]
    pub fn format_outcome(&self, outcome: &ProvisionOutcome) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&OutcomeJson::from(outcome)).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_outcome_text(outcome),
        }
    }

    fn format_outcome_text(outcome: &ProvisionOutcome) -> String {
        let mut output = String::new();

        let rows: Vec<StepRow> = outcome
            .status
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| StepRow {
                index: i + 1,
                resource: step.label.clone(),
                result: Self::truncate(&step.detail, 50),
            })
            .collect();
        if !rows.is_empty() {
            output.push('\n');
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        let state = match outcome.status.state {
            RunState::Succeeded => outcome.status.state.to_string().green(),
            RunState::RolledBack | RunState::Running => outcome.status.state.to_string().yellow(),
            RunState::PartiallyRolledBack | RunState::Failed => {
                outcome.status.state.to_string().red()
            }
        };
        let _ = write!(output, "\nRun {}: {state}", outcome.status.run_id);

        if let Some(persist) = &outcome.persist {
            let _ = write!(
                output,
                "\nState: {} created, {} updated, {} unchanged, {} removed",
                persist.created.to_string().green(),
                persist.updated.to_string().yellow(),
                persist.unchanged,
                persist.soft_deleted.to_string().red()
            );
            if persist.propagated + persist.pruned > 0 {
                let _ = write!(
                    output,
                    " ({} repointed, {} pruned)",
                    persist.propagated, persist.pruned
                );
            }
        }

        if let Some(rollback) = &outcome.rollback {
            let _ = write!(
                output,
                "\nRollback: {}/{} mutation(s) undone",
                rollback.undone, rollback.total
            );
            if rollback.timed_out {
                let _ = write!(output, " {}", "(budget elapsed)".red());
            }
        }

        if !outcome.status.warnings.is_empty() {
            let _ = write!(output, "\n\n{} Warnings:", "⚠".yellow());
            for warning in &outcome.status.warnings {
                let _ = write!(output, "\n   - {warning}");
            }
        }

        if let Some(error) = &outcome.error {
            let _ = write!(output, "\n\n{} {error}", "✗".red());
        }

        output.push('\n');
        output
    }

    /// Formats stored versions for display.
    #[must_use]
    pub fn format_versions(&self, rows: &[VersionRow]) -> String {
        match self.format {
            OutputFormat::Json => {
                let json: Vec<VersionJson> = rows.iter().map(VersionJson::from).collect();
                serde_json::to_string_pretty(&json).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_versions_text(rows),
        }
    }

    fn format_versions_text(rows: &[VersionRow]) -> String {
        if rows.is_empty() {
            return String::from("No resources on record.\n");
        }

        let table_rows: Vec<StateRow> = rows
            .iter()
            .map(|row| StateRow {
                kind: row.kind.clone(),
                name: row.name.clone(),
                version: row.meta.version,
                state: version_state(&row.meta),
                since: row.meta.valid_from.format("%Y-%m-%d %H:%M:%S").to_string(),
            })
            .collect();

        let mut output = Table::new(table_rows).to_string();
        output.push('\n');
        output
    }

    /// Truncates a string for table display.
    fn truncate(s: &str, max: usize) -> String {
        if s.chars().count() <= max {
            s.to_string()
        } else {
            let cut: String = s.chars().take(max.saturating_sub(1)).collect();
            format!("{cut}…")
        }
    }
}

fn version_state(meta: &VersionMeta) -> String {
    if meta.is_deleted && meta.is_current {
        "deleted".red().to_string()
    } else if meta.is_current {
        "current".green().to_string()
    } else {
        String::from("superseded")
    }
}

impl From<&ProvisionOutcome> for OutcomeJson {
    fn from(outcome: &ProvisionOutcome) -> Self {
        Self {
            run_id: outcome.status.run_id.to_string(),
            state: outcome.status.state.to_string(),
            steps: outcome
                .status
                .steps
                .iter()
                .map(|s| StepJson {
                    resource: s.label.clone(),
                    result: s.detail.clone(),
                })
                .collect(),
            warnings: outcome.status.warnings.clone(),
            error: outcome.error.clone(),
        }
    }
}

impl From<&VersionRow> for VersionJson {
    fn from(row: &VersionRow) -> Self {
        Self {
            kind: row.kind.clone(),
            name: row.name.clone(),
            entity_id: row.meta.entity_id.to_string(),
            version: row.meta.version,
            current: row.meta.is_current,
            deleted: row.meta.is_deleted,
            deletion_reason: row.meta.deletion_reason.clone(),
            valid_from: row.meta.valid_from.to_rfc3339(),
            valid_to: row.meta.valid_to.map(|t| t.to_rfc3339()),
            run_id: row.meta.run_id.to_string(),
        }
    }
}
