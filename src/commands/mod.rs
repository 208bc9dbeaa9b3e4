pub mod backup_list;
pub mod backup_restore;
pub mod project_clean;
pub mod project_list;
pub mod project_move;

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::{Value, json};
use std::env;
use std::path::{Component, Path, PathBuf};

use crate::claude::paths::{ClaudePaths, resolve_paths};
use crate::error::ReconcileError;
use crate::reconcile::apply::{ApplyOutcome, ApplyState};
use crate::reconcile::config::{ClaudingConfig, load_config};
use crate::reconcile::scan::Snapshot;

#[derive(Debug, Clone, Serialize)]
pub struct CommandReport {
    pub command: String,
    pub ok: bool,
    pub details: Vec<String>,
    pub warnings: Vec<String>,
    pub issues: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl CommandReport {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ok: true,
            details: Vec::new(),
            warnings: Vec::new(),
            issues: Vec::new(),
            data: None,
        }
    }

    pub fn detail(&mut self, text: impl Into<String>) {
        self.details.push(text.into());
    }

    pub fn warn(&mut self, text: impl Into<String>) {
        self.warnings.push(text.into());
    }

    pub fn issue(&mut self, text: impl Into<String>) {
        self.ok = false;
        self.issues.push(text.into());
    }

    pub fn fail(&mut self, err: &ReconcileError) {
        self.issue(format!("{}: {err}", err.code().as_str()));
    }
}

pub fn load_environment(claude_dir: Option<&Path>) -> Result<(ClaudingConfig, ClaudePaths)> {
    let cfg = load_config()?;
    let paths = resolve_paths(&cfg, claude_dir)?;
    Ok((cfg, paths))
}

/// Absolute form of a user-supplied path, cleaned lexically. Symlinks are
/// left alone because the stores hold the literal path Claude was run from.
pub fn absolute_path(raw: &Path) -> Result<PathBuf> {
    let joined = if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        env::current_dir()
            .context("failed to read the working directory")?
            .join(raw)
    };

    let mut out = PathBuf::new();
    for component in joined.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    Ok(out)
}

pub fn note_anomalies(report: &mut CommandReport, snapshot: &Snapshot) {
    for anomaly in &snapshot.anomalies {
        let err = anomaly.to_error();
        report.warn(format!("{}: {err}", err.code().as_str()));
    }
}

/// Fold an executor outcome into the report shared by `move` and `clean`.
pub fn report_outcome(report: &mut CommandReport, outcome: &ApplyOutcome) {
    let plan = &outcome.plan;
    report.detail(format!("intent: {}", plan.intent));
    for skipped in &plan.skipped {
        report.warn(format!("skipped {skipped}"));
    }

    if plan.is_empty() {
        report.detail("nothing to do");
    } else if outcome.state == ApplyState::DryRunReported {
        for edit in &plan.edits {
            report.detail(format!("would apply {edit}"));
        }
    } else {
        for change in &outcome.changes {
            report.detail(change.clone());
        }
    }
    for backup in &outcome.backups {
        report.detail(format!("backup: {}", backup.path.display()));
    }
    if outcome.backups_skipped && outcome.state != ApplyState::DryRunReported && !plan.is_empty() {
        report.warn("backups disabled; no rollback net for these edits");
    }
    report.detail(format!("state: {}", outcome.state.as_str()));
    if let Some(err) = &outcome.error {
        report.fail(err);
    }

    report.data = Some(json!({
        "state": outcome.state,
        "plan": plan,
        "folder_moved": outcome.folder_moved,
        "updated": outcome.updated,
        "pending": outcome.pending,
        "backups": outcome.backups,
    }));
}
