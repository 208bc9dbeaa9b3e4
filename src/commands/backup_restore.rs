use anyhow::Result;
use serde_json::json;
use std::path::PathBuf;

use crate::commands::{CommandReport, absolute_path, load_environment};
use crate::reconcile::backup::BackupManager;

#[derive(Debug, Clone, Default)]
pub struct BackupRestoreOptions {
    pub claude_dir: Option<PathBuf>,
    pub backup_path: PathBuf,
}

pub fn run(opts: &BackupRestoreOptions) -> Result<CommandReport> {
    let (_, paths) = load_environment(opts.claude_dir.as_deref())?;
    let mut report = CommandReport::new("restore");
    let manager = BackupManager::new(&paths);
    let backup_path = absolute_path(&opts.backup_path)?;
    report.detail(format!("backup={}", backup_path.display()));

    let located = match manager.locate(&backup_path) {
        Ok(located) => located,
        Err(err) => {
            report.fail(&err);
            return Ok(report);
        }
    };
    if !located.digest_recorded {
        report.warn("no digest recorded for this backup in the audit trail; content not verified");
    }
    let snapshot = located.snapshot;
    if let Err(err) = manager.restore(&snapshot) {
        report.fail(&err);
        return Ok(report);
    }

    report.detail(format!(
        "restored {} to {}",
        snapshot.store,
        snapshot.source.display()
    ));
    report.data = Some(json!({
        "restored": snapshot,
        "digest_recorded": located.digest_recorded,
    }));
    Ok(report)
}
