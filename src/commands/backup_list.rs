use anyhow::Result;
use serde_json::json;
use std::path::PathBuf;

use crate::commands::{CommandReport, load_environment};
use crate::reconcile::backup::{BackupManager, BackupSnapshot};

#[derive(Debug, Clone, Default)]
pub struct BackupListOptions {
    pub claude_dir: Option<PathBuf>,
}

fn describe(snapshot: &BackupSnapshot) -> String {
    let mut line = format!(
        "{} {} {} bytes={}",
        snapshot.captured_at,
        snapshot.store,
        snapshot.path.display(),
        snapshot.bytes
    );
    if let Some(identifier) = &snapshot.identifier {
        line.push_str(&format!(" identifier={identifier}"));
    }
    line
}

pub fn run(opts: &BackupListOptions) -> Result<CommandReport> {
    let (_, paths) = load_environment(opts.claude_dir.as_deref())?;
    let mut report = CommandReport::new("backups");
    report.detail(format!("backups_dir={}", paths.backups_dir.display()));

    let backups = BackupManager::new(&paths).list()?;
    for snapshot in &backups {
        report.detail(describe(snapshot));
    }
    report.detail(format!("{} backup(s)", backups.len()));
    report.data = Some(json!({ "backups": backups }));
    Ok(report)
}
