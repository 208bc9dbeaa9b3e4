use anyhow::Result;
use std::path::PathBuf;

use crate::commands::{
    CommandReport, absolute_path, load_environment, note_anomalies, report_outcome,
};
use crate::reconcile::apply::{ApplyOptions, Executor};
use crate::reconcile::plan::plan_move;
use crate::reconcile::scan::scan;

#[derive(Debug, Clone, Default)]
pub struct ProjectMoveOptions {
    pub claude_dir: Option<PathBuf>,
    pub old_path: PathBuf,
    pub new_path: PathBuf,
    pub dry_run: bool,
    pub no_backup: bool,
}

pub fn run(opts: &ProjectMoveOptions) -> Result<CommandReport> {
    let (cfg, paths) = load_environment(opts.claude_dir.as_deref())?;
    let mut report = CommandReport::new("move");

    let old_path = absolute_path(&opts.old_path)?;
    let new_path = absolute_path(&opts.new_path)?;
    report.detail(format!("old_path={}", old_path.display()));
    report.detail(format!("new_path={}", new_path.display()));

    let snapshot = scan(&paths);
    note_anomalies(&mut report, &snapshot);

    let plan = match plan_move(&old_path, &new_path, &snapshot) {
        Ok(plan) => plan,
        Err(err) => {
            report.fail(&err);
            return Ok(report);
        }
    };

    let options = ApplyOptions {
        dry_run: opts.dry_run,
        backup: cfg.backup.enabled && !opts.no_backup,
    };
    let outcome = Executor::new(&paths).apply(plan, options);
    report_outcome(&mut report, &outcome);
    Ok(report)
}
