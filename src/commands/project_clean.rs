use anyhow::{Result, anyhow};
use std::path::PathBuf;

use crate::commands::{
    CommandReport, absolute_path, load_environment, note_anomalies, report_outcome,
};
use crate::reconcile::apply::{ApplyOptions, Executor};
use crate::reconcile::plan::{CleanTarget, plan_clean};
use crate::reconcile::scan::scan;

#[derive(Debug, Clone, Default)]
pub struct ProjectCleanOptions {
    pub claude_dir: Option<PathBuf>,
    pub paths: Vec<PathBuf>,
    pub force: bool,
    pub dry_run: bool,
    pub no_backup: bool,
}

fn clean_target(opts: &ProjectCleanOptions) -> Result<CleanTarget> {
    if opts.paths.is_empty() {
        return Ok(CleanTarget::All);
    }
    let mut targets = Vec::with_capacity(opts.paths.len());
    for raw in &opts.paths {
        let path = absolute_path(raw)?;
        let text = path
            .to_str()
            .ok_or_else(|| anyhow!("{} is not valid UTF-8", path.display()))?;
        targets.push(text.to_string());
    }
    Ok(CleanTarget::Paths(targets))
}

pub fn run(opts: &ProjectCleanOptions) -> Result<CommandReport> {
    let (cfg, paths) = load_environment(opts.claude_dir.as_deref())?;
    let mut report = CommandReport::new("clean");

    let target = clean_target(opts)?;
    let report_only = target == CleanTarget::All && !opts.force;
    if report_only {
        report.detail("no --path or --force given; reporting what would be cleaned");
    }

    let snapshot = scan(&paths);
    note_anomalies(&mut report, &snapshot);

    let plan = match plan_clean(&target, &snapshot) {
        Ok(plan) => plan,
        Err(err) => {
            report.fail(&err);
            return Ok(report);
        }
    };

    let options = ApplyOptions {
        dry_run: opts.dry_run || report_only,
        backup: cfg.backup.enabled && !opts.no_backup,
    };
    let outcome = Executor::new(&paths).apply(plan, options);
    report_outcome(&mut report, &outcome);
    Ok(report)
}
