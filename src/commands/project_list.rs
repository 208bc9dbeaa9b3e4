use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;

use crate::claude::StoreKind;
use crate::commands::{CommandReport, load_environment, note_anomalies};
use crate::reconcile::scan::{Health, ProjectRecord, scan};

#[derive(Debug, Clone, Default)]
pub struct ProjectListOptions {
    pub claude_dir: Option<PathBuf>,
    pub problems_only: bool,
}

#[derive(Debug, Serialize)]
struct ListedRecord<'a> {
    #[serde(flatten)]
    record: &'a ProjectRecord,
    health: Health,
    sources: Vec<StoreKind>,
}

fn health_label(health: Health) -> &'static str {
    match health {
        Health::Healthy => "healthy",
        Health::Orphaned => "orphaned",
        Health::Ambiguous => "ambiguous",
    }
}

fn describe(record: &ProjectRecord) -> String {
    let path = record.original_path.as_deref().unwrap_or("<unknown path>");
    let mut line = format!(
        "[{}] {path} id={} sessions={} history={} config={}",
        health_label(record.health()),
        record.identifier,
        record.session_file_count,
        record.log_reference_count,
        if record.in_config_dict { "yes" } else { "no" },
    );
    if !record.alternate_paths.is_empty() {
        line.push_str(&format!(" also={}", record.alternate_paths.join(",")));
    }
    line
}

pub fn run(opts: &ProjectListOptions) -> Result<CommandReport> {
    let (_, paths) = load_environment(opts.claude_dir.as_deref())?;
    let mut report = CommandReport::new("list");
    report.detail(format!("claude_dir={}", paths.claude_dir.display()));

    let snapshot = scan(&paths);
    note_anomalies(&mut report, &snapshot);

    let listed: Vec<ListedRecord<'_>> = snapshot
        .records
        .values()
        .filter(|record| !opts.problems_only || record.health() != Health::Healthy)
        .map(|record| ListedRecord {
            record,
            health: record.health(),
            sources: record.sources(),
        })
        .collect();
    for entry in &listed {
        report.detail(describe(entry.record));
    }

    let classes = snapshot.classification();
    report.detail(format!(
        "{} project(s): {} healthy, {} orphaned, {} ambiguous",
        snapshot.records.len(),
        classes.healthy.len(),
        classes.orphaned.len(),
        classes.ambiguous.len()
    ));

    report.data = Some(json!({
        "records": listed,
        "classification": classes,
        "anomalies": snapshot.anomalies,
    }));
    Ok(report)
}
