use crate::claude::StoreKind;
use crate::claude::paths::ClaudePaths;
use crate::reconcile::apply::{ApplyOutcome, ApplyState};
use crate::reconcile::util::now_epoch_secs;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Backup written during an apply, with the digest taken at capture time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedBackup {
    pub path: PathBuf,
    pub sha256: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    pub at_epoch_secs: u64,
    pub intent: String,
    pub state: ApplyState,
    pub folder_moved: bool,
    pub updated: Vec<StoreKind>,
    pub pending: Vec<StoreKind>,
    pub backups: Vec<RecordedBackup>,
    pub error: Option<String>,
}

#[derive(Deserialize)]
struct RecordedEvent {
    #[serde(default)]
    backups: Vec<RecordedBackup>,
}

impl AuditEvent {
    pub fn from_outcome(outcome: &ApplyOutcome) -> Result<Self> {
        Ok(Self {
            at_epoch_secs: now_epoch_secs()?,
            intent: outcome.plan.intent.to_string(),
            state: outcome.state,
            folder_moved: outcome.folder_moved,
            updated: outcome.updated.clone(),
            pending: outcome.pending.clone(),
            backups: outcome
                .backups
                .iter()
                .map(|b| RecordedBackup {
                    path: b.path.clone(),
                    sha256: b.sha256.clone(),
                })
                .collect(),
            error: outcome.error.as_ref().map(|err| err.to_string()),
        })
    }
}

pub fn append_event(paths: &ClaudePaths, event: &AuditEvent) -> Result<()> {
    fs::create_dir_all(&paths.backups_dir)
        .with_context(|| format!("failed to create {}", paths.backups_dir.display()))?;
    let line = format!("{}\n", serde_json::to_string(event)?);
    let path = paths.audit_file();
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

/// Append the outcome of one apply. A failed write is logged and dropped.
pub fn record(paths: &ClaudePaths, outcome: &ApplyOutcome) {
    let written = AuditEvent::from_outcome(outcome).and_then(|event| append_event(paths, &event));
    if let Err(err) = written {
        tracing::warn!(error = %format!("{err:#}"), "failed to append audit event");
    }
}

/// Digest logged when `backup` was captured. Matched on file name, since
/// backup names are unique within the backup directory.
pub fn recorded_digest(paths: &ClaudePaths, backup: &Path) -> Result<Option<String>> {
    let audit = paths.audit_file();
    if !audit.exists() {
        return Ok(None);
    }
    let Some(name) = backup.file_name() else {
        return Ok(None);
    };
    let text = fs::read_to_string(&audit)
        .with_context(|| format!("failed to read {}", audit.display()))?;

    let mut found = None;
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        let Ok(event) = serde_json::from_str::<RecordedEvent>(line) else {
            tracing::debug!(audit = %audit.display(), "skipping unparsable audit line");
            continue;
        };
        if let Some(hit) = event
            .backups
            .into_iter()
            .find(|b| b.path.file_name() == Some(name))
        {
            found = Some(hit.sha256);
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn recorded_digest_finds_the_latest_entry_by_name() {
        let tmp = tempdir().expect("tempdir");
        let paths = ClaudePaths::under(tmp.path().join(".claude"));
        assert_eq!(
            recorded_digest(&paths, Path::new("/x/history.1.jsonl")).expect("no audit"),
            None
        );

        fs::create_dir_all(&paths.backups_dir).expect("mkdir backups");
        let lines = concat!(
            "{\"backups\":[{\"path\":\"/old/history.1.jsonl\",\"sha256\":\"aa\"}]}\n",
            "not json\n",
            "{\"backups\":[]}\n",
            "{\"backups\":[{\"path\":\"/old/history.1.jsonl\",\"sha256\":\"bb\"}]}\n",
        );
        fs::write(paths.audit_file(), lines).expect("audit");

        let moved = paths.backups_dir.join("history.1.jsonl");
        assert_eq!(
            recorded_digest(&paths, &moved).expect("lookup"),
            Some("bb".to_string())
        );
        assert_eq!(
            recorded_digest(&paths, Path::new("/x/dictionary.1.json")).expect("lookup"),
            None
        );
    }
}
