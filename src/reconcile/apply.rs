use crate::claude::paths::ClaudePaths;
use crate::claude::sessions::session_dir;
use crate::claude::{StoreKind, dictionary, history};
use crate::error::ReconcileError;
use crate::reconcile::audit;
use crate::reconcile::backup::{BackupManager, BackupSnapshot};
use crate::reconcile::plan::{ReconciliationPlan, StoreEdit};
use crate::reconcile::util::{copy_tree, write_atomic};
use anyhow::{Context, Result, anyhow, bail};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOptions {
    pub dry_run: bool,
    /// Snapshot each store before it is rewritten or removed.
    pub backup: bool,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            backup: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyState {
    DryRunReported,
    Succeeded,
    PartiallyApplied,
    Aborted,
}

impl ApplyState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DryRunReported => "dry_run_reported",
            Self::Succeeded => "succeeded",
            Self::PartiallyApplied => "partially_applied",
            Self::Aborted => "aborted",
        }
    }
}

#[derive(Debug)]
pub struct ApplyOutcome {
    pub state: ApplyState,
    pub plan: ReconciliationPlan,
    pub folder_moved: bool,
    pub updated: Vec<StoreKind>,
    pub pending: Vec<StoreKind>,
    pub backups: Vec<BackupSnapshot>,
    pub backups_skipped: bool,
    pub changes: Vec<String>,
    pub error: Option<ReconcileError>,
}

impl ApplyOutcome {
    pub fn ok(&self) -> bool {
        matches!(self.state, ApplyState::DryRunReported | ApplyState::Succeeded)
    }
}

enum EditFailure {
    Backup(anyhow::Error),
    Write(anyhow::Error),
    /// The store was changed before the edit failed.
    Partial {
        change: String,
        cause: anyhow::Error,
    },
}

impl EditFailure {
    fn into_error(self, store: StoreKind) -> ReconcileError {
        match self {
            Self::Backup(cause) => ReconcileError::Backup { store, cause },
            Self::Write(cause) | Self::Partial { cause, .. } => {
                ReconcileError::StoreWrite { store, cause }
            }
        }
    }
}

fn move_folder(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "destination appeared after planning",
        ));
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::CrossesDevices => copy_then_remove(from, to),
        Err(err) => Err(err),
    }
}

fn copy_then_remove(from: &Path, to: &Path) -> io::Result<()> {
    if let Err(err) = copy_tree(from, to) {
        let _ = fs::remove_dir_all(to);
        return Err(io::Error::other(format!("{err:#}")));
    }
    if let Err(err) = fs::remove_dir_all(from) {
        tracing::warn!(
            source = %from.display(),
            error = %err,
            "folder copied across devices but the source could not be removed"
        );
    }
    Ok(())
}

/// Applies a plan: folder move first, then session store, history and
/// dictionary. The first failure stops the run; nothing already done is
/// reversed.
#[derive(Debug, Clone)]
pub struct Executor {
    paths: ClaudePaths,
    backups: BackupManager,
}

impl Executor {
    pub fn new(paths: &ClaudePaths) -> Self {
        Self {
            paths: paths.clone(),
            backups: BackupManager::new(paths),
        }
    }

    pub fn apply(&self, plan: ReconciliationPlan, options: ApplyOptions) -> ApplyOutcome {
        let mut outcome = ApplyOutcome {
            state: ApplyState::Aborted,
            pending: plan.stores(),
            plan,
            folder_moved: false,
            updated: Vec::new(),
            backups: Vec::new(),
            backups_skipped: !options.backup,
            changes: Vec::new(),
            error: None,
        };
        if options.dry_run {
            outcome.state = ApplyState::DryRunReported;
            return outcome;
        }
        if !options.backup && !outcome.pending.is_empty() {
            tracing::warn!(
                intent = %outcome.plan.intent,
                "backups disabled; store edits proceed with no rollback net"
            );
        }

        self.run(&mut outcome, options);
        audit::record(&self.paths, &outcome);
        outcome
    }

    fn run(&self, outcome: &mut ApplyOutcome, options: ApplyOptions) {
        if let Some((from, to)) = outcome.plan.folder_move() {
            let (from, to) = (from.to_path_buf(), to.to_path_buf());
            if let Err(source) = move_folder(&from, &to) {
                outcome.error = Some(ReconcileError::FilesystemMove { from, to, source });
                return;
            }
            tracing::info!(from = %from.display(), to = %to.display(), "project folder moved");
            outcome
                .changes
                .push(format!("folder: {} -> {}", from.display(), to.display()));
            outcome.folder_moved = true;
        }

        let edits: Vec<StoreEdit> = outcome
            .plan
            .edits
            .iter()
            .filter(|edit| edit.store().is_some())
            .cloned()
            .collect();
        for edit in &edits {
            let Some(store) = edit.store() else {
                continue;
            };
            match self.apply_edit(edit, options, &mut outcome.backups) {
                Ok(change) => {
                    tracing::info!(store = %store, change = %change, "store updated");
                    outcome.changes.push(change);
                    outcome.updated.push(store);
                    outcome.pending.retain(|pending| *pending != store);
                }
                Err(failure) => {
                    let mut mutated = outcome.folder_moved || !outcome.updated.is_empty();
                    if let EditFailure::Partial { change, .. } = &failure {
                        mutated = true;
                        outcome.changes.push(change.clone());
                    }
                    let err = failure.into_error(store);
                    if mutated {
                        tracing::warn!(
                            updated = ?outcome.updated,
                            pending = ?outcome.pending,
                            "partial apply"
                        );
                        outcome.state = ApplyState::PartiallyApplied;
                        outcome.error = Some(ReconcileError::PartialApply {
                            updated: outcome.updated.clone(),
                            pending: outcome.pending.clone(),
                            cause: anyhow::Error::new(err),
                        });
                    } else {
                        outcome.error = Some(err);
                    }
                    return;
                }
            }
        }
        outcome.state = ApplyState::Succeeded;
    }

    fn apply_edit(
        &self,
        edit: &StoreEdit,
        options: ApplyOptions,
        backups: &mut Vec<BackupSnapshot>,
    ) -> Result<String, EditFailure> {
        match edit {
            StoreEdit::MoveFolder { .. } => Err(EditFailure::Write(anyhow!(
                "folder move is not a store edit"
            ))),
            StoreEdit::RenameSessionDir { from, to } => {
                self.rename_session_dir(from, to).map_err(EditFailure::Write)
            }
            StoreEdit::RemoveSessionDirs { identifiers } => {
                self.remove_session_dirs(identifiers, options, backups)
            }
            StoreEdit::RewriteHistory { from, to, .. } => {
                self.rewrite_store(StoreKind::History, options, backups, |text| {
                    let (next, changed) = history::rewrite_project(text, from, to)?;
                    Ok((changed > 0).then(|| {
                        (next, format!("history.jsonl: {changed} line(s) {from} -> {to}"))
                    }))
                })
            }
            StoreEdit::RemoveHistoryLines { paths, .. } => {
                self.rewrite_store(StoreKind::History, options, backups, |text| {
                    let (next, removed) = history::remove_projects(text, paths);
                    Ok((removed > 0)
                        .then(|| (next, format!("history.jsonl: removed {removed} line(s)"))))
                })
            }
            StoreEdit::RenameDictionaryKey { from, to } => {
                self.rewrite_store(StoreKind::Dictionary, options, backups, |text| {
                    let mut doc = dictionary::parse(text)?;
                    if !doc.rename_project(from, to)? {
                        return Ok(None);
                    }
                    Ok(Some((doc.render()?, format!(".claude.json: {from} -> {to}"))))
                })
            }
            StoreEdit::RemoveDictionaryKeys { paths } => {
                self.rewrite_store(StoreKind::Dictionary, options, backups, |text| {
                    let mut doc = dictionary::parse(text)?;
                    let removed = doc.remove_projects(paths);
                    if removed == 0 {
                        return Ok(None);
                    }
                    Ok(Some((
                        doc.render()?,
                        format!(".claude.json: removed {removed} key(s)"),
                    )))
                })
            }
        }
    }

    fn rename_session_dir(&self, from: &str, to: &str) -> Result<String> {
        let source = session_dir(&self.paths.projects_dir, from);
        let target = session_dir(&self.paths.projects_dir, to);
        if !source.is_dir() {
            bail!("{} disappeared after planning", source.display());
        }
        if target.exists() {
            bail!("{} already exists", target.display());
        }
        fs::rename(&source, &target).with_context(|| {
            format!(
                "failed to rename {} to {}",
                source.display(),
                target.display()
            )
        })?;
        Ok(format!("projects/{from} -> projects/{to}"))
    }

    /// Every targeted directory is backed up before the first one is
    /// removed, so a backup failure leaves the session store untouched.
    fn remove_session_dirs(
        &self,
        identifiers: &BTreeSet<String>,
        options: ApplyOptions,
        backups: &mut Vec<BackupSnapshot>,
    ) -> Result<String, EditFailure> {
        let dirs: Vec<(&String, PathBuf)> = identifiers
            .iter()
            .map(|id| (id, session_dir(&self.paths.projects_dir, id)))
            .filter(|(_, dir)| dir.is_dir())
            .collect();
        if options.backup {
            for (identifier, _) in &dirs {
                let snapshot = self
                    .backups
                    .snapshot_session_dir(identifier)
                    .map_err(EditFailure::Backup)?;
                backups.push(snapshot);
            }
        }

        for (removed, (_, dir)) in dirs.iter().enumerate() {
            if let Err(err) = fs::remove_dir_all(dir) {
                let cause = anyhow::Error::new(err)
                    .context(format!("failed to remove {}", dir.display()));
                if removed == 0 {
                    return Err(EditFailure::Write(cause));
                }
                return Err(EditFailure::Partial {
                    change: format!(
                        "projects: removed {removed} of {} session dir(s)",
                        dirs.len()
                    ),
                    cause,
                });
            }
        }
        Ok(format!("projects: removed {} session dir(s)", dirs.len()))
    }

    /// Read a store file, transform it, snapshot it, then replace it. A
    /// transform returning `None` leaves the file (and the backups) alone.
    fn rewrite_store<F>(
        &self,
        store: StoreKind,
        options: ApplyOptions,
        backups: &mut Vec<BackupSnapshot>,
        transform: F,
    ) -> Result<String, EditFailure>
    where
        F: FnOnce(&str) -> Result<Option<(String, String)>>,
    {
        let path = self.paths.store_path(store).to_path_buf();
        let text = match store {
            StoreKind::Dictionary => dictionary::read(&path),
            _ => history::read(&path),
        }
        .map_err(EditFailure::Write)?
        .ok_or_else(|| {
            EditFailure::Write(anyhow!("{} disappeared after planning", path.display()))
        })?;

        let Some((next, summary)) = transform(&text).map_err(EditFailure::Write)? else {
            return Ok(format!("{store}: nothing left to change"));
        };
        if options.backup {
            let snapshot = self
                .backups
                .snapshot_file(store)
                .map_err(EditFailure::Backup)?;
            backups.push(snapshot);
        }
        write_atomic(&path, next.as_bytes()).map_err(EditFailure::Write)?;
        Ok(summary)
    }
}
