use crate::claude::StoreKind;
use crate::error::ReconcileError;
use crate::reconcile::normalize::normalize;
use crate::reconcile::scan::{Classification, Snapshot, StoreAnomaly};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreEdit {
    MoveFolder {
        from: PathBuf,
        to: PathBuf,
    },
    RenameSessionDir {
        from: String,
        to: String,
    },
    RemoveSessionDirs {
        identifiers: BTreeSet<String>,
    },
    RewriteHistory {
        from: String,
        to: String,
        lines: usize,
    },
    RemoveHistoryLines {
        paths: BTreeSet<String>,
        lines: usize,
    },
    RenameDictionaryKey {
        from: String,
        to: String,
    },
    RemoveDictionaryKeys {
        paths: BTreeSet<String>,
    },
}

impl StoreEdit {
    /// Metadata store touched by the edit; `None` for the project folder move.
    pub fn store(&self) -> Option<StoreKind> {
        match self {
            Self::MoveFolder { .. } => None,
            Self::RenameSessionDir { .. } | Self::RemoveSessionDirs { .. } => {
                Some(StoreKind::Sessions)
            }
            Self::RewriteHistory { .. } | Self::RemoveHistoryLines { .. } => {
                Some(StoreKind::History)
            }
            Self::RenameDictionaryKey { .. } | Self::RemoveDictionaryKeys { .. } => {
                Some(StoreKind::Dictionary)
            }
        }
    }
}

impl fmt::Display for StoreEdit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MoveFolder { from, to } => {
                write!(f, "folder: {} -> {}", from.display(), to.display())
            }
            Self::RenameSessionDir { from, to } => write!(f, "projects/{from} -> projects/{to}"),
            Self::RemoveSessionDirs { identifiers } => {
                let names: Vec<String> =
                    identifiers.iter().map(|id| format!("projects/{id}")).collect();
                write!(f, "remove {}", names.join(", "))
            }
            Self::RewriteHistory { from, to, lines } => {
                write!(f, "history.jsonl: {lines} line(s) {from} -> {to}")
            }
            Self::RemoveHistoryLines { lines, .. } => {
                write!(f, "history.jsonl: remove {lines} line(s)")
            }
            Self::RenameDictionaryKey { from, to } => {
                write!(f, ".claude.json: key {from} -> {to}")
            }
            Self::RemoveDictionaryKeys { paths } => {
                write!(f, ".claude.json: remove {} key(s)", paths.len())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanTarget {
    All,
    Paths(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Intent {
    Move {
        old_path: String,
        new_path: String,
        final_path: String,
    },
    Clean {
        target: CleanTarget,
    },
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Move {
                old_path,
                final_path,
                ..
            } => write!(f, "move {old_path} -> {final_path}"),
            Self::Clean {
                target: CleanTarget::All,
            } => write!(f, "clean all orphans"),
            Self::Clean {
                target: CleanTarget::Paths(paths),
            } => write!(f, "clean {}", paths.join(", ")),
        }
    }
}

/// Edits computed for one intent. Consumed by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconciliationPlan {
    pub intent: Intent,
    pub edits: Vec<StoreEdit>,
    pub classification: Classification,
    pub skipped: Vec<String>,
    pub warnings: Vec<StoreAnomaly>,
}

impl ReconciliationPlan {
    fn new(intent: Intent, snapshot: &Snapshot) -> Self {
        Self {
            intent,
            edits: Vec::new(),
            classification: snapshot.classification(),
            skipped: Vec::new(),
            warnings: snapshot.anomalies.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn folder_move(&self) -> Option<(&Path, &Path)> {
        self.edits.iter().find_map(|edit| match edit {
            StoreEdit::MoveFolder { from, to } => Some((from.as_path(), to.as_path())),
            _ => None,
        })
    }

    pub fn stores(&self) -> Vec<StoreKind> {
        self.edits.iter().filter_map(StoreEdit::store).collect()
    }
}

fn path_str(path: &Path) -> Result<&str, ReconcileError> {
    path.to_str()
        .ok_or_else(|| ReconcileError::invalid(format!("{} is not valid UTF-8", path.display())))
}

/// Literal paths sharing the session identifier `id`, minus `exclude`.
fn other_literals<'a>(snapshot: &'a Snapshot, id: &str, exclude: &[&str]) -> Vec<&'a str> {
    snapshot
        .records
        .get(id)
        .map(|record| {
            record
                .original_path
                .iter()
                .chain(record.alternate_paths.iter())
                .map(String::as_str)
                .filter(|other| !exclude.iter().any(|e| e == other))
                .collect()
        })
        .unwrap_or_default()
}

/// Plan moving `old_path` to `new_path` and repointing every store at the
/// final location. Only probes the filesystem; nothing is mutated.
pub fn plan_move(
    old_path: &Path,
    new_path: &Path,
    snapshot: &Snapshot,
) -> Result<ReconciliationPlan, ReconcileError> {
    if !old_path.is_absolute() || !new_path.is_absolute() {
        return Err(ReconcileError::invalid("both paths must be absolute"));
    }
    if old_path == new_path {
        return Err(ReconcileError::invalid(format!(
            "{} is both source and destination",
            old_path.display()
        )));
    }
    if new_path.starts_with(old_path) {
        return Err(ReconcileError::invalid(format!(
            "cannot move {} into itself or a descendant ({})",
            old_path.display(),
            new_path.display()
        )));
    }

    let old_exists = old_path.exists();
    let new_exists = new_path.exists();
    if old_exists && !old_path.is_dir() {
        return Err(ReconcileError::invalid(format!(
            "{} is a file, not a project directory",
            old_path.display()
        )));
    }

    let (needs_folder_move, final_path) = match (old_exists, new_exists) {
        (true, false) => {
            let parent_ok = new_path.parent().is_some_and(Path::is_dir);
            if !parent_ok {
                return Err(ReconcileError::invalid(format!(
                    "destination parent of {} does not exist",
                    new_path.display()
                )));
            }
            (true, new_path.to_path_buf())
        }
        (true, true) => {
            if !new_path.is_dir() {
                return Err(ReconcileError::invalid(format!(
                    "destination {} is a file",
                    new_path.display()
                )));
            }
            let Some(base) = old_path.file_name() else {
                return Err(ReconcileError::invalid(format!(
                    "{} has no final component",
                    old_path.display()
                )));
            };
            let nested = new_path.join(base);
            if nested.exists() {
                return Err(ReconcileError::invalid(format!(
                    "{} already exists",
                    nested.display()
                )));
            }
            (true, nested)
        }
        (false, true) => {
            if !new_path.is_dir() {
                return Err(ReconcileError::invalid(format!(
                    "destination {} is a file",
                    new_path.display()
                )));
            }
            (false, new_path.to_path_buf())
        }
        (false, false) => {
            return Err(ReconcileError::invalid(format!(
                "neither {} nor {} exists; nothing to reconcile",
                old_path.display(),
                new_path.display()
            )));
        }
    };

    let old = path_str(old_path)?;
    let new = path_str(&final_path)?;
    if !snapshot.references(old) {
        return Err(ReconcileError::invalid(format!(
            "{old} is not referenced by any Claude store"
        )));
    }
    let old_id = normalize(old);
    let new_id = normalize(new);
    let tracked = snapshot.log_paths.contains_key(old) || snapshot.config_paths.contains(old);
    if !tracked {
        // Only the session directory matched, by identifier.
        match snapshot.records.get(&old_id).map(|r| r.original_path.as_deref()) {
            Some(Some(owner)) => {
                return Err(ReconcileError::invalid(format!(
                    "{old} is not tracked; projects/{old_id} belongs to {owner}"
                )));
            }
            Some(None) => {
                return Err(ReconcileError::invalid(format!(
                    "{old} is not tracked and projects/{old_id} has no known original path"
                )));
            }
            None => {}
        }
    }
    // A metadata-only pass may be finishing an earlier partial apply, so the
    // destination being partly referenced is only fatal when a folder moves.
    if needs_folder_move
        && (snapshot.log_paths.contains_key(new) || snapshot.config_paths.contains(new))
    {
        return Err(ReconcileError::invalid(format!(
            "{new} is already referenced by a Claude store"
        )));
    }
    if snapshot.config_paths.contains(old) && snapshot.config_paths.contains(new) {
        return Err(ReconcileError::invalid(format!(
            ".claude.json already has entries for both {old} and {new}"
        )));
    }
    if old_id != new_id
        && snapshot.session_dirs.contains_key(&old_id)
        && snapshot.session_dirs.contains_key(&new_id)
    {
        return Err(ReconcileError::invalid(format!(
            "session directory projects/{new_id} already exists"
        )));
    }

    let mut plan = ReconciliationPlan::new(
        Intent::Move {
            old_path: old.to_string(),
            new_path: path_str(new_path)?.to_string(),
            final_path: new.to_string(),
        },
        snapshot,
    );

    if needs_folder_move {
        plan.edits.push(StoreEdit::MoveFolder {
            from: old_path.to_path_buf(),
            to: final_path.clone(),
        });
    }
    if old_id != new_id && snapshot.session_dirs.contains_key(&old_id) {
        let sharing = other_literals(snapshot, &old_id, &[old]);
        if sharing.is_empty() {
            plan.edits.push(StoreEdit::RenameSessionDir {
                from: old_id,
                to: new_id,
            });
        } else {
            plan.skipped
                .push(format!("projects/{old_id} kept: also used by {}", sharing.join(", ")));
        }
    }
    if let Some(lines) = snapshot.log_paths.get(old) {
        plan.edits.push(StoreEdit::RewriteHistory {
            from: old.to_string(),
            to: new.to_string(),
            lines: *lines,
        });
    }
    if snapshot.config_paths.contains(old) {
        plan.edits.push(StoreEdit::RenameDictionaryKey {
            from: old.to_string(),
            to: new.to_string(),
        });
    }

    tracing::debug!(intent = %plan.intent, edits = plan.edits.len(), "planned move");
    Ok(plan)
}

/// Plan removing every reference to orphaned projects. Targets that are no
/// longer referenced are skipped, so a repeated clean plans nothing.
pub fn plan_clean(
    target: &CleanTarget,
    snapshot: &Snapshot,
) -> Result<ReconciliationPlan, ReconcileError> {
    let mut plan = ReconciliationPlan::new(
        Intent::Clean {
            target: target.clone(),
        },
        snapshot,
    );
    let mut paths = BTreeSet::new();
    let mut identifiers = BTreeSet::new();

    match target {
        CleanTarget::All => {
            for record in snapshot.orphans() {
                if let Some(path) = &record.original_path {
                    paths.insert(path.clone());
                }
                if record.has_session_dir {
                    identifiers.insert(record.identifier.clone());
                }
            }
        }
        CleanTarget::Paths(targets) => {
            for target in targets {
                let path = Path::new(target);
                if !path.is_absolute() {
                    return Err(ReconcileError::invalid(format!(
                        "{target} is not an absolute path"
                    )));
                }
                if path.is_dir() {
                    return Err(ReconcileError::invalid(format!(
                        "{target} still exists on disk; it is not an orphan"
                    )));
                }
                if !snapshot.references(target) {
                    plan.skipped
                        .push(format!("{target}: not referenced by any store"));
                    continue;
                }
                paths.insert(target.clone());

                let id = normalize(target);
                if !snapshot.session_dirs.contains_key(&id) {
                    continue;
                }
                let cleaned: Vec<&str> = targets.iter().map(String::as_str).collect();
                let sharing = other_literals(snapshot, &id, &cleaned);
                if sharing.is_empty() {
                    identifiers.insert(id);
                } else {
                    plan.skipped
                        .push(format!("projects/{id} kept: also used by {}", sharing.join(", ")));
                }
            }
        }
    }

    if !identifiers.is_empty() {
        plan.edits.push(StoreEdit::RemoveSessionDirs { identifiers });
    }
    let lines: usize = paths
        .iter()
        .map(|p| snapshot.log_paths.get(p).copied().unwrap_or(0))
        .sum();
    if lines > 0 {
        plan.edits.push(StoreEdit::RemoveHistoryLines {
            paths: paths
                .iter()
                .filter(|p| snapshot.log_paths.contains_key(*p))
                .cloned()
                .collect(),
            lines,
        });
    }
    let keys: BTreeSet<String> = paths
        .iter()
        .filter(|p| snapshot.config_paths.contains(*p))
        .cloned()
        .collect();
    if !keys.is_empty() {
        plan.edits.push(StoreEdit::RemoveDictionaryKeys { paths: keys });
    }

    tracing::debug!(intent = %plan.intent, edits = plan.edits.len(), "planned clean");
    Ok(plan)
}
