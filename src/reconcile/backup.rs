use crate::claude::StoreKind;
use crate::claude::paths::ClaudePaths;
use crate::claude::sessions::session_dir;
use crate::error::ReconcileError;
use crate::reconcile::audit;
use crate::reconcile::util::{
    capture_stamp, copy_tree, sha256_hex, tree_files, tree_sha256, write_atomic,
};
use anyhow::{Context, Result, anyhow, bail};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Saved copy of one store file, or of one session directory, taken right
/// before it was rewritten or removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackupSnapshot {
    pub store: StoreKind,
    /// Session directory name for `StoreKind::Sessions` snapshots.
    pub identifier: Option<String>,
    pub source: PathBuf,
    pub path: PathBuf,
    pub captured_at: String,
    pub sha256: String,
    pub bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocatedBackup {
    pub snapshot: BackupSnapshot,
    /// False when the audit trail has no entry for the backup; the digest
    /// was then computed from the backup as it is now.
    pub digest_recorded: bool,
}

#[derive(Debug, Clone)]
pub struct BackupManager {
    paths: ClaudePaths,
}

impl BackupManager {
    pub fn new(paths: &ClaudePaths) -> Self {
        Self {
            paths: paths.clone(),
        }
    }

    fn ensure_dir(&self) -> Result<()> {
        fs::create_dir_all(&self.paths.backups_dir)
            .with_context(|| format!("failed to create {}", self.paths.backups_dir.display()))
    }

    fn fresh_target(&self, name: String) -> Result<PathBuf> {
        let target = self.paths.backups_dir.join(name);
        if target.exists() {
            bail!("backup target {} already exists", target.display());
        }
        Ok(target)
    }

    /// Copy the history log or the dictionary aside.
    pub fn snapshot_file(&self, store: StoreKind) -> Result<BackupSnapshot> {
        if store == StoreKind::Sessions {
            bail!("session directories are snapshotted per identifier");
        }
        let source = self.paths.store_path(store).to_path_buf();
        let raw =
            fs::read(&source).with_context(|| format!("failed to read {}", source.display()))?;

        let ext = source
            .extension()
            .and_then(|s| s.to_str())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("bak");
        let stamp = capture_stamp();
        self.ensure_dir()?;
        let path = self.fresh_target(format!("{store}.{stamp}.{ext}"))?;
        fs::write(&path, &raw).with_context(|| format!("failed to write {}", path.display()))?;

        tracing::info!(store = %store, backup = %path.display(), "backup written");
        Ok(BackupSnapshot {
            store,
            identifier: None,
            source,
            path,
            captured_at: stamp,
            sha256: sha256_hex(&raw),
            bytes: raw.len() as u64,
        })
    }

    /// Copy a whole session directory aside.
    pub fn snapshot_session_dir(&self, identifier: &str) -> Result<BackupSnapshot> {
        let source = session_dir(&self.paths.projects_dir, identifier);
        if !source.is_dir() {
            bail!("session directory {} does not exist", source.display());
        }
        let stamp = capture_stamp();
        self.ensure_dir()?;
        let path = self.fresh_target(format!("{}.{identifier}.{stamp}", StoreKind::Sessions))?;
        let copied = copy_tree(&source, &path).and_then(|bytes| Ok((bytes, tree_sha256(&path)?)));
        let (bytes, sha256) = match copied {
            Ok(done) => done,
            Err(err) => {
                if let Err(cleanup) = fs::remove_dir_all(&path) {
                    tracing::warn!(
                        backup = %path.display(),
                        error = %cleanup,
                        "failed to remove incomplete session directory backup"
                    );
                }
                return Err(err);
            }
        };

        tracing::info!(identifier, backup = %path.display(), "session directory backup written");
        Ok(BackupSnapshot {
            store: StoreKind::Sessions,
            identifier: Some(identifier.to_string()),
            source,
            path,
            captured_at: stamp,
            sha256,
            bytes,
        })
    }

    /// Every recognisable backup in the backup directory, newest first.
    pub fn list(&self) -> Result<Vec<BackupSnapshot>> {
        let dir = &self.paths.backups_dir;
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        let read_dir =
            fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;
        for entry in read_dir {
            let entry = entry.with_context(|| format!("failed to read {}", dir.display()))?;
            if let Ok(snapshot) = self.describe(&entry.path()) {
                out.push(snapshot);
            }
        }
        out.sort_by(|a, b| {
            b.captured_at
                .cmp(&a.captured_at)
                .then_with(|| a.path.cmp(&b.path))
        });
        Ok(out)
    }

    /// Rebuild a snapshot description from a backup's file name. The digest
    /// is the one logged in the audit trail at capture time when there is
    /// one, so `restore` can tell if the backup changed since.
    pub fn locate(&self, backup: &Path) -> Result<LocatedBackup, ReconcileError> {
        let restore_err = |err: anyhow::Error| ReconcileError::Restore {
            backup: backup.to_path_buf(),
            reason: format!("{err:#}"),
        };
        let mut snapshot = self.describe(backup).map_err(restore_err)?;
        let recorded = audit::recorded_digest(&self.paths, backup).map_err(restore_err)?;
        let digest_recorded = recorded.is_some();
        if let Some(sha256) = recorded {
            snapshot.sha256 = sha256;
        }
        Ok(LocatedBackup {
            snapshot,
            digest_recorded,
        })
    }

    fn describe(&self, backup: &Path) -> Result<BackupSnapshot> {
        let name = backup
            .file_name()
            .and_then(|s| s.to_str())
            .ok_or_else(|| anyhow!("backup path has no usable file name"))?;
        let parts: Vec<&str> = name.split('.').collect();
        let [prefix, middle, last] = parts.as_slice() else {
            bail!("`{name}` is not a clauding backup name");
        };
        let store =
            StoreKind::parse(prefix).ok_or_else(|| anyhow!("unknown store prefix `{prefix}`"))?;

        let (identifier, source, captured_at, sha256, bytes) = match store {
            StoreKind::Sessions => {
                if !backup.is_dir() {
                    bail!("{} is not a directory", backup.display());
                }
                let bytes = tree_files(backup)?
                    .iter()
                    .map(|rel| fs::metadata(backup.join(rel)).map(|m| m.len()).unwrap_or(0))
                    .sum();
                (
                    Some(middle.to_string()),
                    session_dir(&self.paths.projects_dir, middle),
                    last.to_string(),
                    tree_sha256(backup)?,
                    bytes,
                )
            }
            StoreKind::History | StoreKind::Dictionary => {
                let raw = fs::read(backup)
                    .with_context(|| format!("failed to read {}", backup.display()))?;
                (
                    None,
                    self.paths.store_path(store).to_path_buf(),
                    middle.to_string(),
                    sha256_hex(&raw),
                    raw.len() as u64,
                )
            }
        };

        Ok(BackupSnapshot {
            store,
            identifier,
            source,
            path: backup.to_path_buf(),
            captured_at,
            sha256,
            bytes,
        })
    }

    /// Put the snapshot's content back at its source.
    pub fn restore(&self, snapshot: &BackupSnapshot) -> Result<(), ReconcileError> {
        self.restore_inner(snapshot)
            .map_err(|err| ReconcileError::Restore {
                backup: snapshot.path.clone(),
                reason: format!("{err:#}"),
            })
    }

    fn restore_inner(&self, snapshot: &BackupSnapshot) -> Result<()> {
        match snapshot.store {
            StoreKind::Sessions => {
                if snapshot.source.exists() {
                    bail!(
                        "{} already exists; move it aside before restoring",
                        snapshot.source.display()
                    );
                }
                if tree_sha256(&snapshot.path)? != snapshot.sha256 {
                    bail!("backup content no longer matches its recorded digest");
                }
                copy_tree(&snapshot.path, &snapshot.source)?;
            }
            StoreKind::History | StoreKind::Dictionary => {
                let raw = fs::read(&snapshot.path)
                    .with_context(|| format!("failed to read {}", snapshot.path.display()))?;
                if sha256_hex(&raw) != snapshot.sha256 {
                    bail!("backup content no longer matches its recorded digest");
                }
                write_atomic(&snapshot.source, &raw)?;
            }
        }
        tracing::info!(
            store = %snapshot.store,
            backup = %snapshot.path.display(),
            target = %snapshot.source.display(),
            "backup restored"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn test_paths(root: &Path) -> ClaudePaths {
        let paths = ClaudePaths::under(root.join(".claude"));
        fs::create_dir_all(&paths.projects_dir).expect("mkdir projects");
        paths
    }

    #[test]
    fn dictionary_backup_restores_byte_for_byte() {
        let tmp = tempdir().expect("tempdir");
        let paths = test_paths(tmp.path());
        let original = "{\n  \"projects\": {\n    \"/a/proj\": {\"x\": 1}\n  }\n}\n";
        fs::write(&paths.claude_json_file, original).expect("seed");

        let manager = BackupManager::new(&paths);
        let snapshot = manager.snapshot_file(StoreKind::Dictionary).expect("snapshot");
        assert!(snapshot.path.starts_with(&paths.backups_dir));
        assert!(
            snapshot
                .path
                .file_name()
                .and_then(|s| s.to_str())
                .expect("name")
                .starts_with("dictionary.")
        );

        fs::write(&paths.claude_json_file, "{\"projects\":{}}").expect("edit");
        manager.restore(&snapshot).expect("restore");

        assert_eq!(
            fs::read(&paths.claude_json_file).expect("read"),
            original.as_bytes()
        );
    }

    #[test]
    fn restore_refuses_tampered_backup() {
        let tmp = tempdir().expect("tempdir");
        let paths = test_paths(tmp.path());
        fs::write(&paths.history_file, "{\"project\":\"/a\"}\n").expect("seed");

        let manager = BackupManager::new(&paths);
        let snapshot = manager.snapshot_file(StoreKind::History).expect("snapshot");
        fs::write(&snapshot.path, "tampered").expect("tamper");

        let err = manager.restore(&snapshot).expect_err("must refuse");
        assert!(err.to_string().contains("digest"));
        assert_eq!(
            fs::read_to_string(&paths.history_file).expect("read"),
            "{\"project\":\"/a\"}\n"
        );
    }

    #[test]
    fn snapshot_of_missing_file_fails() {
        let tmp = tempdir().expect("tempdir");
        let paths = test_paths(tmp.path());
        let manager = BackupManager::new(&paths);
        assert!(manager.snapshot_file(StoreKind::History).is_err());
    }

    #[test]
    fn session_dir_backup_round_trips_through_locate() {
        let tmp = tempdir().expect("tempdir");
        let paths = test_paths(tmp.path());
        let dir = paths.projects_dir.join("-gone-proj");
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join("s1.jsonl"), "{\"cwd\":\"/gone/proj\"}\n").expect("session");

        let manager = BackupManager::new(&paths);
        let snapshot = manager.snapshot_session_dir("-gone-proj").expect("snapshot");
        fs::remove_dir_all(&dir).expect("remove");

        let located = manager.locate(&snapshot.path).expect("locate");
        assert_eq!(located.snapshot, snapshot);
        assert!(!located.digest_recorded);

        manager.restore(&located.snapshot).expect("restore");
        assert_eq!(
            fs::read_to_string(dir.join("s1.jsonl")).expect("read"),
            "{\"cwd\":\"/gone/proj\"}\n"
        );
        assert!(manager.restore(&located.snapshot).is_err());
    }

    #[test]
    fn located_backup_is_checked_against_the_audited_digest() {
        let tmp = tempdir().expect("tempdir");
        let paths = test_paths(tmp.path());
        fs::write(&paths.history_file, "{\"project\":\"/a\"}\n").expect("seed");

        let manager = BackupManager::new(&paths);
        let snapshot = manager.snapshot_file(StoreKind::History).expect("snapshot");
        let event = serde_json::json!({
            "backups": [{ "path": snapshot.path, "sha256": snapshot.sha256 }]
        });
        fs::write(paths.audit_file(), format!("{event}\n")).expect("audit");
        fs::write(&snapshot.path, "{\"project\":\"/tampered\"}\n").expect("tamper");
        fs::write(&paths.history_file, "").expect("edit");

        let located = manager.locate(&snapshot.path).expect("locate");
        assert!(located.digest_recorded);
        assert_eq!(located.snapshot.sha256, snapshot.sha256);
        let err = manager.restore(&located.snapshot).expect_err("must refuse");
        assert!(err.to_string().contains("digest"));
        assert_eq!(fs::read_to_string(&paths.history_file).expect("read"), "");
    }

    #[cfg(unix)]
    #[test]
    fn failed_session_dir_backup_leaves_no_partial_copy() {
        let tmp = tempdir().expect("tempdir");
        let paths = test_paths(tmp.path());
        let dir = paths.projects_dir.join("-gone-b");
        fs::create_dir_all(&dir).expect("mkdir");
        fs::write(dir.join("s1.jsonl"), "{}\n").expect("session");
        std::os::unix::fs::symlink(tmp.path().join("missing"), dir.join("dangling"))
            .expect("symlink");

        let manager = BackupManager::new(&paths);
        assert!(manager.snapshot_session_dir("-gone-b").is_err());
        assert!(manager.list().expect("list").is_empty());
        let leftovers = fs::read_dir(&paths.backups_dir).expect("read backups").count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn list_returns_backups_newest_first_and_skips_other_files() {
        let tmp = tempdir().expect("tempdir");
        let paths = test_paths(tmp.path());
        fs::write(&paths.history_file, "{\"project\":\"/a\"}\n").expect("history");
        fs::write(&paths.claude_json_file, "{}").expect("dictionary");

        let manager = BackupManager::new(&paths);
        assert!(manager.list().expect("empty list").is_empty());
        let first = manager.snapshot_file(StoreKind::History).expect("first");
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = manager.snapshot_file(StoreKind::Dictionary).expect("second");
        fs::write(paths.audit_file(), "{}\n").expect("audit");

        let listed = manager.list().expect("list");
        assert_eq!(listed, vec![second, first]);
    }

    #[test]
    fn locate_rejects_foreign_names() {
        let tmp = tempdir().expect("tempdir");
        let paths = test_paths(tmp.path());
        let manager = BackupManager::new(&paths);
        let stray = tmp.path().join("notes.txt");
        fs::write(&stray, "x").expect("write");
        assert!(manager.locate(&stray).is_err());
    }
}
