use crate::claude::paths::ClaudePaths;
use crate::claude::{StoreKind, dictionary, history, sessions};
use crate::error::ReconcileError;
use crate::reconcile::normalize::normalize;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Health {
    Healthy,
    Orphaned,
    /// Original path unknown, or several literal paths share the identifier.
    Ambiguous,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectRecord {
    pub identifier: String,
    pub original_path: Option<String>,
    /// Other literal paths that normalize to the same identifier.
    pub alternate_paths: Vec<String>,
    pub has_session_dir: bool,
    pub session_file_count: usize,
    pub path_exists_on_disk: bool,
    pub log_reference_count: usize,
    pub in_config_dict: bool,
}

impl ProjectRecord {
    pub fn health(&self) -> Health {
        if self.original_path.is_none() || !self.alternate_paths.is_empty() {
            Health::Ambiguous
        } else if self.path_exists_on_disk {
            Health::Healthy
        } else {
            Health::Orphaned
        }
    }

    pub fn sources(&self) -> Vec<StoreKind> {
        let mut out = Vec::new();
        if self.has_session_dir {
            out.push(StoreKind::Sessions);
        }
        if self.log_reference_count > 0 {
            out.push(StoreKind::History);
        }
        if self.in_config_dict {
            out.push(StoreKind::Dictionary);
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreAnomaly {
    pub store: StoreKind,
    pub path: PathBuf,
    pub reason: String,
}

impl StoreAnomaly {
    pub fn to_error(&self) -> ReconcileError {
        ReconcileError::StoreReadAnomaly {
            store: self.store,
            path: self.path.clone(),
            reason: self.reason.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub healthy: Vec<String>,
    pub orphaned: Vec<String>,
    pub ambiguous: Vec<String>,
}

/// Point-in-time read of the three stores for one invocation.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub records: BTreeMap<String, ProjectRecord>,
    pub session_dirs: BTreeMap<String, usize>,
    pub log_paths: BTreeMap<String, usize>,
    pub config_paths: BTreeSet<String>,
    pub anomalies: Vec<StoreAnomaly>,
}

impl Snapshot {
    pub fn record_for_path(&self, path: &str) -> Option<&ProjectRecord> {
        self.records.get(&normalize(path))
    }

    /// True when any store names `path` literally or holds its session dir.
    pub fn references(&self, path: &str) -> bool {
        self.log_paths.contains_key(path)
            || self.config_paths.contains(path)
            || self.session_dirs.contains_key(&normalize(path))
    }

    pub fn classification(&self) -> Classification {
        let mut out = Classification::default();
        for (id, record) in &self.records {
            match record.health() {
                Health::Healthy => out.healthy.push(id.clone()),
                Health::Orphaned => out.orphaned.push(id.clone()),
                Health::Ambiguous => out.ambiguous.push(id.clone()),
            }
        }
        out
    }

    pub fn orphans(&self) -> impl Iterator<Item = &ProjectRecord> {
        self.records
            .values()
            .filter(|record| record.health() == Health::Orphaned)
    }
}

fn anomaly(store: StoreKind, path: &Path, reason: impl Into<String>) -> StoreAnomaly {
    let found = StoreAnomaly {
        store,
        path: path.to_path_buf(),
        reason: reason.into(),
    };
    tracing::warn!(
        store = %found.store,
        path = %found.path.display(),
        reason = %found.reason,
        "store read anomaly; treating store as contributing no entries"
    );
    found
}

fn read_sessions(paths: &ClaudePaths, out: &mut Snapshot) {
    match sessions::scan(&paths.projects_dir) {
        Ok(dirs) => out.session_dirs = dirs,
        Err(err) => out
            .anomalies
            .push(anomaly(StoreKind::Sessions, &paths.projects_dir, format!("{err:#}"))),
    }
}

fn read_history(paths: &ClaudePaths, out: &mut Snapshot) {
    let text = match history::read(&paths.history_file) {
        Ok(Some(text)) => text,
        Ok(None) => return,
        Err(err) => {
            out.anomalies
                .push(anomaly(StoreKind::History, &paths.history_file, format!("{err:#}")));
            return;
        }
    };
    let scanned = history::scan_text(&text);
    if let Some(first) = scanned.malformed_lines.first() {
        out.anomalies.push(anomaly(
            StoreKind::History,
            &paths.history_file,
            format!(
                "{} unparsable line(s), first at line {first}; those lines are ignored",
                scanned.malformed_lines.len()
            ),
        ));
    }
    out.log_paths = scanned.projects;
}

fn read_dictionary(paths: &ClaudePaths, out: &mut Snapshot) {
    let parsed = dictionary::read(&paths.claude_json_file)
        .and_then(|text| text.map(|t| dictionary::parse(&t)).transpose());
    match parsed {
        Ok(Some(doc)) => out.config_paths = doc.project_keys().into_iter().collect(),
        Ok(None) => {}
        Err(err) => out.anomalies.push(anomaly(
            StoreKind::Dictionary,
            &paths.claude_json_file,
            format!("{err:#}"),
        )),
    }
}

pub(crate) fn build_records(out: &mut Snapshot) {
    // Dictionary paths first so they win as the recovered original path.
    let mut literal_by_id: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let literals = out.config_paths.iter().chain(out.log_paths.keys());
    for literal in literals {
        let entry = literal_by_id.entry(normalize(literal)).or_default();
        if !entry.contains(literal) {
            entry.push(literal.clone());
        }
    }

    let ids: BTreeSet<String> = literal_by_id
        .keys()
        .chain(out.session_dirs.keys())
        .cloned()
        .collect();

    for id in ids {
        let literals = literal_by_id.remove(&id).unwrap_or_default();
        let mut iter = literals.iter();
        let original_path = iter.next().cloned();
        let alternate_paths: Vec<String> = iter.cloned().collect();
        let session_files = out.session_dirs.get(&id).copied();
        let record = ProjectRecord {
            path_exists_on_disk: original_path
                .as_deref()
                .is_some_and(|p| Path::new(p).is_dir()),
            log_reference_count: literals
                .iter()
                .map(|p| out.log_paths.get(p).copied().unwrap_or(0))
                .sum(),
            in_config_dict: literals.iter().any(|p| out.config_paths.contains(p)),
            has_session_dir: session_files.is_some(),
            session_file_count: session_files.unwrap_or(0),
            identifier: id.clone(),
            original_path,
            alternate_paths,
        };
        out.records.insert(id, record);
    }
}

/// Read all three stores. Never mutates anything and never fails: a missing
/// store is empty, a present but unreadable one is recorded as an anomaly.
pub fn scan(paths: &ClaudePaths) -> Snapshot {
    let mut out = Snapshot::default();
    read_sessions(paths, &mut out);
    read_history(paths, &mut out);
    read_dictionary(paths, &mut out);
    build_records(&mut out);
    tracing::debug!(
        records = out.records.len(),
        session_dirs = out.session_dirs.len(),
        log_paths = out.log_paths.len(),
        config_paths = out.config_paths.len(),
        anomalies = out.anomalies.len(),
        "scanned stores"
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn test_paths(root: &Path) -> ClaudePaths {
        let paths = ClaudePaths::under(root.join(".claude"));
        fs::create_dir_all(&paths.projects_dir).expect("mkdir projects");
        paths
    }

    #[test]
    fn empty_root_scans_clean() {
        let tmp = tempdir().expect("tempdir");
        let snapshot = scan(&ClaudePaths::under(tmp.path().join(".claude")));
        assert!(snapshot.records.is_empty());
        assert!(snapshot.anomalies.is_empty());
    }

    #[test]
    fn cross_references_all_three_stores() {
        let tmp = tempdir().expect("tempdir");
        let paths = test_paths(tmp.path());
        let live = tmp.path().join("live");
        fs::create_dir_all(&live).expect("mkdir live");
        let live = live.to_string_lossy().to_string();

        fs::create_dir_all(paths.projects_dir.join(normalize(&live))).expect("live session");
        fs::write(paths.projects_dir.join(normalize(&live)).join("s.jsonl"), "{}\n")
            .expect("session file");
        fs::create_dir_all(paths.projects_dir.join("-only-a-dir")).expect("bare session");
        fs::write(
            &paths.history_file,
            format!(
                "{{\"project\":\"{live}\"}}\n{{\"project\":\"{live}\"}}\n{{\"project\":\"/gone/proj\"}}\n"
            ),
        )
        .expect("history");
        fs::write(
            &paths.claude_json_file,
            "{\"projects\":{\"/gone/proj\":{}}}",
        )
        .expect("dictionary");

        let snapshot = scan(&paths);
        assert!(snapshot.anomalies.is_empty());

        let healthy = snapshot.record_for_path(&live).expect("live record");
        assert_eq!(healthy.health(), Health::Healthy);
        assert_eq!(healthy.log_reference_count, 2);
        assert_eq!(healthy.session_file_count, 1);
        assert!(!healthy.in_config_dict);

        let gone = snapshot.record_for_path("/gone/proj").expect("gone record");
        assert_eq!(gone.health(), Health::Orphaned);
        assert_eq!(gone.sources(), vec![StoreKind::History, StoreKind::Dictionary]);

        let bare = snapshot.records.get("-only-a-dir").expect("bare record");
        assert_eq!(bare.original_path, None);
        assert_eq!(bare.health(), Health::Ambiguous);

        let classes = snapshot.classification();
        assert_eq!(classes.orphaned, vec!["-gone-proj".to_string()]);
        assert_eq!(classes.ambiguous, vec!["-only-a-dir".to_string()]);
    }

    #[test]
    fn dictionary_path_wins_over_log_path_and_collisions_are_ambiguous() {
        let tmp = tempdir().expect("tempdir");
        let paths = test_paths(tmp.path());
        fs::write(&paths.history_file, "{\"project\":\"/a_b\"}\n").expect("history");
        fs::write(&paths.claude_json_file, "{\"projects\":{\"/a/b\":{}}}").expect("dictionary");

        let snapshot = scan(&paths);
        let record = snapshot.records.get("-a-b").expect("record");
        assert_eq!(record.original_path.as_deref(), Some("/a/b"));
        assert_eq!(record.alternate_paths, vec!["/a_b".to_string()]);
        assert_eq!(record.health(), Health::Ambiguous);
    }

    #[test]
    fn malformed_stores_are_reported_not_fatal() {
        let tmp = tempdir().expect("tempdir");
        let paths = test_paths(tmp.path());
        fs::write(
            &paths.history_file,
            "{\"project\":\"/kept\"}\n{broken\n",
        )
        .expect("history");
        fs::write(&paths.claude_json_file, "{\"projects\": ").expect("dictionary");

        let snapshot = scan(&paths);
        assert_eq!(snapshot.anomalies.len(), 2);
        assert_eq!(snapshot.anomalies[0].store, StoreKind::History);
        assert!(snapshot.anomalies[0].reason.contains("line 2"));
        assert_eq!(snapshot.anomalies[1].store, StoreKind::Dictionary);
        assert!(snapshot.config_paths.is_empty());
        assert!(snapshot.references("/kept"));
    }
}
