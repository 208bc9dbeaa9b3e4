use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub fn session_dir(projects_dir: &Path, identifier: &str) -> PathBuf {
    projects_dir.join(identifier)
}

fn count_session_files(dir: &Path) -> usize {
    let Ok(read_dir) = fs::read_dir(dir) else {
        return 0;
    };
    read_dir
        .flatten()
        .filter(|entry| {
            let path = entry.path();
            path.is_file() && path.extension().and_then(|s| s.to_str()) == Some("jsonl")
        })
        .count()
}

/// Identifier of every subdirectory of the session store mapped to its
/// `*.jsonl` file count. A missing store is empty.
pub fn scan(projects_dir: &Path) -> Result<BTreeMap<String, usize>> {
    let mut out = BTreeMap::new();
    if !projects_dir.exists() {
        return Ok(out);
    }

    let read_dir = fs::read_dir(projects_dir)
        .with_context(|| format!("failed to read {}", projects_dir.display()))?;
    for entry in read_dir {
        let entry = entry.with_context(|| format!("failed to read {}", projects_dir.display()))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        out.insert(name.to_string(), count_session_files(&path));
    }
    Ok(out)
}
