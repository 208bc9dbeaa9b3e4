//! `history.jsonl`: one JSON record per line, each naming its project by
//! absolute path in the `project` field.
//!
//! Rewrites splice the `project` value in place so every other byte of the
//! line, including key order, spacing and line endings, survives untouched.

use anyhow::{Context, Result};
use serde_json::value::RawValue;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

/// Top-level fields of one record, values left unparsed.
type RawRecord<'a> = BTreeMap<String, &'a RawValue>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryScan {
    /// Literal project path to number of lines naming it.
    pub projects: BTreeMap<String, usize>,
    pub total_lines: usize,
    /// 1-based numbers of non-blank lines that are not JSON objects.
    pub malformed_lines: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum LineProject {
    Blank,
    Malformed,
    Missing,
    Path {
        value: String,
        span: (usize, usize),
    },
}

fn strip_line_ending(line: &str) -> &str {
    line.strip_suffix('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l))
        .unwrap_or(line)
}

fn classify(line: &str) -> LineProject {
    let body = strip_line_ending(line);
    if body.trim().is_empty() {
        return LineProject::Blank;
    }
    let Ok(record) = serde_json::from_str::<RawRecord<'_>>(body) else {
        return LineProject::Malformed;
    };
    let Some(raw) = record.get("project").copied() else {
        return LineProject::Missing;
    };
    let Ok(value) = serde_json::from_str::<String>(raw.get()) else {
        return LineProject::Missing;
    };
    let start = raw.get().as_ptr() as usize - body.as_ptr() as usize;
    LineProject::Path {
        value,
        span: (start, start + raw.get().len()),
    }
}

pub fn scan_text(text: &str) -> HistoryScan {
    let mut out = HistoryScan::default();
    for (idx, line) in text.split_inclusive('\n').enumerate() {
        out.total_lines += 1;
        match classify(line) {
            LineProject::Malformed => out.malformed_lines.push(idx + 1),
            LineProject::Path { value, .. } => *out.projects.entry(value).or_insert(0) += 1,
            LineProject::Blank | LineProject::Missing => {}
        }
    }
    out
}

/// Read the log. `Ok(None)` when the file does not exist.
pub fn read(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let text = String::from_utf8(raw)
        .with_context(|| format!("{} is not valid UTF-8", path.display()))?;
    Ok(Some(text))
}

/// Point every line whose `project` is `from` at `to`. Returns the new text
/// and the number of lines changed.
pub fn rewrite_project(text: &str, from: &str, to: &str) -> Result<(String, usize)> {
    let replacement = serde_json::to_string(to)?;
    let mut out = String::with_capacity(text.len());
    let mut changed = 0usize;
    for line in text.split_inclusive('\n') {
        match classify(line) {
            LineProject::Path { value, span, .. } if value == from => {
                out.push_str(&line[..span.0]);
                out.push_str(&replacement);
                out.push_str(&line[span.1..]);
                changed += 1;
            }
            _ => out.push_str(line),
        }
    }
    Ok((out, changed))
}

/// Drop every line whose `project` is in `paths`. Returns the new text and
/// the number of lines removed.
pub fn remove_projects(text: &str, paths: &BTreeSet<String>) -> (String, usize) {
    let mut out = String::with_capacity(text.len());
    let mut removed = 0usize;
    for line in text.split_inclusive('\n') {
        match classify(line) {
            LineProject::Path { value, .. } if paths.contains(&value) => removed += 1,
            _ => out.push_str(line),
        }
    }
    (out, removed)
}
