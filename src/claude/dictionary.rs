//! `~/.claude.json`: a JSON document whose top-level `projects` object is
//! keyed by absolute project path. Values are opaque and kept verbatim.

use anyhow::{Context, Result, anyhow, bail};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

pub const PROJECTS_KEY: &str = "projects";

#[derive(Debug, Clone)]
pub struct DictionaryDoc {
    root: Map<String, Value>,
    pretty: bool,
    trailing_newline: bool,
}

/// Read the dictionary. `Ok(None)` when the file does not exist.
pub fn read(path: &Path) -> Result<Option<String>> {
    if !path.exists() {
        return Ok(None);
    }
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Some(text))
}

pub fn parse(text: &str) -> Result<DictionaryDoc> {
    let value: Value = serde_json::from_str(text).context("not valid JSON")?;
    let Value::Object(root) = value else {
        bail!("top-level value is not an object");
    };
    if let Some(projects) = root.get(PROJECTS_KEY) {
        if !projects.is_object() {
            bail!("`{PROJECTS_KEY}` is not an object");
        }
    }
    Ok(DictionaryDoc {
        root,
        pretty: text.trim_end().contains('\n'),
        trailing_newline: text.ends_with('\n'),
    })
}

impl DictionaryDoc {
    fn projects(&self) -> Option<&Map<String, Value>> {
        self.root.get(PROJECTS_KEY).and_then(Value::as_object)
    }

    fn projects_mut(&mut self) -> Option<&mut Map<String, Value>> {
        self.root.get_mut(PROJECTS_KEY).and_then(Value::as_object_mut)
    }

    pub fn project_keys(&self) -> Vec<String> {
        self.projects()
            .map(|projects| projects.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.projects().is_some_and(|projects| projects.contains_key(path))
    }

    /// Rename `from` to `to` keeping the entry's position. Returns false when
    /// `from` is absent.
    pub fn rename_project(&mut self, from: &str, to: &str) -> Result<bool> {
        if !self.contains(from) {
            return Ok(false);
        }
        if from != to && self.contains(to) {
            return Err(anyhow!("`{PROJECTS_KEY}` already has an entry for {to}"));
        }
        let Some(projects) = self.projects_mut() else {
            return Ok(false);
        };
        let previous = std::mem::take(projects);
        for (key, value) in previous {
            if key == from {
                projects.insert(to.to_string(), value);
            } else {
                projects.insert(key, value);
            }
        }
        Ok(true)
    }

    pub fn remove_projects(&mut self, paths: &BTreeSet<String>) -> usize {
        let Some(projects) = self.projects_mut() else {
            return 0;
        };
        let before = projects.len();
        projects.retain(|key, _| !paths.contains(key));
        before - projects.len()
    }

    /// Serialize in the layout the document was read with.
    pub fn render(&self) -> Result<String> {
        let mut out = if self.pretty {
            serde_json::to_string_pretty(&self.root)?
        } else {
            serde_json::to_string(&self.root)?
        };
        if self.trailing_newline {
            out.push('\n');
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PRETTY: &str = r#"{
  "numStartups": 12,
  "projects": {
    "/first": {
      "allowedTools": []
    },
    "/a/proj": {
      "history": [
        1,
        2
      ]
    },
    "/other": {}
  },
  "userID": "abc"
}"#;

    #[test]
    fn rename_keeps_position_value_and_layout() {
        let mut doc = parse(PRETTY).expect("parse");
        assert!(doc.rename_project("/a/proj", "/a/renamed").expect("rename"));
        let out = doc.render().expect("render");
        assert_eq!(out, PRETTY.replace("\"/a/proj\"", "\"/a/renamed\""));
        assert_eq!(
            parse(&out).expect("reparse").project_keys(),
            vec!["/first", "/a/renamed", "/other"]
        );
    }

    #[test]
    fn rename_refuses_to_clobber_existing_key() {
        let mut doc = parse(PRETTY).expect("parse");
        assert!(doc.rename_project("/a/proj", "/other").is_err());
        assert!(!doc.rename_project("/missing", "/new").expect("rename"));
    }

    #[test]
    fn remove_drops_only_named_keys() {
        let mut doc = parse("{\"projects\":{\"/gone\":{\"x\":1},\"/kept\":{}}}\n").expect("parse");
        let mut paths = BTreeSet::new();
        paths.insert("/gone".to_string());
        assert_eq!(doc.remove_projects(&paths), 1);
        assert_eq!(doc.render().expect("render"), "{\"projects\":{\"/kept\":{}}}\n");
        assert_eq!(doc.remove_projects(&paths), 0);
    }

    #[test]
    fn documents_without_projects_are_empty() {
        let doc = parse("{}").expect("parse");
        assert!(doc.project_keys().is_empty());
        assert_eq!(doc.render().expect("render"), "{}");
    }

    #[test]
    fn malformed_documents_are_errors() {
        assert!(parse("{not json").is_err());
        assert!(parse("[1, 2]").is_err());
        assert!(parse("{\"projects\": []}").is_err());
    }
}
