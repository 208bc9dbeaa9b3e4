use crate::claude::StoreKind;
use crate::reconcile::config::ClaudingConfig;
use anyhow::Result;
use std::env;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ClaudePaths {
    pub claude_dir: PathBuf,
    pub projects_dir: PathBuf,
    pub history_file: PathBuf,
    pub claude_json_file: PathBuf,
    pub backups_dir: PathBuf,
}

impl ClaudePaths {
    /// Layout rooted at a custom `.claude` directory; the dictionary sits next
    /// to it, which keeps test roots self-contained.
    pub fn under(claude_dir: impl Into<PathBuf>) -> Self {
        let claude_dir = claude_dir.into();
        let claude_json_file = sibling_claude_json(&claude_dir);
        build(claude_dir, claude_json_file, None)
    }

    pub fn store_path(&self, kind: StoreKind) -> &Path {
        match kind {
            StoreKind::Sessions => &self.projects_dir,
            StoreKind::History => &self.history_file,
            StoreKind::Dictionary => &self.claude_json_file,
        }
    }

    pub fn audit_file(&self) -> PathBuf {
        self.backups_dir.join("audit.jsonl")
    }
}

fn sibling_claude_json(claude_dir: &Path) -> PathBuf {
    claude_dir
        .parent()
        .map(|parent| parent.join(".claude.json"))
        .unwrap_or_else(|| PathBuf::from(".claude.json"))
}

fn build(claude_dir: PathBuf, claude_json_file: PathBuf, backups_dir: Option<PathBuf>) -> ClaudePaths {
    ClaudePaths {
        projects_dir: claude_dir.join("projects"),
        history_file: claude_dir.join("history.jsonl"),
        backups_dir: backups_dir.unwrap_or_else(|| claude_dir.join("backups")),
        claude_json_file,
        claude_dir,
    }
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_path(var: &str) -> Option<PathBuf> {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => Some(PathBuf::from(v.trim())),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
struct Overrides {
    claude_dir: Option<PathBuf>,
    claude_json: Option<PathBuf>,
    backups_dir: Option<PathBuf>,
}

fn resolve_from(home: &Path, flag_dir: Option<&Path>, env: Overrides, cfg: &ClaudingConfig) -> ClaudePaths {
    let from_flag = flag_dir.map(Path::to_path_buf);
    let custom_dir = from_flag
        .clone()
        .or(env.claude_dir)
        .or_else(|| cfg.stores.claude_dir.clone());

    let claude_json = match (&from_flag, env.claude_json) {
        (_, Some(explicit)) => explicit,
        (Some(dir), None) => sibling_claude_json(dir),
        (None, None) => match (&cfg.stores.claude_json, &custom_dir) {
            (Some(configured), _) => configured.clone(),
            (None, Some(dir)) => sibling_claude_json(dir),
            (None, None) => home.join(".claude.json"),
        },
    };

    let claude_dir = custom_dir.unwrap_or_else(|| home.join(".claude"));
    let backups_dir = env.backups_dir.or_else(|| cfg.backup.dir.clone());
    build(claude_dir, claude_json, backups_dir)
}

pub fn resolve_paths(cfg: &ClaudingConfig, claude_dir_flag: Option<&Path>) -> Result<ClaudePaths> {
    let home = required_home_dir()?;
    let overrides = Overrides {
        claude_dir: env_path("CLAUDING_CLAUDE_DIR"),
        claude_json: env_path("CLAUDING_CLAUDE_JSON"),
        backups_dir: env_path("CLAUDING_BACKUP_DIR"),
    };
    Ok(resolve_from(&home, claude_dir_flag, overrides, cfg))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_live_under_home() {
        let got = resolve_from(
            Path::new("/home/alice"),
            None,
            Overrides::default(),
            &ClaudingConfig::default(),
        );
        assert_eq!(got.claude_dir, PathBuf::from("/home/alice/.claude"));
        assert_eq!(got.projects_dir, PathBuf::from("/home/alice/.claude/projects"));
        assert_eq!(got.history_file, PathBuf::from("/home/alice/.claude/history.jsonl"));
        assert_eq!(got.backups_dir, PathBuf::from("/home/alice/.claude/backups"));
        assert_eq!(got.claude_json_file, PathBuf::from("/home/alice/.claude.json"));
    }

    #[test]
    fn flag_dir_puts_dictionary_in_its_parent() {
        let mut cfg = ClaudingConfig::default();
        cfg.stores.claude_json = Some(PathBuf::from("/configured/.claude.json"));
        let got = resolve_from(
            Path::new("/home/alice"),
            Some(Path::new("/tmp/root/.claude")),
            Overrides::default(),
            &cfg,
        );
        assert_eq!(got.claude_dir, PathBuf::from("/tmp/root/.claude"));
        assert_eq!(got.claude_json_file, PathBuf::from("/tmp/root/.claude.json"));
    }

    #[test]
    fn env_overrides_beat_config_file() {
        let mut cfg = ClaudingConfig::default();
        cfg.stores.claude_dir = Some(PathBuf::from("/configured/.claude"));
        cfg.backup.dir = Some(PathBuf::from("/configured/backups"));
        let got = resolve_from(
            Path::new("/home/alice"),
            None,
            Overrides {
                claude_dir: Some(PathBuf::from("/env/.claude")),
                claude_json: None,
                backups_dir: Some(PathBuf::from("/env/backups")),
            },
            &cfg,
        );
        assert_eq!(got.claude_dir, PathBuf::from("/env/.claude"));
        assert_eq!(got.claude_json_file, PathBuf::from("/env/.claude.json"));
        assert_eq!(got.backups_dir, PathBuf::from("/env/backups"));
    }

    #[test]
    fn under_matches_test_layout() {
        let paths = ClaudePaths::under("/tmp/x/.claude");
        assert_eq!(paths.claude_json_file, PathBuf::from("/tmp/x/.claude.json"));
        assert_eq!(paths.store_path(StoreKind::Sessions), Path::new("/tmp/x/.claude/projects"));
        assert_eq!(paths.audit_file(), PathBuf::from("/tmp/x/.claude/backups/audit.jsonl"));
    }
}
