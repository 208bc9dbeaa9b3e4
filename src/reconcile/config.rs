use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoresConfig {
    #[serde(default)]
    pub claude_dir: Option<PathBuf>,
    #[serde(default)]
    pub claude_json: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_backup_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

fn default_backup_enabled() -> bool {
    true
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ClaudingConfig {
    pub stores: StoresConfig,
    pub backup: BackupConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct PartialClaudingConfig {
    stores: Option<StoresConfig>,
    backup: Option<BackupConfig>,
}

fn env_or_bool(var: &str, fallback: bool) -> bool {
    match env::var(var) {
        Ok(v) => {
            let trimmed = v.trim();
            match trimmed {
                "1" | "true" | "TRUE" | "yes" | "on" => true,
                "0" | "false" | "FALSE" | "no" | "off" => false,
                _ => fallback,
            }
        }
        Err(_) => fallback,
    }
}

fn validate(cfg: &ClaudingConfig) -> Result<()> {
    let configured = [
        ("stores.claude_dir", &cfg.stores.claude_dir),
        ("stores.claude_json", &cfg.stores.claude_json),
        ("backup.dir", &cfg.backup.dir),
    ];
    for (key, value) in configured {
        if let Some(path) = value {
            if path.as_os_str().is_empty() {
                return Err(anyhow!("invalid {key}: path cannot be empty"));
            }
        }
    }
    Ok(())
}

fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(custom) = env::var("CLAUDING_CONFIG_PATH") {
        let trimmed = custom.trim();
        if !trimmed.is_empty() {
            return Some(PathBuf::from(trimmed));
        }
    }

    let base = dirs::config_dir()?;
    Some(base.join("clauding").join("config.toml"))
}

fn merge_file_config(base: &mut ClaudingConfig, path: &Path) -> Result<()> {
    if !path.exists() {
        return Ok(());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let parsed: PartialClaudingConfig = toml::from_str(&raw)
        .map_err(|err| anyhow!("failed to parse clauding config {}: {err}", path.display()))?;
    if let Some(stores) = parsed.stores {
        base.stores = stores;
    }
    if let Some(backup) = parsed.backup {
        base.backup = backup;
    }
    Ok(())
}

pub fn load_config() -> Result<ClaudingConfig> {
    let mut cfg = ClaudingConfig::default();
    if let Some(path) = resolve_config_path() {
        merge_file_config(&mut cfg, &path)?;
    }

    cfg.backup.enabled = env_or_bool("CLAUDING_BACKUP_ENABLED", cfg.backup.enabled);

    validate(&cfg)?;
    Ok(cfg)
}
