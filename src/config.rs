use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Built-in history branch name, used when no configuration overrides it
pub const DEFAULT_HISTORY_BRANCH_NAME: &str = "forge-history";

/// Repo-local configuration file, looked up at the working tree root
pub const CONFIG_FILE_NAME: &str = ".forge-undo.json";

/// Undo-engine configuration.
///
/// Resolution order: repo-local `.forge-undo.json`, then
/// `<config dir>/forge-undo/config.json`, then built-in defaults. Absent
/// keys fall back to their defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndoConfig {
    #[serde(rename = "history-branch", default = "default_history_branch")]
    pub history_branch: String,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self { history_branch: default_history_branch() }
    }
}

fn default_history_branch() -> String {
    DEFAULT_HISTORY_BRANCH_NAME.to_string()
}

impl UndoConfig {
    /// Load configuration for the repository rooted at `repo_root`
    pub fn load(repo_root: &Path) -> Result<Self> {
        let local = repo_root.join(CONFIG_FILE_NAME);
        if local.exists() {
            return Self::read_file(&local);
        }
        if let Some(global) = Self::global_path() {
            if global.exists() {
                return Self::read_file(&global);
            }
        }
        Ok(Self::default())
    }

    fn read_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("could not read config file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("malformed config file {}", path.display()))
    }

    fn global_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("forge-undo").join("config.json"))
    }
}
