use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// State file kept inside the repository's git dir
pub const STATE_FILE_NAME: &str = "forge-undo.json";

/// Last observation of the working branch, as persisted between runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineState {
    pub branch: String,
    /// Commit id, hex-encoded
    pub head: String,
}

/// Mutable engine state persisted across short-lived CLI invocations:
/// the history-branch size and the monitor's baseline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineState {
    #[serde(default)]
    pub history_size: usize,
    #[serde(default)]
    pub baseline: Option<BaselineState>,
}

impl EngineState {
    /// Load the persisted state, defaulting when no state file exists yet
    pub fn load(git_dir: &Path) -> Result<Self> {
        let path = git_dir.join(STATE_FILE_NAME);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("could not read state file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("malformed state file {}", path.display()))
    }

    pub fn save(&self, git_dir: &Path) -> Result<()> {
        let path = git_dir.join(STATE_FILE_NAME);
        let raw = serde_json::to_string_pretty(self)?;
        fs::write(&path, raw)
            .with_context(|| format!("could not write state file {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = EngineState::load(dir.path()).unwrap();
        assert_eq!(state.history_size, 0);
        assert!(state.baseline.is_none());
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::TempDir::new().unwrap();
        let state = EngineState {
            history_size: 4,
            baseline: Some(BaselineState {
                branch: "master".to_string(),
                head: "0123456789abcdef0123456789abcdef01234567".to_string(),
            }),
        };
        state.save(dir.path()).unwrap();

        let loaded = EngineState::load(dir.path()).unwrap();
        assert_eq!(loaded.history_size, 4);
        let baseline = loaded.baseline.unwrap();
        assert_eq!(baseline.branch, "master");
        assert_eq!(baseline.head, "0123456789abcdef0123456789abcdef01234567");
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join(STATE_FILE_NAME), "[").unwrap();
        assert!(EngineState::load(dir.path()).is_err());
    }
}
