use crate::error::{Result, XgitError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Repository location remembered between invocations. Credentials and
/// pending changes never go here.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct WorkspaceState {
    pub owner: String,
    pub name: String,
    pub branch: String,
    #[serde(default)]
    pub cwd: String,
}

impl WorkspaceState {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

fn workspace_path(dir: &Path) -> PathBuf {
    dir.join("workspace.toml")
}

pub fn save(dir: &Path, state: &WorkspaceState) -> Result<()> {
    let content = toml::to_string_pretty(state).map_err(|e| XgitError::Config(e.to_string()))?;
    std::fs::create_dir_all(dir)?;
    std::fs::write(workspace_path(dir), content)?;
    Ok(())
}

pub fn restore(dir: &Path) -> Option<WorkspaceState> {
    let content = std::fs::read_to_string(workspace_path(dir)).ok()?;
    match toml::from_str::<WorkspaceState>(&content) {
        Ok(state) if !state.owner.is_empty() && !state.name.is_empty() => Some(state),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!("ignoring unreadable workspace file: {e}");
            None
        }
    }
}

pub fn clear(dir: &Path) {
    let _ = std::fs::remove_file(workspace_path(dir));
}

/// Splits `owner/name`.
pub fn parse_full_name(full: &str) -> Option<(&str, &str)> {
    let (owner, name) = full.trim().trim_matches('/').split_once('/')?;
    if owner.is_empty() || name.is_empty() || name.contains('/') {
        return None;
    }
    Some((owner, name))
}
