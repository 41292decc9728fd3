use crate::error::{Result, XgitError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    pub github_token: Option<String>,
    pub api_base: Option<String>,
    pub request_timeout_secs: u64,
    pub max_repositories: usize,
    pub history_limit: usize,
    pub check_remote_on_reopen: bool,
    #[serde(default)]
    pub editor: Option<String>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("github_token", &self.github_token.as_ref().map(|_| "[REDACTED]"))
            .field("api_base", &self.api_base)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_repositories", &self.max_repositories)
            .field("history_limit", &self.history_limit)
            .field("check_remote_on_reopen", &self.check_remote_on_reopen)
            .field("editor", &self.editor)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github_token: None,
            api_base: None,
            request_timeout_secs: 30,
            max_repositories: 100,
            history_limit: 20,
            check_remote_on_reopen: true,
            editor: None,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct StoredCredentials {
    github_token: String,
}

impl Config {
    pub fn load() -> Self {
        Self::load_from(&app_dir())
    }

    pub fn load_from(dir: &Path) -> Self {
        let config_file = dir.join("config.toml");
        let credentials_file = dir.join("credentials.toml");

        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if config_file.exists() {
            figment = figment.merge(Toml::file(&config_file));
        }
        if credentials_file.exists() {
            figment = figment.merge(Toml::file(&credentials_file));
        }

        figment = figment.merge(Env::prefixed("XGIT_")).merge(
            Env::raw()
                .only(&["GITHUB_TOKEN"])
                .map(|_| "github_token".into()),
        );

        match figment.extract::<Config>() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("config parse error, using defaults: {e}");
                Config::default()
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn token(&self) -> Option<&str> {
        self.github_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

pub fn save_token(dir: &Path, token: &str) -> Result<PathBuf> {
    let path = dir.join("credentials.toml");
    let content = toml::to_string_pretty(&StoredCredentials {
        github_token: token.to_string(),
    })
    .map_err(|e| XgitError::Config(e.to_string()))?;

    std::fs::create_dir_all(dir)?;
    std::fs::write(&path, content)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
    }

    Ok(path)
}

pub fn clear_token(dir: &Path) -> Result<bool> {
    let path = dir.join("credentials.toml");
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

pub fn app_dir() -> PathBuf {
    config_dir().join("xgit")
}

pub fn config_dir() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .ok()
        .map(PathBuf::from)
        .or_else(|| {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".config"))
        })
        .unwrap_or_else(|| PathBuf::from("."))
}
