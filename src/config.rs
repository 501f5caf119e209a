use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://localhost:4000/api";
pub const ENV_API_URL: &str = "TASKMATE_API_URL";
pub const ENV_SESSION_FILE: &str = "TASKMATE_SESSION_FILE";
const APP_DIR: &str = "taskmate";
const CONFIG_FILE: &str = "taskmate.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_url: String,
    pub request_timeout_secs: u64,
    pub session_file: Option<PathBuf>,
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            request_timeout_secs: 15,
            session_file: None,
            log_dir: None,
        }
    }
}

/// Values given on the command line; `None` leaves the lower layer alone.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub api_url: Option<String>,
    pub session_file: Option<PathBuf>,
}

impl Config {
    /// Default location: `<config dir>/taskmate/taskmate.toml`.
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
            .ok_or(ConfigError::NoConfigDir)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Full resolution: file, then environment, then CLI overrides.
    pub fn load(path: Option<&Path>, overrides: &Overrides) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };
        let mut config = Self::from_file(&path)?;
        config.apply_env(|key| std::env::var(key).ok());
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.is_empty()) {
            self.api_url = url;
        }
        if let Some(file) = lookup(ENV_SESSION_FILE).filter(|v| !v.is_empty()) {
            self.session_file = Some(PathBuf::from(file));
        }
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(url) = &overrides.api_url {
            self.api_url = url.clone();
        }
        if let Some(file) = &overrides.session_file {
            self.session_file = Some(file.clone());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.api_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ConfigError::InvalidUrl {
                url: self.api_url.clone(),
            });
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    pub fn session_path(&self) -> Result<PathBuf, ConfigError> {
        match &self.session_file {
            Some(p) => Ok(p.clone()),
            None => dirs::config_dir()
                .map(|dir| dir.join(APP_DIR).join("session.json"))
                .ok_or(ConfigError::NoConfigDir),
        }
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(APP_DIR)
                .join("logs")
        })
    }

    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::from_file(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taskmate.toml");
        std::fs::write(&path, "api_url = \"https://tasks.example.com/api\"\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.api_url, "https://tasks.example.com/api");
        assert_eq!(config.request_timeout_secs, 15);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taskmate.toml");
        std::fs::write(&path, "api_url = [").unwrap();
        assert!(matches!(
            Config::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn env_then_cli_layering() {
        let env: HashMap<&str, &str> = [
            (ENV_API_URL, "http://env:1/api"),
            (ENV_SESSION_FILE, "/tmp/env-session.json"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(config.api_url, "http://env:1/api");

        config.apply_overrides(&Overrides {
            api_url: Some("http://cli:2/api".into()),
            session_file: None,
        });
        assert_eq!(config.api_url, "http://cli:2/api");
        assert_eq!(
            config.session_file.as_deref(),
            Some(Path::new("/tmp/env-session.json"))
        );
    }

    #[test]
    fn rejects_non_http_url() {
        let config = Config {
            api_url: "localhost:4000".into(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl { .. })
        ));
    }
}
