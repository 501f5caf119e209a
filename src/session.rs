use crate::errors::ConfigError;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};

#[derive(Debug, Default)]
pub struct Session {
    path: Option<PathBuf>,
    token: RwLock<Option<String>>,
}

#[derive(Deserialize)]
struct WrappedToken {
    token: String,
}

/// Extract the bearer token from a stored or returned value.
pub fn parse_token(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(wrapped) = serde_json::from_str::<WrappedToken>(raw) {
        return Some(wrapped.token).filter(|t| !t.is_empty());
    }
    if let Ok(serde_json::Value::String(s)) = serde_json::from_str::<serde_json::Value>(raw) {
        return Some(s).filter(|t| !t.is_empty());
    }
    Some(raw.to_string())
}

/// Write the token readable by the owner only.
#[cfg(unix)]
fn write_private(path: &Path, token: &str) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    // mode() only applies when the file is created
    file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    file.write_all(token.as_bytes())
}

#[cfg(not(unix))]
fn write_private(path: &Path, token: &str) -> std::io::Result<()> {
    std::fs::write(path, token)
}

impl Session {
    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            path: None,
            token: RwLock::new(Some(token.into())),
        }
    }

    /// Open the session backed by `path`, reading any stored token.
    pub fn open(path: &Path) -> Self {
        let token = match std::fs::read_to_string(path) {
            Ok(raw) => parse_token(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read session file");
                None
            }
        };
        debug!(path = %path.display(), logged_in = token.is_some(), "session opened");
        Self {
            path: Some(path.to_path_buf()),
            token: RwLock::new(token),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    pub(crate) fn store(&self, token: &str) -> Result<(), ConfigError> {
        if let Some(path) = &self.path {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            write_private(path, token).map_err(|source| ConfigError::Write {
                path: path.clone(),
                source,
            })?;
        }
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(token.to_string());
        Ok(())
    }

    pub(crate) fn clear(&self) -> Result<(), ConfigError> {
        *self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        if let Some(path) = &self.path {
            match std::fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => {
                    return Err(ConfigError::Write {
                        path: path.clone(),
                        source,
                    })
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_token_accepts_all_stored_shapes() {
        assert_eq!(parse_token("abc.def.ghi").as_deref(), Some("abc.def.ghi"));
        assert_eq!(
            parse_token(r#"{"token":"abc.def.ghi"}"#).as_deref(),
            Some("abc.def.ghi")
        );
        assert_eq!(parse_token(r#""abc.def.ghi""#).as_deref(), Some("abc.def.ghi"));
        assert_eq!(parse_token("   \n"), None);
        assert_eq!(parse_token(r#"{"token":""}"#), None);
    }

    #[test]
    fn store_and_reopen_round_trips_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");

        let session = Session::open(&path);
        assert!(!session.is_authenticated());
        session.store("jwt-1").unwrap();

        let reopened = Session::open(&path);
        assert_eq!(reopened.token().as_deref(), Some("jwt-1"));

        reopened.clear().unwrap();
        assert!(!path.exists());
        assert!(!reopened.is_authenticated());
    }

    #[cfg(unix)]
    #[test]
    fn stored_token_is_private_to_the_owner() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        Session::open(&path).store("jwt-1").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);

        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
        Session::open(&path).store("jwt-2").unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
        assert_eq!(Session::open(&path).token().as_deref(), Some("jwt-2"));
    }

    #[test]
    fn clear_without_file_is_ok() {
        let session = Session::with_token("t");
        session.clear().unwrap();
        assert_eq!(session.token(), None);
    }
}
