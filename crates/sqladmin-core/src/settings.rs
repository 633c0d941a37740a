//! User settings and per-user paths

use crate::{Result, SqlAdminError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_APPLICATION_NAME: &str = "SQL Server Admin Tool";
pub const DEFAULT_HISTORY_CAP: usize = 100;
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_PORT: u16 = 1433;

const APP_DIR: &str = "sqladmin";
const TEMPLATES_FILE_NAME: &str = "query_templates.json";

/// Settings that tune the execution core, read from `settings.toml`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreSettings {
    /// Maximum number of retained history entries
    pub history_cap: usize,
    /// Client-side limit for one statement
    pub query_timeout_secs: u64,
    /// Application identity reported to the server
    pub application_name: String,
    pub trust_server_certificate: bool,
    /// Port used when the server address names none
    pub default_port: u16,
    /// Override for the history file location
    pub history_path: Option<PathBuf>,
}

impl Default for CoreSettings {
    fn default() -> Self {
        Self {
            history_cap: DEFAULT_HISTORY_CAP,
            query_timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
            application_name: DEFAULT_APPLICATION_NAME.to_string(),
            trust_server_certificate: true,
            default_port: DEFAULT_PORT,
            history_path: None,
        }
    }
}

impl CoreSettings {
    /// Load settings from the default location, falling back to defaults
    /// when the file does not exist
    pub fn load() -> Result<Self> {
        Self::load_from(&settings_file()?)
    }

    /// Load settings from a specific file. A missing file yields defaults,
    /// a malformed one is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "settings file not found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        let settings: Self = toml::from_str(&contents).map_err(|e| {
            SqlAdminError::Configuration(format!("{}: {}", path.display(), e))
        })?;

        if settings.history_cap == 0 {
            return Err(SqlAdminError::Configuration(
                "history_cap must be at least 1".into(),
            ));
        }
        if settings.query_timeout_secs == 0 {
            return Err(SqlAdminError::Configuration(
                "query_timeout_secs must be at least 1".into(),
            ));
        }

        tracing::debug!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    pub fn query_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.query_timeout_secs)
    }

    /// History file location, honouring the override
    pub fn history_file(&self) -> Result<PathBuf> {
        match &self.history_path {
            Some(path) => Ok(path.clone()),
            None => history_file(),
        }
    }

    /// Saved query templates, kept in the same directory as the history file
    pub fn templates_file(&self) -> Result<PathBuf> {
        self.history_file()
            .map(|history| history.with_file_name(TEMPLATES_FILE_NAME))
    }
}

pub fn config_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|p| p.join(APP_DIR))
        .ok_or_else(|| SqlAdminError::Configuration("Could not determine config directory".into()))
}

pub fn data_dir() -> Result<PathBuf> {
    dirs::data_local_dir()
        .map(|p| p.join(APP_DIR))
        .ok_or_else(|| SqlAdminError::Configuration("Could not determine data directory".into()))
}

pub fn settings_file() -> Result<PathBuf> {
    config_dir().map(|p| p.join("settings.toml"))
}

pub fn history_file() -> Result<PathBuf> {
    data_dir().map(|p| p.join("query_history.json"))
}

pub fn log_dir() -> Result<PathBuf> {
    data_dir().map(|p| p.join("logs"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = CoreSettings::load_from(&dir.path().join("settings.toml")).unwrap();
        assert_eq!(settings, CoreSettings::default());
        assert_eq!(settings.history_cap, 100);
        assert_eq!(settings.query_timeout_secs, 300);
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "history_cap = 25\napplication_name = \"Ops Console\"\n").unwrap();

        let settings = CoreSettings::load_from(&path).unwrap();
        assert_eq!(settings.history_cap, 25);
        assert_eq!(settings.application_name, "Ops Console");
        assert_eq!(settings.default_port, 1433);
        assert!(settings.trust_server_certificate);
    }

    #[test]
    fn test_malformed_file_is_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "history_cap = \"lots\"").unwrap();

        let err = CoreSettings::load_from(&path).unwrap_err();
        assert!(matches!(err, SqlAdminError::Configuration(_)));
    }

    #[test]
    fn test_zero_cap_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "history_cap = 0").unwrap();

        assert!(CoreSettings::load_from(&path).is_err());
    }

    #[test]
    fn test_history_path_override() {
        let settings = CoreSettings {
            history_path: Some(PathBuf::from("/tmp/custom.json")),
            ..Default::default()
        };
        assert_eq!(
            settings.history_file().unwrap(),
            PathBuf::from("/tmp/custom.json")
        );
    }

    #[test]
    fn test_templates_file_follows_history_directory() {
        let settings = CoreSettings {
            history_path: Some(PathBuf::from("/tmp/sqladmin/custom.json")),
            ..Default::default()
        };
        assert_eq!(
            settings.templates_file().unwrap(),
            PathBuf::from("/tmp/sqladmin/query_templates.json")
        );
    }
}
