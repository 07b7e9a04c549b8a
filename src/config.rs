// Settings - loaded from a JSON file, with defaults for anything missing

use crate::notification::DEFAULT_DURATION_SECS;
use crate::profile::{Jurisdiction, Profile};
use anyhow::{Context as AnyhowContext, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Overrides `database_path`
pub const DB_ENV_VAR: &str = "GAZETTEER_DB";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    pub jurisdiction: Jurisdiction,

    /// Authority maintains ASD records
    pub has_asd: bool,

    pub database_path: PathBuf,

    /// How long notifications stay visible
    pub notification_seconds: i64,

    /// Log failed lookup responses
    pub show_diagnostics: bool,

    /// Recorded as last user on saved records
    pub user_name: String,

    /// Custodian authority code for new streets and properties
    pub authority: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            jurisdiction: Jurisdiction::England,
            has_asd: true,
            database_path: PathBuf::from("gazetteer.db"),
            notification_seconds: DEFAULT_DURATION_SECS,
            show_diagnostics: false,
            user_name: "editor".to_string(),
            authority: 9050,
        }
    }
}

impl Settings {
    /// Load settings from JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read settings file: {:?}", path.as_ref()))?;

        let settings: Settings = serde_json::from_str(&content).context("Failed to parse settings JSON")?;

        Ok(settings.with_env_overrides())
    }

    /// File settings if present, defaults otherwise
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Settings::from_file(path)
        } else {
            Ok(Settings::default().with_env_overrides())
        }
    }

    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(db) = std::env::var(DB_ENV_VAR) {
            if !db.trim().is_empty() {
                self.database_path = PathBuf::from(db);
            }
        }
        self
    }

    pub fn profile(&self) -> Profile {
        Profile::new(self.jurisdiction, self.has_asd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_partial_file_uses_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"jurisdiction": "wales", "userName": "gwen"}}"#).unwrap();

        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.jurisdiction, Jurisdiction::Wales);
        assert_eq!(settings.user_name, "gwen");
        assert_eq!(settings.notification_seconds, 6);
        assert!(settings.profile().is_welsh());
    }

    #[test]
    fn test_bad_json_has_context() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = Settings::from_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("Failed to parse settings JSON"));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = Settings::from_file("/nonexistent/settings.json").unwrap_err();
        assert!(err.to_string().contains("Failed to read settings file"));
    }

    #[test]
    fn test_scottish_profile() {
        let settings = Settings {
            jurisdiction: Jurisdiction::Scotland,
            has_asd: false,
            ..Default::default()
        };
        assert!(settings.profile().is_scottish());
        assert!(!settings.profile().has_asd);
    }
}
