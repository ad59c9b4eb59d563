//! Reporter configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Reporter configuration
///
/// Mirrors the feature toggles a host test run exposes through its
/// environment. Loaded from TOML, then optionally overridden from
/// environment variables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Reporting on/off
    pub enabled: bool,

    /// Output directory for written results
    pub results_path: PathBuf,

    /// Create steps for framework commands
    pub log_commands: bool,

    /// Create steps for BDD step log entries
    pub log_gherkin_steps: bool,

    /// Attach request/response details for request-like commands
    pub attach_requests: bool,

    /// Add `framework` and `language` labels to every test
    pub add_analytic_labels: bool,

    /// Value used for the `framework` label
    pub framework_name: String,

    /// Omit skipped tests (and suites left empty) when writing
    pub clear_skipped_tests: bool,

    /// Drop pending file attachments recorded by earlier retry attempts
    pub omit_previous_attempt_files: bool,

    /// URL prefix for issue links, `*` is replaced by the issue id
    pub issue_prefix: Option<String>,

    /// URL prefix for tms links, `*` is replaced by the tms id
    pub tms_prefix: Option<String>,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            results_path: PathBuf::from("allure-results"),
            log_commands: true,
            log_gherkin_steps: false,
            attach_requests: false,
            add_analytic_labels: false,
            framework_name: "cypress".to_string(),
            clear_skipped_tests: false,
            omit_previous_attempt_files: false,
            issue_prefix: None,
            tms_prefix: None,
        }
    }
}

impl ReporterConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Override fields from `ALLURE_*` variables
    pub fn apply_env<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let value = value.as_ref();
            match key.as_ref() {
                "ALLURE_ENABLED" => self.enabled = parse_flag(key.as_ref(), value)?,
                "ALLURE_RESULTS_PATH" => self.results_path = PathBuf::from(value),
                "ALLURE_LOG_COMMANDS" => self.log_commands = parse_flag(key.as_ref(), value)?,
                "ALLURE_LOG_GHERKIN" => self.log_gherkin_steps = parse_flag(key.as_ref(), value)?,
                "ALLURE_ATTACH_REQUESTS" => self.attach_requests = parse_flag(key.as_ref(), value)?,
                "ALLURE_ADD_ANALYTIC_LABELS" => {
                    self.add_analytic_labels = parse_flag(key.as_ref(), value)?
                }
                "ALLURE_CLEAR_SKIPPED" => {
                    self.clear_skipped_tests = parse_flag(key.as_ref(), value)?
                }
                "ALLURE_OMIT_PREVIOUS_ATTEMPT_FILES" => {
                    self.omit_previous_attempt_files = parse_flag(key.as_ref(), value)?
                }
                "ALLURE_ISSUE_PREFIX" => self.issue_prefix = non_empty(value),
                "ALLURE_TMS_PREFIX" => self.tms_prefix = non_empty(value),
                _ => {}
            }
        }
        Ok(())
    }

    /// Whether any command or BDD step logging is enabled
    pub fn logs_anything(&self) -> bool {
        self.log_commands || self.log_gherkin_steps
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(Error::InvalidConfig(format!(
            "{} expects a boolean, got '{}'",
            key, other
        ))),
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ReporterConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, ReporterConfig::default());
        assert!(config.log_commands);
        assert!(!config.log_gherkin_steps);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("allure.toml");
        let config = ReporterConfig {
            attach_requests: true,
            tms_prefix: Some("https://tms.example/*/view".to_string()),
            ..Default::default()
        };
        config.save(&path).unwrap();

        let loaded = ReporterConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("allure.toml");
        std::fs::write(&path, "log_gherkin_steps = true\n").unwrap();

        let config = ReporterConfig::load(&path).unwrap();
        assert!(config.log_gherkin_steps);
        assert!(config.log_commands);
        assert_eq!(config.results_path, PathBuf::from("allure-results"));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ReporterConfig::default();
        config
            .apply_env([
                ("ALLURE_LOG_COMMANDS", "false"),
                ("ALLURE_ISSUE_PREFIX", "https://issues.example/"),
                ("ALLURE_TMS_PREFIX", ""),
                ("UNRELATED", "x"),
            ])
            .unwrap();
        assert!(!config.log_commands);
        assert_eq!(config.issue_prefix.as_deref(), Some("https://issues.example/"));
        assert_eq!(config.tms_prefix, None);
    }

    #[test]
    fn test_env_rejects_garbage_flag() {
        let mut config = ReporterConfig::default();
        let err = config.apply_env([("ALLURE_ATTACH_REQUESTS", "maybe")]).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }
}
