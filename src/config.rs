use crate::defect::{Severity, SeverityOverride};
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = ".checkfix.toml";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    /// Glob patterns excluded from the walk.
    pub ignore: Vec<String>,
    pub rules: BTreeMap<String, RuleSettings>,
    pub autofix: AutofixConfig,
    pub directives: DirectiveConfig,
    pub performance: PerformanceConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct RuleSettings {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<SeverityOverride>,
    #[serde(skip_serializing_if = "toml::Table::is_empty")]
    pub options: toml::Table,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AutofixConfig {
    pub enabled: bool,
    /// `text-patch`, `unit-fix` or `external-suggestion`.
    pub mode: String,
    pub output_dir: PathBuf,
    pub suggestion_timeout_ms: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DirectiveConfig {
    pub file: String,
    pub next_line: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct PerformanceConfig {
    pub parallel: bool,
}

impl Default for RuleSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            severity: None,
            options: toml::Table::new(),
        }
    }
}

impl Default for AutofixConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: "unit-fix".to_string(),
            output_dir: PathBuf::from("target/checkfix"),
            suggestion_timeout_ms: 5_000,
        }
    }
}

impl Default for DirectiveConfig {
    fn default() -> Self {
        Self {
            file: "checkfix-disable-file".to_string(),
            next_line: "checkfix-disable-next-line".to_string(),
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { parallel: true }
    }
}

impl RuleSettings {
    /// `self.severity ?? default`.
    pub fn severity_or(&self, default: Severity) -> Severity {
        self.severity.map_or(default, |s| s.0)
    }

    pub fn usize_option(&self, key: &str) -> Option<usize> {
        self.options
            .get(key)
            .and_then(toml::Value::as_integer)
            .and_then(|n| usize::try_from(n).ok())
    }

    pub fn string_list_option(&self, key: &str) -> Option<Vec<String>> {
        let values = self.options.get(key)?.as_array()?;
        Some(
            values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
        )
    }
}

impl Config {
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let config_path = root.join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        Self::from_toml(&config_path, &content)
    }

    pub fn from_toml(path: &Path, content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.message().to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// An empty marker would match every line.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.directives.file.trim().is_empty() {
            return Err(ConfigError::EmptyDirective("file"));
        }
        if self.directives.next_line.trim().is_empty() {
            return Err(ConfigError::EmptyDirective("next_line"));
        }
        Ok(())
    }

    /// Loads `<root>/.checkfix.toml` with paths resolved against `root`.
    pub fn load_or_default(root: &Path) -> Self {
        let mut config = match Self::load(root) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("{}; using default configuration", e);
                Self::default()
            }
        };
        config.anchor_to(root);
        config
    }

    /// Makes a relative `autofix.output_dir` relative to `root` instead of
    /// the working directory.
    pub fn anchor_to(&mut self, root: &Path) {
        if self.autofix.output_dir.is_relative() {
            self.autofix.output_dir = root.join(&self.autofix.output_dir);
        }
    }

    /// Settings for `rule_id`; rules without an entry run with defaults.
    pub fn rule(&self, rule_id: &str) -> RuleSettings {
        self.rules.get(rule_id).cloned().unwrap_or_default()
    }

    pub fn is_enabled(&self, rule_id: &str) -> bool {
        self.rules.get(rule_id).map_or(true, |r| r.enabled)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

pub struct ConfigManager;

impl ConfigManager {
    pub fn new() -> Self {
        Self
    }

    pub fn create_default_config(&self, root: &Path) -> anyhow::Result<PathBuf> {
        let path = root.join(CONFIG_FILE);
        let toml = Config::default().to_toml()?;
        std::fs::write(&path, toml)?;
        Ok(path)
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_config_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert!(config.performance.parallel);
        assert_eq!(config.autofix.mode, "unit-fix");
        assert!(config.is_enabled("console-output"));
    }

    #[test]
    fn test_rule_overrides() {
        let content = r#"
ignore = ["vendor/**"]

[rules.console-output]
severity = "error"

[rules.weak-crypto]
enabled = false

[rules.long-method]
severity = 3
options = { max_statements = 12 }

[autofix]
enabled = true
mode = "text-patch"
"#;
        let config = Config::from_toml(Path::new(CONFIG_FILE), content).unwrap();

        assert_eq!(config.rule("console-output").severity_or(Severity::Info), Severity::Error);
        assert!(!config.is_enabled("weak-crypto"));
        assert_eq!(config.rule("long-method").usize_option("max_statements"), Some(12));
        assert_eq!(config.rule("long-method").severity_or(Severity::Error), Severity::Info);
        assert_eq!(config.rule("unknown").severity_or(Severity::Warning), Severity::Warning);
        assert_eq!(config.autofix.mode, "text-patch");
        assert_eq!(config.ignore, vec!["vendor/**".to_string()]);
        // untouched sections keep their defaults
        assert_eq!(config.directives.next_line, "checkfix-disable-next-line");
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let err = Config::from_toml(Path::new(CONFIG_FILE), "rules = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_empty_directive_marker_is_rejected() {
        let err = Config::from_toml(Path::new(CONFIG_FILE), "[directives]\nfile = \"\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::EmptyDirective("file")));
        let err = Config::from_toml(Path::new(CONFIG_FILE), "[directives]\nnext_line = \" \"\n").unwrap_err();
        assert!(matches!(err, ConfigError::EmptyDirective("next_line")));
    }

    #[test]
    fn test_output_dir_is_resolved_against_config_root() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_or_default(dir.path());
        assert_eq!(config.autofix.output_dir, dir.path().join("target/checkfix"));

        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "[autofix]\noutput_dir = \"/tmp/elsewhere\"\n",
        )
        .unwrap();
        let config = Config::load_or_default(dir.path());
        assert_eq!(config.autofix.output_dir, PathBuf::from("/tmp/elsewhere"));
    }

    #[test]
    fn test_default_config_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = ConfigManager::new().create_default_config(dir.path()).unwrap();
        assert!(path.ends_with(CONFIG_FILE));
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.directives.file, "checkfix-disable-file");
    }
}
