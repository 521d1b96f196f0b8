//! Configuration loading and management.

use std::path::{Path, PathBuf};

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::core::{Error, Result};

/// How much per-item narration the pipeline stages log.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// Stage summaries only at `debug`.
    Quiet,
    /// Stage summaries at `info`.
    #[default]
    Normal,
    /// Per-issue and per-file decisions at `info`.
    Detailed,
}

impl Verbosity {
    /// Whether stage summaries should be logged at `info`.
    pub fn summaries(self) -> bool {
        self != Verbosity::Quiet
    }

    /// Whether per-item decisions should be logged at `info`.
    pub fn detailed(self) -> bool {
        self == Verbosity::Detailed
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Issue tracker project key (e.g. `BOOKKEEPER`).
    pub project: String,
    /// Path to the git repository.
    pub repository: PathBuf,
    /// Paths tracked by the lineage registry (glob).
    pub include: Vec<String>,
    /// Paths ignored by the lineage registry (glob).
    pub exclude: Vec<String>,
    /// Release selection.
    pub releases: ReleasesConfig,
    /// Defect injection estimator.
    pub estimator: EstimatorConfig,
    /// Issue tracker connection.
    pub tracker: TrackerConfig,
    /// Export configuration.
    pub output: OutputConfig,
    /// Log narration level.
    pub verbosity: Verbosity,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: String::new(),
            repository: PathBuf::from("."),
            include: vec!["**/*.java".to_string()],
            exclude: Vec::new(),
            releases: ReleasesConfig::default(),
            estimator: EstimatorConfig::default(),
            tracker: TrackerConfig::default(),
            output: OutputConfig::default(),
            verbosity: Verbosity::default(),
        }
    }
}

impl Config {
    /// Load configuration from an explicit file path.
    ///
    /// Errors if the file does not exist. Use this for explicit `--config` flags.
    /// Env vars with `DEFECTSET_` prefix override file values.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::config(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file_exact(path))
            .merge(Env::prefixed("DEFECTSET_").split("__"))
            .extract()
            .map_err(|e| Error::config(e.to_string()))
    }

    /// Load configuration from directory, looking for defectset.toml or
    /// .defectset/defectset.toml.
    ///
    /// Missing files are silently skipped (defaults are used).
    /// Env vars with `DEFECTSET_` prefix override file/default values.
    pub fn load_default(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(dir.join("defectset.toml")))
            .merge(Toml::file(dir.join(".defectset/defectset.toml")))
            .merge(Env::prefixed("DEFECTSET_").split("__"))
            .extract()
            .map_err(|e| Error::config(e.to_string()))
    }

    /// Parse configuration from a TOML string on top of the defaults.
    pub fn from_toml(content: &str) -> Result<Self> {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::string(content))
            .extract()
            .map_err(|e| Error::config(e.to_string()))
    }

    /// Create default config file content.
    pub fn default_toml() -> &'static str {
        include_str!("default_config.toml")
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.project.trim().is_empty() {
            return Err(Error::config("project key must not be empty"));
        }
        if !(1..=100).contains(&self.releases.percentage) {
            return Err(Error::config(format!(
                "releases.percentage must be within 1..=100, got {}",
                self.releases.percentage
            )));
        }
        let fraction = self.estimator.window_fraction;
        if !fraction.is_finite() || fraction <= 0.0 || fraction > 1.0 {
            return Err(Error::config(format!(
                "estimator.window_fraction must be within (0, 1], got {fraction}"
            )));
        }
        if let Some(p) = self.estimator.cold_start {
            if !p.is_finite() || p < 0.0 {
                return Err(Error::config(format!(
                    "estimator.cold_start must be a finite non-negative number, got {p}"
                )));
            }
        }
        if self.tracker.page_size == 0 {
            return Err(Error::config("tracker.page_size must be positive"));
        }
        Ok(())
    }
}

/// Release selection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleasesConfig {
    /// Percentage of the oldest releases whose rows are exported.
    pub percentage: u8,
}

impl Default for ReleasesConfig {
    fn default() -> Self {
        Self { percentage: 50 }
    }
}

/// Proportion estimator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorConfig {
    /// Fraction of previously resolved issues in the moving window.
    pub window_fraction: f64,
    /// Fixed cold-start proportion.
    pub cold_start: Option<f64>,
    /// Projects the cold-start proportion is computed from when not fixed.
    pub reference_projects: Vec<String>,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        Self {
            window_fraction: 0.01,
            cold_start: None,
            reference_projects: Vec::new(),
        }
    }
}

/// Issue tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Jira base URL.
    pub base_url: String,
    /// Issues requested per search page.
    pub page_size: usize,
    /// Issue type treated as a defect.
    pub issue_type: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://issues.apache.org/jira".to_string(),
            page_size: 1000,
            issue_type: "Bug".to_string(),
        }
    }
}

/// Export format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Arff,
    Json,
}

/// Export configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory the export files are written to.
    pub dir: PathBuf,
    /// Formats written.
    pub formats: Vec<ExportFormat>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            formats: vec![ExportFormat::Csv, ExportFormat::Arff],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Config {
        Config {
            project: "BOOKKEEPER".to_string(),
            ..Config::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.releases.percentage, 50);
        assert_eq!(config.estimator.window_fraction, 0.01);
        assert!(config.estimator.cold_start.is_none());
        assert_eq!(config.tracker.page_size, 1000);
        assert_eq!(config.include, vec!["**/*.java"]);
        assert_eq!(
            config.output.formats,
            vec![ExportFormat::Csv, ExportFormat::Arff]
        );
        assert_eq!(config.verbosity, Verbosity::Normal);
    }

    #[test]
    fn test_default_toml_parses() {
        let config = Config::from_toml(Config::default_toml()).unwrap();
        assert_eq!(config.releases.percentage, 50);
        assert_eq!(config.tracker.issue_type, "Bug");
    }

    #[test]
    fn test_from_toml_overrides() {
        let config = Config::from_toml(
            r#"
project = "AVRO"
verbosity = "detailed"

[releases]
percentage = 33

[estimator]
cold_start = 0.42
"#,
        )
        .unwrap();
        assert_eq!(config.project, "AVRO");
        assert_eq!(config.releases.percentage, 33);
        assert_eq!(config.estimator.cold_start, Some(0.42));
        assert_eq!(config.verbosity, Verbosity::Detailed);
        assert_eq!(config.estimator.window_fraction, 0.01);
    }

    #[test]
    fn test_from_file_missing() {
        let result = Config::from_file("/nonexistent/defectset.toml");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_load_default_without_files() {
        let temp = tempfile::tempdir().unwrap();
        let config = Config::load_default(temp.path()).unwrap();
        assert_eq!(config.releases.percentage, 50);
    }

    #[test]
    fn test_load_default_reads_dotdir() {
        let temp = tempfile::tempdir().unwrap();
        std::fs::create_dir(temp.path().join(".defectset")).unwrap();
        std::fs::write(
            temp.path().join(".defectset/defectset.toml"),
            "project = \"ZOOKEEPER\"\n",
        )
        .unwrap();
        let config = Config::load_default(temp.path()).unwrap();
        assert_eq!(config.project, "ZOOKEEPER");
    }

    #[test]
    fn test_validate_accepts_defaults_with_project() {
        assert!(valid().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_project() {
        assert!(Config::default().validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_percentage() {
        let mut config = valid();
        config.releases.percentage = 0;
        assert!(config.validate().is_err());
        config.releases.percentage = 101;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_estimator_values() {
        let mut config = valid();
        config.estimator.window_fraction = 0.0;
        assert!(config.validate().is_err());

        let mut config = valid();
        config.estimator.cold_start = Some(-0.1);
        assert!(config.validate().is_err());

        let mut config = valid();
        config.estimator.cold_start = Some(f64::NAN);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_verbosity_levels() {
        assert!(!Verbosity::Quiet.summaries());
        assert!(Verbosity::Normal.summaries());
        assert!(!Verbosity::Normal.detailed());
        assert!(Verbosity::Detailed.detailed());
    }
}
