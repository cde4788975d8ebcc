/// Analysis configuration loader - parses fit.toml
///
/// Keeps scenario inputs, column names and fitter constants out of the
/// code so a new dataset only needs a config edit.
///
/// The config path defaults to `fit.toml` in the working directory and can
/// be overridden with `CLIMRISK_CONFIG` (also read from `.env`).

use serde::Deserialize;
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::analysis::solver::DEFAULT_MAX_EVALUATIONS;
use crate::model::{DEFAULT_NSTD, DEFAULT_V_RATIO};

pub const DEFAULT_CONFIG_PATH: &str = "fit.toml";
pub const CONFIG_PATH_ENV: &str = "CLIMRISK_CONFIG";
pub const LOG_FILE_ENV: &str = "CLIMRISK_LOG_FILE";

/// Column names used by the hurricane scenario exports.
pub const DEFAULT_RETURN_PERIOD_COLUMN: &str = "return-years";
pub const DEFAULT_INTENSITY_COLUMN: &str = "wind";

// ---------------------------------------------------------------------------
// Configuration structures
// ---------------------------------------------------------------------------

/// Fitter design constants.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FitSettings {
    /// Ratio in the exceedance-rate term of the return-level model.
    pub v_ratio: f64,
    /// Band half-width, in standard errors of each parameter.
    pub nstd: f64,
    /// Solver budget in model evaluations over the tail.
    pub max_evaluations: usize,
}

impl Default for FitSettings {
    fn default() -> Self {
        Self {
            v_ratio: DEFAULT_V_RATIO,
            nstd: DEFAULT_NSTD,
            max_evaluations: DEFAULT_MAX_EVALUATIONS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GridSpacing {
    Linear,
    Log,
}

/// Return periods the fitted curve is evaluated on.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GridSettings {
    pub start_years: f64,
    pub end_years: f64,
    pub points: usize,
    pub spacing: GridSpacing,
}

impl Default for GridSettings {
    fn default() -> Self {
        Self {
            start_years: 1.01,
            end_years: 100_000.0,
            points: 100_000,
            spacing: GridSpacing::Log,
        }
    }
}

impl GridSettings {
    /// Grid values, first and last exactly `start_years` and `end_years`.
    pub fn return_periods(&self) -> Vec<f64> {
        let n = self.points.max(2);
        let last = (n - 1) as f64;
        (0..n)
            .map(|i| {
                if i == n - 1 {
                    return self.end_years;
                }
                let t = i as f64 / last;
                match self.spacing {
                    GridSpacing::Linear => {
                        self.start_years + t * (self.end_years - self.start_years)
                    }
                    GridSpacing::Log => {
                        let (a, b) = (self.start_years.ln(), self.end_years.ln());
                        (a + t * (b - a)).exp()
                    }
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub directory: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
        }
    }
}

/// One climate scenario and where its sample lives.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScenarioConfig {
    pub label: String,
    pub path: PathBuf,
    #[serde(default = "default_return_period_column")]
    pub return_period_column: String,
    #[serde(default = "default_intensity_column")]
    pub intensity_column: String,
}

fn default_return_period_column() -> String {
    DEFAULT_RETURN_PERIOD_COLUMN.to_string()
}

fn default_intensity_column() -> String {
    DEFAULT_INTENSITY_COLUMN.to_string()
}

/// Root configuration structure for TOML parsing
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub fit: FitSettings,
    #[serde(default)]
    pub grid: GridSettings,
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(rename = "scenario", default)]
    pub scenarios: Vec<ScenarioConfig>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ConfigError {
    /// The file could not be read.
    Io { path: PathBuf, source: std::io::Error },
    /// The file is not valid TOML for this schema.
    Parse { path: PathBuf, source: toml::de::Error },
    /// Parsed, but a value is out of range.
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(f, "Failed to read {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "Failed to parse {}: {}", path.display(), source)
            }
            ConfigError::Invalid(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid(_) => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl AnalysisConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: AnalysisConfig = toml::from_str(contents).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Range checks that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| -> Result<(), ConfigError> { Err(ConfigError::Invalid(msg)) };

        if !(self.fit.v_ratio > 0.0) || !self.fit.v_ratio.is_finite() {
            return invalid(format!("fit.v_ratio must be positive, got {}", self.fit.v_ratio));
        }
        if !(self.fit.nstd >= 0.0) || !self.fit.nstd.is_finite() {
            return invalid(format!("fit.nstd must be non-negative, got {}", self.fit.nstd));
        }
        if self.fit.max_evaluations == 0 {
            return invalid("fit.max_evaluations must be at least 1".to_string());
        }
        if !(self.grid.start_years > 1.0) {
            return invalid(format!(
                "grid.start_years must be above 1 year, got {}",
                self.grid.start_years
            ));
        }
        if !(self.grid.end_years > self.grid.start_years) || !self.grid.end_years.is_finite() {
            return invalid(format!(
                "grid.end_years ({}) must exceed grid.start_years ({})",
                self.grid.end_years, self.grid.start_years
            ));
        }
        if self.grid.points < 2 {
            return invalid(format!("grid.points must be at least 2, got {}", self.grid.points));
        }
        if self.scenarios.is_empty() {
            return invalid("at least one [[scenario]] is required".to_string());
        }

        let mut seen = HashSet::new();
        for scenario in &self.scenarios {
            if scenario.label.trim().is_empty() {
                return invalid("scenario label must not be empty".to_string());
            }
            if !seen.insert(scenario.label.as_str()) {
                return invalid(format!("duplicate scenario label '{}'", scenario.label));
            }
        }

        Ok(())
    }

    /// Scenario by label.
    pub fn scenario(&self, label: &str) -> Option<&ScenarioConfig> {
        self.scenarios.iter().find(|s| s.label == label)
    }
}

/// Loads the analysis configuration from an explicit path.
pub fn load_config_from<P: AsRef<Path>>(path: P) -> Result<AnalysisConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    AnalysisConfig::from_toml_str(&contents, path)
}

/// Resolves the config path: `CLIMRISK_CONFIG` (environment or `.env`),
/// otherwise `fit.toml` in the working directory.
pub fn config_path() -> PathBuf {
    dotenv::dotenv().ok();
    env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Optional log file path from `CLIMRISK_LOG_FILE`.
pub fn log_file_path() -> Option<String> {
    dotenv::dotenv().ok();
    env::var(LOG_FILE_ENV).ok().filter(|p| !p.trim().is_empty())
}
