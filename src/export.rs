/// Output files for a batch run.
///
/// Per fitted scenario, under the output directory:
/// - `<slug>_fit.csv`     — `return-period,rp,rp_up,rp_low` over the grid
/// - `<slug>_scatter.csv` — `return-years,<intensity column>,in_tail`, the
///   input sample with a tail flag
///
/// `rp_up` and `rp_low` are the band envelope (see
/// `ScenarioFit::curve_point`), not the curves at `params ± nstd·se`
/// themselves: near the threshold those two can swap sides of `rp`.
///
/// Plus one `summary.json` describing every scenario, fitted or failed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::model::{CurvePoint, Sample, ScenarioFailure, ScenarioFit};

pub const SUMMARY_FILE: &str = "summary.json";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ExportError {
    Io { path: PathBuf, source: std::io::Error },
    Csv { path: PathBuf, source: csv::Error },
    Json { path: PathBuf, source: serde_json::Error },
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportError::Io { path, source } => {
                write!(f, "Failed to write {}: {}", path.display(), source)
            }
            ExportError::Csv { path, source } => {
                write!(f, "Failed to write CSV {}: {}", path.display(), source)
            }
            ExportError::Json { path, source } => {
                write!(f, "Failed to write JSON {}: {}", path.display(), source)
            }
        }
    }
}

impl std::error::Error for ExportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ExportError::Io { source, .. } => Some(source),
            ExportError::Csv { source, .. } => Some(source),
            ExportError::Json { source, .. } => Some(source),
        }
    }
}

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// Column names match the plotting scripts downstream.
#[derive(Debug, Serialize)]
struct CurveRow {
    #[serde(rename = "return-period")]
    return_period: f64,
    rp: f64,
    rp_up: f64,
    rp_low: f64,
}

impl From<&CurvePoint> for CurveRow {
    fn from(p: &CurvePoint) -> Self {
        CurveRow {
            return_period: p.return_period,
            rp: p.central,
            rp_up: p.upper,
            rp_low: p.lower,
        }
    }
}

/// Header is written by hand: the intensity column keeps the scenario's
/// own name.
#[derive(Debug, Serialize)]
struct ScatterRow {
    return_years: f64,
    intensity: f64,
    in_tail: bool,
}

// ---------------------------------------------------------------------------
// Run summary
// ---------------------------------------------------------------------------

/// What happened to one scenario in a run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ScenarioOutcome {
    Fitted {
        #[serde(flatten)]
        fit: ScenarioFit,
        curve_file: String,
        scatter_file: String,
    },
    Failed {
        label: String,
        /// `ingest`, `fit` or `export`.
        stage: String,
        kind: String,
        tail_points: Option<usize>,
        message: String,
    },
}

impl ScenarioOutcome {
    pub fn fitted(fit: &ScenarioFit, files: &ScenarioFiles) -> Self {
        ScenarioOutcome::Fitted {
            fit: fit.clone(),
            curve_file: file_name(&files.curve),
            scatter_file: file_name(&files.scatter),
        }
    }

    pub fn fit_failed(failure: &ScenarioFailure) -> Self {
        ScenarioOutcome::Failed {
            label: failure.label.clone(),
            stage: "fit".to_string(),
            kind: failure.error.kind().to_string(),
            tail_points: failure.tail_points,
            message: failure.error.to_string(),
        }
    }

    /// Failure outside the fitter (reading input, writing output), with
    /// the kind derived from the stage name.
    pub fn other_failed(label: &str, stage: &str, err: &dyn std::error::Error) -> Self {
        Self::stage_failed(label, stage, &format!("{}Error", capitalize(stage)), err)
    }

    /// Failure outside the fitter with an explicit kind.
    pub fn stage_failed(
        label: &str,
        stage: &str,
        kind: &str,
        err: &dyn std::error::Error,
    ) -> Self {
        ScenarioOutcome::Failed {
            label: label.to_string(),
            stage: stage.to_string(),
            kind: kind.to_string(),
            tail_points: None,
            message: err.to_string(),
        }
    }

    pub fn label(&self) -> &str {
        match self {
            ScenarioOutcome::Fitted { fit, .. } => &fit.label,
            ScenarioOutcome::Failed { label, .. } => label,
        }
    }

    pub fn is_fitted(&self) -> bool {
        matches!(self, ScenarioOutcome::Fitted { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_at: DateTime<Utc>,
    pub config: String,
    pub scenarios: Vec<ScenarioOutcome>,
}

impl RunSummary {
    pub fn new(config: &Path) -> Self {
        RunSummary {
            generated_at: Utc::now(),
            config: config.display().to_string(),
            scenarios: Vec::new(),
        }
    }

    pub fn fitted_count(&self) -> usize {
        self.scenarios.iter().filter(|s| s.is_fitted()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.scenarios.len() - self.fitted_count()
    }
}

// ---------------------------------------------------------------------------
// Writers
// ---------------------------------------------------------------------------

/// Filesystem-safe lowercase name: "SSP2-4.5" -> "ssp2_4_5".
pub fn scenario_slug(label: &str) -> String {
    let mut slug = String::with_capacity(label.len());
    for c in label.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c.to_ascii_lowercase());
        } else if !slug.ends_with('_') {
            slug.push('_');
        }
    }
    let trimmed = slug.trim_matches('_');
    if trimmed.is_empty() {
        "scenario".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Writes the curve table to any writer.
pub fn write_curve_csv<W: Write>(writer: W, curve: &[CurvePoint]) -> Result<(), csv::Error> {
    let mut wtr = csv::Writer::from_writer(writer);
    for point in curve {
        wtr.serialize(CurveRow::from(point))?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes the input sample with each row flagged as tail or body. The
/// intensity column is headed `intensity_column`, as in the input file.
pub fn write_scatter_csv<W: Write>(
    writer: W,
    sample: &Sample,
    threshold: f64,
    intensity_column: &str,
) -> Result<(), csv::Error> {
    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(["return-years", intensity_column, "in_tail"])?;
    for obs in sample.observations() {
        wtr.serialize(ScatterRow {
            return_years: obs.return_period,
            intensity: obs.intensity,
            in_tail: obs.intensity >= threshold,
        })?;
    }
    wtr.flush()?;
    Ok(())
}

/// Paths written for one scenario.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioFiles {
    pub curve: PathBuf,
    pub scatter: PathBuf,
}

/// Writes the curve and scatter CSVs for one fitted scenario.
pub fn write_scenario_outputs(
    dir: &Path,
    sample: &Sample,
    fit: &ScenarioFit,
    intensity_column: &str,
) -> Result<ScenarioFiles, ExportError> {
    let slug = scenario_slug(&fit.label);
    let files = ScenarioFiles {
        curve: dir.join(format!("{}_fit.csv", slug)),
        scatter: dir.join(format!("{}_scatter.csv", slug)),
    };

    let curve_file = create(&files.curve)?;
    write_curve_csv(curve_file, &fit.curve).map_err(|e| ExportError::Csv {
        path: files.curve.clone(),
        source: e,
    })?;

    let scatter_file = create(&files.scatter)?;
    write_scatter_csv(scatter_file, sample, fit.threshold, intensity_column).map_err(|e| {
        ExportError::Csv {
            path: files.scatter.clone(),
            source: e,
        }
    })?;

    Ok(files)
}

/// Writes `summary.json` into `dir` and returns its path.
pub fn write_summary_json(dir: &Path, summary: &RunSummary) -> Result<PathBuf, ExportError> {
    let path = dir.join(SUMMARY_FILE);
    let json = serde_json::to_string_pretty(summary).map_err(|e| ExportError::Json {
        path: path.clone(),
        source: e,
    })?;
    fs::write(&path, json).map_err(|e| ExportError::Io {
        path: path.clone(),
        source: e,
    })?;
    Ok(path)
}

/// Creates the output directory if needed.
pub fn ensure_output_dir(dir: &Path) -> Result<(), ExportError> {
    fs::create_dir_all(dir).map_err(|e| ExportError::Io {
        path: dir.to_path_buf(),
        source: e,
    })
}

fn create(path: &Path) -> Result<File, ExportError> {
    File::create(path).map_err(|e| ExportError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
