/// Scenario sample reader.
///
/// Each scenario ships as a CSV with a header row. Two columns matter:
/// the empirical return period in years (default `return-years`) and the
/// intensity (default `wind`). Other columns are ignored, and so are rows
/// whose intensity cell is blank. Any other unparseable cell is an error
/// that names the file, line and column.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::config::ScenarioConfig;
use crate::model::{FitError, Observation, Sample};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum IngestError {
    /// The file could not be opened.
    Io { path: PathBuf, source: std::io::Error },
    /// The CSV itself is malformed (ragged rows, bad UTF-8, ...).
    Csv { origin: String, source: csv::Error },
    /// A required header is absent.
    MissingColumn {
        origin: String,
        column: String,
        available: Vec<String>,
    },
    /// A cell in a required column is not a number.
    BadValue {
        origin: String,
        line: u64,
        column: String,
        value: String,
    },
    /// Rows parsed but do not form a valid sample.
    Sample { origin: String, source: FitError },
}

impl IngestError {
    /// Failure kind for the run summary. Invalid samples keep the
    /// fitter's own kind so they read the same whichever stage caught them.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::Sample { source, .. } => source.kind(),
            _ => "IngestError",
        }
    }
}

impl std::fmt::Display for IngestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IngestError::Io { path, source } => {
                write!(f, "Failed to open {}: {}", path.display(), source)
            }
            IngestError::Csv { origin, source } => {
                write!(f, "Malformed CSV in {}: {}", origin, source)
            }
            IngestError::MissingColumn { origin, column, available } => write!(
                f,
                "{} has no '{}' column (found: {})",
                origin,
                column,
                available.join(", ")
            ),
            IngestError::BadValue { origin, line, column, value } => write!(
                f,
                "{} line {}: '{}' value '{}' is not a number",
                origin, line, column, value
            ),
            IngestError::Sample { origin, source } => write!(f, "{}: {}", origin, source),
        }
    }
}

impl std::error::Error for IngestError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IngestError::Io { source, .. } => Some(source),
            IngestError::Csv { source, .. } => Some(source),
            IngestError::Sample { source, .. } => Some(source),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Readers
// ---------------------------------------------------------------------------

/// Column names to pull from the CSV.
#[derive(Debug, Clone, Copy)]
pub struct Columns<'a> {
    pub return_period: &'a str,
    pub intensity: &'a str,
}

/// Reads the sample described by one `[[scenario]]` entry.
pub fn read_scenario(scenario: &ScenarioConfig) -> Result<Sample, IngestError> {
    read_sample(
        &scenario.path,
        &scenario.label,
        Columns {
            return_period: &scenario.return_period_column,
            intensity: &scenario.intensity_column,
        },
    )
}

/// Reads a sample from a CSV file on disk.
pub fn read_sample<P: AsRef<Path>>(
    path: P,
    label: &str,
    columns: Columns<'_>,
) -> Result<Sample, IngestError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| IngestError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    read_sample_from_reader(file, &path.display().to_string(), label, columns)
}

/// Reads a sample from any reader. `origin` names the source in errors.
pub fn read_sample_from_reader<R: Read>(
    reader: R,
    origin: &str,
    label: &str,
    columns: Columns<'_>,
) -> Result<Sample, IngestError> {
    let csv_err = |e: csv::Error| IngestError::Csv {
        origin: origin.to_string(),
        source: e,
    };

    let mut rdr = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = rdr.headers().map_err(csv_err)?.clone();
    let rp_idx = column_index(&headers, columns.return_period, origin)?;
    let intensity_idx = column_index(&headers, columns.intensity, origin)?;

    let mut observations = Vec::new();
    for record in rdr.records() {
        let record = record.map_err(csv_err)?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);

        let intensity_cell = record.get(intensity_idx).unwrap_or("");
        if intensity_cell.is_empty() {
            continue;
        }

        let parse = |cell: &str, column: &str| -> Result<f64, IngestError> {
            cell.parse::<f64>().map_err(|_| IngestError::BadValue {
                origin: origin.to_string(),
                line,
                column: column.to_string(),
                value: cell.to_string(),
            })
        };

        let return_period = parse(record.get(rp_idx).unwrap_or(""), columns.return_period)?;
        let intensity = parse(intensity_cell, columns.intensity)?;
        observations.push(Observation::new(return_period, intensity));
    }

    Sample::new(label, observations).map_err(|e| IngestError::Sample {
        origin: origin.to_string(),
        source: e,
    })
}

fn column_index(
    headers: &csv::StringRecord,
    column: &str,
    origin: &str,
) -> Result<usize, IngestError> {
    headers
        .iter()
        .position(|h| h == column)
        .ok_or_else(|| IngestError::MissingColumn {
            origin: origin.to_string(),
            column: column.to_string(),
            available: headers.iter().map(String::from).collect(),
        })
}
