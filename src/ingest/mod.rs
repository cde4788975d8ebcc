/// Input side of the analysis.
///
/// Submodules:
/// - `scenario_csv` — reads one scenario's (return period, intensity)
///   sample from a CSV file.

pub mod scenario_csv;
