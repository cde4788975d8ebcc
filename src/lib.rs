/// climrisk_analysis: GPD return-level curves for tropical-cyclone
/// intensity under several climate scenarios.
///
/// # Module structure
///
/// ```text
/// climrisk_analysis
/// ├── model       — shared data types (Sample, GpdParams, ScenarioFit, FitError, …)
/// ├── config      — run configuration loader (fit.toml)
/// ├── logging     — stage-tagged console and file logging
/// ├── ingest
/// │   └── scenario_csv — per-scenario CSV sample reader
/// ├── analysis
/// │   ├── threshold    — 90th-percentile threshold, tail selection
/// │   ├── return_level — return-level model and gradient
/// │   ├── solver       — nonlinear least squares + covariance
/// │   └── fitter       — per-scenario fit, std errors, confidence band
/// ├── export      — curve/scatter CSVs and the JSON run summary
/// └── batch       — per-scenario ingest → fit → export with isolated failures
/// ```

/// Public modules
pub mod analysis;
pub mod batch;
pub mod config;
pub mod export;
pub mod ingest;
pub mod logging;
pub mod model;
