/// Extreme-value analysis of one scenario sample.
///
/// Submodules:
/// - `threshold`    — 90th-percentile threshold and tail selection
/// - `return_level` — the GPD return-level model and its gradient
/// - `solver`       — starting point and L-BFGS least squares (argmin)
/// - `fitter`       — ties the above together into a fitted curve with band

pub mod fitter;
pub mod return_level;
pub mod solver;
pub mod threshold;

pub use fitter::{fit_scenario, fit_tail};
pub use return_level::{return_level, ReturnLevelModel};
