/// Core data types for the climate-risk return-level analysis.
///
/// This module defines the shared domain model imported by all other
/// modules: samples, fitted parameters, curve points and the failure
/// taxonomy of the fitter. It contains no I/O.

use serde::Serialize;

// ---------------------------------------------------------------------------
// Design constants
// ---------------------------------------------------------------------------

/// Quantile of the sample intensities used as the GPD threshold u.
pub const TAIL_QUANTILE: f64 = 0.90;

/// Number of free parameters in the return-level model (ξ, σ, ζ_u).
pub const N_PARAMS: usize = 3;

/// Smallest tail that can be fitted: one more point than free parameters.
pub const MIN_TAIL_POINTS: usize = N_PARAMS + 1;

/// Default exceedance-rate ratio in the return-level model.
pub const DEFAULT_V_RATIO: f64 = 0.1;

/// Default band width in standard deviations.
pub const DEFAULT_NSTD: f64 = 3.0;

// ---------------------------------------------------------------------------
// Sample types
// ---------------------------------------------------------------------------

/// One (return period, intensity) pair, e.g. a storm's maximum wind speed
/// and its empirical return period in years.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Observation {
    pub return_period: f64,
    pub intensity: f64,
}

impl Observation {
    pub fn new(return_period: f64, intensity: f64) -> Self {
        Self { return_period, intensity }
    }
}

/// All observations for one climate scenario ("Current climate",
/// "SSP2-4.5", ...).
///
/// Immutable once built. `Sample::new` guarantees the sample is non-empty,
/// every return period is finite and positive and every intensity is
/// finite.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    label: String,
    observations: Vec<Observation>,
}

impl Sample {
    pub fn new(label: impl Into<String>, observations: Vec<Observation>) -> Result<Self, FitError> {
        if observations.is_empty() {
            return Err(FitError::InvalidSample("sample is empty".to_string()));
        }

        for (i, obs) in observations.iter().enumerate() {
            if !obs.return_period.is_finite() || obs.return_period <= 0.0 {
                return Err(FitError::InvalidSample(format!(
                    "row {}: return period must be positive, got {}",
                    i, obs.return_period
                )));
            }
            if !obs.intensity.is_finite() {
                return Err(FitError::InvalidSample(format!(
                    "row {}: intensity must be finite, got {}",
                    i, obs.intensity
                )));
            }
        }

        Ok(Self {
            label: label.into(),
            observations,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn intensities(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.intensity).collect()
    }
}

// ---------------------------------------------------------------------------
// Fit output types
// ---------------------------------------------------------------------------

/// Parameters of the GPD tail model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GpdParams {
    /// Shape ξ.
    pub xi: f64,
    /// Scale σ.
    pub sigma: f64,
    /// Exceedance rate ζ_u.
    pub zeta_u: f64,
}

impl GpdParams {
    pub fn new(xi: f64, sigma: f64, zeta_u: f64) -> Self {
        Self { xi, sigma, zeta_u }
    }

    pub fn to_array(self) -> [f64; N_PARAMS] {
        [self.xi, self.sigma, self.zeta_u]
    }

    pub fn from_array(p: [f64; N_PARAMS]) -> Self {
        Self::new(p[0], p[1], p[2])
    }

    /// `self + k * other`, component-wise. Used to shift parameters by a
    /// multiple of their standard errors.
    pub fn offset(self, other: GpdParams, k: f64) -> Self {
        Self::new(
            self.xi + k * other.xi,
            self.sigma + k * other.sigma,
            self.zeta_u + k * other.zeta_u,
        )
    }

    pub fn is_finite(&self) -> bool {
        self.xi.is_finite() && self.sigma.is_finite() && self.zeta_u.is_finite()
    }
}

/// One row of the plotted curve: central fit plus band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CurvePoint {
    pub return_period: f64,
    pub central: f64,
    pub upper: f64,
    pub lower: f64,
}

/// Successful fit for one scenario.
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioFit {
    pub label: String,
    /// Threshold u the fit and the curve both use.
    pub threshold: f64,
    pub tail_points: usize,
    pub params: GpdParams,
    /// Square roots of the covariance diagonal, same layout as `params`.
    pub std_errors: GpdParams,
    pub v_ratio: f64,
    pub nstd: f64,
    pub residual_sum_squares: f64,
    pub evaluations: usize,
    #[serde(skip)]
    pub curve: Vec<CurvePoint>,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Reasons a scenario could not be fitted.
#[derive(Debug, Clone, PartialEq)]
pub enum FitError {
    /// The input rows were rejected before any computation.
    InvalidSample(String),
    /// Fewer tail points than the model needs. The solver was not run.
    InsufficientTailData { tail_points: usize, required: usize },
    /// The solver ran out of budget, the tail is degenerate, or the
    /// covariance could not be formed.
    FitNonConvergence { evaluations: usize, reason: String },
    /// The model has no real value at this return period / parameter set.
    DomainError { return_period: f64, detail: String },
}

impl FitError {
    /// Stable tag used in the run summary.
    pub fn kind(&self) -> &'static str {
        match self {
            FitError::InvalidSample(_) => "InvalidSample",
            FitError::InsufficientTailData { .. } => "InsufficientTailData",
            FitError::FitNonConvergence { .. } => "FitNonConvergence",
            FitError::DomainError { .. } => "DomainError",
        }
    }
}

impl std::fmt::Display for FitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FitError::InvalidSample(msg) => write!(f, "Invalid sample: {}", msg),
            FitError::InsufficientTailData { tail_points, required } => write!(
                f,
                "Insufficient tail data: {} points at or above threshold, need {}",
                tail_points, required
            ),
            FitError::FitNonConvergence { evaluations, reason } => write!(
                f,
                "Fit did not converge after {} evaluations: {}",
                evaluations, reason
            ),
            FitError::DomainError { return_period, detail } => write!(
                f,
                "Domain error at return period {}: {}",
                return_period, detail
            ),
        }
    }
}

impl std::error::Error for FitError {}

/// A fit failure tagged with the scenario it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct ScenarioFailure {
    pub label: String,
    /// Tail size, when the threshold step got that far.
    pub tail_points: Option<usize>,
    pub error: FitError,
}

impl std::fmt::Display for ScenarioFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.label, self.error)
    }
}

impl std::error::Error for ScenarioFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_rejects_empty() {
        let err = Sample::new("empty", vec![]).unwrap_err();
        assert_eq!(err.kind(), "InvalidSample");
    }

    #[test]
    fn test_sample_rejects_non_positive_return_period() {
        let obs = vec![Observation::new(2.0, 10.0), Observation::new(0.0, 11.0)];
        let err = Sample::new("bad rp", obs).unwrap_err();
        assert!(matches!(err, FitError::InvalidSample(ref m) if m.contains("row 1")));
    }

    #[test]
    fn test_sample_rejects_nan_intensity() {
        let obs = vec![Observation::new(2.0, f64::NAN)];
        assert!(Sample::new("nan", obs).is_err());
    }

    #[test]
    fn test_params_offset() {
        let p = GpdParams::new(0.1, 5.0, 1.0);
        let se = GpdParams::new(0.01, 0.5, 0.1);
        let up = p.offset(se, 3.0);
        assert!((up.xi - 0.13).abs() < 1e-12);
        assert!((up.sigma - 6.5).abs() < 1e-12);
        assert!((up.zeta_u - 1.3).abs() < 1e-12);
    }

    #[test]
    fn test_error_display_names_counts() {
        let err = FitError::InsufficientTailData { tail_points: 2, required: 4 };
        assert_eq!(
            err.to_string(),
            "Insufficient tail data: 2 points at or above threshold, need 4"
        );
    }
}
