/// Per-scenario return-level fitting.
///
/// `fit_scenario` runs the whole pipeline for one sample:
///
/// 1. Threshold u = 90th percentile of the intensities, tail = points ≥ u
/// 2. Guards: at least four tail points, tail not flat at u
/// 3. Profiled starting point, L-BFGS least-squares solve
/// 4. Standard errors from the covariance diagonal
/// 5. Central curve and ± nstd band over the return-period grid
///
/// Each call depends only on its arguments. A failure carries the scenario
/// label so a batch over several scenarios can report it and move on.

use crate::analysis::return_level::ReturnLevelModel;
use crate::analysis::solver::{initial_guess, solve};
use crate::analysis::threshold::{select_tail, TailSelection};
use crate::config::{FitSettings, GridSettings};
use crate::model::{
    CurvePoint, FitError, GpdParams, MIN_TAIL_POINTS, Sample, ScenarioFailure, ScenarioFit,
};

/// Tail intensities closer than this to u count as equal to it.
const DEGENERATE_TAIL_TOL: f64 = 1e-12;

/// Fits one scenario and evaluates its curve on the configured grid.
pub fn fit_scenario(
    sample: &Sample,
    fit: &FitSettings,
    grid: &GridSettings,
) -> Result<ScenarioFit, ScenarioFailure> {
    let selection = select_tail(sample);
    let tail_points = selection.len();

    let fail = |error: FitError| ScenarioFailure {
        label: sample.label().to_string(),
        tail_points: Some(tail_points),
        error,
    };

    let mut fitted = fit_tail(sample.label(), &selection, fit).map_err(fail)?;
    fitted.curve = fitted.curve_over(&grid.return_periods()).map_err(fail)?;
    Ok(fitted)
}

/// Fits the tail without evaluating the dense curve.
pub fn fit_tail(
    label: &str,
    selection: &TailSelection,
    fit: &FitSettings,
) -> Result<ScenarioFit, FitError> {
    let tail = &selection.tail;
    if tail.len() < MIN_TAIL_POINTS {
        return Err(FitError::InsufficientTailData {
            tail_points: tail.len(),
            required: MIN_TAIL_POINTS,
        });
    }

    let spread = tail
        .iter()
        .map(|o| (o.intensity - selection.threshold).abs())
        .fold(0.0_f64, f64::max);
    if spread <= DEGENERATE_TAIL_TOL * selection.threshold.abs().max(1.0) {
        return Err(FitError::FitNonConvergence {
            evaluations: 0,
            reason: format!(
                "degenerate tail: all {} tail intensities equal the threshold {}",
                tail.len(),
                selection.threshold
            ),
        });
    }

    let model = ReturnLevelModel::new(selection.threshold, fit.v_ratio);
    let start = initial_guess(&model, tail)?;
    let outcome = solve(&model, tail, start, fit.max_evaluations)?;

    if !outcome.params.is_finite() {
        return Err(FitError::FitNonConvergence {
            evaluations: outcome.evaluations,
            reason: format!("solver returned non-finite parameters {:?}", outcome.params),
        });
    }

    Ok(ScenarioFit {
        label: label.to_string(),
        threshold: selection.threshold,
        tail_points: tail.len(),
        params: outcome.params,
        std_errors: outcome.std_errors(),
        v_ratio: fit.v_ratio,
        nstd: fit.nstd,
        residual_sum_squares: outcome.residual_sum_squares,
        evaluations: outcome.evaluations,
        curve: Vec::new(),
    })
}

impl ScenarioFit {
    fn model(&self) -> ReturnLevelModel {
        ReturnLevelModel::new(self.threshold, self.v_ratio)
    }

    /// Central return level at `return_period`.
    pub fn return_level(&self, return_period: f64) -> Result<f64, FitError> {
        self.model().evaluate(return_period, &self.params)
    }

    /// Parameters shifted by `+nstd` and `-nstd` standard errors.
    pub fn band_params(&self) -> (GpdParams, GpdParams) {
        (
            self.params.offset(self.std_errors, self.nstd),
            self.params.offset(self.std_errors, -self.nstd),
        )
    }

    /// Central value and band at one return period.
    ///
    /// The band is an envelope, not the raw shifted curves: `upper` is the
    /// pointwise max and `lower` the pointwise min of the central curve and
    /// the curves at `params + nstd·se` and `params − nstd·se`. Near the
    /// threshold, where `v·ζ_u / L < 1`, a larger σ lowers the level, so
    /// the `+nstd` curve can lie under the central one and `upper` then
    /// comes from the `−nstd` parameters.
    pub fn curve_point(&self, return_period: f64) -> Result<CurvePoint, FitError> {
        let model = self.model();
        let (plus, minus) = self.band_params();

        let central = model.evaluate(return_period, &self.params)?;
        let a = model.evaluate(return_period, &plus)?;
        let b = model.evaluate(return_period, &minus)?;

        Ok(CurvePoint {
            return_period,
            central,
            upper: central.max(a).max(b),
            lower: central.min(a).min(b),
        })
    }

    /// Curve points for every return period, in order.
    pub fn curve_over(&self, return_periods: &[f64]) -> Result<Vec<CurvePoint>, FitError> {
        return_periods.iter().map(|&rp| self.curve_point(rp)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GridSpacing;
    use crate::model::Observation;

    fn small_grid() -> GridSettings {
        GridSettings {
            start_years: 1.01,
            end_years: 100_000.0,
            points: 400,
            spacing: GridSpacing::Log,
        }
    }

    /// 101 points: 90 body points below 20, then 11 tail points from the
    /// model with u = 20 whose smallest value sits exactly on the
    /// 90th percentile.
    fn well_conditioned_sample(noise: f64) -> Sample {
        let truth = GpdParams::new(0.1, 5.0, 1.0);
        let model = ReturnLevelModel::new(20.0, 0.1);

        let mut obs: Vec<Observation> = (0..90)
            .map(|i| Observation::new(1.0 + i as f64 * 0.1, 5.0 + i as f64 * 0.1))
            .collect();

        let rp0 = 1.0 / (1.0 - (-0.1_f64).exp());
        for k in 0..=10 {
            let rp = rp0 * (10_000.0 / rp0).powf(k as f64 / 10.0);
            let wiggle = if k == 0 { 0.0 } else { noise * [1.0, -1.0, 0.5, -0.5][k % 4] };
            obs.push(Observation::new(rp, model.evaluate(rp, &truth).unwrap() + wiggle));
        }

        Sample::new("synthetic", obs).unwrap()
    }

    #[test]
    fn test_recovers_parameters_on_well_conditioned_tail() {
        let sample = well_conditioned_sample(0.02);
        let fit = fit_scenario(&sample, &FitSettings::default(), &small_grid())
            .expect("fit should succeed");

        assert!((fit.threshold - 20.0).abs() < 1e-9, "u = {}", fit.threshold);
        assert_eq!(fit.tail_points, 11);
        assert!((fit.params.xi - 0.1).abs() < 0.02, "xi = {}", fit.params.xi);
        assert!((fit.params.sigma - 5.0).abs() < 1.0, "sigma = {}", fit.params.sigma);
        assert!((fit.params.zeta_u - 1.0).abs() < 0.2, "zeta_u = {}", fit.params.zeta_u);
        assert!(fit.std_errors.is_finite());
        assert_eq!(fit.curve.len(), 400);
    }

    #[test]
    fn test_band_brackets_central_everywhere() {
        let sample = well_conditioned_sample(0.05);
        let fit = fit_scenario(&sample, &FitSettings::default(), &small_grid()).unwrap();

        for p in &fit.curve {
            assert!(
                p.lower <= p.central && p.central <= p.upper,
                "band out of order at rp={}: {:?}",
                p.return_period,
                p
            );
        }
        // A noisy fit has a band of non-zero width somewhere.
        assert!(fit.curve.iter().any(|p| p.upper > p.lower));
    }

    #[test]
    fn test_central_curve_is_monotone_for_positive_shape() {
        let sample = well_conditioned_sample(0.0);
        let fit = fit_scenario(&sample, &FitSettings::default(), &small_grid()).unwrap();
        assert!(fit.params.xi > 0.0);
        assert!(fit.curve.windows(2).all(|w| w[1].central >= w[0].central));
    }

    #[test]
    fn test_curve_uses_fitted_threshold() {
        let sample = well_conditioned_sample(0.0);
        let fit = fit_scenario(&sample, &FitSettings::default(), &small_grid()).unwrap();
        let direct = ReturnLevelModel::new(fit.threshold, fit.v_ratio)
            .evaluate(500.0, &fit.params)
            .unwrap();
        assert_eq!(fit.return_level(500.0).unwrap(), direct);
    }

    #[test]
    fn test_sparse_tail_is_rejected_before_solving() {
        // Ten points: the 90th percentile leaves a single point in the tail.
        let obs = (1..=10)
            .map(|i| Observation::new(i as f64 + 1.0, i as f64))
            .collect();
        let sample = Sample::new("sparse", obs).unwrap();

        let err = fit_scenario(&sample, &FitSettings::default(), &small_grid()).unwrap_err();
        assert_eq!(err.label, "sparse");
        assert_eq!(err.tail_points, Some(1));
        assert_eq!(
            err.error,
            FitError::InsufficientTailData { tail_points: 1, required: 4 }
        );
    }

    #[test]
    fn test_flat_tail_is_non_convergence() {
        // Forty points, top eight all equal: the tail is flat at u.
        let obs = (0..40)
            .map(|i| {
                let v = if i >= 32 { 50.0 } else { i as f64 };
                Observation::new(2.0 + i as f64, v)
            })
            .collect();
        let sample = Sample::new("flat", obs).unwrap();

        let err = fit_scenario(&sample, &FitSettings::default(), &small_grid()).unwrap_err();
        match err.error {
            FitError::FitNonConvergence { ref reason, .. } => {
                assert!(reason.contains("degenerate"), "{}", reason)
            }
            ref other => panic!("expected non-convergence, got {:?}", other),
        }
    }

    #[test]
    fn test_band_crossing_zero_rate_is_domain_error() {
        // ζ_u − 3·se < 0 makes the lower band curve non-real.
        let fit = ScenarioFit {
            label: "wide".to_string(),
            threshold: 20.0,
            tail_points: 6,
            params: GpdParams::new(0.1, 5.0, 1.0),
            std_errors: GpdParams::new(0.01, 0.1, 0.5),
            v_ratio: 0.1,
            nstd: 3.0,
            residual_sum_squares: 1.0,
            evaluations: 10,
            curve: Vec::new(),
        };
        assert!(fit.return_level(100.0).is_ok());
        let err = fit.curve_point(100.0).unwrap_err();
        assert_eq!(err.kind(), "DomainError");
    }

    #[test]
    fn test_band_is_envelope_of_shifted_curves() {
        let fit = ScenarioFit {
            label: "envelope".to_string(),
            threshold: 20.0,
            tail_points: 8,
            params: GpdParams::new(0.1, 5.0, 1.0),
            std_errors: GpdParams::new(0.05, 1.0, 0.01),
            v_ratio: 0.1,
            nstd: 3.0,
            residual_sum_squares: 1.0,
            evaluations: 10,
            curve: Vec::new(),
        };
        let model = fit.model();
        let (plus, minus) = fit.band_params();

        // Near the threshold the +nstd curve sits below the central curve.
        let near = fit.curve_point(2.0).unwrap();
        let plus_near = model.evaluate(2.0, &plus).unwrap();
        let minus_near = model.evaluate(2.0, &minus).unwrap();
        assert!(plus_near < near.central, "{} vs {}", plus_near, near.central);
        assert_eq!(near.upper, minus_near);
        assert_eq!(near.lower, plus_near);

        // Far out the ordering flips back.
        let far = fit.curve_point(100.0).unwrap();
        assert_eq!(far.upper, model.evaluate(100.0, &plus).unwrap());
        assert_eq!(far.lower, model.evaluate(100.0, &minus).unwrap());
    }

    #[test]
    fn test_zero_nstd_collapses_band() {
        let sample = well_conditioned_sample(0.05);
        let settings = FitSettings { nstd: 0.0, ..FitSettings::default() };
        let fit = fit_scenario(&sample, &settings, &small_grid()).unwrap();
        assert!(fit.curve.iter().all(|p| p.upper == p.central && p.lower == p.central));
    }
}
