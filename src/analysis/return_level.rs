/// GPD return-level model.
///
/// ```text
/// return_level(rp) = u + (σ/ξ) · ( (−(v·ζ_u) / ln(1 − 1/rp))^ξ − 1 )
/// ```
///
/// `u` is the threshold the parameters were fitted against; the model is
/// only meaningful with that same u.

use crate::model::{FitError, GpdParams};

/// Below this |ξ| the ξ → 0 limit `u + σ·ln(base)` is used.
const XI_ZERO_TOL: f64 = 1e-9;

/// Model inputs that stay fixed while parameters vary.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReturnLevelModel {
    pub threshold: f64,
    pub v_ratio: f64,
}

impl ReturnLevelModel {
    pub fn new(threshold: f64, v_ratio: f64) -> Self {
        Self { threshold, v_ratio }
    }

    /// `−ln(1 − 1/rp)`, positive and finite for every rp > 1.
    pub fn log_term(return_period: f64) -> Result<f64, FitError> {
        if !(return_period > 1.0) || !return_period.is_finite() {
            return Err(FitError::DomainError {
                return_period,
                detail: "ln(1 - 1/rp) requires a finite return period above 1 year".to_string(),
            });
        }
        // ln_1p keeps precision for large return periods.
        Ok(-(-1.0 / return_period).ln_1p())
    }

    /// `v·ζ_u / (−ln(1 − 1/rp))`, the base raised to ξ.
    fn base(&self, return_period: f64, zeta_u: f64) -> Result<f64, FitError> {
        let l = Self::log_term(return_period)?;
        let base = self.v_ratio * zeta_u / l;
        if !(base > 0.0) || !base.is_finite() {
            return Err(FitError::DomainError {
                return_period,
                detail: format!(
                    "base (v_ratio * zeta_u) / -ln(1 - 1/rp) = {} is not positive",
                    base
                ),
            });
        }
        Ok(base)
    }

    /// Checked evaluation of the return level.
    pub fn evaluate(&self, return_period: f64, params: &GpdParams) -> Result<f64, FitError> {
        let base = self.base(return_period, params.zeta_u)?;

        let level = if params.xi.abs() < XI_ZERO_TOL {
            self.threshold + params.sigma * base.ln()
        } else {
            self.threshold + (params.sigma / params.xi) * (base.powf(params.xi) - 1.0)
        };

        if !level.is_finite() {
            return Err(FitError::DomainError {
                return_period,
                detail: format!(
                    "return level is not finite for xi={}, sigma={}, zeta_u={}",
                    params.xi, params.sigma, params.zeta_u
                ),
            });
        }
        Ok(level)
    }

    /// Value and partial derivatives with respect to (ξ, σ, ζ_u).
    pub fn evaluate_with_gradient(
        &self,
        return_period: f64,
        params: &GpdParams,
    ) -> Result<(f64, [f64; 3]), FitError> {
        let value = self.evaluate(return_period, params)?;
        let base = self.base(return_period, params.zeta_u)?;
        let GpdParams { xi, sigma, zeta_u } = *params;
        let ln_b = base.ln();

        let grad = if xi.abs() < XI_ZERO_TOL {
            // Series expansion of the model around ξ = 0.
            [0.5 * sigma * ln_b * ln_b, ln_b, sigma / zeta_u]
        } else {
            let b_xi = base.powf(xi);
            let d_xi = -(sigma / (xi * xi)) * (b_xi - 1.0) + (sigma / xi) * b_xi * ln_b;
            let d_sigma = (b_xi - 1.0) / xi;
            let d_zeta = sigma * b_xi / zeta_u;
            [d_xi, d_sigma, d_zeta]
        };

        if grad.iter().any(|g| !g.is_finite()) {
            return Err(FitError::DomainError {
                return_period,
                detail: "model gradient is not finite".to_string(),
            });
        }
        Ok((value, grad))
    }
}

/// Free-function form of [`ReturnLevelModel::evaluate`].
pub fn return_level(
    return_period: f64,
    params: &GpdParams,
    threshold: f64,
    v_ratio: f64,
) -> Result<f64, FitError> {
    ReturnLevelModel::new(threshold, v_ratio).evaluate(return_period, params)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> (ReturnLevelModel, GpdParams) {
        (ReturnLevelModel::new(20.0, 0.1), GpdParams::new(0.1, 5.0, 1.0))
    }

    #[test]
    fn test_known_value() {
        let (model, params) = reference();
        // rp = 100: -ln(0.99) = 0.0100503..., base = 9.9499..., base^0.1 = 1.2580...
        let rp = 100.0_f64;
        let l = -(1.0 - 1.0 / rp).ln();
        let expected = 20.0 + 50.0 * ((0.1 / l).powf(0.1) - 1.0);
        let got = model.evaluate(rp, &params).unwrap();
        assert!((got - expected).abs() < 1e-10, "{} vs {}", got, expected);
    }

    #[test]
    fn test_equals_threshold_where_base_is_one() {
        let (model, params) = reference();
        // base = 1  <=>  -ln(1 - 1/rp) = v * zeta = 0.1
        let rp = 1.0 / (1.0 - (-0.1_f64).exp());
        let got = model.evaluate(rp, &params).unwrap();
        assert!((got - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_deterministic() {
        let (model, params) = reference();
        for rp in [1.5, 10.0, 123.4, 99_999.0] {
            let a = model.evaluate(rp, &params).unwrap();
            let b = model.evaluate(rp, &params).unwrap();
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_monotone_for_positive_shape() {
        let (model, params) = reference();
        let mut prev = f64::NEG_INFINITY;
        let mut rp = 1.01;
        while rp < 1e5 {
            let v = model.evaluate(rp, &params).unwrap();
            assert!(v >= prev, "decreased at rp={}", rp);
            prev = v;
            rp *= 1.1;
        }
    }

    #[test]
    fn test_return_period_at_or_below_one_is_domain_error() {
        let (model, params) = reference();
        for rp in [1.0, 0.5, -3.0, f64::NAN] {
            let err = model.evaluate(rp, &params).unwrap_err();
            assert_eq!(err.kind(), "DomainError", "rp={}", rp);
        }
    }

    #[test]
    fn test_negative_zeta_is_domain_error() {
        let (model, _) = reference();
        let params = GpdParams::new(-0.3, 5.0, -0.5);
        let err = model.evaluate(50.0, &params).unwrap_err();
        assert!(matches!(
            err,
            FitError::DomainError { return_period, .. } if return_period == 50.0
        ));
    }

    #[test]
    fn test_zero_shape_uses_limit() {
        let model = ReturnLevelModel::new(10.0, 0.1);
        let tiny = model.evaluate(200.0, &GpdParams::new(1e-12, 2.0, 1.0)).unwrap();
        let small = model.evaluate(200.0, &GpdParams::new(1e-6, 2.0, 1.0)).unwrap();
        assert!((tiny - small).abs() < 1e-4);
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let (model, params) = reference();
        let rp = 250.0;
        let (_, grad) = model.evaluate_with_gradient(rp, &params).unwrap();
        let p = params.to_array();
        for j in 0..3 {
            let h = 1e-6 * p[j].abs().max(1.0);
            let mut up = p;
            let mut dn = p;
            up[j] += h;
            dn[j] -= h;
            let fd = (model.evaluate(rp, &GpdParams::from_array(up)).unwrap()
                - model.evaluate(rp, &GpdParams::from_array(dn)).unwrap())
                / (2.0 * h);
            assert!(
                (fd - grad[j]).abs() < 1e-5 * fd.abs().max(1.0),
                "param {}: analytic {} vs numeric {}",
                j,
                grad[j],
                fd
            );
        }
    }

    #[test]
    fn test_free_function_matches_model() {
        let (model, params) = reference();
        assert_eq!(
            return_level(75.0, &params, 20.0, 0.1).unwrap(),
            model.evaluate(75.0, &params).unwrap()
        );
    }
}
