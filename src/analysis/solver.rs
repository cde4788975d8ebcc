/// Nonlinear least-squares solver for the return-level model.
///
/// Minimises `½ Σ (return_level(rp_i) − y_i)²` over the tail with argmin's
/// L-BFGS and a More–Thuente line search. The Jacobian is analytic (see
/// `ReturnLevelModel::evaluate_with_gradient`).
///
/// The iteration runs in whitened coordinates `z`:
///
/// ```text
/// θ = (ξ, σ, ln ζ_u) = θ₀ + T·z,     T = L⁻ᵀ,  L Lᵀ = Jθᵀ Jθ at θ₀
/// ```
///
/// so the Gauss–Newton Hessian is the identity at the start and the first
/// unit step along the steepest descent is a Gauss–Newton step. Working in
/// ln ζ_u keeps the rate positive.
///
/// The starting point comes from profiling the shape: for a fixed ξ the
/// model is linear in `A = (σ/ξ)·ζ_u^ξ` and `B = σ/ξ`,
///
/// ```text
/// y − u = A · (v / L)^ξ − B,     L = −ln(1 − 1/rp)
/// ```
///
/// so each ξ on a coarse grid gets its best (A, B) in closed form. The best
/// admissible grid point seeds the iteration.
///
/// Parameter covariance follows the unweighted curve-fit convention:
/// `inv(JᵀJ) · SSR / (m − n)`.

use std::sync::atomic::{AtomicUsize, Ordering};

use argmin::core::{CostFunction, Executor, Gradient, State, TerminationReason, TerminationStatus};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use nalgebra::{Matrix2, Matrix3, Vector2, Vector3};

use crate::analysis::return_level::ReturnLevelModel;
use crate::model::{FitError, GpdParams, N_PARAMS, Observation};

/// Default evaluation budget.
pub const DEFAULT_MAX_EVALUATIONS: usize = 30_000;

/// L-BFGS history length.
const LBFGS_MEMORY: usize = 5;

/// Gradient tolerance in whitened coordinates, relative to the data scale.
const GRAD_TOL: f64 = 1e-10;

/// Shape values tried when profiling for a starting point: -0.5 to 1.5.
const PROFILE_XI_STEPS: std::ops::RangeInclusive<i32> = -25..=75;
const PROFILE_XI_DIVISOR: f64 = 50.0;

/// Result of a converged solve.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverOutcome {
    pub params: GpdParams,
    pub covariance: Matrix3<f64>,
    pub residual_sum_squares: f64,
    pub evaluations: usize,
}

impl SolverOutcome {
    /// Square roots of the covariance diagonal.
    pub fn std_errors(&self) -> GpdParams {
        GpdParams::new(
            self.covariance[(0, 0)].sqrt(),
            self.covariance[(1, 1)].sqrt(),
            self.covariance[(2, 2)].sqrt(),
        )
    }
}

/// Sum of squares plus the normal-equation pieces `JᵀJ` and `Jᵀr`.
struct Linearization {
    rss: f64,
    jtj: Matrix3<f64>,
    jtr: Vector3<f64>,
}

fn linearize(
    model: &ReturnLevelModel,
    tail: &[Observation],
    params: &GpdParams,
) -> Result<Linearization, FitError> {
    let mut rss = 0.0;
    let mut jtj = Matrix3::zeros();
    let mut jtr = Vector3::zeros();

    for obs in tail {
        let (value, grad) = model.evaluate_with_gradient(obs.return_period, params)?;
        let r = value - obs.intensity;
        let g = Vector3::from(grad);
        rss += r * r;
        jtj += g * g.transpose();
        jtr += g * r;
    }

    Ok(Linearization { rss, jtj, jtr })
}

/// Affine map from the optimiser's coordinates to (ξ, σ, ln ζ_u).
struct Whitening {
    origin: Vector3<f64>,
    transform: Matrix3<f64>,
}

impl Whitening {
    fn at(start: &GpdParams, lin: &Linearization) -> Self {
        let chain = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, start.zeta_u));
        let hessian = chain * lin.jtj * chain;

        let transform = hessian
            .cholesky()
            .and_then(|c| c.l().try_inverse())
            .map(|l_inv| l_inv.transpose())
            .unwrap_or_else(|| {
                let scale = hessian.diagonal().map(|h| 1.0 / h.max(f64::EPSILON).sqrt());
                Matrix3::from_diagonal(&scale)
            });

        Whitening {
            origin: Vector3::new(start.xi, start.sigma, start.zeta_u.ln()),
            transform,
        }
    }

    fn params(&self, z: &[f64]) -> GpdParams {
        let theta = self.origin + self.transform * Vector3::new(z[0], z[1], z[2]);
        GpdParams::new(theta[0], theta[1], theta[2].exp())
    }

    /// Pulls a gradient in (ξ, σ, ζ_u) back to the optimiser's coordinates.
    fn pull_back(&self, params: &GpdParams, grad: &Vector3<f64>) -> Vec<f64> {
        let log_grad = Vector3::new(grad[0], grad[1], grad[2] * params.zeta_u);
        (self.transform.transpose() * log_grad).as_slice().to_vec()
    }
}

/// Half the residual sum of squares, as seen by argmin.
struct LeastSquares<'a> {
    model: &'a ReturnLevelModel,
    tail: &'a [Observation],
    whitening: &'a Whitening,
    evaluations: &'a AtomicUsize,
    budget: usize,
}

impl LeastSquares<'_> {
    fn tick(&self) -> Result<(), argmin::core::Error> {
        let used = self.evaluations.fetch_add(1, Ordering::Relaxed) + 1;
        if used > self.budget {
            return Err(argmin::core::Error::msg(format!(
                "evaluation budget of {} exhausted",
                self.budget
            )));
        }
        Ok(())
    }
}

impl CostFunction for LeastSquares<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, z: &Self::Param) -> Result<Self::Output, argmin::core::Error> {
        self.tick()?;
        let params = self.whitening.params(z);
        let mut rss = 0.0;
        for obs in self.tail {
            let r = self
                .model
                .evaluate(obs.return_period, &params)
                .map_err(|e| argmin::core::Error::msg(e.to_string()))?
                - obs.intensity;
            rss += r * r;
        }
        Ok(0.5 * rss)
    }
}

impl Gradient for LeastSquares<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, z: &Self::Param) -> Result<Self::Gradient, argmin::core::Error> {
        self.tick()?;
        let params = self.whitening.params(z);
        let lin = linearize(self.model, self.tail, &params)
            .map_err(|e| argmin::core::Error::msg(e.to_string()))?;
        Ok(self.whitening.pull_back(&params, &lin.jtr))
    }
}

/// Starting point from the profiled shape grid, or `(1, 1, 1)` when no grid
/// point yields positive σ and ζ_u.
pub fn initial_guess(
    model: &ReturnLevelModel,
    tail: &[Observation],
) -> Result<GpdParams, FitError> {
    let mut log_terms = Vec::with_capacity(tail.len());
    for obs in tail {
        log_terms.push(ReturnLevelModel::log_term(obs.return_period)?);
    }

    let mut best: Option<(f64, GpdParams)> = None;

    for step in PROFILE_XI_STEPS {
        if step == 0 {
            continue;
        }
        let xi = step as f64 / PROFILE_XI_DIVISOR;

        let mut ata = Matrix2::zeros();
        let mut aty = Vector2::zeros();
        let mut xs = Vec::with_capacity(tail.len());
        for (obs, &l) in tail.iter().zip(&log_terms) {
            let x = (model.v_ratio / l).powf(xi);
            let row = Vector2::new(x, -1.0);
            ata += row * row.transpose();
            aty += row * (obs.intensity - model.threshold);
            xs.push(x);
        }

        let Some(coef) = ata.lu().solve(&aty) else {
            continue;
        };
        let (a, b) = (coef[0], coef[1]);

        let sigma = xi * b;
        let ratio = a / b;
        if !(sigma > 0.0) || !(ratio > 0.0) {
            continue;
        }
        let zeta_u = ratio.powf(1.0 / xi);
        if !(zeta_u > 0.0) || !zeta_u.is_finite() {
            continue;
        }

        let ssr: f64 = tail
            .iter()
            .zip(&xs)
            .map(|(obs, &x)| {
                let r = a * x - b - (obs.intensity - model.threshold);
                r * r
            })
            .sum();

        if !ssr.is_finite() {
            continue;
        }
        if best.as_ref().is_none_or(|(best_ssr, _)| ssr < *best_ssr) {
            best = Some((ssr, GpdParams::new(xi, sigma, zeta_u)));
        }
    }

    Ok(best.map(|(_, p)| p).unwrap_or(GpdParams::new(1.0, 1.0, 1.0)))
}

/// L-BFGS from `start`.
///
/// Every cost or gradient sweep over the tail counts against
/// `max_evaluations`. Running out of budget, or of iterations, is a
/// `FitNonConvergence`. A line search that can make no further progress
/// ends the run at the best point found.
pub fn solve(
    model: &ReturnLevelModel,
    tail: &[Observation],
    start: GpdParams,
    max_evaluations: usize,
) -> Result<SolverOutcome, FitError> {
    let m = tail.len();
    if m <= N_PARAMS {
        return Err(FitError::InsufficientTailData {
            tail_points: m,
            required: N_PARAMS + 1,
        });
    }

    let lin = linearize(model, tail, &start)?;
    if lin.jtr.amax() == 0.0 {
        let covariance = covariance(&lin, m, 1)?;
        return Ok(SolverOutcome {
            params: start,
            covariance,
            residual_sum_squares: lin.rss,
            evaluations: 1,
        });
    }

    let whitening = Whitening::at(&start, &lin);
    let counter = AtomicUsize::new(1);
    let problem = LeastSquares {
        model,
        tail,
        whitening: &whitening,
        evaluations: &counter,
        budget: max_evaluations,
    };

    let data_scale = tail.iter().map(|o| o.intensity.abs()).fold(1.0, f64::max);
    let tol_cost = (f64::EPSILON * 0.5 * lin.rss).max(f64::MIN_POSITIVE);
    let solver = LBFGS::new(MoreThuenteLineSearch::new(), LBFGS_MEMORY)
        .with_tolerance_grad(GRAD_TOL * data_scale)
        .and_then(|s| s.with_tolerance_cost(tol_cost))
        .map_err(|e| non_convergence(1, format!("invalid solver settings: {}", e)))?;

    let run = Executor::new(problem, solver)
        .configure(|state| state.param(vec![0.0; N_PARAMS]).max_iters(max_evaluations as u64))
        .run();

    let used = counter.load(Ordering::Relaxed);
    if used > max_evaluations {
        return Err(non_convergence(
            max_evaluations,
            format!("evaluation budget of {} exhausted", max_evaluations),
        ));
    }

    let res = run.map_err(|e| non_convergence(used, format!("optimizer failed: {}", e)))?;
    let state = res.state();
    if let TerminationStatus::Terminated(TerminationReason::MaxItersReached) =
        state.get_termination_status()
    {
        return Err(non_convergence(
            used,
            format!("iteration limit of {} reached", max_evaluations),
        ));
    }

    let best = state
        .get_best_param()
        .ok_or_else(|| non_convergence(used, "optimizer returned no parameters".to_string()))?;
    let params = whitening.params(best);

    let lin = linearize(model, tail, &params)?;
    let evaluations = used + 1;
    let covariance = covariance(&lin, m, evaluations)?;

    Ok(SolverOutcome {
        params,
        covariance,
        residual_sum_squares: lin.rss,
        evaluations,
    })
}

fn non_convergence(evaluations: usize, reason: String) -> FitError {
    FitError::FitNonConvergence { evaluations, reason }
}

fn covariance(lin: &Linearization, m: usize, evaluations: usize) -> Result<Matrix3<f64>, FitError> {
    let dof = (m - N_PARAMS) as f64;
    let scale = lin.rss / dof;

    let inverse = lin.jtj.try_inverse().ok_or_else(|| FitError::FitNonConvergence {
        evaluations,
        reason: "Jacobian is singular at the solution; parameter covariance is undefined"
            .to_string(),
    })?;

    let cov = inverse * scale;
    for i in 0..N_PARAMS {
        let var = cov[(i, i)];
        if !var.is_finite() || var < 0.0 {
            return Err(FitError::FitNonConvergence {
                evaluations,
                reason: format!("parameter variance {} is not a finite non-negative number", var),
            });
        }
    }
    Ok(cov)
}
