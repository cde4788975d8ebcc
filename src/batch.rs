/// Batch run over the configured scenarios.
///
/// Each scenario goes through ingest, fit and export on its own. A failure
/// at any stage is logged, recorded in the run summary and does not stop
/// the remaining scenarios.

use std::path::Path;

use crate::analysis::fit_scenario;
use crate::config::{AnalysisConfig, ScenarioConfig};
use crate::export::{self, RunSummary, ScenarioOutcome};
use crate::ingest::scenario_csv::read_scenario;
use crate::logging::{self, Stage};

/// Runs one scenario end to end, writing its files into `output_dir`.
pub fn run_scenario(
    scenario: &ScenarioConfig,
    config: &AnalysisConfig,
    output_dir: &Path,
) -> ScenarioOutcome {
    let label = scenario.label.as_str();

    let sample = match read_scenario(scenario) {
        Ok(sample) => sample,
        Err(e) => {
            logging::error(Stage::Ingest, Some(label), &e.to_string());
            return ScenarioOutcome::stage_failed(label, "ingest", e.kind(), &e);
        }
    };
    logging::info(
        Stage::Ingest,
        Some(label),
        &format!("{}: {} observations from {}", label, sample.len(), scenario.path.display()),
    );

    let fit = match fit_scenario(&sample, &config.fit, &config.grid) {
        Ok(fit) => fit,
        Err(failure) => {
            logging::log_fit_failure(label, &failure.error);
            return ScenarioOutcome::fit_failed(&failure);
        }
    };
    logging::info(
        Stage::Fit,
        Some(label),
        &format!(
            "{}: u={:.3}, tail={}, xi={:.4}±{:.4}, sigma={:.4}±{:.4}, \
             zeta_u={:.4}±{:.4} ({} evaluations)",
            label,
            fit.threshold,
            fit.tail_points,
            fit.params.xi,
            fit.std_errors.xi,
            fit.params.sigma,
            fit.std_errors.sigma,
            fit.params.zeta_u,
            fit.std_errors.zeta_u,
            fit.evaluations
        ),
    );

    match export::write_scenario_outputs(output_dir, &sample, &fit, &scenario.intensity_column) {
        Ok(files) => {
            logging::debug(
                Stage::Export,
                Some(label),
                &format!("wrote {} and {}", files.curve.display(), files.scatter.display()),
            );
            ScenarioOutcome::fitted(&fit, &files)
        }
        Err(e) => {
            logging::error(Stage::Export, Some(label), &e.to_string());
            ScenarioOutcome::other_failed(label, "export", &e)
        }
    }
}

/// Runs every scenario (or only `only`, when given) in config order.
pub fn run_batch(
    config: &AnalysisConfig,
    config_path: &Path,
    output_dir: &Path,
    only: Option<&str>,
) -> RunSummary {
    let mut summary = RunSummary::new(config_path);

    for scenario in &config.scenarios {
        if only.is_some_and(|label| label != scenario.label) {
            continue;
        }
        summary.scenarios.push(run_scenario(scenario, config, output_dir));
    }

    logging::log_run_summary(
        summary.scenarios.len(),
        summary.fitted_count(),
        summary.failed_count(),
    );
    summary
}
