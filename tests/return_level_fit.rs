/// End-to-end tests for the return-level fitter and the batch pipeline.
///
/// Samples are synthesised from the model itself, so the expected
/// parameters are known exactly.

use climrisk_analysis::analysis::{fit_scenario, ReturnLevelModel};
use climrisk_analysis::batch::{run_batch, run_scenario};
use climrisk_analysis::config::{
    AnalysisConfig, FitSettings, GridSettings, GridSpacing, OutputSettings, ScenarioConfig,
};
use climrisk_analysis::export::{self, ScenarioOutcome};
use climrisk_analysis::model::{FitError, GpdParams, Observation, Sample};
use std::fs;
use std::path::{Path, PathBuf};

fn truth() -> GpdParams {
    GpdParams::new(0.1, 5.0, 1.0)
}

fn coarse_grid() -> GridSettings {
    GridSettings {
        start_years: 1.01,
        end_years: 100_000.0,
        points: 500,
        spacing: GridSpacing::Log,
    }
}

/// Return periods 1..=50 with intensities from the model at u = 20.
/// At rp = 1 the model's limit is u − σ/ξ.
fn fifty_year_sample() -> Sample {
    let model = ReturnLevelModel::new(20.0, 0.1);
    let p = truth();
    let obs = (1..=50)
        .map(|rp| {
            let rp = rp as f64;
            let y = if rp == 1.0 {
                20.0 - p.sigma / p.xi
            } else {
                model.evaluate(rp, &p).unwrap()
            };
            Observation::new(rp, y)
        })
        .collect();
    Sample::new("fifty", obs).unwrap()
}

/// Body below 20 plus an eleven-point tail spanning 1.05 to 10 000 years.
fn wide_tail_sample(label: &str, noise: f64) -> Sample {
    let model = ReturnLevelModel::new(20.0, 0.1);
    let mut obs: Vec<Observation> = (0..90)
        .map(|i| Observation::new(1.0 + i as f64 * 0.1, 5.0 + i as f64 * 0.1))
        .collect();
    let rp0 = 1.0 / (1.0 - (-0.1_f64).exp());
    for k in 0..=10 {
        let rp = rp0 * (10_000.0 / rp0).powf(k as f64 / 10.0);
        let wiggle = if k == 0 { 0.0 } else { noise * [1.0, -1.0, 0.5, -0.5][k % 4] };
        obs.push(Observation::new(rp, model.evaluate(rp, &truth()).unwrap() + wiggle));
    }
    Sample::new(label, obs).unwrap()
}

fn write_csv(path: &Path, sample: &Sample) {
    let mut text = String::from("storm_id,return-years,wind\n");
    for (i, o) in sample.observations().iter().enumerate() {
        text.push_str(&format!("{},{},{}\n", i + 1, o.return_period, o.intensity));
    }
    fs::write(path, text).unwrap();
}

fn scenario(label: &str, path: PathBuf) -> ScenarioConfig {
    ScenarioConfig {
        label: label.to_string(),
        path,
        return_period_column: "return-years".to_string(),
        intensity_column: "wind".to_string(),
    }
}

#[test]
fn test_fifty_year_sample_recovers_shape_and_brackets_100_year_level() {
    let sample = fifty_year_sample();
    let fit = fit_scenario(&sample, &FitSettings::default(), &coarse_grid())
        .expect("fit should succeed");

    // u is re-derived from the data (≈ 28.06), so σ and ζ_u come back
    // expressed against that threshold: σ' = σ + ξ(u − 20), ζ' = ζ (σ/σ')^(1/ξ).
    assert_eq!(fit.tail_points, 5);
    assert!((fit.threshold - 28.0632).abs() < 1e-3, "u = {}", fit.threshold);

    let xi = fit.params.xi;
    assert!((xi - 0.1).abs() <= 0.02, "xi = {} outside ±20%", xi);

    let sigma_adj = 5.0 + 0.1 * (fit.threshold - 20.0);
    let zeta_adj = (5.0 / sigma_adj).powf(10.0);
    assert!(
        (fit.params.sigma - sigma_adj).abs() <= 0.2 * sigma_adj,
        "sigma = {}, expected ≈ {}",
        fit.params.sigma,
        sigma_adj
    );
    assert!(
        (fit.params.zeta_u - zeta_adj).abs() <= 0.2 * zeta_adj,
        "zeta_u = {}, expected ≈ {}",
        fit.params.zeta_u,
        zeta_adj
    );

    // Same curve as the generating model, whatever the threshold.
    let expected_100 = ReturnLevelModel::new(20.0, 0.1).evaluate(100.0, &truth()).unwrap();
    let p = fit.curve_point(100.0).unwrap();
    assert!((p.central - expected_100).abs() < 1e-3, "{} vs {}", p.central, expected_100);
    assert!(p.lower <= p.central && p.central <= p.upper, "{:?}", p);
}

#[test]
fn test_noisy_wide_tail_recovers_parameters_within_twenty_percent() {
    let sample = wide_tail_sample("noisy", 0.05);
    let fit = fit_scenario(&sample, &FitSettings::default(), &coarse_grid()).unwrap();

    assert!((fit.threshold - 20.0).abs() < 1e-9);
    let t = truth();
    assert!((fit.params.xi - t.xi).abs() <= 0.2 * t.xi, "xi = {}", fit.params.xi);
    assert!((fit.params.sigma - t.sigma).abs() <= 0.2 * t.sigma, "sigma = {}", fit.params.sigma);
    assert!(
        (fit.params.zeta_u - t.zeta_u).abs() <= 0.2 * t.zeta_u,
        "zeta_u = {}",
        fit.params.zeta_u
    );

    let p = fit.curve_point(100.0).unwrap();
    assert!(p.lower <= p.central && p.central <= p.upper);
    assert!(p.upper > p.lower, "noisy fit should have a band");

    assert_eq!(fit.curve.len(), 500);
    assert!(fit.curve.iter().all(|c| c.lower <= c.central && c.central <= c.upper));
}

#[test]
fn test_sparse_tail_is_insufficient() {
    let obs = (1..=12).map(|i| Observation::new(1.5 * i as f64, i as f64)).collect();
    let sample = Sample::new("sparse", obs).unwrap();

    let failure = fit_scenario(&sample, &FitSettings::default(), &coarse_grid()).unwrap_err();
    assert_eq!(failure.label, "sparse");
    assert!(matches!(
        failure.error,
        FitError::InsufficientTailData { tail_points, required: 4 } if tail_points < 4
    ));
}

#[test]
fn test_scenarios_are_independent() {
    let good = wide_tail_sample("good", 0.02);
    let sparse = Sample::new(
        "sparse",
        (1..=10).map(|i| Observation::new(i as f64 + 1.0, i as f64)).collect(),
    )
    .unwrap();

    let settings = FitSettings::default();
    let alone = fit_scenario(&good, &settings, &coarse_grid()).unwrap();
    assert!(fit_scenario(&sparse, &settings, &coarse_grid()).is_err());
    let after_failure = fit_scenario(&good, &settings, &coarse_grid()).unwrap();

    assert_eq!(alone.params, after_failure.params);
    assert_eq!(alone.std_errors, after_failure.std_errors);
}

#[test]
fn test_batch_writes_outputs_and_records_failures() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input");
    let output = dir.path().join("output");
    fs::create_dir_all(&input).unwrap();
    export::ensure_output_dir(&output).unwrap();

    write_csv(&input.join("good.csv"), &wide_tail_sample("good", 0.02));
    write_csv(
        &input.join("sparse.csv"),
        &Sample::new(
            "sparse",
            (1..=10).map(|i| Observation::new(i as f64 + 1.0, i as f64)).collect(),
        )
        .unwrap(),
    );

    fs::write(input.join("zero.csv"), "storm_id,return-years,wind\n1,0,30.0\n2,2.0,31.0\n")
        .unwrap();

    let config = AnalysisConfig {
        fit: FitSettings::default(),
        grid: coarse_grid(),
        output: OutputSettings { directory: output.clone() },
        scenarios: vec![
            scenario("Missing file", input.join("nope.csv")),
            scenario("SSP2-4.5", input.join("good.csv")),
            scenario("Sparse", input.join("sparse.csv")),
            scenario("Zero period", input.join("zero.csv")),
        ],
    };
    config.validate().unwrap();

    let summary = run_batch(&config, Path::new("fit.toml"), &output, None);
    assert_eq!(summary.scenarios.len(), 4);
    assert_eq!(summary.fitted_count(), 1);
    assert_eq!(summary.failed_count(), 3);

    match &summary.scenarios[0] {
        ScenarioOutcome::Failed { stage, kind, .. } => {
            assert_eq!(stage, "ingest");
            assert_eq!(kind, "IngestError");
        }
        other => panic!("expected ingest failure, got {:?}", other),
    }
    assert!(summary.scenarios[1].is_fitted());
    match &summary.scenarios[2] {
        ScenarioOutcome::Failed { kind, tail_points, .. } => {
            assert_eq!(kind, "InsufficientTailData");
            assert_eq!(*tail_points, Some(1));
        }
        other => panic!("expected fit failure, got {:?}", other),
    }
    // An invalid sample is caught while reading but keeps the fitter's kind.
    match &summary.scenarios[3] {
        ScenarioOutcome::Failed { stage, kind, .. } => {
            assert_eq!(stage, "ingest");
            assert_eq!(kind, "InvalidSample");
        }
        other => panic!("expected invalid sample, got {:?}", other),
    }

    let curve = fs::read_to_string(output.join("ssp2_4_5_fit.csv")).unwrap();
    let mut lines = curve.lines();
    assert_eq!(lines.next(), Some("return-period,rp,rp_up,rp_low"));
    assert_eq!(lines.count(), 500);

    let scatter = fs::read_to_string(output.join("ssp2_4_5_scatter.csv")).unwrap();
    assert_eq!(scatter.lines().next(), Some("return-years,wind,in_tail"));
    assert_eq!(scatter.lines().filter(|l| l.ends_with(",true")).count(), 11);

    assert!(!output.join("sparse_fit.csv").exists());

    let path = export::write_summary_json(&output, &summary).unwrap();
    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
    let statuses: Vec<&str> = json["scenarios"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["status"].as_str().unwrap())
        .collect();
    assert_eq!(statuses, vec!["failed", "fitted", "failed", "failed"]);
}

#[test]
fn test_single_scenario_selection() {
    let dir = tempfile::tempdir().unwrap();
    let csv = dir.path().join("good.csv");
    write_csv(&csv, &wide_tail_sample("good", 0.0));

    let config = AnalysisConfig {
        fit: FitSettings::default(),
        grid: coarse_grid(),
        output: OutputSettings { directory: dir.path().to_path_buf() },
        scenarios: vec![
            scenario("Current climate", csv.clone()),
            scenario("SSP5-8.5", csv),
        ],
    };

    let summary = run_batch(&config, Path::new("fit.toml"), dir.path(), Some("SSP5-8.5"));
    assert_eq!(summary.scenarios.len(), 1);
    assert_eq!(summary.scenarios[0].label(), "SSP5-8.5");

    let direct = run_scenario(&config.scenarios[0], &config, dir.path());
    assert!(direct.is_fitted());
    assert!(dir.path().join("current_climate_fit.csv").exists());
}
