//! Climate-Risk Return-Level Analysis - Batch Driver
//!
//! For every scenario in the configuration:
//! 1. Reads the (return period, intensity) sample from CSV
//! 2. Fits the GPD return-level model to the 90th-percentile tail
//! 3. Writes the central curve with its ± nstd band and a tail-flagged scatter
//!
//! A scenario that fails is reported and skipped; the rest still run.
//! `summary.json` in the output directory records every outcome.
//!
//! Usage:
//!   cargo run --release
//!   cargo run --release -- --config fit.toml --output-dir output --scenario SSP5-8.5
//!
//! Environment:
//!   CLIMRISK_CONFIG   - config path when --config is not given (default fit.toml)
//!   CLIMRISK_LOG_FILE - append log entries to this file

use climrisk_analysis::batch::run_batch;
use climrisk_analysis::config::{self, AnalysisConfig};
use climrisk_analysis::export::{self, ScenarioOutcome};
use climrisk_analysis::logging::{self, LogLevel};
use std::env;
use std::path::PathBuf;

fn usage(program: &str) -> String {
    format!(
        "Usage: {} [--config PATH] [--output-dir DIR] [--scenario LABEL]",
        program
    )
}

fn main() {
    println!("🌀 Climate-Risk Return-Level Analysis");
    println!("======================================\n");

    // Parse command-line arguments
    let args: Vec<String> = env::args().collect();
    let mut config_path: Option<PathBuf> = None;
    let mut output_dir: Option<PathBuf> = None;
    let mut only: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--config" | "--output-dir" | "--scenario" => {
                let Some(value) = args.get(i + 1) else {
                    eprintln!("Error: {} requires a value", flag);
                    std::process::exit(1);
                };
                match flag {
                    "--config" => config_path = Some(PathBuf::from(value)),
                    "--output-dir" => output_dir = Some(PathBuf::from(value)),
                    _ => only = Some(value.clone()),
                }
                i += 2;
            }
            "-h" | "--help" => {
                println!("{}", usage(&args[0]));
                return;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                eprintln!("{}", usage(&args[0]));
                std::process::exit(1);
            }
        }
    }

    let log_file = config::log_file_path();
    logging::init_logger(LogLevel::Info, log_file.as_deref());

    // Load configuration
    let config_path = config_path.unwrap_or_else(config::config_path);
    println!("⚙️  Loading configuration from {}...", config_path.display());
    let config: AnalysisConfig = match config::load_config_from(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("\n❌ {}\n", e);
            std::process::exit(1);
        }
    };
    println!("✓ Configuration loaded:");
    println!("  - Scenarios: {}", config.scenarios.len());
    println!("  - v_ratio: {}, nstd: {}", config.fit.v_ratio, config.fit.nstd);
    println!(
        "  - Grid: {} points, {} to {} years ({:?})\n",
        config.grid.points, config.grid.start_years, config.grid.end_years, config.grid.spacing
    );

    if let Some(label) = &only {
        if config.scenario(label).is_none() {
            eprintln!("❌ No scenario labelled '{}' in {}", label, config_path.display());
            std::process::exit(1);
        }
    }

    let output_dir = output_dir.unwrap_or_else(|| config.output.directory.clone());
    if let Err(e) = export::ensure_output_dir(&output_dir) {
        eprintln!("\n❌ {}\n", e);
        std::process::exit(1);
    }

    println!("📈 Fitting scenarios...");
    let summary = run_batch(&config, &config_path, &output_dir, only.as_deref());

    println!();
    for outcome in &summary.scenarios {
        match outcome {
            ScenarioOutcome::Fitted { fit, curve_file, .. } => println!(
                "   ✓ {} - xi={:.4}, sigma={:.4}, zeta_u={:.4} → {}",
                fit.label, fit.params.xi, fit.params.sigma, fit.params.zeta_u, curve_file
            ),
            ScenarioOutcome::Failed { label, kind, message, .. } => {
                eprintln!("   ✗ {} - {}: {}", label, kind, message)
            }
        }
    }

    match export::write_summary_json(&output_dir, &summary) {
        Ok(path) => println!("\n📝 Summary written to {}", path.display()),
        Err(e) => eprintln!("\n⚠️  {}", e),
    }

    println!("\n{}", "=".repeat(50));
    println!("📊 Run Summary");
    println!("{}", "=".repeat(50));
    println!("Fitted:  {}", summary.fitted_count());
    println!("Failed:  {}", summary.failed_count());
    println!("Total:   {}", summary.scenarios.len());
}
