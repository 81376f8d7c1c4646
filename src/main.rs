//! rust_conform command-line entry point.
//!
//! Runs one device category's conformance suite against the in-process
//! simulator for that category and prints a verdict summary.

use anyhow::{Context, Result};
use clap::Parser;
use rust_conform::config::{CategorySettings, ConformConfig};
use rust_conform::conformance::CancellationSignal;
use rust_conform::hardware::mock::{
    CoverCalibratorSimulator, FocuserSimulator, RotatorSimulator,
};
use rust_conform::hardware::{Device, DeviceCategory};
use rust_conform::logging;
use rust_conform::report::ConformanceReport;
use rust_conform::sequencer::{
    CoverCalibratorSuite, DeviceSuite, FocuserSuite, RotatorSuite, RunSummary,
};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "rust_conform", version, about = "Driver conformance harness")]
struct Cli {
    /// Device category to test: rotator, focuser or cover-calibrator
    #[arg(short, long, default_value = "rotator")]
    device: DeviceCategory,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the JSON report here
    #[arg(short, long)]
    report: Option<PathBuf>,

    /// Also measure transaction rates
    #[arg(long)]
    performance: bool,

    /// Override the configured log level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => ConformConfig::load_from(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => ConformConfig::load().context("loading configuration")?,
    };
    if let Some(level) = &cli.log_level {
        config.application.log_level = level.clone();
    }
    if cli.performance {
        config.phases.performance = true;
    }
    config.validate()?;
    logging::init(&config.application);

    let cancel = CancellationSignal::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling run");
            on_interrupt.cancel();
        }
    });

    let settings = config.settings_for(cli.device);
    let mut report = ConformanceReport::new();
    let summary = run(cli.device, settings, &cancel, &mut report).await;

    println!(
        "{}: {} checks, {} OK, {} info, {} issues, {} errors{}",
        summary.category,
        summary.checks_run,
        summary.counts.ok,
        summary.counts.info,
        summary.counts.issue,
        summary.counts.error,
        if summary.cancelled { " (cancelled)" } else { "" }
    );
    for failure in report.failures() {
        println!("  {} {}: {}", failure.verdict, failure.check, failure.message);
    }

    if let Some(path) = &cli.report {
        report
            .write_json(path)
            .with_context(|| format!("writing report to {}", path.display()))?;
        info!(path = %path.display(), "Report written");
    }

    if !summary.is_conformant() {
        std::process::exit(1);
    }
    Ok(())
}

async fn run(
    category: DeviceCategory,
    settings: CategorySettings,
    cancel: &CancellationSignal,
    report: &mut ConformanceReport,
) -> RunSummary {
    match category {
        DeviceCategory::Rotator => {
            let device = RotatorSimulator::default();
            describe(&device, report).await;
            RotatorSuite::run(&device, settings, cancel, report).await
        }
        DeviceCategory::Focuser => {
            let device = FocuserSimulator::default();
            describe(&device, report).await;
            FocuserSuite::run(&device, settings, cancel, report).await
        }
        DeviceCategory::CoverCalibrator => {
            let device = CoverCalibratorSimulator::default();
            describe(&device, report).await;
            CoverCalibratorSuite::run(&device, settings, cancel, report).await
        }
    }
}

async fn describe(device: &dyn Device, report: &mut ConformanceReport) {
    if let Ok(name) = device.name().await {
        report.device = Some(name);
    }
}
