//! Face Embedding Quantization Benchmark
//!
//! Measures a full-precision ArcFace model against its INT8 quantized
//! variant on the same aligned faces and prints a ranked comparison.

use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use facebench::bench::alloc::CountingAllocator;
use facebench::bench::report::wait_for_exit;
use facebench::config::Config;
use facebench::engine::ArcFaceEmbedder;
use facebench::service::BenchHarness;

#[global_allocator]
static GLOBAL: CountingAllocator = CountingAllocator;

fn main() -> Result<()> {
    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .init();

    info!("Starting facebench v{}", env!("CARGO_PKG_VERSION"));

    let base_dir = executable_dir()?;

    let config_path = base_dir.join(Config::default_file_name());
    let config = Config::load(&config_path).unwrap_or_else(|e| {
        info!("Using default config ({})", e);
        Config::default()
    });

    info!("Configuration loaded:");
    info!("  Base directory: {}", base_dir.display());
    info!("  Device: {}", config.inference.device);
    info!("  Warm-up trials: {}", config.benchmark.warmup_trials);
    info!("  Measured trials: {}", config.benchmark.trials);

    let harness = BenchHarness::<ArcFaceEmbedder>::setup(&config, &base_dir).map_err(|e| {
        error!("{}", e);
        e
    })?;

    let report = harness.run().map_err(|e| {
        error!("{}", e);
        e
    })?;

    if !CountingAllocator::is_installed() {
        info!("Allocation counting inactive; allocation columns read zero");
    }

    println!("\n{}", report.render());

    if let Some(json_path) = &config.report.json_path {
        let path = base_dir.join(json_path);
        report.save_json(&path)?;
        info!("Report written to {}", path.display());
    }

    if config.report.wait_for_exit {
        wait_for_exit(io::stdin().lock(), io::stdout())?;
    }

    Ok(())
}

/// Directory containing the running executable
fn executable_dir() -> Result<PathBuf> {
    let exe = std::env::current_exe().context("Failed to locate executable")?;
    exe.parent()
        .map(|p| p.to_path_buf())
        .context("Executable has no parent directory")
}
