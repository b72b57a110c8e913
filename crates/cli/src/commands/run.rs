//! `run` command implementation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use contracts::CaptureConfig;
use tracing::{info, warn};

use crate::capture_loop::{CaptureRunner, RunConfig};
use crate::cli::RunArgs;

/// Execute the `run` command
pub async fn run_capture(args: &RunArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let mut config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    apply_overrides(&mut config, args);
    config_loader::ConfigLoader::validate(&config).context("Invalid command-line override")?;

    info!(
        backend = ?config.device.backend,
        device_index = config.device.index,
        pairing = ?config.pull.pairing,
        timeout_ms = ?config.pull.timeout_ms,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    if args.metrics_port != 0 {
        observability::init_metrics_only(args.metrics_port)?;
        info!("Metrics endpoint available on port {}", args.metrics_port);
    }

    let backend = device::backend_for(&config).context("Failed to select device backend")?;
    let runner = CaptureRunner::new(
        RunConfig {
            capture: config,
            frames: (args.frames != 0).then_some(args.frames),
            print_frames: true,
        },
        backend,
    );

    let stop = Arc::new(AtomicBool::new(false));
    let stop_flag = stop.clone();
    let mut task = tokio::task::spawn_blocking(move || runner.run(&stop_flag));

    info!("Starting capture...");

    let stats = tokio::select! {
        joined = &mut task => joined.context("Capture task panicked")??,
        _ = shutdown_signal() => {
            warn!("Received shutdown signal, stopping capture...");
            stop.store(true, Ordering::Release);
            task.await.context("Capture task panicked")??
        }
    };

    info!(
        frames_pulled = stats.frames_pulled,
        duration_secs = stats.duration.as_secs_f64(),
        fps = format!("{:.2}", stats.fps()),
        "Capture finished"
    );
    stats.print_summary();

    Ok(())
}

fn apply_overrides(config: &mut CaptureConfig, args: &RunArgs) {
    if let Some(backend) = args.backend {
        info!(backend = ?backend, "Overriding device backend from CLI");
        config.device.backend = backend.into();
    }
    if let Some(timeout_ms) = args.timeout_ms {
        info!(timeout_ms, "Overriding pull timeout from CLI");
        config.pull.timeout_ms = (timeout_ms != 0).then_some(timeout_ms);
    }
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &CaptureConfig) {
    let geometry = contracts::FrameGeometry::default();

    println!("\n=== Configuration Summary ===\n");
    println!("Device:");
    println!("  Backend: {:?}", config.device.backend);
    println!("  Index: {}", config.device.index);
    println!("  Motor: {}", config.device.motor);
    println!("\nPull:");
    println!("  Pairing: {:?}", config.pull.pairing);
    match config.pull.timeout_ms {
        Some(ms) => println!("  Timeout: {ms}ms"),
        None => println!("  Timeout: none (wait forever)"),
    }
    println!("\nPump:");
    println!("  Poll timeout: {}ms", config.pump.poll_timeout_ms);
    println!("\nFrames:");
    println!(
        "  Color: {}x{} x{} bytes",
        geometry.color.width, geometry.color.height, geometry.color.bytes_per_element
    );
    println!(
        "  Depth: {}x{} x{} bytes",
        geometry.depth.width, geometry.depth.height, geometry.depth.bytes_per_element
    );
    println!();
}
