//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{CaptureConfig, FrameGeometry};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo<'a> {
    config: &'a CaptureConfig,
    backend_available: bool,
    geometry: FrameGeometry,
    buffers: BufferInfo,
}

/// Output buffer sizes a caller must provide
#[derive(Serialize)]
struct BufferInfo {
    color_bytes: usize,
    depth_samples: usize,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let info = build_config_info(&config);
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&config);
    }

    Ok(())
}

fn build_config_info(config: &CaptureConfig) -> ConfigInfo<'_> {
    let geometry = FrameGeometry::default();
    ConfigInfo {
        config,
        backend_available: device::backend_available(config.device.backend),
        geometry,
        buffers: BufferInfo {
            color_bytes: geometry.color_bytes(),
            depth_samples: geometry.depth_samples(),
        },
    }
}

fn print_config_info(config: &CaptureConfig) {
    let geometry = FrameGeometry::default();

    println!("=== Depth Capture Configuration ===\n");

    println!("Device");
    println!(
        "   ├─ Backend: {:?}{}",
        config.device.backend,
        if device::backend_available(config.device.backend) {
            ""
        } else {
            " (not compiled in)"
        }
    );
    println!("   ├─ Index: {}", config.device.index);
    println!("   └─ Motor: {}", config.device.motor);

    println!("\nPull");
    println!("   ├─ Pairing: {:?}", config.pull.pairing);
    match config.pull.timeout_ms {
        Some(ms) => println!("   └─ Timeout: {ms}ms"),
        None => println!("   └─ Timeout: none"),
    }

    println!("\nEvent Pump");
    println!("   └─ Poll timeout: {}ms", config.pump.poll_timeout_ms);

    println!("\nFrames");
    for (i, mode) in [geometry.color, geometry.depth].iter().enumerate() {
        let prefix = if i == 1 { "└─" } else { "├─" };
        println!(
            "   {} {}: {}x{}, {} bytes/element, {} bytes",
            prefix,
            mode.kind,
            mode.width,
            mode.height,
            mode.bytes_per_element,
            mode.frame_bytes()
        );
    }

    println!();
}
