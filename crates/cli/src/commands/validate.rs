//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::{CaptureConfig, PairingPolicy};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    backend: String,
    backend_available: bool,
    device_index: u32,
    pairing: String,
    timeout_ms: Option<u64>,
    poll_timeout_ms: u64,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    // Check file exists
    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: if warnings.is_empty() {
                    None
                } else {
                    Some(warnings)
                },
                summary: Some(ConfigSummary {
                    backend: format!("{:?}", config.device.backend).to_lowercase(),
                    backend_available: device::backend_available(config.device.backend),
                    device_index: config.device.index,
                    pairing: format!("{:?}", config.pull.pairing).to_lowercase(),
                    timeout_ms: config.pull.timeout_ms,
                    poll_timeout_ms: config.pump.poll_timeout_ms,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &CaptureConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if !device::backend_available(config.device.backend) {
        warnings.push(format!(
            "backend '{:?}' is not compiled into this build",
            config.device.backend
        ));
    }

    if config.pull.timeout_ms.is_none() {
        warnings.push("pull.timeout_ms is unset - a pull waits until frames arrive".to_string());
    }

    if config.pull.pairing == PairingPolicy::Latest {
        warnings.push(
            "pull.pairing = \"latest\" - one frame of a snapshot may be stale".to_string(),
        );
    }

    if let Some(timeout) = config.pull.timeout_ms {
        if timeout < config.pump.poll_timeout_ms {
            warnings.push(format!(
                "pull.timeout_ms ({timeout}) is shorter than pump.poll_timeout_ms ({})",
                config.pump.poll_timeout_ms
            ));
        }
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Backend: {}", summary.backend);
            println!("  Device index: {}", summary.device_index);
            println!("  Pairing: {}", summary.pairing);
            match summary.timeout_ms {
                Some(ms) => println!("  Pull timeout: {ms}ms"),
                None => println!("  Pull timeout: none"),
            }
            println!("  Poll timeout: {}ms", summary.poll_timeout_ms);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}
