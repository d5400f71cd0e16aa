// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `validate` command.

use neasmart_config::{ConfigLoader, NeasmartConfig};
use neasmart_modbus::BusKind;

use crate::cli::{Cli, OutputFormat, ValidateArgs};
use crate::error::{BinError, BinResult};

/// Executes the `validate` command to validate configuration.
pub fn validate(cli: &Cli, args: ValidateArgs) -> BinResult<()> {
    let config_path = cli.config_path();
    let source = config_path
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(defaults)".to_string());

    let config = ConfigLoader::new()
        .load_or_default(config_path.as_deref())
        .map_err(|e| BinError::from(e).with_context("Configuration validation failed"))?;

    let warnings = collect_warnings(&config);
    let core = config.core_settings();

    match args.format {
        OutputFormat::Text => {
            println!("✓ Configuration is valid: {}", source);
            println!();
            println!("Summary:");
            println!("  Slave ID:       {}", core.slave_id);
            println!("  Bus:            {}", config.modbus.kind);
            println!("  Database:       {}", core.database_path.display());
            println!("  Fallback:       {}", if core.enable_fallback { "enabled" } else { "disabled" });
            println!(
                "  Breaker:        {} failures, {}s recovery",
                core.circuit_breaker_failure_threshold, core.circuit_breaker_recovery_timeout_seconds
            );
            if config.server.enabled {
                println!("  Modbus server:  {}", config.server.listen_addr());
            }
            if config.api.enabled {
                println!("  API:            {}", config.api.listen_addr());
            }

            if !warnings.is_empty() {
                println!();
                println!("Warnings:");
                for warning in &warnings {
                    println!("  ⚠ {}", warning);
                }
            }

            if args.show_config {
                println!();
                println!("Parsed configuration:");
                let rendered = serde_json::to_string_pretty(&config)
                    .map_err(|e| BinError::runtime(format!("Failed to render config: {e}")))?;
                println!("{rendered}");
            }
        }
        OutputFormat::Json => {
            let output = serde_json::json!({
                "valid": true,
                "config_path": source,
                "summary": {
                    "slave_id": core.slave_id,
                    "bus": config.modbus.kind.to_string(),
                    "database_path": core.database_path,
                    "enable_fallback": core.enable_fallback,
                    "retry_max_attempts": core.retry_max_attempts,
                    "sync_on_startup": core.sync_on_startup,
                    "circuit_breaker_failure_threshold": core.circuit_breaker_failure_threshold,
                    "circuit_breaker_recovery_timeout_seconds": core.circuit_breaker_recovery_timeout_seconds,
                },
                "warnings": warnings,
                "config": if args.show_config { Some(&config) } else { None },
            });
            let rendered = serde_json::to_string_pretty(&output)
                .map_err(|e| BinError::runtime(format!("Failed to render result: {e}")))?;
            println!("{rendered}");
        }
    }

    Ok(())
}

/// Settings that load fine but are probably not what the operator wants.
fn collect_warnings(config: &NeasmartConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if !config.store.enable_fallback {
        warnings.push("In-memory fallback disabled: writes fail while the database is unavailable".to_string());
    }
    if config.gateway.sync_on_startup && config.modbus.kind == BusKind::Local {
        warnings.push("Startup sync on the local bus only re-reads the restored context".to_string());
    }
    if !config.server.enabled && config.modbus.kind == BusKind::Local {
        warnings.push("Modbus server disabled with a local bus: the Neasmart cannot reach the gateway".to_string());
    }
    if !config.api.enabled && !config.server.enabled {
        warnings.push("Both the API and the Modbus server are disabled".to_string());
    }

    warnings
}
