// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Implementation of the `version` command.

use crate::cli::Cli;
use crate::error::BinResult;

/// Executes the `version` command to display version information.
pub fn version(_cli: &Cli) -> BinResult<()> {
    println!("Neasmart gateway");
    println!();
    println!("Version Information:");
    println!("  neasmart-bin:    {}", crate::VERSION);
    println!("  neasmart-core:   {}", neasmart_core::VERSION);
    println!("  neasmart-store:  {}", neasmart_store::VERSION);
    println!("  neasmart-modbus: {}", neasmart_modbus::VERSION);
    println!("  neasmart-config: {}", neasmart_config::VERSION);
    println!("  neasmart-api:    {}", neasmart_api::VERSION);
    println!();
    println!("Build Information:");
    println!("  Rust Edition: 2024");
    println!("  Target:       {}", std::env::consts::ARCH);
    println!("  OS:           {}", std::env::consts::OS);
    println!();
    println!("License: PolyForm Noncommercial License 1.0.0");
    println!("Copyright (c) 2025 Sylvex. All rights reserved.");

    Ok(())
}
