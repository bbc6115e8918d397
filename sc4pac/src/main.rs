// SPDX-FileCopyrightText: Copyright © 2024-2025 sc4pac
//
// SPDX-License-Identifier: MPL-2.0

mod cli;

use std::process::ExitCode;

/// Main entry point
#[tokio::main]
async fn main() -> ExitCode {
    // Unexpected errors are defects: print the backtrace, exit 2
    std::panic::set_hook(Box::new(|info| {
        eprintln!("{info}");
        eprintln!("{}", std::backtrace::Backtrace::force_capture());
        std::process::exit(2);
    }));

    match cli::process().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Operation aborted. {e}");
            ExitCode::FAILURE
        }
    }
}
