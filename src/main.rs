//! Prometheus Test Harness - Main CLI Application
//!
//! Soak, load, benchmark, scalability, stress, spike and security testing
//! for Prometheus, plus GitHub repository health scoring.

use clap::Parser;
use prometheus_test_harness::{app::App, cli::Cli, error::AppError};
use std::{error::Error, process};

#[tokio::main]
async fn main() {
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panic: {}", panic_info);
        eprintln!("Please report this issue together with the command line that triggered it.");
        process::exit(AppError::internal("panic").exit_code());
    }));

    let cli = Cli::parse();
    let use_color = cli.use_colors();

    let result = match App::new(cli) {
        Ok(app) => app.run().await,
        Err(e) => Err(e),
    };

    if let Err(e) = result {
        eprintln!("{}", e.format_for_console(use_color));

        if let Some(source) = e.source() {
            eprintln!("Caused by: {}", source);
        }

        if let Some(suggestion) = e.suggestion() {
            eprintln!();
            eprintln!("Hint: {}", suggestion);
        }

        process::exit(e.exit_code());
    }
}
