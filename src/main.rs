//! ShiftX CLI
//!
//! Rewraps or transcodes streams from several media files into one output
//! file, each stream shifted by its own offset.
//!
//! # Usage
//!
//! ```bash
//! shiftx transcode -i "music.wav,offset=10" -i "voice.wav,profile=wave16b48kmono,offset=-2.5" -o mix.wav
//! shiftx transcode --job job.txt -o out.mov --report report.json
//! shiftx concat part1.wav part2.wav -o joined.wav
//! shiftx inspect -i input.mov --json
//! shiftx profiles
//! ```
//!
//! Exit status: 0 on success, 1 on failure or when a stream could not be
//! processed at all, 130 when interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use shiftx_cli::app::DefaultAppContainer;
use shiftx_cli::cli::{commands, Cli};
use shiftx_cli::config::Settings;
use shiftx_cli::utils::logging::{init_logging, log_system_info};

/// Main entry point for the ShiftX CLI application
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => ExitCode::from(code.clamp(0, 255) as u8),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let settings = Settings::load(cli.config.as_deref(), &cli.overrides())
        .context("Failed to load settings")?;
    init_logging(&settings.logging())?;
    log_system_info();
    info!("Starting ShiftX");

    let registry = shiftx_cli::initialize_codec_registry()?;
    let container = DefaultAppContainer::new(settings)?;

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&cancel);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current packet");
            flag.store(true, Ordering::SeqCst);
        }
    });

    let command = cli.command;
    let code = tokio::task::spawn_blocking(move || commands::execute(&container, command, cancel))
        .await
        .context("Job thread panicked")??;

    registry.teardown();
    info!("ShiftX finished with exit code {}", code);
    Ok(code)
}
