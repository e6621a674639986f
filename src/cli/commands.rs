//! Command implementations

use anyhow::{Context, Result};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use crate::app::{AppContainer, ConcatRequest, InspectFormat, TranscodeRequest};
use crate::cli::args::{ConcatArgs, InspectArgs, OutputArgs, ProfilesArgs, TranscodeArgs};
use crate::cli::Commands;
use crate::config::{parse_job_file, parse_request};
use crate::engine::{CancelOnFlag, ConsoleProgress, NoProgress, ProcessReport, ProgressSink};
use crate::error::{ShiftXError, ShiftXResult};

/// Exit status of an interrupted job
pub const EXIT_CANCELLED: i32 = 130;

/// Run one command, returning the process exit status
pub fn execute(container: &dyn AppContainer, command: Commands, cancel: Arc<AtomicBool>) -> Result<i32> {
    match command {
        Commands::Transcode(args) => {
            info!("Executing transcode command");
            transcode(container, args, cancel)
        }
        Commands::Concat(args) => {
            info!("Executing concat command");
            concat(container, args, cancel)
        }
        Commands::Inspect(args) => {
            info!("Executing inspect command");
            inspect(container, args)
        }
        Commands::Profiles(args) => {
            info!("Executing profiles command");
            profiles(container, args)
        }
    }
}

/// Execute the transcode command
pub fn transcode(container: &dyn AppContainer, args: TranscodeArgs, cancel: Arc<AtomicBool>) -> Result<i32> {
    let mut streams = Vec::new();
    if let Some(job) = &args.job {
        streams.extend(parse_job_file(job)?);
    }
    for input in &args.inputs {
        streams.push(parse_request(input).with_context(|| format!("Invalid --input '{}'", input))?);
    }
    if streams.is_empty() {
        anyhow::bail!("No input given, use --input or --job");
    }

    let request = TranscodeRequest::new(streams, &args.output.output)
        .with_overwrite(container.settings().overwrite);
    let interactor = container.transcode_interactor();

    let report = with_progress(container, &args.output, cancel, |progress| {
        interactor.execute(&request, progress)
    });
    finish(report, &args.output)
}

/// Execute the concat command
pub fn concat(container: &dyn AppContainer, args: ConcatArgs, cancel: Arc<AtomicBool>) -> Result<i32> {
    let request = ConcatRequest {
        inputs: args.inputs,
        output: args.output.output.clone(),
        profile: args.profile,
        overwrite: container.settings().overwrite,
    };
    let interactor = container.concat_interactor();

    let report = with_progress(container, &args.output, cancel, |progress| {
        interactor.execute(&request, progress)
    });
    finish(report, &args.output)
}

/// Execute the inspect command
pub fn inspect(container: &dyn AppContainer, args: InspectArgs) -> Result<i32> {
    let format = if args.json {
        InspectFormat::Json
    } else {
        InspectFormat::Text
    };
    let text = container
        .inspect_interactor()
        .execute(&args.input, format)
        .with_context(|| format!("Failed to inspect {}", args.input.display()))?;
    print!("{}", text);
    if args.json {
        println!();
    }
    Ok(0)
}

/// Execute the profiles command
pub fn profiles(container: &dyn AppContainer, args: ProfilesArgs) -> Result<i32> {
    let text = container.profiles_interactor().execute(args.json)?;
    print!("{}", text);
    if args.json {
        println!();
    }
    Ok(0)
}

fn with_progress<F>(
    container: &dyn AppContainer,
    output: &OutputArgs,
    cancel: Arc<AtomicBool>,
    run: F,
) -> ShiftXResult<ProcessReport>
where
    F: FnOnce(&mut dyn ProgressSink) -> ShiftXResult<ProcessReport>,
{
    if cancel.load(Ordering::SeqCst) {
        return Err(ShiftXError::Cancelled);
    }
    if output.no_progress || output.json {
        let mut sink = CancelOnFlag::new(NoProgress, cancel);
        run(&mut sink)
    } else {
        let mut sink = CancelOnFlag::new(
            ConsoleProgress::new(container.settings().progress_interval),
            cancel,
        );
        let result = run(&mut sink);
        sink.into_inner().finish();
        result
    }
}

fn finish(report: ShiftXResult<ProcessReport>, output: &OutputArgs) -> Result<i32> {
    let report = match report {
        Ok(report) => report,
        Err(ShiftXError::Cancelled) => {
            warn!("Job cancelled before any output was written");
            return Ok(EXIT_CANCELLED);
        }
        Err(e) => return Err(e.into()),
    };
    if let Some(path) = &output.report {
        std::fs::write(path, report.to_json()?)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        info!("Report written to {}", path.display());
    }

    let mut stdout = std::io::stdout().lock();
    if output.json {
        writeln!(stdout, "{}", report.to_json()?)?;
    } else {
        writeln!(stdout, "{}", report.summary())?;
    }

    if report.cancelled {
        warn!("Job cancelled");
        return Ok(EXIT_CANCELLED);
    }
    Ok(report.exit_code())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::DefaultAppContainer;
    use crate::cli::Cli;
    use crate::config::{Settings, SettingsOverrides};
    use clap::Parser;
    use tempfile::TempDir;

    #[test]
    fn test_interrupt_before_start_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("out.wav");
        let input = dir.path().join("in.wav");
        let cli = Cli::try_parse_from([
            "shiftx",
            "transcode",
            "-i",
            input.to_str().unwrap(),
            "-o",
            output.to_str().unwrap(),
            "--no-progress",
        ])
        .unwrap();

        let settings = Settings::resolve(None, |_| None, &SettingsOverrides::default()).unwrap();
        let container = DefaultAppContainer::new(settings).unwrap();
        let cancel = Arc::new(AtomicBool::new(true));

        let code = execute(&container, cli.command, cancel).unwrap();
        assert_eq!(code, EXIT_CANCELLED);
        assert!(!output.exists());
    }
}
