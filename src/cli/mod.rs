//! CLI module for ShiftX
//!
//! This module handles command-line argument parsing and command execution.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::SettingsOverrides;
use crate::utils::logging::{LogFormat, LogLevel};

pub mod args;
pub mod commands;

/// ShiftX
///
/// Rewraps or transcodes streams from several media files into one output
/// file, shifting each stream by its own time offset.
#[derive(Parser, Debug)]
#[command(name = "shiftx")]
#[command(about = "ShiftX - multi-stream rewrap and transcode with per-stream offsets")]
#[command(version)]
#[command(long_about = None)]
pub struct Cli {
    /// Logging level (error, warn, info, debug, trace)
    #[arg(long, global = true)]
    pub log_level: Option<LogLevel>,

    /// Log format (text, compact, json)
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    /// Settings file (TOML or YAML)
    #[arg(long, global = true, env = "SHIFTX_CONFIG")]
    pub config: Option<PathBuf>,

    /// Additional profile directory, may be repeated
    #[arg(long = "profile-dir", global = true)]
    pub profile_dirs: Vec<PathBuf>,

    /// Decoder threads for the FFmpeg backend
    #[arg(long, global = true)]
    pub threads: Option<usize>,

    /// The command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write selected streams of several inputs into one file
    Transcode(args::TranscodeArgs),
    /// Join the first stream of each input, one after the other
    Concat(args::ConcatArgs),
    /// Show the streams of a media file
    Inspect(args::InspectArgs),
    /// List the known encoding profiles
    Profiles(args::ProfilesArgs),
}

impl Cli {
    /// Settings given on the command line
    pub fn overrides(&self) -> SettingsOverrides {
        let overwrite = match &self.command {
            Commands::Transcode(args) => args.output.overwrite_policy(),
            Commands::Concat(args) => args.output.overwrite_policy(),
            _ => None,
        };

        SettingsOverrides {
            log_level: self.log_level,
            log_format: self.log_format,
            profile_dirs: self.profile_dirs.clone(),
            overwrite,
            threads: self.threads,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::path::OverwritePolicy;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_transcode() {
        let cli = Cli::try_parse_from([
            "shiftx",
            "--log-level",
            "debug",
            "transcode",
            "-i",
            "a.wav,offset=10",
            "-i",
            "b.wav,stream=0,offset=-3",
            "-o",
            "out.wav",
            "--overwrite",
        ])
        .unwrap();

        let overrides = cli.overrides();
        assert_eq!(overrides.log_level, Some(LogLevel::Debug));
        assert_eq!(overrides.overwrite, Some(OverwritePolicy::Always));

        match cli.command {
            Commands::Transcode(args) => {
                assert_eq!(args.inputs.len(), 2);
                assert_eq!(args.output.output, PathBuf::from("out.wav"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "shiftx",
            "profiles",
            "--profile-dir",
            "p1",
            "--profile-dir",
            "p2",
            "--log-format",
            "json",
        ])
        .unwrap();
        let overrides = cli.overrides();
        assert_eq!(overrides.profile_dirs, vec![PathBuf::from("p1"), PathBuf::from("p2")]);
        assert_eq!(overrides.log_format, Some(LogFormat::Json));
        assert_eq!(overrides.overwrite, None);
    }

    #[test]
    fn test_rejects_bad_log_level() {
        assert!(Cli::try_parse_from(["shiftx", "--log-level", "loud", "profiles"]).is_err());
    }
}
