//! Command-line argument definitions

use clap::Args;
use std::path::PathBuf;

use crate::utils::path::OverwritePolicy;

/// Output options shared by the writing commands
#[derive(Args, Debug)]
pub struct OutputArgs {
    /// Output file path
    #[arg(short, long)]
    pub output: PathBuf,

    /// Replace the output file if it exists
    #[arg(long)]
    pub overwrite: bool,

    /// Also write the job report as JSON to this file
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Print the job report as JSON instead of text
    #[arg(long)]
    pub json: bool,

    /// Do not draw the progress line
    #[arg(long)]
    pub no_progress: bool,
}

impl OutputArgs {
    /// `--overwrite` given, otherwise left to the settings
    pub fn overwrite_policy(&self) -> Option<OverwritePolicy> {
        self.overwrite.then_some(OverwritePolicy::Always)
    }
}

/// Arguments for the transcode command
#[derive(Args, Debug)]
pub struct TranscodeArgs {
    /// Stream request: PATH[,stream=N][,channel=N][,profile=NAME][,offset=SECONDS][,slot=N]
    #[arg(short, long = "input", value_name = "REQUEST")]
    pub inputs: Vec<String>,

    /// Job file with one stream request per line
    #[arg(long)]
    pub job: Option<PathBuf>,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Arguments for the concat command
#[derive(Args, Debug)]
pub struct ConcatArgs {
    /// Files to join, in order
    #[arg(required = true, num_args = 2..)]
    pub inputs: Vec<PathBuf>,

    /// Transcode every input to this profile instead of rewrapping
    #[arg(short, long)]
    pub profile: Option<String>,

    #[command(flatten)]
    pub output: OutputArgs,
}

/// Arguments for the inspect command
#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Input media file path
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the profiles command
#[derive(Args, Debug)]
pub struct ProfilesArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}
