//! Path utilities for input and output files

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

use crate::error::{ShiftXError, ShiftXResult};

/// What to do when the output file already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverwritePolicy {
    /// Fail with `OutputExists`
    Never,
    /// Replace the existing file
    Always,
}

impl FromStr for OverwritePolicy {
    type Err = ShiftXError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "never" | "no" | "false" => Ok(OverwritePolicy::Never),
            "always" | "yes" | "true" => Ok(OverwritePolicy::Always),
            other => Err(ShiftXError::config(format!(
                "Unknown overwrite policy: {}",
                other
            ))),
        }
    }
}

/// Lowercase file extension
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Fail with `InputFileNotFound` unless `path` is a readable file
pub fn ensure_input(path: &Path) -> ShiftXResult<()> {
    if !path.is_file() {
        return Err(ShiftXError::InputFileNotFound {
            path: path.display().to_string(),
        });
    }
    Ok(())
}

/// Check the output location before anything is written
pub fn prepare_output(output: &Path, inputs: &[&Path], policy: OverwritePolicy) -> ShiftXResult<()> {
    for input in inputs {
        if is_same_file(output, input) {
            return Err(ShiftXError::config(format!(
                "Output {} would overwrite one of the inputs",
                output.display()
            )));
        }
    }

    if output.exists() {
        match policy {
            OverwritePolicy::Never => {
                return Err(ShiftXError::OutputExists {
                    path: output.display().to_string(),
                })
            }
            OverwritePolicy::Always => warn!("Replacing existing file {}", output.display()),
        }
    }

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.exists() {
            info!("Creating output directory {}", parent.display());
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn is_same_file(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of(Path::new("a/B.WAV")), Some("wav".to_string()));
        assert_eq!(extension_of(Path::new("noext")), None);
    }

    #[test]
    fn test_prepare_output_policies() {
        let dir = TempDir::new().unwrap();
        let existing = dir.path().join("out.wav");
        std::fs::write(&existing, b"x").unwrap();

        assert!(matches!(
            prepare_output(&existing, &[], OverwritePolicy::Never),
            Err(ShiftXError::OutputExists { .. })
        ));
        assert!(prepare_output(&existing, &[], OverwritePolicy::Always).is_ok());
    }

    #[test]
    fn test_prepare_output_creates_directory() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("nested/deeper/out.wav");
        prepare_output(&output, &[], OverwritePolicy::Never).unwrap();
        assert!(output.parent().unwrap().is_dir());
    }

    #[test]
    fn test_prepare_output_refuses_input() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("in.wav");
        std::fs::write(&input, b"x").unwrap();
        assert!(prepare_output(&input, &[input.as_path()], OverwritePolicy::Always).is_err());
    }

    #[test]
    fn test_ensure_input() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            ensure_input(&dir.path().join("missing.wav")),
            Err(ShiftXError::InputFileNotFound { .. })
        ));
        assert!(ensure_input(dir.path()).is_err());
    }

    #[test]
    fn test_overwrite_policy_parse() {
        assert_eq!("always".parse::<OverwritePolicy>().unwrap(), OverwritePolicy::Always);
        assert_eq!("NEVER".parse::<OverwritePolicy>().unwrap(), OverwritePolicy::Never);
        assert!("prompt".parse::<OverwritePolicy>().is_err());
    }
}
