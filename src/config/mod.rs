//! Settings and job configuration
//!
//! Settings are layered with the precedence CLI > environment (`SHIFTX_*`) >
//! settings file > defaults. The settings file is TOML or YAML, chosen by
//! extension, and keeps its keys under a `shiftx` table:
//!
//! ```toml
//! [shiftx]
//! log_level = "info"
//! log_format = "json"
//! profile_dirs = ["profiles"]
//! progress_interval_ms = 250
//! overwrite = "always"
//! threads = 4
//! ```

pub mod job;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ShiftXError, ShiftXResult};
use crate::utils::logging::{LogFormat, LogLevel, LoggingConfig};
use crate::utils::path::{extension_of, OverwritePolicy};

pub use job::{parse_job_file, parse_job_text, parse_request};

#[cfg(test)]
mod tests;

/// Settings files looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILES: &[&str] = &["shiftx.toml", "shiftx.yaml", "shiftx.yml"];

/// Environment variable holding extra profile directories (path list)
pub const PROFILES_ENV: &str = "SHIFTX_PROFILES";

/// Effective runtime settings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    pub log_level: LogLevel,
    pub log_format: LogFormat,
    /// Searched in order, later profiles override earlier ones
    pub profile_dirs: Vec<PathBuf>,
    pub progress_interval: Duration,
    pub overwrite: OverwritePolicy,
    /// Codec threads for the libav backend
    pub threads: usize,
    /// Settings file that was applied, if any
    pub source: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Warn,
            log_format: LogFormat::Text,
            profile_dirs: Vec::new(),
            progress_interval: Duration::from_millis(500),
            overwrite: OverwritePolicy::Never,
            threads: num_cpus::get(),
            source: None,
        }
    }
}

/// Values given on the command line, `None` when not given
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub log_level: Option<LogLevel>,
    pub log_format: Option<LogFormat>,
    pub profile_dirs: Vec<PathBuf>,
    pub overwrite: Option<OverwritePolicy>,
    pub threads: Option<usize>,
}

/// Contents of the `shiftx` table of a settings file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileSettings {
    pub log_level: Option<LogLevel>,
    pub log_format: Option<LogFormat>,
    pub profile_dirs: Vec<PathBuf>,
    pub progress_interval_ms: Option<u64>,
    pub overwrite: Option<OverwritePolicy>,
    pub threads: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SettingsDocument {
    #[serde(default)]
    shiftx: Option<FileSettings>,
}

impl FileSettings {
    /// Parse TOML content
    pub fn from_toml(content: &str) -> ShiftXResult<Self> {
        let document: SettingsDocument = toml::from_str(content)
            .map_err(|e| ShiftXError::config(format!("Failed to parse TOML settings: {}", e)))?;
        Ok(document.shiftx.unwrap_or_default())
    }

    /// Parse YAML content
    pub fn from_yaml(content: &str) -> ShiftXResult<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let document: SettingsDocument = serde_yaml::from_str(content)
            .map_err(|e| ShiftXError::config(format!("Failed to parse YAML settings: {}", e)))?;
        Ok(document.shiftx.unwrap_or_default())
    }

    /// Read a settings file, format chosen by extension
    ///
    /// Relative profile directories are resolved against the file's directory.
    pub fn read(path: &Path) -> ShiftXResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ShiftXError::config(format!("Cannot read settings {}: {}", path.display(), e))
        })?;

        let mut settings = match extension_of(path).as_deref() {
            Some("toml") => Self::from_toml(&content)?,
            Some("yaml") | Some("yml") => Self::from_yaml(&content)?,
            _ => {
                return Err(ShiftXError::config(format!(
                    "Unsupported settings format: {} (expected .toml, .yaml or .yml)",
                    path.display()
                )))
            }
        };

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        for dir in &mut settings.profile_dirs {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
        Ok(settings)
    }
}

impl Settings {
    /// Resolve the full hierarchy from the process environment
    pub fn load(config_file: Option<&Path>, overrides: &SettingsOverrides) -> ShiftXResult<Self> {
        let file = match config_file {
            Some(path) => Some(path.to_path_buf()),
            None => discover_config_file(Path::new(".")),
        };
        Self::resolve(file.as_deref(), |key| std::env::var(key).ok(), overrides)
    }

    /// Resolve the hierarchy with an explicit environment lookup
    pub fn resolve<F>(
        config_file: Option<&Path>,
        env: F,
        overrides: &SettingsOverrides,
    ) -> ShiftXResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Settings::default();

        if let Some(path) = config_file {
            info!("Loading settings from {}", path.display());
            settings.apply_file(FileSettings::read(path)?);
            settings.source = Some(path.to_path_buf());
        }
        settings.apply_env(env)?;
        settings.apply_overrides(overrides);

        if settings.threads == 0 {
            return Err(ShiftXError::config("Thread count must be at least 1"));
        }
        debug!("Effective settings: {:?}", settings);
        Ok(settings)
    }

    fn apply_file(&mut self, file: FileSettings) {
        if let Some(level) = file.log_level {
            self.log_level = level;
        }
        if let Some(format) = file.log_format {
            self.log_format = format;
        }
        self.profile_dirs.extend(file.profile_dirs);
        if let Some(ms) = file.progress_interval_ms {
            self.progress_interval = Duration::from_millis(ms);
        }
        if let Some(policy) = file.overwrite {
            self.overwrite = policy;
        }
        if let Some(threads) = file.threads {
            self.threads = threads;
        }
    }

    fn apply_env<F>(&mut self, env: F) -> ShiftXResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut applied = 0;
        let mut var = |key: &str| {
            let value = env(key).filter(|v| !v.trim().is_empty());
            if let Some(value) = &value {
                debug!("Environment override {}={}", key, value);
                applied += 1;
            }
            value
        };

        if let Some(value) = var("SHIFTX_LOG_LEVEL") {
            self.log_level = value.parse()?;
        }
        if let Some(value) = var("SHIFTX_LOG_FORMAT") {
            self.log_format = value.parse()?;
        }
        if let Some(value) = var(PROFILES_ENV) {
            self.profile_dirs.extend(std::env::split_paths(&value));
        }
        if let Some(value) = var("SHIFTX_PROGRESS_INTERVAL_MS") {
            let ms = value.trim().parse::<u64>().map_err(|_| {
                ShiftXError::config(format!("Invalid SHIFTX_PROGRESS_INTERVAL_MS: {}", value))
            })?;
            self.progress_interval = Duration::from_millis(ms);
        }
        if let Some(value) = var("SHIFTX_OVERWRITE") {
            self.overwrite = value.parse()?;
        }
        if let Some(value) = var("SHIFTX_THREADS") {
            self.threads = value
                .trim()
                .parse()
                .map_err(|_| ShiftXError::config(format!("Invalid SHIFTX_THREADS: {}", value)))?;
        }

        if applied > 0 {
            debug!("Applied {} environment overrides", applied);
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: &SettingsOverrides) {
        if let Some(level) = overrides.log_level {
            self.log_level = level;
        }
        if let Some(format) = overrides.log_format {
            self.log_format = format;
        }
        self.profile_dirs
            .extend(overrides.profile_dirs.iter().cloned());
        if let Some(policy) = overrides.overwrite {
            self.overwrite = policy;
        }
        if let Some(threads) = overrides.threads {
            self.threads = threads;
        }
    }

    pub fn logging(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level,
            format: self.log_format,
            target: self.log_level == LogLevel::Trace,
        }
    }
}

/// First default settings file present in `dir`
pub fn discover_config_file(dir: &Path) -> Option<PathBuf> {
    DEFAULT_CONFIG_FILES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.is_file())
}
