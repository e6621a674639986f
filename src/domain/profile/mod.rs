//! Encoding profiles
//!
//! A profile is a named map of codec options (codec, sample rate, frame size,
//! bit rate...) describing the target of a transcoded stream. Profiles come
//! from the built-in presets and from TOML files in profile directories.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::domain::model::{SampleFormat, StreamKind};
use crate::error::{ShiftXError, ShiftXResult};

#[cfg(test)]
mod tests;

/// Named set of encoding options
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Profile {
    pub name: String,
    pub kind: StreamKind,
    pub codec: String,
    pub options: BTreeMap<String, String>,
}

impl Profile {
    /// Create a profile without options
    pub fn new(name: impl Into<String>, kind: StreamKind, codec: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            codec: codec.into(),
            options: BTreeMap::new(),
        }
    }

    /// Audio profile with sample rate and channel count
    pub fn audio(name: &str, codec: &str, sample_rate: u32, channels: u16) -> Self {
        Self::new(name, StreamKind::Audio, codec)
            .with_option("sample_rate", sample_rate)
            .with_option("channels", channels)
    }

    /// Video profile with frame size
    pub fn video(name: &str, codec: &str, width: u32, height: u32) -> Self {
        Self::new(name, StreamKind::Video, codec)
            .with_option("width", width)
            .with_option("height", height)
    }

    pub fn with_option(mut self, key: &str, value: impl ToString) -> Self {
        self.options.insert(key.to_string(), value.to_string());
        self
    }

    /// Raw option value
    pub fn get(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str)
    }

    /// Option value parsed into `T`
    pub fn get_parsed<T: FromStr>(&self, key: &str) -> ShiftXResult<Option<T>> {
        match self.get(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse::<T>().map(Some).map_err(|_| {
                ShiftXError::config(format!(
                    "Profile {}: invalid value '{}' for {}",
                    self.name, raw, key
                ))
            }),
        }
    }

    pub fn sample_rate(&self) -> ShiftXResult<Option<u32>> {
        self.get_parsed("sample_rate")
    }

    pub fn channels(&self) -> ShiftXResult<Option<u16>> {
        self.get_parsed("channels")
    }

    pub fn width(&self) -> ShiftXResult<Option<u32>> {
        self.get_parsed("width")
    }

    pub fn height(&self) -> ShiftXResult<Option<u32>> {
        self.get_parsed("height")
    }

    pub fn frame_rate(&self) -> ShiftXResult<Option<f64>> {
        self.get_parsed("frame_rate")
    }

    pub fn bit_rate(&self) -> ShiftXResult<Option<u64>> {
        self.get_parsed("bit_rate")
    }

    pub fn pixel_format(&self) -> Option<&str> {
        self.get("pixel_format")
    }

    /// PCM layout when the profile targets a PCM codec
    pub fn pcm_format(&self) -> Option<SampleFormat> {
        SampleFormat::from_codec_name(&self.codec)
    }

    /// Build a profile from a parsed TOML table
    fn from_table(table: &toml::value::Table, origin: &Path) -> ShiftXResult<Self> {
        let field = |key: &str| -> ShiftXResult<String> {
            table
                .get(key)
                .and_then(toml_scalar)
                .ok_or_else(|| {
                    ShiftXError::config(format!(
                        "Profile in {} is missing '{}'",
                        origin.display(),
                        key
                    ))
                })
        };

        let name = field("identificator")?;
        let kind_name = field("type")?;
        let kind = match StreamKind::parse(&kind_name) {
            Some(kind @ (StreamKind::Audio | StreamKind::Video)) => kind,
            _ => {
                return Err(ShiftXError::config(format!(
                    "Profile {} has unsupported type '{}'",
                    name, kind_name
                )))
            }
        };
        let codec = field("codec")?;

        let mut profile = Profile::new(name, kind, codec);
        for (key, value) in table {
            if matches!(key.as_str(), "identificator" | "type" | "codec") {
                continue;
            }
            match toml_scalar(value) {
                Some(text) => {
                    profile.options.insert(key.clone(), text);
                }
                None => warn!(
                    "Ignoring non scalar option {} in profile {}",
                    key, profile.name
                ),
            }
        }
        Ok(profile)
    }
}

fn toml_scalar(value: &toml::Value) -> Option<String> {
    match value {
        toml::Value::String(s) => Some(s.clone()),
        toml::Value::Integer(i) => Some(i.to_string()),
        toml::Value::Float(f) => Some(f.to_string()),
        toml::Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Registry of known profiles, keyed by name
#[derive(Debug, Clone, Default)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, Profile>,
}

impl ProfileRegistry {
    /// Registry with no profiles
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry pre-loaded with the built-in presets
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        for profile in builtin_profiles() {
            registry.register(profile);
        }
        registry
    }

    /// Add or replace a profile
    pub fn register(&mut self, profile: Profile) {
        if self.profiles.contains_key(&profile.name) {
            debug!("Profile {} redefined", profile.name);
        }
        self.profiles.insert(profile.name.clone(), profile);
    }

    pub fn get(&self, name: &str) -> Option<&Profile> {
        self.profiles.get(name)
    }

    /// Look up a profile, failing with `UnknownProfile`
    pub fn resolve(&self, name: &str) -> ShiftXResult<&Profile> {
        self.get(name).ok_or_else(|| ShiftXError::UnknownProfile {
            name: name.to_string(),
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Profile> {
        self.profiles.values()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Load profiles from one TOML file
    ///
    /// The file holds either a single profile at top level or an array of
    /// `[[profile]]` tables.
    pub fn load_file(&mut self, path: &Path) -> ShiftXResult<usize> {
        let content = std::fs::read_to_string(path)?;
        let parsed: toml::Value = toml::from_str(&content).map_err(|e| {
            ShiftXError::config(format!("Failed to parse profile {}: {}", path.display(), e))
        })?;

        let tables: Vec<&toml::value::Table> = match parsed.get("profile") {
            Some(toml::Value::Array(items)) => items.iter().filter_map(|v| v.as_table()).collect(),
            _ => parsed.as_table().into_iter().collect(),
        };

        let mut loaded = 0;
        for table in tables {
            let profile = Profile::from_table(table, path)?;
            debug!("Loaded profile {} from {}", profile.name, path.display());
            self.register(profile);
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Load every `*.toml` profile below `dir`, recursively
    pub fn load_dir(&mut self, dir: &Path) -> ShiftXResult<usize> {
        if !dir.is_dir() {
            return Err(ShiftXError::config(format!(
                "Profile directory not found: {}",
                dir.display()
            )));
        }

        let mut files: Vec<_> = WalkDir::new(dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("Skipping unreadable profile entry: {}", e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| path.extension().map_or(false, |ext| ext == "toml"))
            .collect();
        files.sort();

        let mut loaded = 0;
        for file in files {
            loaded += self.load_file(&file)?;
        }
        Ok(loaded)
    }
}

/// Built-in presets
pub fn builtin_profiles() -> Vec<Profile> {
    vec![
        Profile::audio("wave16b48kmono", "pcm_s16le", 48000, 1),
        Profile::audio("wave16b48kstereo", "pcm_s16le", 48000, 2),
        Profile::audio("wave24b48kmono", "pcm_s24le", 48000, 1),
        Profile::audio("wave24b48kstereo", "pcm_s24le", 48000, 2),
        Profile::audio("wave16b44kstereo", "pcm_s16le", 44100, 2),
        Profile::audio("wavefloat48kstereo", "pcm_f32le", 48000, 2),
        Profile::audio("aac48kstereo", "aac", 48000, 2).with_option("bit_rate", 192_000),
        Profile::video("mpeg2", "mpeg2video", 1920, 1080)
            .with_option("frame_rate", 25)
            .with_option("bit_rate", 15_000_000)
            .with_option("pixel_format", "yuv422p"),
        Profile::video("h264", "libx264", 1920, 1080)
            .with_option("frame_rate", 25)
            .with_option("bit_rate", 8_000_000)
            .with_option("pixel_format", "yuv420p"),
    ]
}
