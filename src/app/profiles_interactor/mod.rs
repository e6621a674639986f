// Profiles interactor - Lists the encoding profiles known to the registry

use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;

use crate::domain::{Profile, ProfileRegistry};
use crate::error::{ShiftXError, ShiftXResult};

/// Interactor for the profile listing use case
pub struct ProfilesInteractor {
    profiles: Arc<ProfileRegistry>,
}

#[derive(Serialize)]
struct ProfileEntry<'a> {
    name: &'a str,
    kind: String,
    codec: &'a str,
    options: &'a std::collections::BTreeMap<String, String>,
}

impl<'a> From<&'a Profile> for ProfileEntry<'a> {
    fn from(profile: &'a Profile) -> Self {
        Self {
            name: &profile.name,
            kind: profile.kind.to_string(),
            codec: &profile.codec,
            options: &profile.options,
        }
    }
}

impl ProfilesInteractor {
    pub fn new(profiles: Arc<ProfileRegistry>) -> Self {
        Self { profiles }
    }

    /// Render every known profile, sorted by name
    pub fn execute(&self, json: bool) -> ShiftXResult<String> {
        if json {
            let entries: Vec<ProfileEntry> = self.profiles.iter().map(ProfileEntry::from).collect();
            return serde_json::to_string_pretty(&entries)
                .map_err(|e| ShiftXError::config(format!("JSON serialization failed: {}", e)));
        }

        let mut output = String::new();
        for profile in self.profiles.iter() {
            let options = profile
                .options
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(" ");
            let _ = writeln!(
                output,
                "{:<20} {:<6} {:<12} {}",
                profile.name,
                profile.kind.to_string(),
                profile.codec,
                options
            );
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_builtins() {
        let interactor = ProfilesInteractor::new(Arc::new(ProfileRegistry::with_builtins()));
        let text = interactor.execute(false).unwrap();
        assert!(text.lines().any(|l| l.starts_with("wave24b48kmono")));
        assert!(text.contains("sample_rate=48000"));

        let json: serde_json::Value = serde_json::from_str(&interactor.execute(true).unwrap()).unwrap();
        let names: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|p| p["name"].as_str().unwrap())
            .collect();
        assert!(names.contains(&"h264"));
        assert!(names.contains(&"wave16b48kstereo"));
    }
}
