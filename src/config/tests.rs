use super::*;
use std::collections::HashMap;
use tempfile::TempDir;

fn no_env(_: &str) -> Option<String> {
    None
}

fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

#[test]
fn test_defaults() {
    let settings = Settings::resolve(None, no_env, &SettingsOverrides::default()).unwrap();
    assert_eq!(settings.log_level, LogLevel::Warn);
    assert_eq!(settings.overwrite, OverwritePolicy::Never);
    assert_eq!(settings.threads, num_cpus::get());
    assert!(settings.profile_dirs.is_empty());
    assert!(settings.source.is_none());
}

#[test]
fn test_toml_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shiftx.toml");
    std::fs::write(
        &path,
        r#"
[shiftx]
log_level = "debug"
log_format = "json"
profile_dirs = ["profiles", "/opt/profiles"]
progress_interval_ms = 100
overwrite = "always"
threads = 2
"#,
    )
    .unwrap();

    let settings = Settings::resolve(Some(&path), no_env, &SettingsOverrides::default()).unwrap();
    assert_eq!(settings.log_level, LogLevel::Debug);
    assert_eq!(settings.log_format, LogFormat::Json);
    assert_eq!(
        settings.profile_dirs,
        vec![dir.path().join("profiles"), PathBuf::from("/opt/profiles")]
    );
    assert_eq!(settings.progress_interval, Duration::from_millis(100));
    assert_eq!(settings.overwrite, OverwritePolicy::Always);
    assert_eq!(settings.threads, 2);
    assert_eq!(settings.source.as_deref(), Some(path.as_path()));
}

#[test]
fn test_yaml_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("settings.yaml");
    std::fs::write(&path, "shiftx:\n  log_level: info\n  threads: 3\n").unwrap();

    let settings = Settings::resolve(Some(&path), no_env, &SettingsOverrides::default()).unwrap();
    assert_eq!(settings.log_level, LogLevel::Info);
    assert_eq!(settings.threads, 3);
}

#[test]
fn test_file_without_table_keeps_defaults() {
    assert_eq!(
        FileSettings::from_toml("[other]\nkey = 1\n").unwrap(),
        FileSettings::default()
    );
    assert_eq!(FileSettings::from_yaml("").unwrap(), FileSettings::default());
}

#[test]
fn test_file_errors() {
    assert!(FileSettings::from_toml("[shiftx]\nverbosity = 3\n").is_err());
    assert!(FileSettings::from_toml("[shiftx]\nlog_level = \"loud\"\n").is_err());

    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shiftx.ini");
    std::fs::write(&path, "").unwrap();
    assert!(FileSettings::read(&path).is_err());
    assert!(FileSettings::read(&dir.path().join("missing.toml")).is_err());
}

#[test]
fn test_precedence_cli_over_env_over_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("shiftx.toml");
    std::fs::write(
        &path,
        "[shiftx]\nlog_level = \"error\"\nthreads = 2\noverwrite = \"never\"\n",
    )
    .unwrap();

    let env = env_of(&[("SHIFTX_LOG_LEVEL", "info"), ("SHIFTX_THREADS", "6")]);
    let overrides = SettingsOverrides {
        threads: Some(8),
        ..Default::default()
    };

    let settings = Settings::resolve(Some(&path), env, &overrides).unwrap();
    assert_eq!(settings.log_level, LogLevel::Info);
    assert_eq!(settings.threads, 8);
    assert_eq!(settings.overwrite, OverwritePolicy::Never);
}

#[test]
fn test_profile_dirs_accumulate() {
    let joined = std::env::join_paths(["/env/a", "/env/b"]).unwrap();
    let joined = joined.to_string_lossy().into_owned();
    let env = env_of(&[(PROFILES_ENV, joined.as_str())]);
    let overrides = SettingsOverrides {
        profile_dirs: vec![PathBuf::from("/cli")],
        ..Default::default()
    };

    let settings = Settings::resolve(None, env, &overrides).unwrap();
    assert_eq!(
        settings.profile_dirs,
        vec![
            PathBuf::from("/env/a"),
            PathBuf::from("/env/b"),
            PathBuf::from("/cli")
        ]
    );
}

#[test]
fn test_invalid_env_values() {
    let env = env_of(&[("SHIFTX_THREADS", "many")]);
    assert!(Settings::resolve(None, env, &SettingsOverrides::default()).is_err());

    let env = env_of(&[("SHIFTX_OVERWRITE", "maybe")]);
    assert!(Settings::resolve(None, env, &SettingsOverrides::default()).is_err());

    let env = env_of(&[("SHIFTX_THREADS", "0")]);
    assert!(Settings::resolve(None, env, &SettingsOverrides::default()).is_err());
}

#[test]
fn test_blank_env_is_ignored() {
    let env = env_of(&[("SHIFTX_LOG_LEVEL", "  ")]);
    let settings = Settings::resolve(None, env, &SettingsOverrides::default()).unwrap();
    assert_eq!(settings.log_level, LogLevel::Warn);
}

#[test]
fn test_discover_config_file() {
    let dir = TempDir::new().unwrap();
    assert!(discover_config_file(dir.path()).is_none());

    std::fs::write(dir.path().join("shiftx.yml"), "").unwrap();
    assert_eq!(
        discover_config_file(dir.path()),
        Some(dir.path().join("shiftx.yml"))
    );

    std::fs::write(dir.path().join("shiftx.toml"), "").unwrap();
    assert_eq!(
        discover_config_file(dir.path()),
        Some(dir.path().join("shiftx.toml"))
    );
}
