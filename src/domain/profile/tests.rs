use super::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_builtin_profiles_registered() {
    let registry = ProfileRegistry::with_builtins();
    let profile = registry.resolve("wave24b48kmono").unwrap();

    assert_eq!(profile.kind, StreamKind::Audio);
    assert_eq!(profile.codec, "pcm_s24le");
    assert_eq!(profile.sample_rate().unwrap(), Some(48000));
    assert_eq!(profile.channels().unwrap(), Some(1));
    assert_eq!(profile.pcm_format(), Some(SampleFormat::S24));

    let mpeg2 = registry.resolve("mpeg2").unwrap();
    assert_eq!(mpeg2.kind, StreamKind::Video);
    assert_eq!(mpeg2.width().unwrap(), Some(1920));
    assert_eq!(mpeg2.pcm_format(), None);
}

#[test]
fn test_unknown_profile() {
    let registry = ProfileRegistry::with_builtins();
    match registry.resolve("wave8b8kmono") {
        Err(ShiftXError::UnknownProfile { name }) => assert_eq!(name, "wave8b8kmono"),
        other => panic!("unexpected result: {:?}", other),
    }
}

#[test]
fn test_invalid_option_value() {
    let profile = Profile::new("broken", StreamKind::Audio, "pcm_s16le").with_option("sample_rate", "fast");
    assert!(profile.sample_rate().is_err());
    assert_eq!(profile.channels().unwrap(), None);
}

#[test]
fn test_load_profile_directory() {
    let dir = TempDir::new().unwrap();
    let nested = dir.path().join("studio");
    fs::create_dir(&nested).unwrap();

    fs::write(
        dir.path().join("hires.toml"),
        "identificator = \"wave32b96kstereo\"\ntype = \"audio\"\ncodec = \"pcm_s32le\"\nsample_rate = 96000\nchannels = 2\n",
    )
    .unwrap();
    fs::write(
        nested.join("pack.toml"),
        "[[profile]]\nidentificator = \"mono8k\"\ntype = \"audio\"\ncodec = \"pcm_u8\"\nsample_rate = 8000\nchannels = 1\n\n\
         [[profile]]\nidentificator = \"wave16b48kmono\"\ntype = \"audio\"\ncodec = \"pcm_s16le\"\nsample_rate = 48000\nchannels = 1\nnote = \"override\"\n",
    )
    .unwrap();
    fs::write(dir.path().join("readme.txt"), "not a profile").unwrap();

    let mut registry = ProfileRegistry::with_builtins();
    let before = registry.len();
    let loaded = registry.load_dir(dir.path()).unwrap();

    assert_eq!(loaded, 3);
    assert_eq!(registry.len(), before + 2);
    assert_eq!(
        registry.resolve("wave32b96kstereo").unwrap().sample_rate().unwrap(),
        Some(96000)
    );
    assert_eq!(registry.resolve("wave16b48kmono").unwrap().get("note"), Some("override"));
}

#[test]
fn test_load_profile_missing_fields() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.toml");
    fs::write(&path, "identificator = \"x\"\ncodec = \"pcm_s16le\"\n").unwrap();

    let mut registry = ProfileRegistry::empty();
    assert!(registry.load_file(&path).is_err());
    assert!(registry.is_empty());
}

#[test]
fn test_load_missing_directory() {
    let mut registry = ProfileRegistry::empty();
    assert!(registry.load_dir(Path::new("/nonexistent/profiles")).is_err());
}
