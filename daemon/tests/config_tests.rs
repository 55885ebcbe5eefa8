use powerguard_daemon::config::Config;
use std::io::Write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.general.housekeeping_interval_secs, 300);
    assert!(config.lists.allow_path.is_none());
    assert!(config.lists.deny_path.is_none());
}

#[test]
fn test_load_from_toml() {
    let toml_content = r#"
[general]
housekeeping_interval_secs = 60

[lists]
allow_path = "/tmp/allow.txt"
"#;
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(toml_content.as_bytes()).unwrap();
    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.general.housekeeping_interval_secs, 60);
    assert_eq!(config.lists.allow_path, Some(PathBuf::from("/tmp/allow.txt")));
    assert!(config.lists.deny_path.is_none());
}

#[test]
fn test_missing_lists_section_defaults() {
    let toml_content = r#"
[general]
housekeeping_interval_secs = 120
"#;
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(toml_content.as_bytes()).unwrap();
    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.general.housekeeping_interval_secs, 120);
    assert!(config.lists.allow_path.is_none());
}

#[test]
fn test_save_config() {
    let mut config = Config::default();
    config.general.housekeeping_interval_secs = 90;
    let file = NamedTempFile::new().unwrap();
    config.save(file.path()).unwrap();
    let loaded = Config::load(file.path()).unwrap();
    assert_eq!(loaded.general.housekeeping_interval_secs, 90);
}
