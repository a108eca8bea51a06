use std::path::Path;

use parley_common::ConfigError;

use super::*;
use crate::schema::VoiceMode;

fn write_config(contents: &str) -> (tempfile::TempDir, std::path::PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, contents).unwrap();
    (dir, path)
}

#[test]
fn missing_file_is_reported_as_not_found() {
    let err = load_from_path(Path::new("/tmp/parley-does-not-exist/config.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::FileNotFound(_)));
}

#[test]
fn partial_file_keeps_defaults_for_other_sections() {
    let (_dir, path) = write_config(
        r#"
[signaling]
url = "ws://127.0.0.1:9000/voice"

[voice]
mode = "ptt"
"#,
    );

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.signaling.url, "ws://127.0.0.1:9000/voice");
    assert_eq!(config.voice.mode, VoiceMode::Ptt);
    assert_eq!(config.signaling.request_timeout_ms, 10_000);
    assert_eq!(config.latency.good_below_ms, 100);
    assert!(config.ice_servers.is_empty());
}

#[test]
fn ice_servers_parse_as_array_of_tables() {
    let config = parse_str(
        r#"
[[ice_servers]]
urls = ["turn:turn.example.org:3478"]
username = "u"
credential = "p"
"#,
    )
    .unwrap();
    assert_eq!(config.ice_servers.len(), 1);
    assert_eq!(config.ice_servers[0].username, "u");
}

#[test]
fn garbage_is_a_parse_error() {
    let (_dir, path) = write_config("this is not valid toml {{{");
    let err = load_from_path(&path).unwrap_err();
    assert!(matches!(err, ConfigError::ParseError(_)));
}

#[test]
fn out_of_range_values_still_load() {
    let (_dir, path) = write_config(
        r#"
[latency]
good_below_ms = 900
average_below_ms = 200
"#,
    );

    let config = load_from_path(&path).unwrap();
    assert_eq!(config.latency.good_below_ms, 900);
    assert!(crate::validation::validate(&config).is_err());
}

#[test]
fn written_template_loads_back_as_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("parley").join("config.toml");

    create_default_config(&path).unwrap();
    let config = load_from_path(&path).unwrap();

    assert_eq!(config.voice.mode, VoiceMode::Vad);
    assert_eq!(config.latency.ping_interval_secs, 5);
    assert!(config.signaling.url.is_empty());
    assert!(crate::validation::validate(&config).is_ok());
}

#[test]
fn default_path_ends_in_parley_dir() {
    if let Ok(path) = default_config_path() {
        assert!(path.ends_with("parley/config.toml"));
    }
}
