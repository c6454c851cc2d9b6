#![allow(clippy::unwrap_used)]
// File round trips for recdesk-config.

use std::time::Duration;

use pretty_assertions::assert_eq;
use tempfile::TempDir;

use recdesk_config::{Config, Profile, load_config_from, profile_to_desk_config, save_config_to};
use recdesk_core::TlsMode;

#[test]
fn test_missing_file_yields_defaults() {
    let dir = TempDir::new().unwrap();
    let cfg = load_config_from(&dir.path().join("absent.toml")).unwrap();

    assert_eq!(cfg.default_profile.as_deref(), Some("default"));
    assert_eq!(cfg.defaults.output, "table");
    assert_eq!(cfg.defaults.timeout, 30);
    assert!(cfg.profiles.is_empty());
}

#[test]
fn test_save_then_load_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested").join("config.toml");

    let mut cfg = Config::default();
    cfg.profiles.insert(
        "office".into(),
        Profile {
            server: "https://records.local/api".into(),
            insecure: Some(true),
            stale_time: Some("45s".into()),
            ..Profile::default()
        },
    );
    cfg.default_profile = Some("office".into());
    save_config_to(&path, &cfg).unwrap();

    let loaded = load_config_from(&path).unwrap();
    assert_eq!(loaded.default_profile.as_deref(), Some("office"));
    let profile = &loaded.profiles["office"];
    assert_eq!(profile.server, "https://records.local/api");
    assert_eq!(profile.insecure, Some(true));
    assert_eq!(profile.stale_time.as_deref(), Some("45s"));
}

#[test]
fn test_handwritten_toml_builds_desk_config() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
default_profile = "archive"

[defaults]
timeout = 12

[profiles.archive]
server = "https://archive.local/api/"
keep_unused_for = "5m"
logout_path = "/auth/signout"
"#,
    )
    .unwrap();

    let cfg = load_config_from(&path).unwrap();
    let profile = &cfg.profiles["archive"];
    let desk = profile_to_desk_config(profile, "archive", &cfg.defaults).unwrap();

    assert_eq!(desk.url.as_str(), "https://archive.local/api/");
    assert_eq!(desk.timeout, Duration::from_secs(12));
    assert!(matches!(desk.tls, TlsMode::System));
    assert_eq!(desk.auth_paths.logout, "/auth/signout");
    assert_eq!(desk.query.keep_unused_for, Duration::from_secs(300));
    assert_eq!(desk.query.stale_time, None);
}
