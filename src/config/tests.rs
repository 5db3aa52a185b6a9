use super::load_config;
use super::settings::Settings;
use serial_test::serial;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.messaging.ttl_uplift_ms, 0);
    assert_eq!(settings.messaging.default_ttl_ms, 60_000);
    assert!(settings.messaging.reply_to_address.is_empty());
    assert_eq!(settings.publication.max_threads, 1);
    assert_eq!(settings.publication.expired_reply_ttl_ms, 60_000);
    assert_eq!(settings.publication.end_tolerance_ms, 3_600_000);
    assert_eq!(settings.logging.level, "info");
}

#[test]
#[serial]
fn test_env_overrides_defaults() {
    temp_env::with_vars(
        [
            ("SWITCHYARD__MESSAGING__TTL_UPLIFT_MS", Some("10000")),
            ("SWITCHYARD__PUBLICATION__STORAGE_PATH", Some("/tmp/switchyard-test")),
        ],
        || {
            let cfg = load_config().expect("load_config failed");
            assert_eq!(cfg.messaging.ttl_uplift_ms, 10_000);
            assert_eq!(cfg.publication.storage_path, "/tmp/switchyard-test");
            // untouched values fall back to defaults
            assert_eq!(cfg.messaging.default_ttl_ms, 60_000);
            assert_eq!(cfg.logging.level, "info");
        },
    );
}

#[test]
#[serial]
fn test_load_config_from_file_overrides_defaults() {
    use std::env;
    use std::fs;
    use tempfile::TempDir;

    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    fs::create_dir_all("config").expect("create config dir");
    let toml = r#"
        [messaging]
        reply_to_address = "mqtt://broker/replies"

        [publication]
        max_threads = 4
        end_tolerance_ms = 1000

        [logging]
        level = "debug"
    "#;
    fs::write("config/default.toml", toml).expect("write config file");

    let cfg = load_config();

    // restore cwd before asserting so a failure does not leak the tempdir cwd
    env::set_current_dir(orig).expect("restore cwd");

    let cfg = cfg.expect("load_config failed");
    assert_eq!(cfg.messaging.reply_to_address, "mqtt://broker/replies");
    assert_eq!(cfg.publication.max_threads, 4);
    assert_eq!(cfg.publication.end_tolerance_ms, 1000);
    assert_eq!(cfg.logging.level, "debug");
    assert_eq!(cfg.messaging.ttl_uplift_ms, 0);
}
