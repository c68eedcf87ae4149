//! Coverage for config parsing, overrides, and validation.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use urlminder::config::{
    config_dir, Config, CursorRecovery, FailurePolicyConfig, LoadReport, RejectedOverride,
};
use urlminder::consumer::FailurePolicy;

fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn config_dir_resolves() {
    let path = match config_dir() {
        Ok(path) => path,
        Err(err) => panic!("config dir should resolve: {err}"),
    };
    assert!(path.ends_with(".urlminder"));
}

#[test]
fn parse_full_config() {
    let toml_str = r#"
[telegram]
host = "tg.internal"
bot_token = "123:abc"
request_timeout_seconds = 10

[consumer]
batch_size = 25
idle_interval_ms = 250
fetch_backoff_ms = 500
max_fetch_backoff_ms = 8000
failure_policy = "retry"
retry_attempts = 4

[cursor]
persist = false
on_unavailable = "fail_fast"

[storage]
db_path = "/var/lib/urlminder/pages.db"

[logging]
level = "debug"
logs_dir = "/var/log/urlminder"
"#;
    let config = match Config::from_toml(toml_str) {
        Ok(config) => config,
        Err(err) => panic!("full config should parse: {err}"),
    };

    assert_eq!(config.telegram.host, "tg.internal");
    assert_eq!(config.telegram.bot_token.as_deref(), Some("123:abc"));
    assert_eq!(config.consumer.batch_size, 25);
    assert_eq!(config.consumer.failure_policy, FailurePolicyConfig::Retry);
    assert!(!config.cursor.persist);
    assert_eq!(config.cursor.on_unavailable, CursorRecovery::FailFast);
    assert_eq!(
        config.db_path().expect("db path"),
        PathBuf::from("/var/lib/urlminder/pages.db")
    );
    assert_eq!(
        config.logs_dir().expect("logs dir"),
        PathBuf::from("/var/log/urlminder")
    );
    assert!(config.validate().is_ok());

    let settings = config.consumer_settings();
    assert_eq!(settings.batch_size, 25);
    assert_eq!(settings.idle_interval, Duration::from_millis(250));
    assert_eq!(settings.fetch_backoff, Duration::from_millis(500));
    assert_eq!(settings.max_fetch_backoff, Duration::from_millis(8000));
    assert_eq!(
        settings.failure_policy,
        FailurePolicy::Retry { max_attempts: 4 }
    );
}

#[test]
fn partial_config_keeps_defaults() {
    let config = match Config::from_toml("[consumer]\nbatch_size = 5\n") {
        Ok(config) => config,
        Err(err) => panic!("partial config should parse: {err}"),
    };
    assert_eq!(config.consumer.batch_size, 5);
    assert_eq!(config.consumer.idle_interval_ms, 1_000);
    assert_eq!(config.telegram.host, "api.telegram.org");
    assert!(config.cursor.persist);
}

#[test]
fn unknown_failure_policy_is_rejected() {
    let result = Config::from_toml("[consumer]\nfailure_policy = \"explode\"\n");
    assert!(result.is_err());
}

#[test]
fn env_overrides_file_values() {
    let mut config = match Config::from_toml("[telegram]\nbot_token = \"from-file\"\n") {
        Ok(config) => config,
        Err(err) => panic!("config should parse: {err}"),
    };
    let rejected = config.apply_overrides(env_from(&[
        ("URLMINDER_TELEGRAM_TOKEN", "from-env"),
        ("URLMINDER_TELEGRAM_HOST", "localhost:8081"),
        ("URLMINDER_BATCH_SIZE", "42"),
        ("URLMINDER_DB_PATH", "/tmp/x.db"),
        ("URLMINDER_LOG_LEVEL", "trace"),
    ]));

    assert_eq!(config.telegram.bot_token.as_deref(), Some("from-env"));
    assert_eq!(config.telegram.host, "localhost:8081");
    assert_eq!(config.consumer.batch_size, 42);
    assert_eq!(config.db_path().expect("db path"), PathBuf::from("/tmp/x.db"));
    assert_eq!(config.logging.level, "trace");
    assert!(rejected.is_empty());
}

#[test]
fn invalid_numeric_override_is_ignored() {
    let mut config = Config::default();
    let rejected = config.apply_overrides(env_from(&[("URLMINDER_BATCH_SIZE", "lots")]));
    assert_eq!(config.consumer.batch_size, 100);
    assert_eq!(
        rejected,
        vec![RejectedOverride {
            var: "URLMINDER_BATCH_SIZE",
            value: "lots".to_owned(),
        }]
    );
}

#[test]
fn load_reports_file_and_rejected_overrides() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[consumer]\nbatch_size = 7\n").expect("write");

    let (config, report) = match Config::load_with(
        Some(&path),
        env_from(&[("URLMINDER_BATCH_SIZE", "many")]),
    ) {
        Ok(loaded) => loaded,
        Err(err) => panic!("config should load: {err}"),
    };

    assert_eq!(config.consumer.batch_size, 7);
    assert_eq!(
        report,
        LoadReport {
            path,
            file_found: true,
            rejected_overrides: vec![RejectedOverride {
                var: "URLMINDER_BATCH_SIZE",
                value: "many".to_owned(),
            }],
        }
    );
}

#[test]
fn load_without_file_reports_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("absent.toml");
    let env_path = path.to_string_lossy().into_owned();

    let (config, report) =
        match Config::load_with(None, env_from(&[("URLMINDER_CONFIG", env_path.as_str())])) {
            Ok(loaded) => loaded,
            Err(err) => panic!("defaults should load: {err}"),
        };

    assert_eq!(config.consumer.batch_size, 100);
    assert_eq!(report.path, path);
    assert!(!report.file_found);
    assert!(report.rejected_overrides.is_empty());
}

#[test]
fn validate_rejects_out_of_range_batch_size() {
    for bad in [0, 101] {
        let mut config = Config::default();
        config.consumer.batch_size = bad;
        assert!(config.validate().is_err(), "batch_size {bad} should fail");
    }
    let mut config = Config::default();
    config.consumer.batch_size = 1;
    assert!(config.validate().is_ok());
}

#[test]
fn validate_rejects_zero_retry_attempts() {
    let mut config = Config::default();
    config.consumer.failure_policy = FailurePolicyConfig::Retry;
    config.consumer.retry_attempts = 0;
    assert!(config.validate().is_err());

    config.consumer.failure_policy = FailurePolicyConfig::LogAndDrop;
    assert!(config.validate().is_ok());
}

#[test]
fn missing_token_is_an_error() {
    let mut config = Config::default();
    assert!(config.require_token().is_err());

    config.telegram.bot_token = Some("   ".to_owned());
    assert!(config.require_token().is_err());

    config.telegram.bot_token = Some("123:abc".to_owned());
    assert_eq!(config.require_token().expect("token"), "123:abc");
}

#[test]
fn load_from_missing_file_yields_defaults() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = Config::load_from(&dir.path().join("absent.toml")).expect("defaults");
    assert_eq!(config.consumer.batch_size, 100);
}

#[test]
fn load_from_malformed_file_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[consumer\nbatch_size = ").expect("write");
    assert!(Config::load_from(&path).is_err());
}

#[test]
fn load_from_reads_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[logging]\nlevel = \"warn\"\n").expect("write");
    let config = Config::load_from(&path).expect("load");
    assert_eq!(config.logging.level, "warn");
}
