//! Integration tests for configuration loading and validation
//!
//! Tests that touch environment variables hold `ENV_MUTEX`.

use std::io::Write;
use std::sync::Mutex;
use study_courier::config::load_config;
use tempfile::NamedTempFile;

static ENV_MUTEX: Mutex<()> = Mutex::new(());

fn cleanup_env_vars() {
    std::env::remove_var("COURIER_APPLICATION_LOG_LEVEL");
    std::env::remove_var("COURIER_HOST_BASE_URL");
    std::env::remove_var("COURIER_EXPORT_DELETE_ORIGINAL");
    std::env::remove_var("COURIER_UPLOADER_TIMEOUT_SECONDS");
    std::env::remove_var("TEST_HOST_PASSWORD");
}

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_complete_config() {
    let _guard = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    let file = write_config(
        r#"
[application]
log_level = "debug"

[host]
base_url = "https://orthanc.example.org:8042"
username = "courier"
password = "hunter2"
timeout_seconds = 10
change_batch_size = 50

[export]
export_dir = "/data/exports"
default_passphrase = "fallback"
delete_original = false
delivery_pacing_ms = 250

[queue]
queue_dir = "/data/mailqueue"
artifact_extension = "7z"

[server]
bind_address = "0.0.0.0:9000"

[uploader]
program = "/usr/local/bin/filesender"
args = ["--insecure"]
username = "sender@example.org"
api_key = "abc123"
timeout_seconds = 120

[monitor]
enabled = false
"#,
    );

    let config = load_config(file.path()).unwrap();

    assert_eq!(config.application.log_level, "debug");
    assert_eq!(config.host.base_url, "https://orthanc.example.org:8042");
    assert_eq!(config.host.change_batch_size, 50);
    assert_eq!(config.export.default_passphrase, "fallback");
    assert!(!config.export.delete_original);
    assert_eq!(config.queue.artifact_extension, "7z");
    assert_eq!(config.server.bind_address.port(), 9000);
    assert_eq!(config.uploader.args, vec!["--insecure".to_string()]);
    assert_eq!(config.uploader.timeout_seconds, 120);
    assert!(!config.monitor.enabled);

    // secrets never show up in debug output
    let debug = format!("{config:?}");
    assert!(!debug.contains("hunter2"));
    assert!(!debug.contains("abc123"));
}

#[test]
fn test_defaults_for_minimal_config() {
    let _guard = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    let file = write_config("[host]\nbase_url = \"http://localhost:8042\"\n");

    let config = load_config(file.path()).unwrap();

    assert_eq!(config.export.default_passphrase, "default123");
    assert!(config.export.delete_original);
    assert_eq!(config.export.delivery_pacing_ms, 500);
    assert_eq!(config.export.ledger_path().to_str().unwrap(), "/exports/mapping.json");
    assert_eq!(config.queue.queue_dir.to_str().unwrap(), "/mailqueue");
    assert_eq!(config.uploader.timeout_seconds, 300);
    assert_eq!(config.uploader.poll_interval_seconds, 10);
    assert_eq!(config.host.settle_delay_ms, 1000);
    assert_eq!(config.monitor.interval_seconds, 120);
}

#[test]
fn test_env_substitution_and_overrides() {
    let _guard = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();
    std::env::set_var("TEST_HOST_PASSWORD", "from-env");
    std::env::set_var("COURIER_EXPORT_DELETE_ORIGINAL", "false");
    std::env::set_var("COURIER_UPLOADER_TIMEOUT_SECONDS", "42");

    let file = write_config(
        "[host]\nbase_url = \"http://localhost:8042\"\npassword = \"${TEST_HOST_PASSWORD}\"\n",
    );
    let result = load_config(file.path());
    cleanup_env_vars();

    let config = result.unwrap();
    assert!(config.host.password.is_some());
    assert!(!config.export.delete_original);
    assert_eq!(config.uploader.timeout_seconds, 42);
}

#[test]
fn test_invalid_configs_are_rejected() {
    let _guard = ENV_MUTEX.lock().unwrap();
    cleanup_env_vars();

    let cases = [
        "[host]\nbase_url = \"not a url\"\n",
        "[host]\nbase_url = \"http://h\"\n[export]\nexport_dir = \"/same\"\n[queue]\nqueue_dir = \"/same\"\n",
        "[host]\nbase_url = \"http://h\"\n[queue]\nartifact_extension = \".zip\"\n",
        "[host]\nbase_url = \"http://h\"\n[uploader]\ntimeout_seconds = 0\n",
        "[host]\nbase_url = \"http://h\"\n[application]\nlog_level = \"loud\"\n",
    ];
    for content in cases {
        let file = write_config(content);
        assert!(load_config(file.path()).is_err(), "accepted: {content}");
    }
}

#[test]
fn test_missing_file() {
    assert!(load_config("/nonexistent/courier.toml").is_err());
}
