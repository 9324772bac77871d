use std::env;
use std::fs;
use std::sync::{Mutex, OnceLock};

use paysage_cli::commands::remind::RemindCommand;
use paysage_cli::commands::{derive, doctor, migrate, remind};
use serde_json::Value;
use tempfile::TempDir;

#[test]
fn migrate_returns_success_with_valid_env() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&[("PAYSAGE_DATABASE_URL", &database_url(&dir))], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_for_non_sqlite_url() {
    with_env(&[("PAYSAGE_DATABASE_URL", "postgres://localhost/paysage")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn doctor_reports_pass_with_valid_env() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&[("PAYSAGE_DATABASE_URL", &database_url(&dir))], || {
        let result = doctor::run(true);
        assert_eq!(result.exit_code, 0, "expected passing doctor report: {}", result.output);

        let report = parse_payload(&result.output);
        assert_eq!(report["overall_status"], "pass");
        assert_eq!(report["checks"].as_array().map(Vec::len), Some(3));
    });
}

#[test]
fn doctor_flags_broken_rule_file() {
    let dir = TempDir::new().expect("tempdir");
    let rules = dir.path().join("rules.toml");
    fs::write(&rules, "rules = []\n").expect("write rules");
    let rules_path = rules.display().to_string();

    with_env(
        &[
            ("PAYSAGE_DATABASE_URL", &database_url(&dir)),
            ("PAYSAGE_ASSISTANT_RULES_PATH", &rules_path),
        ],
        || {
            let result = doctor::run(true);
            assert_eq!(result.exit_code, 1);

            let report = parse_payload(&result.output);
            assert_eq!(report["overall_status"], "fail");
            assert_eq!(report["checks"][1]["name"], "rule_table");
            assert_eq!(report["checks"][1]["status"], "fail");
        },
    );
}

#[test]
fn derive_prices_the_built_in_mowing_rule() {
    with_env(&[], || {
        let result = derive::run("Tonte de gazon sur 200m²", None);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "derive");
        assert_eq!(decimal_field(&payload["data"]["total_ht"]), Some(80.0));
        assert_eq!(decimal_field(&payload["data"]["total_ttc"]), Some(96.0));
        assert_eq!(payload["data"]["confidence_pct"], 57);
        assert_eq!(payload["data"]["subject"], "Tonte de pelouse");
    });
}

#[test]
fn derive_with_unknown_text_is_empty_but_successful() {
    with_env(&[], || {
        let result = derive::run("Bonjour, merci pour votre retour", None);
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["message"], "no prestation detected");
        assert_eq!(payload["data"]["confidence_pct"], 0);
        assert_eq!(payload["data"]["subject"], "Devis de travaux paysagers");
    });
}

#[test]
fn derive_reports_missing_rule_file() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&[], || {
        let result = derive::run("tonte 100 m2", Some(dir.path().join("absent.toml")));
        assert_eq!(result.exit_code, 6);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["error_class"], "rule_table");
    });
}

#[test]
fn remind_lifecycle_persists_between_invocations() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&[("PAYSAGE_DATABASE_URL", &database_url(&dir))], || {
        let started = parse_payload(
            &remind::run(RemindCommand::Start { invoice: "F-2026-0042".to_string(), auto_send: true })
                .output,
        );
        assert_eq!(started["status"], "ok");
        assert_eq!(started["data"]["current_level"], "level1");
        let workflow = started["data"]["id"].as_str().expect("workflow id").to_string();

        let advanced = remind::run(RemindCommand::Advance { workflow: workflow.clone(), channel: None });
        assert_eq!(advanced.exit_code, 0);
        let advanced = parse_payload(&advanced.output);
        assert_eq!(advanced["data"]["workflow"]["current_level"], "level2");
        assert_eq!(advanced["data"]["message"]["level"], "level1");

        let duplicate = remind::run(RemindCommand::Start {
            invoice: "F-2026-0042".to_string(),
            auto_send: false,
        });
        assert_eq!(duplicate.exit_code, 8);
        assert_eq!(parse_payload(&duplicate.output)["error_class"], "conflict");

        let stopped = remind::run(RemindCommand::Stop {
            workflow: workflow.clone(),
            reason: Some("invoice paid".to_string()),
        });
        assert_eq!(stopped.exit_code, 0);

        let rejected = remind::run(RemindCommand::Advance { workflow: workflow.clone(), channel: None });
        assert_eq!(rejected.exit_code, 9);
        assert_eq!(parse_payload(&rejected.output)["error_class"], "workflow_inactive");

        let shown = parse_payload(&remind::run(RemindCommand::Show { workflow }).output);
        assert_eq!(shown["data"]["workflow"]["is_active"], false);
        assert_eq!(shown["data"]["messages"].as_array().map(Vec::len), Some(1));
    });
}

#[test]
fn remind_run_due_with_nothing_due_is_ok() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&[("PAYSAGE_DATABASE_URL", &database_url(&dir))], || {
        remind::run(RemindCommand::Start { invoice: "F-2026-0043".to_string(), auto_send: true });

        let result = remind::run(RemindCommand::RunDue { limit: None });
        assert_eq!(result.exit_code, 0);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["data"]["scanned"], 0);
        assert_eq!(payload["message"], "0 due, 0 sent, 0 conflicted, 0 failed");
    });
}

#[test]
fn remind_unknown_workflow_is_not_found() {
    let dir = TempDir::new().expect("tempdir");
    with_env(&[("PAYSAGE_DATABASE_URL", &database_url(&dir))], || {
        let result = remind::run(RemindCommand::Show { workflow: "RW-missing".to_string() });
        assert_eq!(result.exit_code, 7);
        assert_eq!(parse_payload(&result.output)["error_class"], "not_found");
    });
}

fn decimal_field(value: &Value) -> Option<f64> {
    value.as_str().and_then(|raw| raw.parse().ok())
}

fn database_url(dir: &TempDir) -> String {
    format!("sqlite://{}", dir.path().join("paysage.db").display())
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "PAYSAGE_DATABASE_URL",
        "PAYSAGE_DATABASE_MAX_CONNECTIONS",
        "PAYSAGE_DATABASE_TIMEOUT_SECS",
        "PAYSAGE_SERVER_BIND_ADDRESS",
        "PAYSAGE_SERVER_PORT",
        "PAYSAGE_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "PAYSAGE_LOGGING_LEVEL",
        "PAYSAGE_LOGGING_FORMAT",
        "PAYSAGE_LOG_LEVEL",
        "PAYSAGE_LOG_FORMAT",
        "PAYSAGE_ASSISTANT_RULES_PATH",
        "PAYSAGE_REMINDERS_DEFAULT_CHANNEL",
        "PAYSAGE_REMINDERS_SCHEDULER_BATCH_SIZE",
        "PAYSAGE_REMINDERS_DEFAULT_STOP_REASON",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
