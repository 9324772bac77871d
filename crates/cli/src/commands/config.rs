use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use paysage_core::config::{AppConfig, LoadOptions};
use toml::Value;

struct ConfigField {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<ConfigField> {
    let field = |key: &'static str, env_key: &'static str, value: String| ConfigField {
        key,
        env_key,
        value,
    };

    vec![
        field("database.url", "PAYSAGE_DATABASE_URL", config.database.url.clone()),
        field(
            "database.max_connections",
            "PAYSAGE_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        field(
            "database.timeout_secs",
            "PAYSAGE_DATABASE_TIMEOUT_SECS",
            config.database.timeout_secs.to_string(),
        ),
        field("server.bind_address", "PAYSAGE_SERVER_BIND_ADDRESS", config.server.bind_address.clone()),
        field("server.port", "PAYSAGE_SERVER_PORT", config.server.port.to_string()),
        field(
            "server.graceful_shutdown_secs",
            "PAYSAGE_SERVER_GRACEFUL_SHUTDOWN_SECS",
            config.server.graceful_shutdown_secs.to_string(),
        ),
        field("logging.level", "PAYSAGE_LOGGING_LEVEL", config.logging.level.clone()),
        field("logging.format", "PAYSAGE_LOGGING_FORMAT", format!("{:?}", config.logging.format)),
        field(
            "assistant.rules_path",
            "PAYSAGE_ASSISTANT_RULES_PATH",
            config
                .assistant
                .rules_path
                .as_ref()
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "<built-in>".to_string()),
        ),
        field(
            "reminders.default_channel",
            "PAYSAGE_REMINDERS_DEFAULT_CHANNEL",
            config.reminders.default_channel.as_str().to_string(),
        ),
        field(
            "reminders.scheduler_batch_size",
            "PAYSAGE_REMINDERS_SCHEDULER_BATCH_SIZE",
            config.reminders.scheduler_batch_size.to_string(),
        ),
        field(
            "reminders.default_stop_reason",
            "PAYSAGE_REMINDERS_DEFAULT_STOP_REASON",
            config.reminders.default_stop_reason.clone(),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("paysage.toml"), PathBuf::from("config/paysage.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}
