use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use agentpay_core::config::{AppConfig, LoadOptions, DEFAULT_CONFIG_FILE};
use secrecy::ExposeSecret;
use toml::Value;

use super::CommandResult;

struct Entry {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult { exit_code: 2, output: format!("config validation failed: {error}") }
        }
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in entries(&config) {
        let source = field_source(
            entry.key,
            entry.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(entry.key, &entry.value, source));
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    let entry = |key, env_key, value: String| Entry { key, env_key, value };
    vec![
        entry(
            "vendor.account_sid",
            "AGENTPAY_VENDOR_ACCOUNT_SID",
            redact_identifier(&config.vendor.account_sid),
        ),
        entry(
            "vendor.api_key",
            "AGENTPAY_VENDOR_API_KEY",
            redact_identifier(config.vendor.api_key.expose_secret()),
        ),
        entry(
            "vendor.api_secret",
            "AGENTPAY_VENDOR_API_SECRET",
            redact_secret(config.vendor.api_secret.expose_secret()),
        ),
        entry("vendor.base_url", "AGENTPAY_VENDOR_BASE_URL", config.vendor.base_url.clone()),
        entry(
            "vendor.timeout_secs",
            "AGENTPAY_VENDOR_TIMEOUT_SECS",
            config.vendor.timeout_secs.to_string(),
        ),
        entry("payment.token_type", "AGENTPAY_PAYMENT_TOKEN_TYPE", config.payment.token_type.clone()),
        entry("payment.currency", "AGENTPAY_PAYMENT_CURRENCY", config.payment.currency.clone()),
        entry(
            "payment.payment_connector",
            "AGENTPAY_PAYMENT_CONNECTOR",
            config.payment.payment_connector.clone(),
        ),
        entry(
            "payment.require_security_code",
            "AGENTPAY_PAYMENT_REQUIRE_SECURITY_CODE",
            config.payment.require_security_code.to_string(),
        ),
        entry(
            "payment.require_postal_code",
            "AGENTPAY_PAYMENT_REQUIRE_POSTAL_CODE",
            config.payment.require_postal_code.to_string(),
        ),
        entry(
            "callback.bind_address",
            "AGENTPAY_CALLBACK_BIND_ADDRESS",
            config.callback.bind_address.clone(),
        ),
        entry("callback.port", "AGENTPAY_CALLBACK_PORT", config.callback.port.to_string()),
        entry(
            "callback.public_url",
            "AGENTPAY_CALLBACK_PUBLIC_URL",
            config.callback.public_url.clone().unwrap_or_else(|| "<unset>".to_string()),
        ),
        entry(
            "session.idle_ttl_secs",
            "AGENTPAY_SESSION_IDLE_TTL_SECS",
            config.session.idle_ttl_secs.to_string(),
        ),
        entry(
            "session.sweep_interval_secs",
            "AGENTPAY_SESSION_SWEEP_INTERVAL_SECS",
            config.session.sweep_interval_secs.to_string(),
        ),
        entry("logging.level", "AGENTPAY_LOGGING_LEVEL", config.logging.level.clone()),
        entry("logging.format", "AGENTPAY_LOGGING_FORMAT", format!("{:?}", config.logging.format)),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from(DEFAULT_CONFIG_FILE);
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config").join(DEFAULT_CONFIG_FILE);
    if nested.exists() {
        return Some(nested);
    }

    None
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

/// Keeps the two-letter SID prefix (AC, SK) so operators can tell which kind
/// of credential is configured.
fn redact_identifier(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.get(..2) {
        Some(prefix) if trimmed.len() > 6 => format!("{prefix}***"),
        _ => "<redacted>".to_string(),
    }
}

fn redact_secret(value: &str) -> String {
    if value.trim().is_empty() {
        "<empty>".to_string()
    } else {
        "<redacted>".to_string()
    }
}
