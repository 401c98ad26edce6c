use std::env;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "agentpay.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub vendor: VendorConfig,
    pub payment: PaymentConfig,
    pub callback: CallbackConfig,
    pub session: SessionConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct VendorConfig {
    pub account_sid: String,
    pub api_key: SecretString,
    pub api_secret: SecretString,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PaymentConfig {
    pub token_type: String,
    pub currency: String,
    pub payment_connector: String,
    pub require_security_code: bool,
    pub require_postal_code: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackConfig {
    pub bind_address: String,
    pub port: u16,
    pub public_url: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub idle_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub account_sid: Option<String>,
    pub api_key: Option<String>,
    pub api_secret: Option<String>,
    pub callback_port: Option<u16>,
    pub public_url: Option<String>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            vendor: VendorConfig {
                account_sid: String::new(),
                api_key: String::new().into(),
                api_secret: String::new().into(),
                base_url: "https://api.twilio.com".to_string(),
                timeout_secs: 10,
            },
            payment: PaymentConfig {
                token_type: "reusable".to_string(),
                currency: "USD".to_string(),
                payment_connector: "Default".to_string(),
                require_security_code: true,
                require_postal_code: false,
            },
            callback: CallbackConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 4000,
                public_url: None,
            },
            session: SessionConfig { idle_ttl_secs: 3600, sweep_interval_secs: 60 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl VendorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl CallbackConfig {
    /// Externally reachable base URL for vendor callbacks. Falls back to the
    /// bound listener address when no public URL is configured.
    pub fn public_base_url(&self, bound: SocketAddr) -> String {
        match &self.public_url {
            Some(url) => url.trim().trim_end_matches('/').to_string(),
            None => format!("http://{bound}"),
        }
    }
}

impl SessionConfig {
    /// `None` disables idle-session eviction.
    pub fn idle_ttl(&self) -> Option<Duration> {
        (self.idle_ttl_secs > 0).then(|| Duration::from_secs(self.idle_ttl_secs))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(vendor) = patch.vendor {
            if let Some(account_sid) = vendor.account_sid {
                self.vendor.account_sid = account_sid;
            }
            if let Some(api_key_value) = vendor.api_key {
                self.vendor.api_key = secret_value(api_key_value);
            }
            if let Some(api_secret_value) = vendor.api_secret {
                self.vendor.api_secret = secret_value(api_secret_value);
            }
            if let Some(base_url) = vendor.base_url {
                self.vendor.base_url = base_url;
            }
            if let Some(timeout_secs) = vendor.timeout_secs {
                self.vendor.timeout_secs = timeout_secs;
            }
        }

        if let Some(payment) = patch.payment {
            if let Some(token_type) = payment.token_type {
                self.payment.token_type = token_type;
            }
            if let Some(currency) = payment.currency {
                self.payment.currency = currency;
            }
            if let Some(payment_connector) = payment.payment_connector {
                self.payment.payment_connector = payment_connector;
            }
            if let Some(require_security_code) = payment.require_security_code {
                self.payment.require_security_code = require_security_code;
            }
            if let Some(require_postal_code) = payment.require_postal_code {
                self.payment.require_postal_code = require_postal_code;
            }
        }

        if let Some(callback) = patch.callback {
            if let Some(bind_address) = callback.bind_address {
                self.callback.bind_address = bind_address;
            }
            if let Some(port) = callback.port {
                self.callback.port = port;
            }
            if let Some(public_url) = callback.public_url {
                self.callback.public_url = Some(public_url);
            }
        }

        if let Some(session) = patch.session {
            if let Some(idle_ttl_secs) = session.idle_ttl_secs {
                self.session.idle_ttl_secs = idle_ttl_secs;
            }
            if let Some(sweep_interval_secs) = session.sweep_interval_secs {
                self.session.sweep_interval_secs = sweep_interval_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("AGENTPAY_VENDOR_ACCOUNT_SID") {
            self.vendor.account_sid = value;
        }
        if let Some(value) = read_env("AGENTPAY_VENDOR_API_KEY") {
            self.vendor.api_key = secret_value(value);
        }
        if let Some(value) = read_env("AGENTPAY_VENDOR_API_SECRET") {
            self.vendor.api_secret = secret_value(value);
        }
        if let Some(value) = read_env("AGENTPAY_VENDOR_BASE_URL") {
            self.vendor.base_url = value;
        }
        if let Some(value) = read_env("AGENTPAY_VENDOR_TIMEOUT_SECS") {
            self.vendor.timeout_secs = parse_u64("AGENTPAY_VENDOR_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("AGENTPAY_PAYMENT_TOKEN_TYPE") {
            self.payment.token_type = value;
        }
        if let Some(value) = read_env("AGENTPAY_PAYMENT_CURRENCY") {
            self.payment.currency = value;
        }
        if let Some(value) = read_env("AGENTPAY_PAYMENT_CONNECTOR") {
            self.payment.payment_connector = value;
        }
        if let Some(value) = read_env("AGENTPAY_PAYMENT_REQUIRE_SECURITY_CODE") {
            self.payment.require_security_code =
                parse_bool("AGENTPAY_PAYMENT_REQUIRE_SECURITY_CODE", &value)?;
        }
        if let Some(value) = read_env("AGENTPAY_PAYMENT_REQUIRE_POSTAL_CODE") {
            self.payment.require_postal_code =
                parse_bool("AGENTPAY_PAYMENT_REQUIRE_POSTAL_CODE", &value)?;
        }

        if let Some(value) = read_env("AGENTPAY_CALLBACK_BIND_ADDRESS") {
            self.callback.bind_address = value;
        }
        if let Some(value) = read_env("AGENTPAY_CALLBACK_PORT") {
            self.callback.port = parse_u16("AGENTPAY_CALLBACK_PORT", &value)?;
        }
        if let Some(value) = read_env("AGENTPAY_CALLBACK_PUBLIC_URL") {
            self.callback.public_url = Some(value);
        }

        if let Some(value) = read_env("AGENTPAY_SESSION_IDLE_TTL_SECS") {
            self.session.idle_ttl_secs = parse_u64("AGENTPAY_SESSION_IDLE_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("AGENTPAY_SESSION_SWEEP_INTERVAL_SECS") {
            self.session.sweep_interval_secs =
                parse_u64("AGENTPAY_SESSION_SWEEP_INTERVAL_SECS", &value)?;
        }

        let log_level =
            read_env("AGENTPAY_LOGGING_LEVEL").or_else(|| read_env("AGENTPAY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("AGENTPAY_LOGGING_FORMAT").or_else(|| read_env("AGENTPAY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(account_sid) = overrides.account_sid {
            self.vendor.account_sid = account_sid;
        }
        if let Some(api_key) = overrides.api_key {
            self.vendor.api_key = secret_value(api_key);
        }
        if let Some(api_secret) = overrides.api_secret {
            self.vendor.api_secret = secret_value(api_secret);
        }
        if let Some(port) = overrides.callback_port {
            self.callback.port = port;
        }
        if let Some(public_url) = overrides.public_url {
            self.callback.public_url = Some(public_url);
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_vendor(&self.vendor)?;
        validate_payment(&self.payment)?;
        validate_callback(&self.callback)?;
        validate_session(&self.session)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from("config").join(DEFAULT_CONFIG_FILE)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_vendor(vendor: &VendorConfig) -> Result<(), ConfigError> {
    let account_sid = vendor.account_sid.trim();
    if account_sid.is_empty() {
        return Err(ConfigError::Validation(
            "vendor.account_sid is required. Pass it as the first argument or set AGENTPAY_VENDOR_ACCOUNT_SID".to_string(),
        ));
    }
    if !account_sid.starts_with("AC") {
        return Err(ConfigError::Validation(
            "vendor.account_sid must start with `AC` (find it on the account dashboard)".to_string(),
        ));
    }

    if vendor.api_key.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "vendor.api_key is required. Pass it as the second argument or set AGENTPAY_VENDOR_API_KEY".to_string(),
        ));
    }
    if vendor.api_secret.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation(
            "vendor.api_secret is required. Pass it as the third argument or set AGENTPAY_VENDOR_API_SECRET".to_string(),
        ));
    }

    if !is_http_url(&vendor.base_url) {
        return Err(ConfigError::Validation(
            "vendor.base_url must start with http:// or https://".to_string(),
        ));
    }

    if vendor.timeout_secs == 0 || vendor.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "vendor.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_payment(payment: &PaymentConfig) -> Result<(), ConfigError> {
    match payment.token_type.trim() {
        "reusable" | "one-time" => {}
        other => {
            return Err(ConfigError::Validation(format!(
                "payment.token_type `{other}` is not supported (expected reusable|one-time)"
            )))
        }
    }

    let currency = payment.currency.trim();
    if currency.len() != 3 || !currency.chars().all(|ch| ch.is_ascii_alphabetic()) {
        return Err(ConfigError::Validation(
            "payment.currency must be a three letter ISO 4217 code".to_string(),
        ));
    }

    if payment.payment_connector.trim().is_empty() {
        return Err(ConfigError::Validation(
            "payment.payment_connector must name the connector configured with the vendor"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_callback(callback: &CallbackConfig) -> Result<(), ConfigError> {
    if callback.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation(
            "callback.bind_address must not be empty".to_string(),
        ));
    }

    if let Some(public_url) = &callback.public_url {
        if !is_http_url(public_url) {
            return Err(ConfigError::Validation(
                "callback.public_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_session(session: &SessionConfig) -> Result<(), ConfigError> {
    if session.idle_ttl_secs > 0 && session.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "session.sweep_interval_secs must be greater than zero when idle_ttl_secs is set"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(value: &str) -> bool {
    let value = value.trim();
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    vendor: Option<VendorPatch>,
    payment: Option<PaymentPatch>,
    callback: Option<CallbackPatch>,
    session: Option<SessionPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct VendorPatch {
    account_sid: Option<String>,
    api_key: Option<String>,
    api_secret: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PaymentPatch {
    token_type: Option<String>,
    currency: Option<String>,
    payment_connector: Option<String>,
    require_security_code: Option<bool>,
    require_postal_code: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct CallbackPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    public_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionPatch {
    idle_ttl_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::net::SocketAddr;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const CREDENTIAL_VARS: [&str; 3] =
        ["AGENTPAY_VENDOR_ACCOUNT_SID", "AGENTPAY_VENDOR_API_KEY", "AGENTPAY_VENDOR_API_SECRET"];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn set_credentials(account_sid: &str) {
        env::set_var("AGENTPAY_VENDOR_ACCOUNT_SID", account_sid);
        env::set_var("AGENTPAY_VENDOR_API_KEY", "SK-env-key");
        env::set_var("AGENTPAY_VENDOR_API_SECRET", "env-secret-value");
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_AGENTPAY_API_KEY", "SK-from-env");
        env::set_var("TEST_AGENTPAY_API_SECRET", "secret-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("agentpay.toml");
            fs::write(
                &path,
                r#"
[vendor]
account_sid = "AC123"
api_key = "${TEST_AGENTPAY_API_KEY}"
api_secret = "${TEST_AGENTPAY_API_SECRET}"

[payment]
currency = "EUR"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.vendor.api_key.expose_secret() == "SK-from-env",
                "api key should be interpolated from environment",
            )?;
            ensure(
                config.vendor.api_secret.expose_secret() == "secret-from-env",
                "api secret should be interpolated from environment",
            )?;
            ensure(config.payment.currency == "EUR", "currency should come from the file")?;
            ensure(config.payment.token_type == "reusable", "token type should keep its default")?;
            Ok(())
        })();

        clear_vars(&["TEST_AGENTPAY_API_KEY", "TEST_AGENTPAY_API_SECRET"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("agentpay.toml");
        fs::write(&path, "[vendor]\napi_key = \"${AGENTPAY_TEST_UNSET_VARIABLE}\"\n")
            .map_err(|err| err.to_string())?;

        let outcome = AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() });
        ensure(
            matches!(
                outcome,
                Err(ConfigError::MissingEnvInterpolation { ref var }) if var == "AGENTPAY_TEST_UNSET_VARIABLE"
            ),
            "missing interpolation variable should be named in the error",
        )
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_credentials("AC-env");
        env::set_var("AGENTPAY_LOG_LEVEL", "warn");
        env::set_var("AGENTPAY_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "json logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&CREDENTIAL_VARS);
        clear_vars(&["AGENTPAY_LOG_LEVEL", "AGENTPAY_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_credentials("AC-from-env");
        env::set_var("AGENTPAY_CALLBACK_PORT", "4100");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("agentpay.toml");
            fs::write(
                &path,
                r#"
[vendor]
account_sid = "AC-from-file"
timeout_secs = 20

[callback]
port = 4200
public_url = "https://file.example.test"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    account_sid: Some("AC-from-override".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.vendor.account_sid == "AC-from-override",
                "override account sid should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.callback.port == 4100, "env port should win over the file")?;
            ensure(config.vendor.timeout_secs == 20, "file timeout should win over default")?;
            ensure(
                config.callback.public_url.as_deref() == Some("https://file.example.test"),
                "file public url should be kept",
            )?;
            Ok(())
        })();

        clear_vars(&CREDENTIAL_VARS);
        clear_vars(&["AGENTPAY_CALLBACK_PORT"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_credentials("not-an-account");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("vendor.account_sid")
            );
            ensure(has_message, "validation failure should mention vendor.account_sid")
        })();

        clear_vars(&CREDENTIAL_VARS);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_credentials("AC1");
        env::set_var("AGENTPAY_SESSION_IDLE_TTL_SECS", "soon");

        let outcome = AppConfig::load(LoadOptions::default());

        clear_vars(&CREDENTIAL_VARS);
        clear_vars(&["AGENTPAY_SESSION_IDLE_TTL_SECS"]);
        ensure(
            matches!(
                outcome,
                Err(ConfigError::InvalidEnvOverride { ref key, .. }) if key == "AGENTPAY_SESSION_IDLE_TTL_SECS"
            ),
            "non-numeric ttl should be rejected",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        set_credentials("AC1");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("SK-env-key"), "debug output should not contain api key")?;
            ensure(
                !debug.contains("env-secret-value"),
                "debug output should not contain api secret",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&CREDENTIAL_VARS);
        result
    }

    #[test]
    fn public_base_url_falls_back_to_bound_address() {
        let mut config = AppConfig::default();
        let bound: SocketAddr = "127.0.0.1:4321".parse().expect("socket address");

        assert_eq!(config.callback.public_base_url(bound), "http://127.0.0.1:4321");

        config.callback.public_url = Some("https://pay.example.test/".to_string());
        assert_eq!(config.callback.public_base_url(bound), "https://pay.example.test");
        assert_eq!(config.session.idle_ttl().map(|ttl| ttl.as_secs()), Some(3600));
    }
}
