use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "offerdesk.toml";
pub const NESTED_CONFIG_FILE: &str = "config/offerdesk.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub backend: BackendConfig,
    pub polling: PollingConfig,
    pub profile: ProfileConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct BackendConfig {
    pub base_url: String,
    pub api_token: Option<SecretString>,
    pub timeout_secs: u64,
}

impl BackendConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Debug)]
pub struct PollingConfig {
    pub interval_secs: u64,
    pub enabled: bool,
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[derive(Clone, Debug)]
pub struct ProfileConfig {
    pub client_id: String,
    /// Column profile document; the baseline columns are used when unset or missing.
    pub path: Option<PathBuf>,
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
    pub base_url: Option<String>,
    pub api_token: Option<String>,
    pub timeout_secs: Option<u64>,
    pub poll_interval_secs: Option<u64>,
    pub client_id: Option<String>,
    pub profile_path: Option<PathBuf>,
    pub log_level: Option<String>,
    pub log_format: Option<LogFormat>,
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
            backend: BackendConfig {
                base_url: "http://localhost:8000/api".to_string(),
                api_token: None,
                timeout_secs: 30,
            },
            polling: PollingConfig { interval_secs: 5, enabled: true },
            profile: ProfileConfig { client_id: "default".to_string(), path: None },
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
        if let Some(backend) = patch.backend {
            if let Some(base_url) = backend.base_url {
                self.backend.base_url = base_url;
            }
            if let Some(api_token_value) = backend.api_token {
                self.backend.api_token = Some(secret_value(api_token_value));
            }
            if let Some(timeout_secs) = backend.timeout_secs {
                self.backend.timeout_secs = timeout_secs;
            }
        }

        if let Some(polling) = patch.polling {
            if let Some(interval_secs) = polling.interval_secs {
                self.polling.interval_secs = interval_secs;
            }
            if let Some(enabled) = polling.enabled {
                self.polling.enabled = enabled;
            }
        }

        if let Some(profile) = patch.profile {
            if let Some(client_id) = profile.client_id {
                self.profile.client_id = client_id;
            }
            if let Some(path) = profile.path {
                self.profile.path = Some(path);
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
        if let Some(value) = read_env("OFFERDESK_BACKEND_BASE_URL") {
            self.backend.base_url = value;
        }
        if let Some(value) = read_env("OFFERDESK_BACKEND_API_TOKEN") {
            self.backend.api_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("OFFERDESK_BACKEND_TIMEOUT_SECS") {
            self.backend.timeout_secs = parse_u64("OFFERDESK_BACKEND_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("OFFERDESK_POLLING_INTERVAL_SECS") {
            self.polling.interval_secs = parse_u64("OFFERDESK_POLLING_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("OFFERDESK_POLLING_ENABLED") {
            self.polling.enabled = parse_bool("OFFERDESK_POLLING_ENABLED", &value)?;
        }

        if let Some(value) = read_env("OFFERDESK_PROFILE_CLIENT_ID") {
            self.profile.client_id = value;
        }
        if let Some(value) = read_env("OFFERDESK_PROFILE_PATH") {
            self.profile.path = Some(PathBuf::from(value));
        }

        let log_level =
            read_env("OFFERDESK_LOGGING_LEVEL").or_else(|| read_env("OFFERDESK_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("OFFERDESK_LOGGING_FORMAT").or_else(|| read_env("OFFERDESK_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(base_url) = overrides.base_url {
            self.backend.base_url = base_url;
        }
        if let Some(api_token) = overrides.api_token {
            self.backend.api_token = Some(secret_value(api_token));
        }
        if let Some(timeout_secs) = overrides.timeout_secs {
            self.backend.timeout_secs = timeout_secs;
        }
        if let Some(poll_interval_secs) = overrides.poll_interval_secs {
            self.polling.interval_secs = poll_interval_secs;
        }
        if let Some(client_id) = overrides.client_id {
            self.profile.client_id = client_id;
        }
        if let Some(profile_path) = overrides.profile_path {
            self.profile.path = Some(profile_path);
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(log_format) = overrides.log_format {
            self.logging.format = log_format;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_backend(&self.backend)?;
        validate_polling(&self.polling)?;
        validate_profile(&self.profile)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(DEFAULT_CONFIG_FILE), PathBuf::from(NESTED_CONFIG_FILE)]
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

fn validate_backend(backend: &BackendConfig) -> Result<(), ConfigError> {
    let base_url = backend.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "backend.base_url must start with http:// or https://".to_string(),
        ));
    }

    if backend.timeout_secs == 0 || backend.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "backend.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if let Some(token) = &backend.api_token {
        if token.expose_secret().trim().is_empty() {
            return Err(ConfigError::Validation(
                "backend.api_token must not be blank when set".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_polling(polling: &PollingConfig) -> Result<(), ConfigError> {
    if polling.interval_secs == 0 || polling.interval_secs > 3600 {
        return Err(ConfigError::Validation(
            "polling.interval_secs must be in range 1..=3600".to_string(),
        ));
    }
    Ok(())
}

fn validate_profile(profile: &ProfileConfig) -> Result<(), ConfigError> {
    if profile.client_id.trim().is_empty() {
        return Err(ConfigError::Validation("profile.client_id must not be empty".to_string()));
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

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.trim().parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    backend: Option<BackendPatch>,
    polling: Option<PollingPatch>,
    profile: Option<ProfilePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct BackendPatch {
    base_url: Option<String>,
    api_token: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct PollingPatch {
    interval_secs: Option<u64>,
    enabled: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
struct ProfilePatch {
    client_id: Option<String>,
    path: Option<PathBuf>,
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
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const ALL_VARS: &[&str] = &[
        "OFFERDESK_BACKEND_BASE_URL",
        "OFFERDESK_BACKEND_API_TOKEN",
        "OFFERDESK_BACKEND_TIMEOUT_SECS",
        "OFFERDESK_POLLING_INTERVAL_SECS",
        "OFFERDESK_POLLING_ENABLED",
        "OFFERDESK_PROFILE_CLIENT_ID",
        "OFFERDESK_PROFILE_PATH",
        "OFFERDESK_LOGGING_LEVEL",
        "OFFERDESK_LOGGING_FORMAT",
        "OFFERDESK_LOG_LEVEL",
        "OFFERDESK_LOG_FORMAT",
    ];

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_validate_without_file_or_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.backend.api_token.is_none(), "token should be unset by default")?;
        ensure(config.polling.interval() == Duration::from_secs(5), "default interval is 5s")?;
        ensure(config.polling.enabled, "polling should be enabled by default")?;
        ensure(config.profile.client_id == "default", "default client id")?;
        ensure(matches!(config.logging.format, LogFormat::Compact), "compact logs by default")
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);

        env::set_var("TEST_OFFERDESK_TOKEN", "tok-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("offerdesk.toml");
            fs::write(
                &path,
                r#"
[backend]
base_url = "https://offers.example.com/api"
api_token = "${TEST_OFFERDESK_TOKEN}"

[profile]
client_id = "kessler"
path = "profiles/kessler.toml"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.backend.api_token.as_ref().map(|token| token.expose_secret())
                    == Some("tok-from-env"),
                "api token should be interpolated from the environment",
            )?;
            ensure(config.profile.client_id == "kessler", "client id should come from file")?;
            ensure(
                config.profile.path.as_deref().map(|path| path.ends_with("kessler.toml"))
                    == Some(true),
                "profile path should come from file",
            )
        })();

        clear_vars(&["TEST_OFFERDESK_TOKEN"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);
        env::remove_var("TEST_OFFERDESK_MISSING");

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("offerdesk.toml");
        fs::write(&path, "[backend]\napi_token = \"${TEST_OFFERDESK_MISSING}\"\n")
            .map_err(|err| err.to_string())?;

        let error = match AppConfig::load(LoadOptions {
            config_path: Some(path),
            ..LoadOptions::default()
        }) {
            Ok(_) => return Err("expected interpolation failure".to_string()),
            Err(error) => error,
        };
        ensure(
            matches!(error, ConfigError::MissingEnvInterpolation { ref var } if var == "TEST_OFFERDESK_MISSING"),
            "error should name the missing variable",
        )
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);

        env::set_var("OFFERDESK_BACKEND_BASE_URL", "https://from-env.example.com");
        env::set_var("OFFERDESK_POLLING_INTERVAL_SECS", "15");
        env::set_var("OFFERDESK_LOG_FORMAT", "json");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("offerdesk.toml");
            fs::write(
                &path,
                r#"
[backend]
base_url = "https://from-file.example.com"
timeout_secs = 12

[polling]
interval_secs = 30

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    poll_interval_secs: Some(2),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.backend.base_url == "https://from-env.example.com",
                "env base url should win over file",
            )?;
            ensure(config.backend.timeout_secs == 12, "file timeout should win over default")?;
            ensure(config.polling.interval_secs == 2, "override interval should win over env")?;
            ensure(config.logging.level == "debug", "override log level should win")?;
            ensure(
                matches!(config.logging.format, LogFormat::Json),
                "log format alias should be read from env",
            )
        })();

        clear_vars(ALL_VARS);
        result
    }

    #[test]
    fn invalid_env_values_fail_fast() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);

        env::set_var("OFFERDESK_POLLING_ENABLED", "sometimes");
        let enabled_error = AppConfig::load(LoadOptions::default()).err();
        clear_vars(ALL_VARS);

        env::set_var("OFFERDESK_BACKEND_BASE_URL", "ftp://offers.example.com");
        let url_error = AppConfig::load(LoadOptions::default()).err();
        clear_vars(ALL_VARS);

        ensure(
            matches!(enabled_error, Some(ConfigError::InvalidEnvOverride { ref key, .. }) if key == "OFFERDESK_POLLING_ENABLED"),
            "non-boolean polling flag should be rejected",
        )?;
        ensure(
            matches!(url_error, Some(ConfigError::Validation(ref message)) if message.contains("backend.base_url")),
            "validation failure should mention backend.base_url",
        )
    }

    #[test]
    fn required_file_must_exist() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let missing = dir.path().join("absent.toml");
        let error = AppConfig::load(LoadOptions {
            config_path: Some(missing.clone()),
            require_file: true,
            ..LoadOptions::default()
        })
        .err();

        ensure(
            matches!(error, Some(ConfigError::MissingConfigFile(ref path)) if path == &missing),
            "missing required file should be reported with its path",
        )
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;
        clear_vars(ALL_VARS);

        env::set_var("OFFERDESK_BACKEND_API_TOKEN", "tok-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("tok-secret-value"), "debug output should not contain token")
        })();

        clear_vars(ALL_VARS);
        result
    }
}
