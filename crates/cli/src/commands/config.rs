use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use offerdesk_core::config::{AppConfig, DEFAULT_CONFIG_FILE, NESTED_CONFIG_FILE};
use secrecy::ExposeSecret;
use toml::Value;

use super::{columns::default_profile_path, load_config, CommandResult, GlobalOptions};

/// Effective configuration, one line per key with the layer it came from.
pub fn run(options: &GlobalOptions) -> CommandResult {
    let config = match load_config("config", options) {
        Ok(config) => config,
        Err(result) => return result,
    };

    let file_path = options.config_path.clone().or_else(detect_config_path);
    let file_doc = load_config_file_doc(file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, file_doc.as_ref(), file_path.as_deref())
    };

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in entries(&config) {
        lines.push(render_line(entry.key, &entry.value, source(entry.key, entry.env_keys)));
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

struct Entry {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Entry {
    fn new(key: &'static str, value: String, env_keys: &'static [&'static str]) -> Self {
        Self { key, value, env_keys }
    }
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    let api_token = match &config.backend.api_token {
        Some(token) => redact_token(token.expose_secret()),
        None => "<unset>".to_string(),
    };
    let profile_path = config
        .profile
        .path
        .clone()
        .unwrap_or_else(|| default_profile_path(&config.profile.client_id));

    vec![
        Entry::new(
            "backend.base_url",
            config.backend.base_url.clone(),
            &["OFFERDESK_BACKEND_BASE_URL"],
        ),
        Entry::new("backend.api_token", api_token, &["OFFERDESK_BACKEND_API_TOKEN"]),
        Entry::new(
            "backend.timeout_secs",
            config.backend.timeout_secs.to_string(),
            &["OFFERDESK_BACKEND_TIMEOUT_SECS"],
        ),
        Entry::new(
            "polling.interval_secs",
            config.polling.interval_secs.to_string(),
            &["OFFERDESK_POLLING_INTERVAL_SECS"],
        ),
        Entry::new(
            "polling.enabled",
            config.polling.enabled.to_string(),
            &["OFFERDESK_POLLING_ENABLED"],
        ),
        Entry::new(
            "profile.client_id",
            config.profile.client_id.clone(),
            &["OFFERDESK_PROFILE_CLIENT_ID"],
        ),
        Entry::new(
            "profile.path",
            profile_path.display().to_string(),
            &["OFFERDESK_PROFILE_PATH"],
        ),
        Entry::new(
            "logging.level",
            config.logging.level.clone(),
            &["OFFERDESK_LOGGING_LEVEL", "OFFERDESK_LOG_LEVEL"],
        ),
        Entry::new(
            "logging.format",
            format!("{:?}", config.logging.format).to_ascii_lowercase(),
            &["OFFERDESK_LOGGING_FORMAT", "OFFERDESK_LOG_FORMAT"],
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [DEFAULT_CONFIG_FILE, NESTED_CONFIG_FILE]
        .into_iter()
        .map(PathBuf::from)
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    file_doc: Option<&Value>,
    file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if file_doc.is_some_and(|doc| contains_path(doc, key_path)) {
        let file_path = file_path
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "config file".to_string());
        return format!("file ({file_path})");
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    key_path.split('.').try_fold(root, |current, key| current.get(key)).is_some()
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

/// Keeps at most a short prefix so operators can tell tokens apart.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    match trimmed.split_once('-') {
        Some((prefix, _)) if prefix.len() <= 8 => format!("{prefix}-***"),
        _ => "<redacted>".to_string(),
    }
}
