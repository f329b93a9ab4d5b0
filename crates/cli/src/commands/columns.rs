use std::path::PathBuf;

use offerdesk_core::columns::{ColumnConfig, ColumnKey, ColumnProjection, ProfileStore};
use offerdesk_core::config::AppConfig;
use serde::Serialize;
use tracing::info;

use super::{load_config, CommandResult, GlobalOptions, EXIT_CONFIG, EXIT_REJECTED};

/// Where a client's column profile lives when `profile.path` is not configured.
pub fn default_profile_path(client_id: &str) -> PathBuf {
    PathBuf::from("config").join("profiles").join(format!("{client_id}.toml"))
}

pub(crate) fn profile_store(config: &AppConfig) -> ProfileStore {
    let path = config
        .profile
        .path
        .clone()
        .unwrap_or_else(|| default_profile_path(&config.profile.client_id));
    ProfileStore::new(path)
}

pub(crate) fn load_projection(
    command: &str,
    config: &AppConfig,
) -> Result<(ProfileStore, ColumnProjection), CommandResult> {
    let store = profile_store(config);
    let profile = store.load_or_default(&config.profile.client_id).map_err(|error| {
        CommandResult::failure(command, "profile", error.to_string(), EXIT_CONFIG)
    })?;
    Ok((store, ColumnProjection::new(profile)))
}

#[derive(Debug, Serialize)]
struct ColumnsReport {
    client_id: String,
    profile_path: String,
    saved: bool,
    columns: Vec<ColumnConfig>,
}

/// Shows the client's columns, flipping visibility of each `toggle` key first.
///
/// The profile is written back only when at least one toggle took effect.
pub fn run(options: &GlobalOptions, toggles: &[String]) -> CommandResult {
    let command = "columns";
    let config = match load_config(command, options) {
        Ok(config) => config,
        Err(result) => return result,
    };
    let (store, mut projection) = match load_projection(command, &config) {
        Ok(loaded) => loaded,
        Err(result) => return result,
    };

    let mut changed = false;
    for raw in toggles {
        let key = match raw.parse::<ColumnKey>() {
            Ok(key) => key,
            Err(error) => {
                return CommandResult::failure(
                    command,
                    "validation",
                    error.to_string(),
                    EXIT_REJECTED,
                )
            }
        };
        if projection.toggle_visibility(key) {
            changed = true;
        } else {
            info!(
                event_name = "review.columns.required",
                column = key.as_str(),
                "required column cannot be hidden"
            );
        }
    }

    if changed {
        if let Err(error) = store.save(projection.profile()) {
            return CommandResult::failure(command, "profile", error.to_string(), EXIT_CONFIG);
        }
    }

    let report = ColumnsReport {
        client_id: projection.profile().client_id.clone(),
        profile_path: store.path().display().to_string(),
        saved: changed,
        columns: projection.columns().to_vec(),
    };
    let message = format!("visible columns: {}", projection.header().join(", "));
    CommandResult::success_with(command, message, Some(report))
}
