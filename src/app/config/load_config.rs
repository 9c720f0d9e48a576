//! Loads `capdeploy.toml` and layers environment overrides on top.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::domain::config::{CONFIG_FILE_NAME, PASSWORD_ENV_VAR, URL_ENV_VAR};
use crate::domain::{AppError, Config};

/// Load configuration from `path`, else `./capdeploy.toml` when present, else defaults.
///
/// `CAPROVER_URL` and `CAPROVER_PASSWORD` are applied afterwards.
pub fn load_config(path: Option<&Path>) -> Result<Config, AppError> {
    let mut config = match config_path(path)? {
        Some(path) => {
            debug!(path = %path.display(), "loading configuration");
            let content = fs::read_to_string(&path).map_err(|e| {
                AppError::config_error(format!("Failed to read {}: {}", path.display(), e))
            })?;
            Config::parse_toml(&content)?
        }
        None => Config::default(),
    };

    apply_environment(
        &mut config,
        std::env::var(URL_ENV_VAR).ok(),
        std::env::var(PASSWORD_ENV_VAR).ok(),
    )?;
    Ok(config)
}

/// Override the controller URL and supply the password. Blank values are ignored.
pub fn apply_environment(
    config: &mut Config,
    url: Option<String>,
    password: Option<String>,
) -> Result<(), AppError> {
    if let Some(url) = url.filter(|value| !value.trim().is_empty()) {
        config.controller.url = Some(url);
    }
    if let Some(password) = password.filter(|value| !value.is_empty()) {
        config.controller.password = Some(password);
    }
    config.validate()
}

fn config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>, AppError> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(AppError::config_error(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        return Ok(Some(path.to_path_buf()));
    }
    let local = PathBuf::from(CONFIG_FILE_NAME);
    Ok(local.is_file().then_some(local))
}
