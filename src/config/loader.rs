// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Environment variable that supplies the account key.
pub const ACCOUNT_KEY_ENV_VAR: &str = "NIFTIBATCH_ACCOUNT_KEY";

/// Load a configuration file and return the raw `RawConfigFile`.
///
/// Only TOML deserialization; see [`load_and_validate`].
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    let config: RawConfigFile = toml::from_str(&contents)?;
    Ok(config)
}

/// Load, apply environment overrides and validate.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw = load_from_path(&path)?;
    validate_with_env(raw)
}

/// Like [`load_and_validate`], but a missing file at the default location
/// yields the built-in defaults.
pub fn load_or_default(path: Option<&Path>) -> Result<ConfigFile> {
    let raw = match path {
        Some(path) => load_from_path(path)?,
        None => {
            let default = default_config_path();
            if default.is_file() {
                load_from_path(&default)?
            } else {
                tracing::debug!(path = %default.display(), "no config file; using defaults");
                RawConfigFile::default()
            }
        }
    };
    validate_with_env(raw)
}

fn validate_with_env(mut raw: RawConfigFile) -> Result<ConfigFile> {
    apply_env_overrides(&mut raw, std::env::var(ACCOUNT_KEY_ENV_VAR).ok());
    ConfigFile::try_from(raw)
}

/// A non-empty `NIFTIBATCH_ACCOUNT_KEY` replaces `[auth].account_key`.
pub(crate) fn apply_env_overrides(raw: &mut RawConfigFile, account_key: Option<String>) {
    if let Some(key) = account_key.filter(|k| !k.is_empty()) {
        raw.auth.account_key = Some(key);
    }
}

/// `Niftibatch.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Niftibatch.toml")
}
