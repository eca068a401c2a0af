//! Reading config files.

use std::io;
use std::path::Path;

use airmic_common::ConfigError;
use tracing::{info, warn};

use super::paths::{create_default_config, default_config_path, io_error};
use crate::schema::AirmicConfig;
use crate::validation;

/// Parse config text. Absent sections and fields take their defaults.
pub fn parse_config(content: &str) -> Result<AirmicConfig, ConfigError> {
    toml::from_str(content).map_err(|e| ConfigError::ParseError(format!("invalid TOML: {e}")))
}

/// Load the file at `path`.
///
/// Range problems are only logged here, so a hand-edited file with one bad
/// value still loads. [`crate::load_config`] is the strict entry point.
pub fn load_from_path(path: &Path) -> Result<AirmicConfig, ConfigError> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(ConfigError::FileNotFound(path.to_path_buf()))
        }
        Err(e) => return Err(io_error("read", path, e)),
    };

    let config = parse_config(&content)?;
    if let Err(e) = validation::validate(&config) {
        warn!(path = %path.display(), "Config has out-of-range values: {e}");
    }
    info!(path = %path.display(), "Loaded config");
    Ok(config)
}

/// Load `path`, writing the default template there first if it is missing.
pub fn load_or_create(path: &Path) -> Result<AirmicConfig, ConfigError> {
    match load_from_path(path) {
        Err(ConfigError::FileNotFound(_)) => {
            create_default_config(path)?;
            Ok(AirmicConfig::default())
        }
        other => other,
    }
}

/// [`load_or_create`] at the platform default location.
pub fn load_default() -> Result<AirmicConfig, ConfigError> {
    load_or_create(&default_config_path()?)
}
