//! Where the config file lives, and writing the commented default.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use airmic_common::ConfigError;
use tracing::info;

use super::template::default_config_toml;

const APP_DIR: &str = "airmic";
const FILE_NAME: &str = "config.toml";

/// `<config dir>/airmic/config.toml`, e.g. `~/.config/airmic/config.toml`
/// on Linux.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| config_path_in(&dir))
        .ok_or_else(|| ConfigError::ParseError("no platform config directory".into()))
}

pub(crate) fn config_path_in(base: &Path) -> PathBuf {
    base.join(APP_DIR).join(FILE_NAME)
}

/// Write the default template to `path`, creating parent directories.
///
/// An existing file is never overwritten: this returns `Ok(false)` and
/// leaves it alone.
pub fn create_default_config(path: &Path) -> Result<bool, ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| io_error("create", parent, e))?;
    }

    let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => return Ok(false),
        Err(e) => return Err(io_error("create", path, e)),
    };
    file.write_all(default_config_toml().as_bytes())
        .map_err(|e| io_error("write", path, e))?;

    info!(path = %path.display(), "Wrote default config");
    Ok(true)
}

pub(crate) fn io_error(action: &str, path: &Path, e: io::Error) -> ConfigError {
    ConfigError::ParseError(format!("failed to {action} {}: {e}", path.display()))
}
