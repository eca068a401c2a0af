//! airmic configuration system.
//!
//! TOML-based configuration with validation. All config sections use
//! sensible defaults so partial configs work out of the box.
//!
//! ```rust,no_run
//! let config = airmic_config::load_config(None)?;
//! println!("control channel on port {}", config.server.ws_port);
//! # Ok::<(), airmic_common::ConfigError>(())
//! ```

pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use schema::{AirmicConfig, CONFIG_SCHEMA_VERSION};

use airmic_common::ConfigError;
use std::path::Path;

/// Load and validate config.
///
/// With an explicit path the file must exist. Without one, `config.toml` is
/// read from the OS config directory and a default is created if missing.
pub fn load_config(path: Option<&Path>) -> Result<AirmicConfig, ConfigError> {
    let config = match path {
        Some(path) => toml_loader::load_from_path(path)?,
        None => toml_loader::load_default()?,
    };

    validation::validate(&config)?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_config_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[room]\nmax_mics = 0\n").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn load_config_with_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nbase_url = \"mics.example.org\"\n").unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.server.public_base_url(), "https://mics.example.org");
    }

    #[test]
    fn load_config_missing_explicit_path() {
        let err = load_config(Some(Path::new("/tmp/airmic_does_not_exist.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
