//! Full configuration validation.
//!
//! Each section has its own validator; this orchestrator calls them all
//! and collects errors into a single `ConfigError`.

mod helpers;
mod sections;


use crate::schema::AirmicConfig;
use airmic_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &AirmicConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    sections::validate_server(&mut errors, config);
    sections::validate_room(&mut errors, config);
    sections::validate_qr(&mut errors, config);
    sections::validate_audio(&mut errors, config);
    sections::validate_gate(&mut errors, config);
    sections::validate_ducking(&mut errors, config);
    sections::validate_endpoint(&mut errors, config);
    sections::validate_logging(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}
