//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check TLS material is present and readable when secure is enabled
//! - Validate value ranges (timeouts > 0)
//!
//! # Design Decisions
//! - Returns all validation errors, not just the first
//! - Validation is a pure function: NodeConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::path::Path;

use crate::config::schema::NodeConfig;

/// A single semantic validation failure.
#[derive(Debug)]
pub enum ValidationError {
    /// secure = true but the named TLS setting is missing.
    MissingTlsMaterial(&'static str),
    /// A configured file path does not exist.
    FileNotFound(String),
    /// The named timeout must be greater than zero.
    ZeroTimeout(&'static str),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::MissingTlsMaterial(field) => {
                write!(f, "listener.secure is set but listener.{} is not", field)
            }
            ValidationError::FileNotFound(path) => write!(f, "file not found: {}", path),
            ValidationError::ZeroTimeout(field) => {
                write!(f, "listener.{} must be greater than zero", field)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Validate a loaded configuration, accumulating all failures.
pub fn validate_config(config: &NodeConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.secure {
        check_tls_path(&config.listener.cert_path, "cert_path", &mut errors);
        check_tls_path(&config.listener.key_path, "key_path", &mut errors);
    }
    if config.listener.handshake_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("handshake_timeout_secs"));
    }
    if config.listener.close_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("close_timeout_secs"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_tls_path(
    path: &Option<String>,
    field: &'static str,
    errors: &mut Vec<ValidationError>,
) {
    match path {
        Some(path) if !Path::new(path).exists() => {
            errors.push(ValidationError::FileNotFound(path.clone()));
        }
        Some(_) => {}
        None => errors.push(ValidationError::MissingTlsMaterial(field)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&NodeConfig::default()).is_ok());
    }

    #[test]
    fn secure_without_material_is_rejected() {
        let mut config = NodeConfig::default();
        config.listener.secure = true;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn missing_files_are_reported() {
        let mut config = NodeConfig::default();
        config.listener.secure = true;
        config.listener.cert_path = Some("/does/not/exist.pem".to_string());
        config.listener.key_path = Some("tests/certs/key.pem".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(matches!(errors[0], ValidationError::FileNotFound(_)));
    }

    #[test]
    fn zero_timeouts_are_rejected() {
        let mut config = NodeConfig::default();
        config.listener.handshake_timeout_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::ZeroTimeout(_)));
    }
}
