//! Configuration file loader.

use std::path::Path;

use super::error::{ConfigError, ConfigResult};
use super::types::RemoteComponentConfig;
use super::validation::{BasicValidator, Validator};

/// Configuration loader with validation support.
///
/// [`ConfigLoader::new`] runs the built-in [`BasicValidator`]; additional
/// validators can be stacked with [`ConfigLoader::with_validator`], and
/// [`ConfigLoader::unvalidated`] skips validation entirely.
#[derive(Debug)]
pub struct ConfigLoader {
    validators: Vec<Box<dyn Validator>>,
}

impl ConfigLoader {
    /// Creates a loader with the built-in semantic checks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            validators: vec![Box::new(BasicValidator::new())],
        }
    }

    /// Creates a loader that accepts any well-formed TOML.
    #[must_use]
    pub fn unvalidated() -> Self {
        Self {
            validators: Vec::new(),
        }
    }

    /// Stacks an additional validator.
    #[must_use]
    pub fn with_validator<V: Validator + 'static>(mut self, validator: V) -> Self {
        self.validators.push(Box::new(validator));
        self
    }

    /// Loads a configuration from a file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file does not exist, cannot be read, is
    /// malformed TOML, or fails validation.
    pub fn load<P: AsRef<Path>>(&self, path: P) -> ConfigResult<RemoteComponentConfig> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.load_str(&content)
    }

    /// Loads a configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed or validation fails.
    pub fn load_str(&self, content: &str) -> ConfigResult<RemoteComponentConfig> {
        let config: RemoteComponentConfig = toml::from_str(content)?;
        self.validate(&config)?;
        Ok(config)
    }

    /// Loads a configuration or returns the defaults if the file does not
    /// exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be loaded.
    pub fn load_or_default<P: AsRef<Path>>(&self, path: P) -> ConfigResult<RemoteComponentConfig> {
        let path = path.as_ref();
        if path.exists() {
            self.load(path)
        } else {
            Ok(RemoteComponentConfig::default())
        }
    }

    fn validate(&self, config: &RemoteComponentConfig) -> ConfigResult<()> {
        for validator in &self.validators {
            let result = validator.validate(config);
            if !result.is_valid() {
                let messages: Vec<String> = result
                    .errors()
                    .iter()
                    .map(|f| format!("{}: {}", f.field, f.message))
                    .collect();
                return Err(ConfigError::ValidationError(messages.join("; ")));
            }
        }
        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const VALID: &str = r#"
        name = "servo"
        halrcmd_uri = "tcp://10.0.0.1:5001"
        halrcomp_uri = "tcp://10.0.0.1:5002"
    "#;

    #[test]
    fn test_load_from_string() {
        let config = ConfigLoader::new().load_str(VALID).unwrap();
        assert_eq!(config.name, "servo");
        assert_eq!(config.halrcomp_uri, "tcp://10.0.0.1:5002");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("component.toml");
        std::fs::write(&config_path, VALID).unwrap();

        let config = ConfigLoader::new().load(&config_path).unwrap();
        assert_eq!(config.name, "servo");
    }

    #[test]
    fn test_load_nonexistent_file() {
        let result = ConfigLoader::new().load("/nonexistent/component.toml");
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_validation_failure_names_the_field() {
        let result = ConfigLoader::new().load_str("name = \"\"");
        let Err(ConfigError::ValidationError(message)) = result else {
            panic!("expected a validation error");
        };
        assert!(message.contains("name"));
    }

    #[test]
    fn test_unvalidated_loader_accepts_incomplete_config() {
        let config = ConfigLoader::unvalidated().load_str("name = \"bare\"").unwrap();
        assert_eq!(config.name, "bare");
        assert!(config.halrcmd_uri.is_empty());
    }

    #[test]
    fn test_load_or_default_without_file() {
        let config = ConfigLoader::new()
            .load_or_default("/nonexistent/component.toml")
            .unwrap();
        assert_eq!(config.name, "default");
    }
}
