//! Configuration validation.

use super::types::RemoteComponentConfig;

/// A single validation finding.
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// The field path that failed validation.
    pub field: String,
    /// Error message.
    pub message: String,
    /// Severity level.
    pub severity: ValidationSeverity,
}

impl ValidationError {
    /// Creates a new error.
    pub fn error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Error,
        }
    }

    /// Creates a new warning.
    pub fn warning(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            severity: ValidationSeverity::Warning,
        }
    }
}

/// Severity of validation findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationSeverity {
    /// Error - configuration is invalid.
    Error,
    /// Warning - configuration may have issues.
    Warning,
}

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    findings: Vec<ValidationError>,
}

impl ValidationResult {
    /// Creates a new empty (valid) result.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a finding to the result.
    pub fn add(&mut self, finding: ValidationError) {
        self.findings.push(finding);
    }

    /// Checks if the validation passed (no error-severity findings).
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !self
            .findings
            .iter()
            .any(|f| f.severity == ValidationSeverity::Error)
    }

    /// All findings, errors and warnings alike.
    #[must_use]
    pub fn findings(&self) -> &[ValidationError] {
        &self.findings
    }

    /// Only error-severity findings.
    #[must_use]
    pub fn errors(&self) -> Vec<&ValidationError> {
        self.findings
            .iter()
            .filter(|f| f.severity == ValidationSeverity::Error)
            .collect()
    }
}

/// Trait for configuration validators.
pub trait Validator: std::fmt::Debug {
    /// Validates a configuration and returns any findings.
    fn validate(&self, config: &RemoteComponentConfig) -> ValidationResult;
}

/// Built-in validator for basic configuration checks.
#[derive(Debug, Default)]
pub struct BasicValidator;

/// URI schemes the message-queue library accepts.
const KNOWN_SCHEMES: &[&str] = &["tcp", "ipc", "inproc", "pgm", "epgm"];

impl BasicValidator {
    /// Creates a new basic validator.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    fn check_uri(result: &mut ValidationResult, field: &str, uri: &str) {
        if uri.is_empty() {
            result.add(ValidationError::error(field, "URI cannot be empty"));
            return;
        }
        let Some((scheme, rest)) = uri.split_once("://") else {
            result.add(ValidationError::error(
                field,
                format!("'{uri}' is missing a scheme"),
            ));
            return;
        };
        if !KNOWN_SCHEMES.contains(&scheme) {
            result.add(ValidationError::error(
                field,
                format!("unknown scheme '{scheme}'"),
            ));
        }
        if rest.is_empty() {
            result.add(ValidationError::error(
                field,
                format!("'{uri}' has no endpoint address"),
            ));
        }
    }
}

impl Validator for BasicValidator {
    fn validate(&self, config: &RemoteComponentConfig) -> ValidationResult {
        let mut result = ValidationResult::new();

        if config.name.is_empty() {
            result.add(ValidationError::error(
                "name",
                "Component name cannot be empty",
            ));
        }

        Self::check_uri(&mut result, "halrcmd_uri", &config.halrcmd_uri);
        Self::check_uri(&mut result, "halrcomp_uri", &config.halrcomp_uri);

        if config.heartbeat_period_ms > 0 && config.heartbeat_period_ms < 100 {
            result.add(ValidationError::warning(
                "heartbeat_period_ms",
                "Periods under 100 ms flood the command channel with pings",
            ));
        }

        result
    }
}
