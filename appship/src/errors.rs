//! Error types for appship

use config_eval::{FieldError, TemplateError};
use thiserror::Error;

/// Main error type for appship
#[derive(Error, Debug)]
pub enum ReleaseError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Template error: {0}")]
    TemplateError(#[from] TemplateError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Validation failed for {context}: {}", field_errors_to_string(.errors))]
    ValidationError {
        context: String,
        errors: Vec<FieldError>,
    },

    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("Install error: {0}")]
    InstallError(String),

    #[error("Build error: {0}")]
    BuildError(String),

    #[error("Artifact error: {0}")]
    ArtifactError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReleaseError {
    /// Whether this error is a setup fault (raised before any pair starts)
    pub fn is_setup_fault(&self) -> bool {
        matches!(
            self,
            ReleaseError::ConfigError(_)
                | ReleaseError::ValidationError { .. }
                | ReleaseError::UnknownPlatform(_)
        )
    }

    /// Wrap an error with the file or step it happened in
    pub fn install(context: impl std::fmt::Display, cause: impl std::fmt::Display) -> Self {
        ReleaseError::InstallError(format!("{}: {}", context, cause))
    }
}

/// Render field errors as a single line
pub fn field_errors_to_string(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_lists_every_field() {
        let err = ReleaseError::ValidationError {
            context: "project settings".to_string(),
            errors: vec![
                FieldError {
                    path: "project.solutionPath".to_string(),
                    message: "field is required".to_string(),
                },
                FieldError {
                    path: "project.outputPath".to_string(),
                    message: "expected string but found number".to_string(),
                },
            ],
        };

        assert_eq!(
            err.to_string(),
            "Validation failed for project settings: project.solutionPath: field is required; \
             project.outputPath: expected string but found number"
        );
        assert!(err.is_setup_fault());
        assert!(!ReleaseError::BuildError("x".into()).is_setup_fault());
    }
}
