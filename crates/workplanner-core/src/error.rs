//! Error taxonomy shared by every WorkPlanner crate.

use serde::Serialize;

/// A single field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Errors produced by planner operations.
#[derive(Debug, thiserror::Error)]
pub enum PlannerError {
    /// Malformed or out-of-range input, detected before any mutation.
    #[error("validation failed: {}", summarize(.0))]
    Validation(Vec<FieldError>),

    /// Referenced record does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// Caller is authenticated but not allowed to do this.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Action not valid for the record's current lifecycle state.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Duplicate vote where multiple votes are disallowed.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Edit attempted on a locked schedule.
    #[error("locked: {0}")]
    Locked(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlannerError {
    /// Shorthand for a validation error on a single field.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation(vec![FieldError::new(field, message)])
    }

    /// Whether the error is caused by the caller (as opposed to the server).
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Storage(_) | Self::Config(_) | Self::Io(_))
    }
}

fn summarize(errors: &[FieldError]) -> String {
    errors
        .iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, PlannerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display_lists_fields() {
        let err = PlannerError::Validation(vec![
            FieldError::new("title", "too short"),
            FieldError::new("options", "need 2-10"),
        ]);
        assert_eq!(
            err.to_string(),
            "validation failed: title: too short; options: need 2-10"
        );
    }

    #[test]
    fn test_client_error_classification() {
        assert!(PlannerError::NotFound("Poll".into()).is_client_error());
        assert!(PlannerError::invalid("week", "bad").is_client_error());
        assert!(!PlannerError::Storage("disk".into()).is_client_error());
    }
}
