//! Structured error types for task resolution and execution.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Configuration errors (user-facing)
    MissingRequiredField,
    InvalidFieldValue,
    InvalidShape,
    TaskNotFound,
    DuplicateTask,
    ReferenceCycle,

    // Invariant violations (caller bugs)
    NotNormalized,

    // Execution errors
    TaskFailed,

    // Loading errors
    Io,
    Parse,

    // Internal errors
    InternalError,
}

/// Structured error for resolution and task invocation.
#[derive(Debug, Clone, Serialize, Error)]
#[error("{message}{}", details_suffix(.details))]
pub struct ChefError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ChefError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
            details: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// True for errors caused by the user's configuration rather than by
    /// a bug in the caller or a failing task.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self.code,
            ErrorCode::MissingRequiredField
                | ErrorCode::InvalidFieldValue
                | ErrorCode::InvalidShape
                | ErrorCode::TaskNotFound
                | ErrorCode::DuplicateTask
                | ErrorCode::ReferenceCycle
        )
    }

    // Convenience constructors

    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::MissingRequiredField,
            format!("{} is required", field),
        )
        .with_field(field)
    }

    pub fn invalid_value(field: &str, reason: &str) -> Self {
        Self::new(ErrorCode::InvalidFieldValue, reason).with_field(field)
    }

    pub fn invalid_shape(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidShape, reason)
    }

    pub fn task_not_found(name: &str) -> Self {
        Self::new(
            ErrorCode::TaskNotFound,
            format!("referring task not found: {}", name),
        )
        .with_field("task")
    }

    pub fn duplicate_task(display_name: &str) -> Self {
        Self::new(
            ErrorCode::DuplicateTask,
            format!("task already registered: {}", display_name),
        )
    }

    pub fn reference_cycle(chain: &[String]) -> Self {
        Self::new(
            ErrorCode::ReferenceCycle,
            format!("task reference cycle: {}", chain.join(" -> ")),
        )
        .with_field("task")
    }

    pub fn not_normalized(field: &str) -> Self {
        Self::new(
            ErrorCode::NotNormalized,
            format!("parent config {} not normalized", field),
        )
        .with_field(field)
    }

    pub fn task_failed(name: &str, reason: impl fmt::Display) -> Self {
        Self::new(ErrorCode::TaskFailed, format!("task {} failed", name))
            .with_details(reason.to_string())
    }

    pub fn io(path: &str, err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::Io, format!("cannot read {}", path)).with_details(err.to_string())
    }

    pub fn parse(path: &str, err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::Parse, format!("cannot parse {}", path))
            .with_details(err.to_string())
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InternalError, err.to_string())
    }
}

fn details_suffix(details: &Option<String>) -> String {
    details
        .as_ref()
        .map(|d| format!(": {}", d))
        .unwrap_or_default()
}

// Allow using ? with anyhow errors by converting them
impl From<anyhow::Error> for ChefError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ChefError>() {
            Ok(chef_err) => chef_err,
            Err(err) => ChefError::internal(err),
        }
    }
}

/// Result type for resolution and task operations.
pub type ChefResult<T> = std::result::Result<T, ChefError>;
