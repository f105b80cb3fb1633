//! # AppError
//!
//! Centralized error handling for the Interludes backend.
//! Maps domain-specific failures to actionable error types.

use thiserror::Error;

/// The primary error type for all il-core operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// Resource not found (e.g., Activity, Slot, User)
    #[error("{0} not found with ID {1}")]
    NotFound(String, String),

    /// Validation failure (e.g., duplicate priority in a ranked submission)
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Security/Auth failure (e.g., rejected CAS login, bad admin credentials)
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Infrastructure failure (e.g., DB down, CAS server unreachable)
    #[error("internal service error: {0}")]
    Internal(String),

    /// Resource already exists (e.g., duplicate user email)
    #[error("conflict: {0}")]
    Conflict(String),
}

/// A specialized Result type for Interludes logic.
pub type Result<T> = std::result::Result<T, AppError>;
