//! Shared primitives for all Rust crates in Ephemera.

#![forbid(unsafe_code)]

/// Requester identity shared across services.
pub mod requester;

use thiserror::Error;

pub use requester::Requester;

/// Result type used across Ephemera crates.
pub type AppResult<T> = Result<T, AppError>;

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Inbound request failed signature or freshness verification.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Configuration is unavailable or malformed.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Requested target is not present in configuration.
    #[error("Target '{0}' not found in config.")]
    UnknownTarget(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Provisioning engine exited unsuccessfully.
    #[error("provisioning engine '{phase}' failed: {diagnostics}")]
    Engine {
        /// Engine phase that failed (`init`, `apply`, `output`, `destroy`).
        phase: String,
        /// Captured diagnostic output.
        diagnostics: String,
    },

    /// Apply succeeded but a required named output was absent.
    #[error("provisioning output '{0}' is missing")]
    MissingOutput(String),

    /// Teardown trigger could not be registered after a successful apply.
    #[error("teardown scheduling failed: {0}")]
    SchedulerRegistration(String),

    /// Chat message or attachment could not be delivered.
    #[error("chat delivery failed: {0}")]
    Delivery(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}
