//! # Framework Errors
//!
//! This module defines the common error types used throughout the process
//! framework. Recoverable conditions surface here as `Result`s; contract
//! violations (duplicate handler registration, dispatch of an unhandled message
//! type, double task submission) panic instead, since they are programming
//! errors no caller can meaningfully handle.

/// Errors that can occur within the process framework itself.
#[derive(Debug, thiserror::Error)]
pub enum FrameworkError {
    #[error("Concurrency manager is shut down")]
    ManagerShutDown,
    #[error("Invalid process properties: {0}")]
    InvalidProperties(String),
    #[error("No worker thread available for process placement")]
    WorkerUnavailable,
}

pub type FrameworkResult<T> = Result<T, FrameworkError>;
