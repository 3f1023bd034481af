//! Error types for request resolution and execution.

use thiserror::Error;

use crate::cursor::CursorError;
use crate::statement::CompileError;
use crate::storage::StorageError;

/// Message returned to callers in place of server-side error detail.
pub const GENERIC_ERROR: &str = "query failed. check logs for error";

/// Errors produced while resolving and executing a request.
#[derive(Debug, Error)]
pub enum Error {
    /// The query/role pair is not approved, or the database asserted a role
    /// with no matching statement branch.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// The role-policy query failed or returned an unusable role.
    #[error("role resolution failed: {0}")]
    PolicyResolutionFailed(String),

    /// The query compiler rejected the query.
    #[error("compile failed: {0}")]
    CompileFailed(#[from] CompileError),

    /// The storage engine failed to execute or scan a statement.
    #[error("execution failed: {0}")]
    ExecutionFailed(#[from] StorageError),

    /// An inbound cursor could not be decrypted.
    #[error("invalid cursor: {0}")]
    CursorDecodeFailed(#[from] CursorError),

    /// A document did not have the expected shape.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The request itself is invalid (bad JSON, missing variables).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The request deadline passed during a blocking call.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Persisted statement store failure.
    #[error("statement store error: {0}")]
    Store(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Stable machine-readable error code.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Unauthorized(_) => "UNAUTHORIZED",
            Error::PolicyResolutionFailed(_) => "POLICY_RESOLUTION_FAILED",
            Error::CompileFailed(_) => "COMPILE_FAILED",
            Error::ExecutionFailed(_) => "EXECUTION_FAILED",
            Error::CursorDecodeFailed(_) => "CURSOR_DECODE_FAILED",
            Error::MalformedInput(_) => "MALFORMED_INPUT",
            Error::InvalidRequest(_) => "INVALID_REQUEST",
            Error::DeadlineExceeded => "DEADLINE_EXCEEDED",
            Error::Store(_) => "STORE_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Whether the error was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::Unauthorized(_)
                | Error::CursorDecodeFailed(_)
                | Error::MalformedInput(_)
                | Error::InvalidRequest(_)
        )
    }

    /// Message safe to return to the caller.
    ///
    /// In production, server-side failures collapse to [`GENERIC_ERROR`] so
    /// that statement text and storage errors never leave the process.
    pub fn client_message(&self, production: bool) -> String {
        if production && !self.is_client_error() {
            GENERIC_ERROR.to_string()
        } else {
            self.to_string()
        }
    }
}

impl From<sled::Error> for Error {
    fn from(e: sled::Error) -> Self {
        Error::Store(e.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_hides_server_errors() {
        let err = Error::ExecutionFailed(StorageError::Backend(
            "relation \"users\" does not exist".to_string(),
        ));
        assert_eq!(err.client_message(true), GENERIC_ERROR);
        assert!(err.client_message(false).contains("users"));
        assert!(!err.is_client_error());

        let err = Error::CompileFailed(CompileError::new("unknown field: secret"));
        assert_eq!(err.client_message(true), GENERIC_ERROR);
        assert!(err.client_message(false).contains("secret"));
    }

    #[test]
    fn test_client_errors_keep_message() {
        let err = Error::Unauthorized("query not allowed for role anon".to_string());
        assert!(err.is_client_error());
        assert!(err.client_message(true).contains("not allowed"));

        let err = Error::CursorDecodeFailed(CursorError::Decrypt);
        assert_eq!(err.code(), "CURSOR_DECODE_FAILED");
        assert_ne!(err.client_message(true), GENERIC_ERROR);
    }

    #[test]
    fn test_deadline_is_server_side() {
        let err = Error::DeadlineExceeded;
        assert_eq!(err.code(), "DEADLINE_EXCEEDED");
        assert_eq!(err.client_message(true), GENERIC_ERROR);
        assert_eq!(err.client_message(false), "deadline exceeded");
    }
}
