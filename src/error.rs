use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use thiserror::Error;

/// Result type for dynamodb-testkit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error code DynamoDB returns when a condition expression evaluates to false
pub const CONDITIONAL_CHECK_FAILED: &str = "ConditionalCheckFailedException";

/// Errors that can occur while running a local DynamoDB server for tests
#[derive(Error, Debug)]
pub enum Error {
    /// The server is not accepting connections yet (transient during startup)
    #[error("Transport error: {0}")]
    Transport(String),

    /// The server answered with an application-level error
    #[error("Service error {code}: {message}")]
    Service {
        /// Error code reported by the server, e.g. `ResourceNotFoundException`
        code: String,
        /// Human readable message reported by the server
        message: String,
    },

    /// A caller-supplied condition was not satisfied by the stored item
    #[error("Condition failed: {0}")]
    ConditionFailed(String),

    /// The stored version of an item did not match the expected version
    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    /// The server could not be started or its readiness could not be confirmed
    #[error("Startup failure: {0}")]
    Startup(String),

    /// Tables could not be wiped or created
    #[error("Provisioning failure: {0}")]
    Provisioning(String),

    /// A data-plane operation was attempted before the server reported ready
    #[error("Server not ready: {0}")]
    NotReady(String),

    /// A record could not be converted to or from a DynamoDB item
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// The container or process runtime failed
    #[error("Backend error: {0}")]
    Backend(String),

    /// Invalid argument error
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// General internal errors
    #[error("Internal error: {0}")]
    Internal(String),

    /// Errors related to JSON serialization/deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Errors related to I/O operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns the service error code if the server answered with one
    pub fn service_code(&self) -> Option<&str> {
        match self {
            Error::Service { code, .. } => Some(code),
            Error::ConditionFailed(_) => Some(CONDITIONAL_CHECK_FAILED),
            _ => None,
        }
    }

    /// Shorthand for an application-level error with the given code
    pub fn service(code: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Service {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Classifies an AWS SDK error.
    ///
    /// Failures that happen before the server produced a parseable answer (dispatch, timeout,
    /// malformed response) are transport errors. Service errors keep their code so callers can
    /// tell "no such table" apart from "condition failed".
    pub fn from_sdk<E, R>(operation: &str, err: SdkError<E, R>) -> Self
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
        R: std::fmt::Debug,
    {
        match err {
            SdkError::DispatchFailure(_) | SdkError::TimeoutError(_) | SdkError::ResponseError(_) => {
                Error::Transport(format!("DynamoDB {} failed: {}", operation, err))
            }
            SdkError::ServiceError(context) => {
                let service_err = context.err();
                let code = service_err.code().unwrap_or("Unknown").to_string();
                let message = service_err
                    .message()
                    .map(str::to_string)
                    .unwrap_or_else(|| service_err.to_string());

                if code == CONDITIONAL_CHECK_FAILED {
                    Error::ConditionFailed(message)
                } else {
                    Error::Service { code, message }
                }
            }
            other => Error::Internal(format!("DynamoDB {} failed: {}", operation, other)),
        }
    }
}

impl From<Box<dyn std::error::Error + Send + Sync>> for Error {
    fn from(err: Box<dyn std::error::Error + Send + Sync>) -> Self {
        Error::Internal(err.to_string())
    }
}
