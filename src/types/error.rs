use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum S3relayError {
    #[error("cancelled")]
    Cancelled,
    #[error("no objects found.")]
    NoObjectsFound,
    #[error("listing failed: {0}")]
    ListingFailed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatterError {
    #[error("invalid template '{template}': {reason}")]
    Template { template: String, reason: String },
    #[error("key '{key}' does not match template '{template}'")]
    NoMatch { key: String, template: String },
    #[error("field '{field}' required by template '{template}' is missing")]
    MissingField { field: String, template: String },
    #[error("destination key for '{relpath}' is empty")]
    EmptyKey { relpath: String },
}

/// Classified failure of a storage call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("operation timed out: {0}")]
    Timeout(String),
    #[error("request throttled: {0}")]
    Throttled(String),
    #[error("server error: {0}")]
    ServerError(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("validation mismatch: {0}")]
    ValidationMismatch(String),
    #[error("access denied: {0}")]
    AccessDenied(String),
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("bucket not found: {0}")]
    NoSuchBucket(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("decompression failed: {0}")]
    Decompression(String),
}

impl StorageError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StorageError::Timeout(_)
                | StorageError::Throttled(_)
                | StorageError::ServerError(_)
                | StorageError::Network(_)
                | StorageError::ValidationMismatch(_)
        )
    }

    /// Classify an S3 service error by HTTP status and error code.
    pub fn from_service_response(status: u16, code: Option<&str>, message: String) -> Self {
        match code {
            Some("AccessDenied" | "InvalidAccessKeyId" | "SignatureDoesNotMatch")
            | Some("AllAccessDisabled" | "ExpiredToken" | "InvalidToken") => {
                return StorageError::AccessDenied(message);
            }
            Some("NoSuchBucket") => return StorageError::NoSuchBucket(message),
            Some("NoSuchKey" | "NotFound") => return StorageError::NotFound(message),
            Some("SlowDown" | "Throttling" | "ThrottlingException" | "TooManyRequests") => {
                return StorageError::Throttled(message);
            }
            Some("RequestTimeout" | "RequestTimeoutException") => {
                return StorageError::Timeout(message);
            }
            Some("InternalError" | "ServiceUnavailable") => {
                return StorageError::ServerError(message);
            }
            _ => {}
        }

        match status {
            401 | 403 => StorageError::AccessDenied(message),
            404 => StorageError::NotFound(message),
            408 => StorageError::Timeout(message),
            429 | 503 => StorageError::Throttled(message),
            500..=599 => StorageError::ServerError(message),
            _ => StorageError::InvalidRequest(message),
        }
    }

    pub fn from_io_error(e: &std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::InvalidData => StorageError::Decompression(e.to_string()),
            std::io::ErrorKind::TimedOut => StorageError::Timeout(e.to_string()),
            _ => StorageError::Network(e.to_string()),
        }
    }
}

/// Whether an error is worth another attempt.
pub fn is_transient_error(e: &anyhow::Error) -> bool {
    e.downcast_ref::<StorageError>()
        .is_some_and(StorageError::is_transient)
}

pub fn is_cancelled_error(e: &anyhow::Error) -> bool {
    if let Some(err) = e.downcast_ref::<S3relayError>() {
        return *err == S3relayError::Cancelled;
    }

    false
}
