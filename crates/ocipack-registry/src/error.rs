//! Error types for registry operations.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur during registry operations.
///
/// Variants raised for a specific blob or manifest carry its digest or
/// reference so callers can report exactly what failed.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Failed to connect to registry.
    #[error("Failed to connect to registry at {url}: {source}")]
    ConnectionFailed {
        /// Registry URL.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// A request did not complete within the configured timeout.
    #[error("Request to {url} timed out")]
    Timeout {
        /// Request URL.
        url: String,
    },

    /// Authentication failed.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed {
        /// Error message.
        message: String,
    },

    /// HTTP error from registry.
    #[error("HTTP error from registry during {operation}: {status} - {message}")]
    HttpError {
        /// Operation that failed.
        operation: String,
        /// HTTP status code (0 when no response was received).
        status: u16,
        /// Error message.
        message: String,
    },

    /// Blob upload failed.
    #[error("Failed to upload blob {digest}: {status} - {message}")]
    BlobUploadFailed {
        /// Digest of the blob.
        digest: String,
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// Manifest push failed.
    #[error("Failed to push manifest {reference}: {status} - {message}")]
    ManifestPushFailed {
        /// Tag or digest the manifest was pushed under.
        reference: String,
        /// HTTP status code.
        status: u16,
        /// Error message.
        message: String,
    },

    /// The registry accepted a manifest but did not report its digest.
    #[error("Registry did not return a content digest for manifest {reference}")]
    MissingDigest {
        /// Tag or digest the manifest was pushed under.
        reference: String,
    },

    /// An upload session location could not be used.
    #[error("Invalid upload location '{location}' for blob {digest}")]
    InvalidLocation {
        /// Digest of the blob being uploaded.
        digest: String,
        /// Location header value.
        location: String,
    },

    /// File I/O error.
    #[error("File I/O error at {path}: {source}")]
    IoError {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Invalid URL.
    #[error("Invalid URL: {url}")]
    InvalidUrl {
        /// URL string.
        url: String,
    },

    /// TLS material could not be loaded.
    #[error("Invalid TLS configuration: {message}")]
    InvalidTls {
        /// Error message.
        message: String,
    },
}

impl RegistryError {
    /// Returns true if this error is transient and the request may be retried.
    ///
    /// Connection failures, timeouts and 5xx responses are transient. 4xx
    /// responses and authentication failures are permanent.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionFailed { .. } | Self::Timeout { .. } => true,
            Self::HttpError { status, .. }
            | Self::BlobUploadFailed { status, .. }
            | Self::ManifestPushFailed { status, .. } => *status == 0 || *status >= 500,
            _ => false,
        }
    }

    /// Returns true if the registry rejected the credentials or permissions.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        match self {
            Self::AuthenticationFailed { .. } => true,
            Self::HttpError { status, .. }
            | Self::BlobUploadFailed { status, .. }
            | Self::ManifestPushFailed { status, .. } => *status == 401 || *status == 403,
            _ => false,
        }
    }
}

impl From<reqwest::Error> for RegistryError {
    fn from(err: reqwest::Error) -> Self {
        let url = err
            .url()
            .map_or_else(|| "unknown".to_string(), ToString::to_string);

        if err.is_timeout() {
            Self::Timeout { url }
        } else if err.is_connect() {
            Self::ConnectionFailed { url, source: err }
        } else if err.is_status() {
            let status = err.status().map_or(0, |s| s.as_u16());
            Self::HttpError {
                operation: url,
                status,
                message: err.to_string(),
            }
        } else {
            Self::HttpError {
                operation: url,
                status: 0,
                message: err.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_blob_upload() {
        let err = RegistryError::BlobUploadFailed {
            digest: "sha256:abc".to_string(),
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Failed to upload blob sha256:abc: 500 - boom");
    }

    #[test]
    fn test_server_errors_are_retryable() {
        let err = RegistryError::ManifestPushFailed {
            reference: "1.2.3".to_string(),
            status: 503,
            message: "unavailable".to_string(),
        };
        assert!(err.is_retryable());
        assert!(!err.is_unauthorized());
    }

    #[test]
    fn test_client_errors_are_permanent() {
        let err = RegistryError::ManifestPushFailed {
            reference: "1.2.3".to_string(),
            status: 400,
            message: "MANIFEST_INVALID".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_auth_errors_are_permanent() {
        let err = RegistryError::HttpError {
            operation: "blob exists".to_string(),
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(err.is_unauthorized());

        let err = RegistryError::AuthenticationFailed {
            message: "invalid token".to_string(),
        };
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Authentication failed: invalid token");
    }

    #[test]
    fn test_timeouts_are_retryable() {
        let err = RegistryError::Timeout {
            url: "https://registry.example.com/v2/".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn test_missing_digest_is_permanent() {
        let err = RegistryError::MissingDigest {
            reference: "sha256-abc".to_string(),
        };
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("sha256-abc"));
    }
}
