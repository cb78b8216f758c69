//! Error types for ocipack core operations.
//!
//! This module defines the error types used throughout the `ocipack-core` crate.

use thiserror::Error;

/// Result type alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in ocipack core operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A digest string is not of the form `sha256:<64 lowercase hex>`.
    #[error("Invalid digest '{digest}': {reason}")]
    InvalidDigest {
        /// The rejected digest string.
        digest: String,
        /// Reason the digest is invalid.
        reason: String,
    },

    /// A descriptor handed to the manifest builder is unusable.
    #[error("Invalid {role} descriptor: {reason}")]
    InvalidDescriptor {
        /// Which descriptor was rejected (e.g. "tar", "bundle").
        role: String,
        /// Reason the descriptor is invalid.
        reason: String,
    },

    /// A git ref or version tag is not a publishable semantic version.
    #[error("Invalid version '{input}': {reason}")]
    InvalidVersion {
        /// The rejected ref or tag.
        input: String,
        /// Reason the version is invalid.
        reason: String,
    },

    /// Serialization error while canonicalizing a document.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_invalid_digest() {
        let err = Error::InvalidDigest {
            digest: "md5:abc".to_string(),
            reason: "unsupported algorithm".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid digest 'md5:abc': unsupported algorithm"
        );
    }

    #[test]
    fn test_error_display_invalid_descriptor() {
        let err = Error::InvalidDescriptor {
            role: "tar".to_string(),
            reason: "size is zero".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid tar descriptor: size is zero");
    }

    #[test]
    fn test_error_display_invalid_version() {
        let err = Error::InvalidVersion {
            input: "refs/heads/main".to_string(),
            reason: "not a tag ref".to_string(),
        };
        assert!(err.to_string().contains("refs/heads/main"));
    }
}
