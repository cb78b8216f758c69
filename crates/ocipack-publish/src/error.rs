//! Error types for publish runs.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use ocipack_registry::RegistryError;
use thiserror::Error;

use crate::attestation::SigningError;

/// A step of the publish run, used to report where a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Uploading the bundle and empty config blobs.
    AttestationBlobs,
    /// Pushing the attestation manifest by digest.
    AttestationManifest,
    /// Pushing the referrer index under the digest-derived tag.
    ReferrerIndex,
    /// Uploading the archive and empty config blobs.
    PackageBlobs,
    /// Pushing the package manifest under the version tag.
    SubjectManifest,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AttestationBlobs => "attestation blobs",
            Self::AttestationManifest => "attestation manifest",
            Self::ReferrerIndex => "referrer index",
            Self::PackageBlobs => "package blobs",
            Self::SubjectManifest => "subject manifest",
        };
        f.write_str(name)
    }
}

/// Errors that end a publish run.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Run inputs could not be turned into valid documents.
    #[error("Invalid input: {0}")]
    InvalidInput(#[from] ocipack_core::Error),

    /// A staged archive could not be read.
    #[error("Failed to read staged archive {path}: {source}")]
    StagedFile {
        /// Archive path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A staged archive does not match what the staging step recorded.
    #[error("Staged archive {path} has {field} {actual}, expected {expected}")]
    StagedFileMismatch {
        /// Archive path.
        path: PathBuf,
        /// `sha256` or `size`.
        field: &'static str,
        /// Value recorded at staging time.
        expected: String,
        /// Value computed from the file.
        actual: String,
    },

    /// A manifest references a blob that is not part of its upload group.
    #[error("Manifest references blob {digest} that is not scheduled for upload")]
    MissingBlob {
        /// Digest of the unscheduled blob.
        digest: String,
    },

    /// The signer could not produce an attestation bundle.
    #[error("Attestation for {subject} failed: {source}")]
    Attestation {
        /// Digest of the subject manifest.
        subject: String,
        /// Underlying error.
        #[source]
        source: SigningError,
    },

    /// A registry request failed.
    #[error("Registry error during {stage} ({target}): {source}")]
    Registry {
        /// Stage the request belonged to.
        stage: Stage,
        /// Digest or tag the request concerned.
        target: String,
        /// Underlying error.
        #[source]
        source: RegistryError,
    },

    /// The registry stored a manifest under a different digest than computed.
    #[error("Digest mismatch during {stage}: expected {expected}, registry returned {actual}")]
    DigestMismatch {
        /// Stage whose push returned the digest.
        stage: Stage,
        /// Locally computed digest.
        expected: String,
        /// Digest returned by the registry.
        actual: String,
    },

    /// The run exceeded its overall time limit.
    #[error("Publish run did not finish within {after:?}")]
    TimedOut {
        /// Configured limit.
        after: Duration,
    },
}

impl PublishError {
    /// Returns the registry stage this error occurred in, if any.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::Registry { stage, .. } | Self::DigestMismatch { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Returns true if the registry rejected the run's credentials.
    #[must_use]
    pub const fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Registry { source, .. } if source.is_unauthorized())
    }
}
