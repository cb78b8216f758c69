//! The seam between the publisher and whatever produces provenance.
//!
//! A signer receives the subject name, the version tag and the digest of
//! the package manifest and returns opaque bundle bytes. The publisher never looks
//! inside the bundle; it only needs the media and predicate type to
//! describe it.

use async_trait::async_trait;
use ocipack_core::manifest::BundleKind;
use ocipack_core::Digest;

/// Predicate type of SLSA v1 build provenance.
pub const SLSA_PROVENANCE_V1: &str = "https://slsa.dev/provenance/v1";

/// What an attestation is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationSubject {
    /// Name of the published artifact, e.g. `registry.example.com/acme/widget`.
    pub name: String,
    /// Version tag the package manifest is pushed under.
    pub version: String,
    /// Digest of the package manifest.
    pub digest: Digest,
}

/// A signed attestation ready to be uploaded as a blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttestationBundle {
    /// Bundle content, uploaded as-is.
    pub bytes: Vec<u8>,
    /// Media type of the bundle.
    pub media_type: String,
    /// Predicate type of the signed statement.
    pub predicate_type: String,
}

impl AttestationBundle {
    /// Returns the media and predicate type pair used by the manifest builder.
    #[must_use]
    pub fn kind(&self) -> BundleKind {
        BundleKind::new(&self.media_type, &self.predicate_type)
    }
}

/// Errors produced while creating an attestation.
#[derive(Debug, thiserror::Error)]
pub enum SigningError {
    /// Key material could not be decoded.
    #[error("invalid key format: {0}")]
    InvalidKeyFormat(String),

    /// A signature did not verify.
    #[error("invalid signature")]
    InvalidSignature,

    /// The statement or envelope could not be encoded or decoded.
    #[error("failed to encode attestation: {0}")]
    Encoding(String),

    /// The signing service could not be reached.
    #[error("signing service at {url} unreachable: {source}")]
    Transport {
        /// Service URL.
        url: String,
        /// Underlying error.
        #[source]
        source: reqwest::Error,
    },

    /// The signing service rejected the request.
    #[error("signing service returned {status}: {message}")]
    Service {
        /// HTTP status code.
        status: u16,
        /// Response body.
        message: String,
    },

    /// The signer returned no content.
    #[error("signer returned an empty bundle")]
    EmptyBundle,
}

/// Produces provenance bundles for published packages.
#[async_trait]
pub trait AttestationSigner: Send + Sync {
    /// Creates a signed bundle attesting to `subject`.
    ///
    /// # Errors
    ///
    /// Returns a [`SigningError`] if no bundle could be produced. The
    /// publish run treats this as fatal.
    async fn attest(&self, subject: &AttestationSubject) -> Result<AttestationBundle, SigningError>;
}
