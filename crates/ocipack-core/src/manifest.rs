//! Construction of package, attestation and referrer-index manifests.
//!
//! Three documents make up a publish:
//!
//! ```text
//!   referrer index (tag: sha256-<subject hex>)
//!        │ manifests[0]
//!        ▼
//!   attestation manifest ──subject──▶ package manifest (tag: <version>)
//!        │ layers[0]                      │ layers
//!        ▼                                ▼
//!   attestation bundle              [tar.gz, zip]
//! ```
//!
//! All builders are pure: given the same inputs and timestamp they return
//! equal manifests, and therefore equal digests.

use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};

use crate::digest::Digest;
use crate::error::{Error, Result};
use crate::oci::{Descriptor, ImageManifest, IndexManifest, MediaType};

/// Annotation keys written by the builders.
pub mod annotations {
    /// RFC3339 creation time.
    pub const CREATED: &str = "org.opencontainers.image.created";
    /// Human-readable file name of a layer.
    pub const TITLE: &str = "org.opencontainers.image.title";
    /// Package version.
    pub const VERSION: &str = "org.opencontainers.image.version";
    /// Source commit the package was built from.
    pub const REVISION: &str = "org.opencontainers.image.revision";

    /// Kind of ocipack document (`package`, `attestation`, `referrer-index`).
    pub const DOCUMENT_TYPE: &str = "dev.ocipack.document.type";
    /// `owner/name` of the source repository.
    pub const SOURCE_REPOSITORY: &str = "dev.ocipack.source.repository";
    /// Stable id of the source repository.
    pub const SOURCE_REPOSITORY_ID: &str = "dev.ocipack.source.repository.id";
    /// Stable id of the source repository owner.
    pub const SOURCE_OWNER_ID: &str = "dev.ocipack.source.owner.id";
    /// Digest of the tar layer.
    pub const TAR_DIGEST: &str = "dev.ocipack.package.tar.digest";
    /// Digest of the zip layer.
    pub const ZIP_DIGEST: &str = "dev.ocipack.package.zip.digest";
    /// Digest of the manifest an attestation is about.
    pub const SUBJECT_DIGEST: &str = "dev.ocipack.subject.digest";
    /// Size of the manifest an attestation is about.
    pub const SUBJECT_SIZE: &str = "dev.ocipack.subject.size";

    /// Content kind inside a sigstore bundle.
    pub const BUNDLE_CONTENT: &str = "dev.sigstore.bundle.content";
    /// Predicate type of the signed statement.
    pub const BUNDLE_PREDICATE_TYPE: &str = "dev.sigstore.bundle.predicateType";
}

/// Values of [`annotations::DOCUMENT_TYPE`].
pub mod document_type {
    /// A package manifest.
    pub const PACKAGE: &str = "package";
    /// An attestation manifest.
    pub const ATTESTATION: &str = "attestation";
    /// A referrer index.
    pub const REFERRER_INDEX: &str = "referrer-index";
}

/// An archive produced by the staging step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedArchive {
    /// Location of the archive on disk.
    pub path: PathBuf,
    /// Lowercase hex sha256 of the archive, without algorithm prefix.
    pub sha256: String,
    /// Size of the archive in bytes.
    pub size: u64,
}

impl StagedArchive {
    /// Creates a staged archive record.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, sha256: impl Into<String>, size: u64) -> Self {
        Self {
            path: path.into(),
            sha256: sha256.into(),
            size,
        }
    }

    /// Converts the staging record into a layer descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDescriptor`] when the size is zero or the
    /// sha256 is empty or malformed.
    pub fn descriptor(&self, role: &str, media_type: &str) -> Result<Descriptor> {
        if self.size == 0 {
            return Err(Error::InvalidDescriptor {
                role: role.to_string(),
                reason: "size is zero".to_string(),
            });
        }
        if self.sha256.is_empty() {
            return Err(Error::InvalidDescriptor {
                role: role.to_string(),
                reason: "digest is empty".to_string(),
            });
        }

        let digest = Digest::from_hex(&self.sha256).map_err(|e| Error::InvalidDescriptor {
            role: role.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Descriptor::new(MediaType::new(media_type), digest, self.size))
    }
}

/// Identity and version of the package being published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageMetadata {
    /// `owner/name` of the source repository.
    pub repository: String,
    /// Stable id of the source repository.
    pub repository_id: String,
    /// Stable id of the repository owner.
    pub owner_id: String,
    /// Commit the archives were built from.
    pub commit_sha: String,
    /// Version tag, without `v` prefix.
    pub version: String,
}

impl PackageMetadata {
    /// Returns the repository name with `/` replaced, for use in file names.
    #[must_use]
    pub fn sanitized_repository(&self) -> String {
        self.repository.replace('/', "-")
    }
}

/// Value of [`annotations::BUNDLE_CONTENT`] for bundles wrapping a DSSE envelope.
pub const DSSE_ENVELOPE_CONTENT: &str = "dsse-envelope";

/// What kind of signed bundle an attestation layer carries.
///
/// A bare DSSE envelope and a sigstore bundle both carry an in-toto
/// statement in a DSSE envelope (the bundle nests it under `dsseEnvelope`).
/// Other media types are passed through without a content annotation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleKind {
    /// Media type of the bundle blob.
    pub media_type: String,
    /// Predicate type of the signed in-toto statement.
    pub predicate_type: String,
}

impl BundleKind {
    /// Creates a bundle kind.
    #[must_use]
    pub fn new(media_type: impl Into<String>, predicate_type: impl Into<String>) -> Self {
        Self {
            media_type: media_type.into(),
            predicate_type: predicate_type.into(),
        }
    }

    /// Returns what the bundle wraps, as recorded in [`annotations::BUNDLE_CONTENT`],
    /// or `None` for a media type whose content is unknown.
    #[must_use]
    pub fn content(&self) -> Option<&'static str> {
        match self.media_type.as_str() {
            MediaType::DSSE_ENVELOPE | MediaType::SIGSTORE_BUNDLE => Some(DSSE_ENVELOPE_CONTENT),
            _ => None,
        }
    }
}

/// Formats a timestamp the way every annotation records it.
#[must_use]
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Builds the package manifest.
///
/// The layers are `[tar, zip]` in that order, the config is the empty JSON
/// object, and annotations record repository identity, commit, version and
/// creation time.
///
/// # Errors
///
/// Returns [`Error::InvalidDescriptor`] if either archive has a zero size
/// or an empty or malformed digest.
pub fn build_package_manifest(
    tar: &StagedArchive,
    zip: &StagedArchive,
    metadata: &PackageMetadata,
    created_at: &DateTime<Utc>,
) -> Result<ImageManifest> {
    let base_name = format!("{}_{}", metadata.sanitized_repository(), metadata.version);

    let tar_layer = tar
        .descriptor("tar", MediaType::PACKAGE_TAR_LAYER)?
        .with_annotation(annotations::TITLE, format!("{base_name}.tar.gz"));
    let zip_layer = zip
        .descriptor("zip", MediaType::PACKAGE_ZIP_LAYER)?
        .with_annotation(annotations::TITLE, format!("{base_name}.zip"));

    let tar_digest = tar_layer.digest.to_string();
    let zip_digest = zip_layer.digest.to_string();

    let mut manifest = ImageManifest::new(vec![tar_layer, zip_layer])
        .with_annotation(annotations::CREATED, format_timestamp(created_at))
        .with_annotation(annotations::DOCUMENT_TYPE, document_type::PACKAGE)
        .with_annotation(annotations::VERSION, &metadata.version)
        .with_annotation(annotations::REVISION, &metadata.commit_sha)
        .with_annotation(annotations::SOURCE_REPOSITORY, &metadata.repository)
        .with_annotation(annotations::SOURCE_REPOSITORY_ID, &metadata.repository_id)
        .with_annotation(annotations::SOURCE_OWNER_ID, &metadata.owner_id)
        .with_annotation(annotations::TAR_DIGEST, tar_digest)
        .with_annotation(annotations::ZIP_DIGEST, zip_digest);
    manifest.artifact_type = Some(MediaType::PACKAGE.to_string());

    Ok(manifest)
}

/// Builds the attestation manifest for a signed bundle.
///
/// The single layer is the bundle. The subject is recorded both as the OCI
/// `subject` field and as annotations, so the manifest describes what it
/// attests to even when found without the referrer index.
///
/// # Errors
///
/// Returns [`Error::InvalidDescriptor`] if the bundle or subject size is zero.
pub fn build_attestation_manifest(
    bundle_size: u64,
    bundle_digest: &Digest,
    kind: &BundleKind,
    subject_size: u64,
    subject_digest: &Digest,
    created_at: &DateTime<Utc>,
) -> Result<ImageManifest> {
    if bundle_size == 0 {
        return Err(Error::InvalidDescriptor {
            role: "bundle".to_string(),
            reason: "size is zero".to_string(),
        });
    }
    if subject_size == 0 {
        return Err(Error::InvalidDescriptor {
            role: "subject".to_string(),
            reason: "size is zero".to_string(),
        });
    }

    let bundle_layer = Descriptor::new(
        MediaType::new(&kind.media_type),
        bundle_digest.clone(),
        bundle_size,
    );
    let subject = Descriptor::new(
        MediaType::image_manifest(),
        subject_digest.clone(),
        subject_size,
    );

    let mut manifest = ImageManifest::new(vec![bundle_layer])
        .with_annotation(annotations::CREATED, format_timestamp(created_at))
        .with_annotation(annotations::DOCUMENT_TYPE, document_type::ATTESTATION)
        .with_annotation(annotations::SUBJECT_DIGEST, subject_digest.as_str())
        .with_annotation(annotations::SUBJECT_SIZE, subject_size.to_string())
        .with_annotation(annotations::BUNDLE_PREDICATE_TYPE, &kind.predicate_type);
    if let Some(content) = kind.content() {
        manifest = manifest.with_annotation(annotations::BUNDLE_CONTENT, content);
    }
    manifest.artifact_type = Some(kind.media_type.clone());
    manifest.subject = Some(subject);

    Ok(manifest)
}

/// Builds the referrer index pointing at an attestation manifest.
///
/// The index is pushed under the tag derived from the subject digest; the
/// tag is not part of the document.
///
/// # Errors
///
/// Returns [`Error::InvalidDescriptor`] if the attestation size is zero.
pub fn build_referrer_index(
    attestation_digest: &Digest,
    attestation_size: u64,
    kind: &BundleKind,
    created_at: &DateTime<Utc>,
) -> Result<IndexManifest> {
    if attestation_size == 0 {
        return Err(Error::InvalidDescriptor {
            role: "attestation".to_string(),
            reason: "size is zero".to_string(),
        });
    }

    let created = format_timestamp(created_at);
    let mut entry = Descriptor::new(
        MediaType::image_manifest(),
        attestation_digest.clone(),
        attestation_size,
    )
    .with_artifact_type(&kind.media_type)
    .with_annotation(annotations::CREATED, &created)
    .with_annotation(annotations::DOCUMENT_TYPE, document_type::ATTESTATION)
    .with_annotation(annotations::BUNDLE_PREDICATE_TYPE, &kind.predicate_type);
    if let Some(content) = kind.content() {
        entry = entry.with_annotation(annotations::BUNDLE_CONTENT, content);
    }

    Ok(IndexManifest::new(vec![entry])
        .with_annotation(annotations::CREATED, created)
        .with_annotation(annotations::DOCUMENT_TYPE, document_type::REFERRER_INDEX))
}
