//! Publish orchestration.
//!
//! A run builds the package manifest, optionally attaches an attestation
//! through the referrer tag, and pushes everything in dependency order:
//!
//! ```text
//! [attestation]  bundle + {} blobs ─► attestation manifest ─► referrer index (sha256-<hex>)
//! [package]      tar + zip + {} blobs ─► package manifest (version tag)
//! ```
//!
//! Blobs within a group are uploaded concurrently; manifests are pushed one
//! at a time, and every digest the registry returns must equal the one
//! computed locally before the run moves on.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use serde::Serialize;

use ocipack_core::manifest::{
    build_attestation_manifest, build_package_manifest, build_referrer_index, PackageMetadata,
    StagedArchive,
};
use ocipack_core::oci::EMPTY_CONFIG;
use ocipack_core::{Digest, EncodedManifest, OciManifest, PackageVersion};
use ocipack_registry::{BlobStatus, Registry};

use crate::attestation::{AttestationSigner, AttestationSubject, SigningError};
use crate::error::{PublishError, Stage};
use crate::file_set::FileSet;

/// Run-wide publish settings.
#[derive(Debug, Clone, Default)]
pub struct PublishOptions {
    /// Overall limit for the run. Outstanding requests are dropped when it
    /// expires; anything already uploaded stays in the registry.
    pub run_timeout: Option<Duration>,
}

impl PublishOptions {
    /// Sets the overall run timeout.
    #[must_use]
    pub const fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }
}

/// Everything needed to publish one package version.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    /// Staged tarball.
    pub tar: StagedArchive,
    /// Staged zip archive.
    pub zip: StagedArchive,
    /// Repository identity, commit and version.
    pub metadata: PackageMetadata,
    /// Name the attestation refers to the package by.
    pub subject_name: String,
    /// Creation time recorded in every document of the run.
    pub created_at: DateTime<Utc>,
}

/// Digests of a published attestation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttestationOutcome {
    /// Digest of the bundle blob.
    pub bundle_digest: Digest,
    /// Digest of the attestation manifest.
    pub manifest_digest: Digest,
    /// Digest of the referrer index.
    pub index_digest: Digest,
    /// Tag the referrer index was pushed under.
    pub referrer_tag: String,
}

/// Result of a successful run. Every digest in it was echoed by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishOutcome {
    /// Digest of the package manifest.
    pub subject_digest: Digest,
    /// Version tag the package manifest was pushed under.
    pub subject_tag: String,
    /// Attestation digests, when attestations ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attestation: Option<AttestationOutcome>,
}

/// Publishes packages to a registry.
pub struct Publisher<R> {
    registry: R,
    signer: Option<Arc<dyn AttestationSigner>>,
    options: PublishOptions,
}

impl<R> std::fmt::Debug for Publisher<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("attestations", &self.signer.is_some())
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<R: Registry> Publisher<R> {
    /// Creates a publisher without attestations.
    #[must_use]
    pub fn new(registry: R) -> Self {
        Self {
            registry,
            signer: None,
            options: PublishOptions::default(),
        }
    }

    /// Enables attestations produced by `signer`.
    #[must_use]
    pub fn with_signer(mut self, signer: Arc<dyn AttestationSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Sets run options.
    #[must_use]
    pub const fn with_options(mut self, options: PublishOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns true if runs attach an attestation.
    #[must_use]
    pub const fn attestations_enabled(&self) -> bool {
        self.signer.is_some()
    }

    /// Returns the registry this publisher pushes to.
    #[must_use]
    pub const fn registry(&self) -> &R {
        &self.registry
    }

    /// Publishes one package version.
    ///
    /// # Errors
    ///
    /// Fails on invalid input, unreadable or inconsistent staged archives,
    /// signer failure, any registry error and any digest mismatch. A failure
    /// while pushing the package leaves an already pushed attestation in
    /// place.
    pub async fn publish(&self, request: &PublishRequest) -> Result<PublishOutcome, PublishError> {
        match self.options.run_timeout {
            Some(limit) => tokio::time::timeout(limit, self.run(request))
                .await
                .map_err(|_| PublishError::TimedOut { after: limit })?,
            None => self.run(request).await,
        }
    }

    async fn run(&self, request: &PublishRequest) -> Result<PublishOutcome, PublishError> {
        let tag = PackageVersion::parse(&request.metadata.version)?.tag();
        let metadata = PackageMetadata {
            version: tag.clone(),
            ..request.metadata.clone()
        };

        let package =
            build_package_manifest(&request.tar, &request.zip, &metadata, &request.created_at)?;

        let mut package_blobs = FileSet::new();
        package_blobs.insert_staged(&request.tar).await?;
        package_blobs.insert_staged(&request.zip).await?;
        package_blobs.insert(EMPTY_CONFIG.to_vec());
        package_blobs.ensure_covers(&package)?;

        let subject = package.encode()?;
        tracing::info!(digest = %subject.digest, tag = %tag, "built package manifest");

        let attestation = match &self.signer {
            Some(signer) => Some(
                self.publish_attestation(signer.as_ref(), request, &subject, &tag)
                    .await?,
            ),
            None => None,
        };

        let pushed = self.push_package(&package_blobs, &subject, &tag).await;
        if let (Err(e), Some(attestation)) = (&pushed, &attestation) {
            tracing::warn!(
                error = %e,
                referrer_tag = %attestation.referrer_tag,
                "package push failed; attestation remains in the registry"
            );
        }
        pushed?;

        tracing::info!(digest = %subject.digest, tag = %tag, "published package");
        Ok(PublishOutcome {
            subject_digest: subject.digest,
            subject_tag: tag,
            attestation,
        })
    }

    async fn publish_attestation(
        &self,
        signer: &dyn AttestationSigner,
        request: &PublishRequest,
        subject: &EncodedManifest,
        tag: &str,
    ) -> Result<AttestationOutcome, PublishError> {
        let attestation_subject = AttestationSubject {
            name: request.subject_name.clone(),
            version: tag.to_string(),
            digest: subject.digest.clone(),
        };
        let attestation_error = |source| PublishError::Attestation {
            subject: subject.digest.to_string(),
            source,
        };

        let bundle = signer
            .attest(&attestation_subject)
            .await
            .map_err(attestation_error)?;
        if bundle.bytes.is_empty() {
            return Err(attestation_error(SigningError::EmptyBundle));
        }

        let kind = bundle.kind();
        let bundle_size = ocipack_core::size_in_bytes(&bundle.bytes);

        let mut blobs = FileSet::new();
        let bundle_digest = blobs.insert(bundle.bytes);
        blobs.insert(EMPTY_CONFIG.to_vec());

        let manifest = build_attestation_manifest(
            bundle_size,
            &bundle_digest,
            &kind,
            subject.size,
            &subject.digest,
            &request.created_at,
        )?;
        blobs.ensure_covers(&manifest)?;
        let manifest = manifest.encode()?;

        let index = build_referrer_index(
            &manifest.digest,
            manifest.size,
            &kind,
            &request.created_at,
        )?
        .encode()?;
        let referrer_tag = subject.digest.referrer_tag();

        self.upload_group(Stage::AttestationBlobs, &blobs).await?;
        self.push_verified(Stage::AttestationManifest, &manifest, None)
            .await?;
        self.push_verified(Stage::ReferrerIndex, &index, Some(&referrer_tag))
            .await?;

        tracing::info!(
            subject = %subject.digest,
            attestation = %manifest.digest,
            referrer_tag = %referrer_tag,
            "published attestation"
        );

        Ok(AttestationOutcome {
            bundle_digest,
            manifest_digest: manifest.digest,
            index_digest: index.digest,
            referrer_tag,
        })
    }

    async fn push_package(
        &self,
        blobs: &FileSet,
        subject: &EncodedManifest,
        tag: &str,
    ) -> Result<(), PublishError> {
        self.upload_group(Stage::PackageBlobs, blobs).await?;
        self.push_verified(Stage::SubjectManifest, subject, Some(tag))
            .await
    }

    /// Uploads every blob of a group concurrently and waits for all of them.
    async fn upload_group(&self, stage: Stage, blobs: &FileSet) -> Result<(), PublishError> {
        let uploads = blobs.iter().map(|(digest, data)| async move {
            self.registry
                .ensure_blob(digest, data)
                .await
                .map_err(|source| PublishError::Registry {
                    stage,
                    target: digest.to_string(),
                    source,
                })
        });

        let statuses = try_join_all(uploads).await?;
        let uploaded = statuses
            .iter()
            .filter(|s| **s == BlobStatus::Uploaded)
            .count();
        tracing::info!(%stage, blobs = statuses.len(), uploaded, "blob group in registry");
        Ok(())
    }

    /// Pushes a manifest and checks the digest the registry stored it under.
    async fn push_verified(
        &self,
        stage: Stage,
        manifest: &EncodedManifest,
        tag: Option<&str>,
    ) -> Result<(), PublishError> {
        let target = tag.map_or_else(|| manifest.digest.to_string(), ToString::to_string);

        let returned = self
            .registry
            .push_manifest(manifest, tag)
            .await
            .map_err(|source| PublishError::Registry {
                stage,
                target: target.clone(),
                source,
            })?;

        if returned != manifest.digest.as_str() {
            return Err(PublishError::DigestMismatch {
                stage,
                expected: manifest.digest.to_string(),
                actual: returned,
            });
        }

        tracing::debug!(%stage, reference = %target, digest = %manifest.digest, "manifest verified");
        Ok(())
    }
}
