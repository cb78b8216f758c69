//! Blobs that must be in the registry before a manifest is pushed.

use std::collections::BTreeMap;

use ocipack_core::manifest::StagedArchive;
use ocipack_core::{Digest, ImageManifest};

use crate::error::PublishError;

/// Content-addressed blobs scheduled for upload, keyed by digest.
///
/// Inserting the same content twice keeps a single entry.
#[derive(Debug, Clone, Default)]
pub struct FileSet {
    blobs: BTreeMap<Digest, Vec<u8>>,
}

impl FileSet {
    /// Creates an empty file set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds in-memory content and returns its digest.
    pub fn insert(&mut self, data: Vec<u8>) -> Digest {
        let digest = Digest::of(&data);
        self.blobs.entry(digest.clone()).or_insert(data);
        digest
    }

    /// Reads a staged archive and adds it after checking it against the
    /// sha256 and size recorded at staging time.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::StagedFile`] if the file cannot be read and
    /// [`PublishError::StagedFileMismatch`] if its content disagrees with
    /// the staging record.
    pub async fn insert_staged(&mut self, archive: &StagedArchive) -> Result<Digest, PublishError> {
        let data = tokio::fs::read(&archive.path)
            .await
            .map_err(|source| PublishError::StagedFile {
                path: archive.path.clone(),
                source,
            })?;

        let actual_size = ocipack_core::size_in_bytes(&data);
        if actual_size != archive.size {
            return Err(PublishError::StagedFileMismatch {
                path: archive.path.clone(),
                field: "size",
                expected: archive.size.to_string(),
                actual: actual_size.to_string(),
            });
        }

        let digest = Digest::of(&data);
        if digest.hex() != archive.sha256 {
            return Err(PublishError::StagedFileMismatch {
                path: archive.path.clone(),
                field: "sha256",
                expected: archive.sha256.clone(),
                actual: digest.hex().to_string(),
            });
        }

        tracing::debug!(path = %archive.path.display(), digest = %digest, "staged archive verified");
        self.blobs.insert(digest.clone(), data);
        Ok(digest)
    }

    /// Returns the content for a digest.
    #[must_use]
    pub fn get(&self, digest: &Digest) -> Option<&[u8]> {
        self.blobs.get(digest).map(Vec::as_slice)
    }

    /// Returns true if the set holds the digest.
    #[must_use]
    pub fn contains(&self, digest: &Digest) -> bool {
        self.blobs.contains_key(digest)
    }

    /// Number of distinct blobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    /// Returns true if no blobs are scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }

    /// Iterates over blobs in digest order.
    pub fn iter(&self) -> impl Iterator<Item = (&Digest, &[u8])> {
        self.blobs.iter().map(|(d, b)| (d, b.as_slice()))
    }

    /// Checks that the config and every layer of `manifest` are scheduled.
    ///
    /// # Errors
    ///
    /// Returns [`PublishError::MissingBlob`] naming the first blob the
    /// manifest references but the set lacks.
    pub fn ensure_covers(&self, manifest: &ImageManifest) -> Result<(), PublishError> {
        std::iter::once(&manifest.config)
            .chain(&manifest.layers)
            .find(|d| !self.contains(&d.digest))
            .map_or(Ok(()), |missing| {
                Err(PublishError::MissingBlob {
                    digest: missing.digest.to_string(),
                })
            })
    }
}
