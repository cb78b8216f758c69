//! OCI Image and Index manifest types.
//!
//! These types conform to the OCI Image Specification (v1.1) for the subset
//! ocipack publishes: image manifests for packages and attestations, and a
//! single-entry index used as a referrer tag.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::digest::{canonicalize, size_in_bytes, Digest};
use crate::error::Result;

/// Annotation map. Ordered so debug output and serialization are stable.
pub type Annotations = BTreeMap<String, String>;

/// An OCI media type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaType(String);

impl MediaType {
    /// OCI image manifest media type.
    pub const OCI_MANIFEST: &'static str = "application/vnd.oci.image.manifest.v1+json";

    /// OCI image index media type.
    pub const OCI_INDEX: &'static str = "application/vnd.oci.image.index.v1+json";

    /// OCI empty JSON object, used as the config blob of artifacts.
    pub const OCI_EMPTY: &'static str = "application/vnd.oci.empty.v1+json";

    /// Artifact type of a published package manifest.
    pub const PACKAGE: &'static str = "application/vnd.ocipack.package.v1+json";

    /// Gzipped tar archive layer of a package.
    pub const PACKAGE_TAR_LAYER: &'static str =
        "application/vnd.ocipack.package.layer.v1.tar+gzip";

    /// Zip archive layer of a package.
    pub const PACKAGE_ZIP_LAYER: &'static str = "application/vnd.ocipack.package.layer.v1.zip";

    /// Sigstore bundle holding a signed attestation.
    pub const SIGSTORE_BUNDLE: &'static str = "application/vnd.dev.sigstore.bundle.v0.3+json";

    /// Bare DSSE envelope holding a signed attestation.
    pub const DSSE_ENVELOPE: &'static str = "application/vnd.dsse.envelope.v1+json";

    /// Creates a new media type.
    #[must_use]
    pub fn new(media_type: impl Into<String>) -> Self {
        Self(media_type.into())
    }

    /// Returns the media type string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Creates the image manifest media type.
    #[must_use]
    pub fn image_manifest() -> Self {
        Self::new(Self::OCI_MANIFEST)
    }

    /// Creates the image index media type.
    #[must_use]
    pub fn image_index() -> Self {
        Self::new(Self::OCI_INDEX)
    }

    /// Creates the empty config media type.
    #[must_use]
    pub fn empty() -> Self {
        Self::new(Self::OCI_EMPTY)
    }
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MediaType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl Serialize for MediaType {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MediaType {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self(s))
    }
}

/// Bytes of the empty JSON object config blob.
pub const EMPTY_CONFIG: &[u8] = b"{}";

/// Well-known digest of [`EMPTY_CONFIG`].
pub const EMPTY_CONFIG_DIGEST: &str =
    "sha256:44136fa355b3678a1146ad16f7e8649e94fb4fc21fe77e8310c060f61caaff8a";

/// OCI content descriptor.
///
/// A descriptor describes the disposition of targeted content. It includes
/// the type of the content, a content identifier (digest), and the byte-size
/// of the raw content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    /// Media type of the referenced content.
    pub media_type: MediaType,

    /// Digest of the targeted content.
    pub digest: Digest,

    /// Size in bytes of the content.
    pub size: u64,

    /// Artifact type of the referenced manifest (index entries only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,

    /// Key-value metadata.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: Annotations,
}

impl Descriptor {
    /// Creates a new descriptor.
    ///
    /// # Examples
    ///
    /// ```
    /// use ocipack_core::{Descriptor, Digest, MediaType};
    ///
    /// let desc = Descriptor::new(
    ///     MediaType::new(MediaType::PACKAGE_TAR_LAYER),
    ///     Digest::of(b"archive"),
    ///     7,
    /// );
    /// assert_eq!(desc.size, 7);
    /// ```
    #[must_use]
    pub fn new(media_type: MediaType, digest: Digest, size: u64) -> Self {
        Self {
            media_type,
            digest,
            size,
            artifact_type: None,
            annotations: Annotations::new(),
        }
    }

    /// Describes a raw payload, computing its digest and size.
    #[must_use]
    pub fn for_bytes(media_type: MediaType, bytes: &[u8]) -> Self {
        Self::new(media_type, Digest::of(bytes), size_in_bytes(bytes))
    }

    /// Returns the descriptor of the empty JSON object config blob.
    #[must_use]
    pub fn empty_config() -> Self {
        Self::for_bytes(MediaType::empty(), EMPTY_CONFIG)
    }

    /// Adds an annotation to the descriptor.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Sets the artifact type.
    #[must_use]
    pub fn with_artifact_type(mut self, artifact_type: impl Into<String>) -> Self {
        self.artifact_type = Some(artifact_type.into());
        self
    }
}

/// A manifest document that can be pushed to a registry.
pub trait OciManifest: Serialize {
    /// Content type sent with the manifest.
    fn media_type(&self) -> &MediaType;

    /// Serializes the manifest to its canonical bytes and digests them.
    ///
    /// # Errors
    ///
    /// Returns an error if the manifest cannot be serialized.
    fn encode(&self) -> Result<EncodedManifest> {
        let bytes = canonicalize(self)?;
        Ok(EncodedManifest {
            media_type: self.media_type().clone(),
            digest: Digest::of(&bytes),
            size: size_in_bytes(&bytes),
            bytes,
        })
    }
}

/// Canonical bytes of a manifest together with their digest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedManifest {
    /// Content type of the manifest.
    pub media_type: MediaType,
    /// Digest of `bytes`.
    pub digest: Digest,
    /// Length of `bytes`.
    pub size: u64,
    /// Canonical serialized manifest.
    pub bytes: Vec<u8>,
}

impl EncodedManifest {
    /// Returns a descriptor pointing at this manifest.
    #[must_use]
    pub fn descriptor(&self) -> Descriptor {
        Descriptor::new(self.media_type.clone(), self.digest.clone(), self.size)
    }
}

/// OCI Image Manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    /// Schema version (always 2).
    pub schema_version: u32,

    /// Media type of this manifest.
    pub media_type: MediaType,

    /// Artifact type (OCI 1.1+).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact_type: Option<String>,

    /// Configuration descriptor.
    pub config: Descriptor,

    /// Layers that make up the artifact, in order.
    pub layers: Vec<Descriptor>,

    /// Subject descriptor for the referrers graph (OCI 1.1+).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<Descriptor>,

    /// Manifest annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: Annotations,
}

impl ImageManifest {
    /// Creates an image manifest with the empty config and the given layers.
    #[must_use]
    pub fn new(layers: Vec<Descriptor>) -> Self {
        Self {
            schema_version: 2,
            media_type: MediaType::image_manifest(),
            artifact_type: None,
            config: Descriptor::empty_config(),
            layers,
            subject: None,
            annotations: Annotations::new(),
        }
    }

    /// Adds an annotation to the manifest.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Returns the first layer with the given media type.
    #[must_use]
    pub fn layer(&self, media_type: &str) -> Option<&Descriptor> {
        self.layers.iter().find(|d| d.media_type.as_str() == media_type)
    }
}

impl OciManifest for ImageManifest {
    fn media_type(&self) -> &MediaType {
        &self.media_type
    }
}

/// OCI Image Index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexManifest {
    /// Schema version (always 2).
    pub schema_version: u32,

    /// Media type of this index.
    pub media_type: MediaType,

    /// Manifests referenced by this index.
    pub manifests: Vec<Descriptor>,

    /// Index annotations.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: Annotations,
}

impl IndexManifest {
    /// Creates an index over the given manifests.
    #[must_use]
    pub fn new(manifests: Vec<Descriptor>) -> Self {
        Self {
            schema_version: 2,
            media_type: MediaType::image_index(),
            manifests,
            annotations: Annotations::new(),
        }
    }

    /// Adds an annotation to the index.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

impl OciManifest for IndexManifest {
    fn media_type(&self) -> &MediaType {
        &self.media_type
    }
}
