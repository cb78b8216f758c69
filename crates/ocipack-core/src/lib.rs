//! # ocipack Core
//!
//! Content addressing and manifest construction for ocipack.
//!
//! This crate provides the pure, I/O-free part of publishing a package to an
//! OCI registry:
//!
//! - [`digest`] - canonical JSON encoding and `sha256:` digests
//! - [`oci`] - OCI descriptor, image manifest and index types
//! - [`manifest`] - builders for package, attestation and referrer-index manifests
//! - [`version`] - semantic version tags parsed from git refs
//!
//! ## Example
//!
//! ```rust
//! use chrono::Utc;
//! use ocipack_core::manifest::{build_package_manifest, PackageMetadata, StagedArchive};
//! use ocipack_core::OciManifest;
//!
//! let tar = StagedArchive::new("pkg.tar.gz", "a".repeat(64), 100);
//! let zip = StagedArchive::new("pkg.zip", "b".repeat(64), 200);
//! let metadata = PackageMetadata {
//!     repository: "acme/widget".to_string(),
//!     repository_id: "1".to_string(),
//!     owner_id: "2".to_string(),
//!     commit_sha: "abc".to_string(),
//!     version: "1.2.3".to_string(),
//! };
//!
//! let manifest = build_package_manifest(&tar, &zip, &metadata, &Utc::now()).unwrap();
//! let encoded = manifest.encode().unwrap();
//! println!("subject digest: {}", encoded.digest);
//! println!("referrer tag:   {}", encoded.digest.referrer_tag());
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod digest;
pub mod error;
pub mod manifest;
pub mod oci;
pub mod version;

#[cfg(test)]
mod proptest_tests;

// Re-export main types at crate root
pub use digest::{canonicalize, size_in_bytes, Digest, Hasher};
pub use error::{Error, Result};
pub use manifest::{BundleKind, PackageMetadata, StagedArchive};
pub use oci::{Descriptor, EncodedManifest, ImageManifest, IndexManifest, MediaType, OciManifest};
pub use version::PackageVersion;
