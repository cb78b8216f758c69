//! # ocipack Publish
//!
//! Publishes versioned packages as OCI artifacts, with an optional
//! provenance attestation linked through the referrer tag convention.
//!
//! ## Features
//!
//! - **Ordered uploads**: blobs before the manifests that reference them,
//!   the attestation manifest before its referrer index
//! - **Digest verification**: every digest the registry returns is checked
//!   against the locally computed one
//! - **Pluggable signing**: a local Ed25519 DSSE signer or a remote signing
//!   service behind the [`AttestationSigner`] trait
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ocipack_core::manifest::{PackageMetadata, StagedArchive};
//! use ocipack_publish::dsse::{Ed25519DsseSigner, SigningKeyPair};
//! use ocipack_publish::{PublishRequest, Publisher};
//! use ocipack_registry::{RegistryClient, RegistryConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RegistryConfig::new("https://registry.example.com", "acme/widget");
//!     let registry = RegistryClient::connect(config).await?;
//!
//!     let signer = Ed25519DsseSigner::new(&SigningKeyPair::generate(), "release");
//!     let publisher = Publisher::new(registry).with_signer(Arc::new(signer));
//!
//!     let request = PublishRequest {
//!         tar: StagedArchive::new("dist/widget.tar.gz", "<sha256>", 1024),
//!         zip: StagedArchive::new("dist/widget.zip", "<sha256>", 1100),
//!         metadata: PackageMetadata {
//!             repository: "acme/widget".to_string(),
//!             repository_id: "1001".to_string(),
//!             owner_id: "2002".to_string(),
//!             commit_sha: "0123abcd".to_string(),
//!             version: "1.2.3".to_string(),
//!         },
//!         subject_name: "registry.example.com/acme/widget".to_string(),
//!         created_at: chrono::Utc::now(),
//!     };
//!
//!     let outcome = publisher.publish(&request).await?;
//!     println!("published {}", outcome.subject_digest);
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod attestation;
pub mod dsse;
mod error;
mod file_set;
mod publisher;
mod signing_service;

pub use attestation::{
    AttestationBundle, AttestationSigner, AttestationSubject, SigningError, SLSA_PROVENANCE_V1,
};
pub use dsse::{Ed25519DsseSigner, SigningKeyPair};
pub use error::{PublishError, Stage};
pub use file_set::FileSet;
pub use publisher::{
    AttestationOutcome, PublishOptions, PublishOutcome, PublishRequest, Publisher,
};
pub use signing_service::HttpAttestationSigner;
