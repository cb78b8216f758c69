//! # ocipack Registry
//!
//! Push-side OCI Distribution client for ocipack packages.
//!
//! This crate uploads blobs and manifests to OCI-compatible registries
//! (Docker Registry, Harbor, GHCR, etc.). It knows nothing about packages
//! or attestations; it moves bytes addressed by digest.
//!
//! ## Features
//!
//! - **Blob uploads**: existence check, then `POST`/`PATCH`/`PUT` upload session
//! - **Manifest pushes**: by tag or by digest, returning the registry's digest
//! - **Token exchange**: basic credentials traded once for a push-scoped token
//! - **Retries**: bounded exponential backoff for transient failures only
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ocipack_core::Digest;
//! use ocipack_registry::{Registry, RegistryAuth, RegistryClient, RegistryConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RegistryConfig::new("https://registry.example.com", "acme/widget")
//!         .with_auth(RegistryAuth::basic("ci", "secret"));
//!
//!     let client = RegistryClient::connect(config).await?;
//!
//!     let data = b"{}";
//!     client.ensure_blob(&Digest::of(data), data).await?;
//!
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod auth;
mod client;
mod config;
mod error;
mod retry;

pub use client::{BlobStatus, Registry, RegistryClient, CONTENT_DIGEST_HEADER};
pub use config::{RegistryAuth, RegistryConfig, TlsConfig};
pub use error::RegistryError;
pub use retry::{Retryable, RetryPolicy};
