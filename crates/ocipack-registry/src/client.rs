//! OCI Distribution API client for blob and manifest uploads.
//!
//! This module provides the push side of the distribution protocol:
//! existence checks, session-based blob uploads and manifest pushes.

use async_trait::async_trait;
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE, LOCATION};
use reqwest::{Method, RequestBuilder, Response, StatusCode};

use ocipack_core::{Digest, EncodedManifest};

use crate::auth;
use crate::config::RegistryConfig;
use crate::error::RegistryError;

/// Header carrying the digest the registry computed for pushed content.
pub const CONTENT_DIGEST_HEADER: &str = "docker-content-digest";

/// Whether a blob had to be transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobStatus {
    /// The registry already had the blob; nothing was sent.
    AlreadyPresent,
    /// The blob was uploaded.
    Uploaded,
}

/// Push operations the publisher needs from a registry.
///
/// Implementations return the registry's digest for pushed manifests
/// unmodified; comparing it with the local digest is the caller's job.
#[async_trait]
pub trait Registry: Send + Sync {
    /// Makes sure a blob exists, uploading it if the registry lacks it.
    async fn ensure_blob(&self, digest: &Digest, data: &[u8]) -> Result<BlobStatus, RegistryError>;

    /// Pushes a manifest, tagged when `tag` is given and addressed by its
    /// digest otherwise, and returns the digest reported by the registry.
    async fn push_manifest(
        &self,
        manifest: &EncodedManifest,
        tag: Option<&str>,
    ) -> Result<String, RegistryError>;
}

/// Client for pushing to an OCI-compatible registry.
#[derive(Debug)]
pub struct RegistryClient {
    config: RegistryConfig,
    http: reqwest::Client,
    authorization: Option<HeaderValue>,
}

impl RegistryClient {
    /// Creates a client that sends the configured credentials as-is.
    ///
    /// Use [`RegistryClient::connect`] to exchange credentials for a token.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created or the
    /// credentials cannot be encoded as a header.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ocipack_registry::{RegistryClient, RegistryConfig};
    ///
    /// let config = RegistryConfig::new("https://registry.example.com", "acme/widget");
    /// let client = RegistryClient::new(config)?;
    /// # Ok::<(), ocipack_registry::RegistryError>(())
    /// ```
    pub fn new(config: RegistryConfig) -> Result<Self, RegistryError> {
        let http = Self::build_http_client(&config)?;
        let authorization = auth::static_authorization(&config.auth)?;

        Ok(Self {
            config,
            http,
            authorization,
        })
    }

    /// Creates a client and performs the credential exchange for this run.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::AuthenticationFailed`] if the registry or
    /// its token service rejects the credentials. This is never retried.
    pub async fn connect(config: RegistryConfig) -> Result<Self, RegistryError> {
        let http = Self::build_http_client(&config)?;
        let authorization = auth::exchange(&http, &config).await?;

        tracing::info!(
            registry = %config.url,
            repository = %config.repository,
            authenticated = authorization.is_some(),
            "connected to registry"
        );

        Ok(Self {
            config,
            http,
            authorization,
        })
    }

    /// Returns the registry configuration.
    #[must_use]
    pub const fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Checks if a blob exists in the repository.
    ///
    /// # Errors
    ///
    /// Returns an error if the registry cannot be contacted or answers with
    /// anything other than 200 or 404.
    pub async fn blob_exists(&self, digest: &Digest) -> Result<bool, RegistryError> {
        self.config
            .retry
            .run(&format!("check blob {digest}"), || self.try_blob_exists(digest))
            .await
    }

    /// Uploads a blob through an upload session.
    ///
    /// The session is initiated with `POST`, the content streamed with
    /// `PATCH` and committed with `PUT ?digest=`. A transient failure
    /// restarts the whole session.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::BlobUploadFailed`] naming the digest if any
    /// step is rejected.
    pub async fn upload_blob(&self, digest: &Digest, data: &[u8]) -> Result<(), RegistryError> {
        self.config
            .retry
            .run(&format!("upload blob {digest}"), || {
                self.try_upload_blob(digest, data)
            })
            .await
    }

    /// Pushes raw manifest bytes under a tag or digest reference.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::ManifestPushFailed`] if the registry rejects
    /// the manifest, or [`RegistryError::MissingDigest`] if it accepts the
    /// manifest without reporting a digest.
    pub async fn push_manifest_bytes(
        &self,
        reference: &str,
        media_type: &str,
        body: &[u8],
    ) -> Result<String, RegistryError> {
        self.config
            .retry
            .run(&format!("push manifest {reference}"), || {
                self.try_push_manifest(reference, media_type, body)
            })
            .await
    }

    async fn try_blob_exists(&self, digest: &Digest) -> Result<bool, RegistryError> {
        let url = self.config.endpoint(&format!("blobs/{digest}"));
        let response = self.request(Method::HEAD, &url).send().await?;

        match response.status() {
            s if s.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(RegistryError::HttpError {
                operation: format!("check blob {digest}"),
                status: status.as_u16(),
                message: Self::error_body(response).await,
            }),
        }
    }

    async fn try_upload_blob(&self, digest: &Digest, data: &[u8]) -> Result<(), RegistryError> {
        // Initiate
        let start_url = self.config.endpoint("blobs/uploads/");
        let response = self
            .request(Method::POST, &start_url)
            .header(CONTENT_LENGTH, 0)
            .send()
            .await?;

        if response.status() != StatusCode::ACCEPTED {
            return Err(Self::upload_error(digest, "start upload", response).await);
        }
        let mut location = self.location(digest, &response)?;

        // Stream
        if !data.is_empty() {
            let response = self
                .request(Method::PATCH, location.as_str())
                .header(CONTENT_TYPE, "application/octet-stream")
                .header("Content-Range", format!("0-{}", data.len() - 1))
                .body(data.to_vec())
                .send()
                .await?;

            if response.status() != StatusCode::ACCEPTED {
                return Err(Self::upload_error(digest, "stream content", response).await);
            }
            if response.headers().contains_key(LOCATION) {
                location = self.location(digest, &response)?;
            }
        }

        // Commit
        location
            .query_pairs_mut()
            .append_pair("digest", digest.as_str());
        let response = self
            .request(Method::PUT, location.as_str())
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, 0)
            .send()
            .await?;

        if response.status() != StatusCode::CREATED {
            return Err(Self::upload_error(digest, "commit upload", response).await);
        }

        tracing::debug!(digest = %digest, size = data.len(), "uploaded blob");
        Ok(())
    }

    async fn try_push_manifest(
        &self,
        reference: &str,
        media_type: &str,
        body: &[u8],
    ) -> Result<String, RegistryError> {
        let url = self.config.endpoint(&format!("manifests/{reference}"));
        let response = self
            .request(Method::PUT, &url)
            .header(CONTENT_TYPE, media_type)
            .body(body.to_vec())
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            return Err(RegistryError::ManifestPushFailed {
                reference: reference.to_string(),
                status,
                message: Self::error_body(response).await,
            });
        }

        let digest = response
            .headers()
            .get(CONTENT_DIGEST_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| RegistryError::MissingDigest {
                reference: reference.to_string(),
            })?;

        tracing::debug!(reference, media_type, returned_digest = %digest, "pushed manifest");
        Ok(digest)
    }

    /// Resolves the `Location` header of an upload response against the registry URL.
    fn location(&self, digest: &Digest, response: &Response) -> Result<url::Url, RegistryError> {
        let raw = response
            .headers()
            .get(LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| RegistryError::InvalidLocation {
                digest: digest.to_string(),
                location: String::new(),
            })?;

        let base = url::Url::parse(&self.config.url).map_err(|_| RegistryError::InvalidUrl {
            url: self.config.url.clone(),
        })?;

        base.join(raw).map_err(|_| RegistryError::InvalidLocation {
            digest: digest.to_string(),
            location: raw.to_string(),
        })
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.authorization {
            Some(value) => builder.header(AUTHORIZATION, value.clone()),
            None => builder,
        }
    }

    async fn upload_error(digest: &Digest, step: &str, response: Response) -> RegistryError {
        let status = response.status().as_u16();
        let body = Self::error_body(response).await;
        RegistryError::BlobUploadFailed {
            digest: digest.to_string(),
            status,
            message: format!("{step}: {body}"),
        }
    }

    async fn error_body(response: Response) -> String {
        response.text().await.unwrap_or_default()
    }

    /// Builds the HTTP client with proper configuration.
    fn build_http_client(config: &RegistryConfig) -> Result<reqwest::Client, RegistryError> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent);

        if let Some(ref tls) = config.tls {
            if tls.insecure_skip_verify {
                tracing::warn!(registry = %config.url, "TLS certificate verification disabled");
                builder = builder.danger_accept_invalid_certs(true);
            }

            if let Some(ref ca_cert) = tls.ca_cert {
                let cert_pem = std::fs::read(ca_cert).map_err(|e| RegistryError::IoError {
                    path: ca_cert.clone(),
                    source: e,
                })?;
                let cert = reqwest::Certificate::from_pem(&cert_pem).map_err(|e| {
                    RegistryError::InvalidTls {
                        message: format!("Invalid CA certificate: {e}"),
                    }
                })?;
                builder = builder.add_root_certificate(cert);
            }
        }

        builder.build().map_err(|e| RegistryError::ConnectionFailed {
            url: config.url.clone(),
            source: e,
        })
    }
}

#[async_trait]
impl Registry for RegistryClient {
    async fn ensure_blob(&self, digest: &Digest, data: &[u8]) -> Result<BlobStatus, RegistryError> {
        if self.blob_exists(digest).await? {
            tracing::debug!(digest = %digest, "blob already present");
            return Ok(BlobStatus::AlreadyPresent);
        }

        self.upload_blob(digest, data).await?;
        Ok(BlobStatus::Uploaded)
    }

    async fn push_manifest(
        &self,
        manifest: &EncodedManifest,
        tag: Option<&str>,
    ) -> Result<String, RegistryError> {
        let reference = tag.map_or_else(|| manifest.digest.to_string(), ToString::to_string);
        self.push_manifest_bytes(&reference, manifest.media_type.as_str(), &manifest.bytes)
            .await
    }
}
