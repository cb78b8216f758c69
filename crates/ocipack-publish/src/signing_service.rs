//! Client for a remote attestation signing service.

use std::time::Duration;

use async_trait::async_trait;
use ocipack_core::MediaType;
use serde::Serialize;

use crate::attestation::{
    AttestationBundle, AttestationSigner, AttestationSubject, SigningError, SLSA_PROVENANCE_V1,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AttestRequest<'a> {
    subject_name: &'a str,
    subject_digest: &'a str,
    version: &'a str,
}

/// Requests sigstore bundles from a signing service over HTTP.
///
/// The service receives `{"subjectName", "subjectDigest", "version"}` and
/// answers with the bundle bytes, which are uploaded without inspection.
#[derive(Debug, Clone)]
pub struct HttpAttestationSigner {
    endpoint: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl HttpAttestationSigner {
    /// Creates a signer posting to `endpoint`.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Transport`] if the HTTP client cannot be built.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, SigningError> {
        let endpoint = endpoint.into();
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(format!("ocipack-publish/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|source| SigningError::Transport {
                url: endpoint.clone(),
                source,
            })?;

        Ok(Self {
            endpoint,
            token: None,
            http,
        })
    }

    /// Sends `token` as a bearer credential with every request.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }
}

#[async_trait]
impl AttestationSigner for HttpAttestationSigner {
    async fn attest(&self, subject: &AttestationSubject) -> Result<AttestationBundle, SigningError> {
        let body = AttestRequest {
            subject_name: &subject.name,
            subject_digest: subject.digest.as_str(),
            version: &subject.version,
        };

        let mut request = self.http.post(&self.endpoint).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let transport = |source| SigningError::Transport {
            url: self.endpoint.clone(),
            source,
        };
        let response = request.send().await.map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SigningError::Service {
                status: status.as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let bytes = response.bytes().await.map_err(transport)?;
        if bytes.is_empty() {
            return Err(SigningError::EmptyBundle);
        }

        tracing::debug!(subject = %subject.digest, size = bytes.len(), "received attestation bundle");

        Ok(AttestationBundle {
            bytes: bytes.to_vec(),
            media_type: MediaType::SIGSTORE_BUNDLE.to_string(),
            predicate_type: SLSA_PROVENANCE_V1.to_string(),
        })
    }
}
