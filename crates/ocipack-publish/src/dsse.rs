//! Local provenance signing with Ed25519 and DSSE.
//!
//! The signer wraps an in-toto v1 statement about the package manifest in a
//! DSSE envelope. The signature covers the DSSE pre-authentication encoding
//! of the payload, not the raw payload, so the payload type is bound to the
//! signature as well.
//!
//! # Example
//!
//! ```rust
//! use ocipack_core::Digest;
//! use ocipack_publish::dsse::{DsseEnvelope, Ed25519DsseSigner, SigningKeyPair};
//! use ocipack_publish::AttestationSubject;
//!
//! let key_pair = SigningKeyPair::generate();
//! let signer = Ed25519DsseSigner::new(&key_pair, "release-2026");
//!
//! let subject = AttestationSubject {
//!     name: "registry.example.com/acme/widget".to_string(),
//!     version: "1.2.3".to_string(),
//!     digest: Digest::of(b"manifest"),
//! };
//! let envelope = signer.sign_statement(&signer.statement(&subject))?;
//!
//! let statement = envelope.verify(&key_pair.verifying_key())?;
//! assert_eq!(statement.subject[0].name, subject.name);
//! # Ok::<(), ocipack_publish::SigningError>(())
//! ```

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use ocipack_core::MediaType;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::attestation::{
    AttestationBundle, AttestationSigner, AttestationSubject, SigningError, SLSA_PROVENANCE_V1,
};

/// Payload type of in-toto statements inside a DSSE envelope.
pub const IN_TOTO_PAYLOAD_TYPE: &str = "application/vnd.in-toto+json";

/// `_type` of in-toto v1 statements.
pub const IN_TOTO_STATEMENT_V1: &str = "https://in-toto.io/Statement/v1";

/// Build type recorded in the provenance predicate.
pub const BUILD_TYPE: &str = "https://ocipack.dev/publish/v1";

/// An Ed25519 key pair for signing and verification.
#[derive(Debug)]
pub struct SigningKeyPair {
    signing_key: SigningKey,
}

impl SigningKeyPair {
    /// Generates a new random key pair.
    #[must_use]
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    /// Creates a key pair from a 32-byte seed.
    ///
    /// # Errors
    ///
    /// Returns an error if the seed is not exactly 32 bytes.
    pub fn from_seed(seed: &[u8]) -> Result<Self, SigningError> {
        let seed: [u8; 32] = seed
            .try_into()
            .map_err(|_| SigningError::InvalidKeyFormat("seed must be 32 bytes".to_string()))?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// Creates a key pair from a base64-encoded seed.
    ///
    /// # Errors
    ///
    /// Returns an error if the key format is invalid.
    pub fn from_base64(encoded: &str) -> Result<Self, SigningError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| SigningError::InvalidKeyFormat(e.to_string()))?;
        Self::from_seed(&bytes)
    }

    /// Returns the verifying (public) key.
    #[must_use]
    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Exports the private seed as base64.
    #[must_use]
    pub fn to_base64(&self) -> String {
        BASE64.encode(self.signing_key.to_bytes())
    }

    /// Exports the public key as base64.
    #[must_use]
    pub fn public_key_base64(&self) -> String {
        BASE64.encode(self.verifying_key().to_bytes())
    }
}

/// Decodes a base64 Ed25519 public key.
///
/// # Errors
///
/// Returns an error if the input is not a base64 encoded 32-byte point.
pub fn verifying_key_from_base64(encoded: &str) -> Result<VerifyingKey, SigningError> {
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|e| SigningError::InvalidKeyFormat(e.to_string()))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| SigningError::InvalidKeyFormat("public key must be 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&bytes).map_err(|e| SigningError::InvalidKeyFormat(e.to_string()))
}

/// DSSE pre-authentication encoding.
///
/// `"DSSEv1" SP len(type) SP type SP len(body) SP body`, lengths in ASCII
/// decimal bytes.
#[must_use]
pub fn pae(payload_type: &str, payload: &[u8]) -> Vec<u8> {
    let mut out = format!(
        "DSSEv1 {} {payload_type} {} ",
        payload_type.len(),
        payload.len()
    )
    .into_bytes();
    out.extend_from_slice(payload);
    out
}

/// An in-toto v1 statement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Statement {
    /// Statement schema identifier.
    #[serde(rename = "_type")]
    pub statement_type: String,
    /// Artifacts the predicate is about.
    pub subject: Vec<ResourceDescriptor>,
    /// Predicate schema identifier.
    #[serde(rename = "predicateType")]
    pub predicate_type: String,
    /// Predicate content.
    pub predicate: serde_json::Value,
}

/// A named artifact and its digests, keyed by algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    /// Artifact name.
    pub name: String,
    /// Digests keyed by algorithm, hex encoded.
    pub digest: BTreeMap<String, String>,
}

/// A DSSE envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DsseEnvelope {
    /// Base64 payload.
    pub payload: String,
    /// Media type of the decoded payload.
    pub payload_type: String,
    /// Signatures over the pre-authentication encoding.
    pub signatures: Vec<DsseSignature>,
}

/// One DSSE signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DsseSignature {
    /// Identifier of the signing key.
    pub keyid: String,
    /// Base64 signature.
    pub sig: String,
}

impl DsseEnvelope {
    /// Verifies that at least one signature was made by `key` and returns
    /// the decoded statement.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::InvalidSignature`] if no signature verifies
    /// and [`SigningError::Encoding`] if the payload cannot be decoded.
    pub fn verify(&self, key: &VerifyingKey) -> Result<Statement, SigningError> {
        let payload = BASE64
            .decode(&self.payload)
            .map_err(|e| SigningError::Encoding(e.to_string()))?;
        let message = pae(&self.payload_type, &payload);

        let verified = self.signatures.iter().any(|s| {
            BASE64
                .decode(&s.sig)
                .ok()
                .and_then(|bytes| <[u8; 64]>::try_from(bytes).ok())
                .is_some_and(|bytes| key.verify(&message, &Signature::from_bytes(&bytes)).is_ok())
        });
        if !verified {
            return Err(SigningError::InvalidSignature);
        }

        serde_json::from_slice(&payload).map_err(|e| SigningError::Encoding(e.to_string()))
    }
}

/// Signs SLSA provenance for published packages with a local Ed25519 key.
#[derive(Debug)]
pub struct Ed25519DsseSigner {
    signing_key: SigningKey,
    key_id: String,
    builder_id: String,
}

impl Ed25519DsseSigner {
    /// Creates a signer from a key pair.
    #[must_use]
    pub fn new(key_pair: &SigningKeyPair, key_id: impl Into<String>) -> Self {
        Self {
            signing_key: key_pair.signing_key.clone(),
            key_id: key_id.into(),
            builder_id: format!("https://ocipack.dev/cli@{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Sets the builder identity recorded in the provenance.
    #[must_use]
    pub fn with_builder_id(mut self, builder_id: impl Into<String>) -> Self {
        self.builder_id = builder_id.into();
        self
    }

    /// Returns the key ID for this signer.
    #[must_use]
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    /// Builds the provenance statement for a subject.
    #[must_use]
    pub fn statement(&self, subject: &AttestationSubject) -> Statement {
        let digest = BTreeMap::from([(
            subject.digest.algorithm().to_string(),
            subject.digest.hex().to_string(),
        )]);

        Statement {
            statement_type: IN_TOTO_STATEMENT_V1.to_string(),
            subject: vec![ResourceDescriptor {
                name: subject.name.clone(),
                digest,
            }],
            predicate_type: SLSA_PROVENANCE_V1.to_string(),
            predicate: serde_json::json!({
                "buildDefinition": {
                    "buildType": BUILD_TYPE,
                    "externalParameters": {
                        "artifact": subject.name,
                        "version": subject.version,
                    },
                },
                "runDetails": {
                    "builder": { "id": self.builder_id },
                },
            }),
        }
    }

    /// Signs a statement into a DSSE envelope.
    ///
    /// # Errors
    ///
    /// Returns [`SigningError::Encoding`] if the statement cannot be serialized.
    pub fn sign_statement(&self, statement: &Statement) -> Result<DsseEnvelope, SigningError> {
        let payload = ocipack_core::canonicalize(statement)
            .map_err(|e| SigningError::Encoding(e.to_string()))?;
        let signature: Signature = self.signing_key.sign(&pae(IN_TOTO_PAYLOAD_TYPE, &payload));

        Ok(DsseEnvelope {
            payload: BASE64.encode(&payload),
            payload_type: IN_TOTO_PAYLOAD_TYPE.to_string(),
            signatures: vec![DsseSignature {
                keyid: self.key_id.clone(),
                sig: BASE64.encode(signature.to_bytes()),
            }],
        })
    }
}

#[async_trait]
impl AttestationSigner for Ed25519DsseSigner {
    async fn attest(&self, subject: &AttestationSubject) -> Result<AttestationBundle, SigningError> {
        let envelope = self.sign_statement(&self.statement(subject))?;
        let bytes = ocipack_core::canonicalize(&envelope)
            .map_err(|e| SigningError::Encoding(e.to_string()))?;

        tracing::debug!(subject = %subject.digest, key_id = %self.key_id, "signed provenance");

        Ok(AttestationBundle {
            bytes,
            media_type: MediaType::DSSE_ENVELOPE.to_string(),
            predicate_type: SLSA_PROVENANCE_V1.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ocipack_core::Digest;

    fn subject() -> AttestationSubject {
        AttestationSubject {
            name: "registry.example.com/acme/widget".to_string(),
            version: "1.2.3".to_string(),
            digest: Digest::of(b"package manifest"),
        }
    }

    #[test]
    fn test_pae_encoding() {
        assert_eq!(
            pae("http://example.com/HelloWorld", b"hello world"),
            b"DSSEv1 29 http://example.com/HelloWorld 11 hello world".to_vec()
        );
        assert_eq!(pae("", b""), b"DSSEv1 0  0 ".to_vec());
    }

    #[test]
    fn test_key_pair_round_trip() {
        let key_pair = SigningKeyPair::generate();
        let reimported = SigningKeyPair::from_base64(&key_pair.to_base64()).unwrap();
        assert_eq!(reimported.verifying_key(), key_pair.verifying_key());

        let public = verifying_key_from_base64(&key_pair.public_key_base64()).unwrap();
        assert_eq!(public, key_pair.verifying_key());
    }

    #[test]
    fn test_invalid_seed_rejected() {
        assert!(matches!(
            SigningKeyPair::from_seed(&[0u8; 16]),
            Err(SigningError::InvalidKeyFormat(_))
        ));
        assert!(SigningKeyPair::from_base64("not base64!").is_err());
    }

    #[test]
    fn test_statement_names_subject_digest() {
        let key_pair = SigningKeyPair::generate();
        let signer = Ed25519DsseSigner::new(&key_pair, "k1").with_builder_id("https://ci.example.com");
        let statement = signer.statement(&subject());

        assert_eq!(statement.statement_type, IN_TOTO_STATEMENT_V1);
        assert_eq!(statement.predicate_type, SLSA_PROVENANCE_V1);
        assert_eq!(statement.subject[0].digest["sha256"], subject().digest.hex());
        assert_eq!(
            statement.predicate["buildDefinition"]["externalParameters"]["version"],
            "1.2.3"
        );
        assert_eq!(
            statement.predicate["runDetails"]["builder"]["id"],
            "https://ci.example.com"
        );
    }

    #[test]
    fn test_sign_and_verify() {
        let key_pair = SigningKeyPair::generate();
        let signer = Ed25519DsseSigner::new(&key_pair, "k1");
        let statement = signer.statement(&subject());

        let envelope = signer.sign_statement(&statement).unwrap();
        assert_eq!(envelope.payload_type, IN_TOTO_PAYLOAD_TYPE);
        assert_eq!(envelope.signatures[0].keyid, "k1");
        assert_eq!(envelope.verify(&key_pair.verifying_key()).unwrap(), statement);
    }

    #[test]
    fn test_verify_fails_with_wrong_key() {
        let signer = Ed25519DsseSigner::new(&SigningKeyPair::generate(), "k1");
        let envelope = signer.sign_statement(&signer.statement(&subject())).unwrap();

        let other = SigningKeyPair::generate();
        assert!(matches!(
            envelope.verify(&other.verifying_key()),
            Err(SigningError::InvalidSignature)
        ));
    }

    #[test]
    fn test_verify_fails_when_payload_type_changes() {
        let key_pair = SigningKeyPair::generate();
        let signer = Ed25519DsseSigner::new(&key_pair, "k1");
        let mut envelope = signer.sign_statement(&signer.statement(&subject())).unwrap();

        envelope.payload_type = "application/json".to_string();
        assert!(envelope.verify(&key_pair.verifying_key()).is_err());
    }

    #[tokio::test]
    async fn test_attest_is_deterministic() {
        let key_pair = SigningKeyPair::from_seed(&[7u8; 32]).unwrap();
        let signer = Ed25519DsseSigner::new(&key_pair, "k1");

        let first = signer.attest(&subject()).await.unwrap();
        let second = signer.attest(&subject()).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.media_type, MediaType::DSSE_ENVELOPE);

        let envelope: DsseEnvelope = serde_json::from_slice(&first.bytes).unwrap();
        assert!(envelope.verify(&key_pair.verifying_key()).is_ok());
    }
}
