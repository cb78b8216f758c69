//! End-to-end publish runs against a mock registry and signing service.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use ocipack_core::manifest::{PackageMetadata, StagedArchive};
use ocipack_core::Digest;
use ocipack_publish::{
    HttpAttestationSigner, PublishError, PublishRequest, Publisher, SigningError, Stage,
};
use ocipack_registry::{RegistryClient, RegistryConfig, RetryPolicy};
use wiremock::matchers::{header, method, path, path_regex};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

const REPO: &str = "acme/widget";
const SESSION: &str = "/v2/acme/widget/blobs/uploads/session-1";

struct EchoDigest;

impl Respond for EchoDigest {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        ResponseTemplate::new(201)
            .insert_header("Docker-Content-Digest", Digest::of(&request.body).as_str())
    }
}

async fn mount_blob_endpoints(server: &MockServer) {
    Mock::given(method("HEAD"))
        .respond_with(ResponseTemplate::new(404))
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/v2/{REPO}/blobs/uploads/")))
        .respond_with(ResponseTemplate::new(202).insert_header("Location", SESSION))
        .mount(server)
        .await;
    Mock::given(method("PATCH"))
        .and(path(SESSION))
        .respond_with(ResponseTemplate::new(202))
        .mount(server)
        .await;
    Mock::given(method("PUT"))
        .and(path(SESSION))
        .respond_with(ResponseTemplate::new(201))
        .mount(server)
        .await;
}

async fn mount_signing_service(server: &MockServer, bundle: &'static str) {
    Mock::given(method("POST"))
        .and(path("/attest"))
        .and(header("Authorization", "Bearer signer-token"))
        .respond_with(ResponseTemplate::new(200).set_body_string(bundle))
        .expect(1)
        .mount(server)
        .await;
}

fn staged(dir: &tempfile::TempDir, name: &str, data: &[u8]) -> StagedArchive {
    let path = dir.path().join(name);
    std::fs::write(&path, data).unwrap();
    StagedArchive::new(path, Digest::of(data).hex(), data.len() as u64)
}

fn request(dir: &tempfile::TempDir) -> PublishRequest {
    PublishRequest {
        tar: staged(dir, "widget.tar.gz", b"tarball contents"),
        zip: staged(dir, "widget.zip", b"zip contents"),
        metadata: PackageMetadata {
            repository: "Acme/Widget".to_string(),
            repository_id: "1001".to_string(),
            owner_id: "2002".to_string(),
            commit_sha: "0123456789abcdef0123456789abcdef01234567".to_string(),
            version: "2.0.0-rc.1".to_string(),
        },
        subject_name: "registry.example.com/acme/widget".to_string(),
        created_at: DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc),
    }
}

fn registry(server: &MockServer) -> RegistryClient {
    let retry = RetryPolicy::default()
        .with_initial_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(5));
    RegistryClient::new(RegistryConfig::new(server.uri(), REPO).with_retry(retry)).unwrap()
}

fn manifest_pushes(requests: &[Request]) -> Vec<String> {
    let prefix = format!("/v2/{REPO}/manifests/");
    requests
        .iter()
        .filter(|r| r.method.as_str() == "PUT")
        .filter_map(|r| r.url.path().strip_prefix(&prefix).map(ToString::to_string))
        .collect()
}

#[tokio::test]
async fn test_full_run_with_signing_service() {
    let server = MockServer::start().await;
    mount_blob_endpoints(&server).await;
    mount_signing_service(&server, r#"{"mediaType":"bundle"}"#).await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/v2/acme/widget/manifests/.+$"))
        .respond_with(EchoDigest)
        .expect(3)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let signer = HttpAttestationSigner::new(format!("{}/attest", server.uri()))
        .unwrap()
        .with_token("signer-token");
    let publisher = Publisher::new(registry(&server)).with_signer(Arc::new(signer));

    let outcome = publisher.publish(&request(&dir)).await.unwrap();
    assert_eq!(outcome.subject_tag, "2.0.0-rc.1");
    let attestation = outcome.attestation.clone().unwrap();
    assert_eq!(attestation.bundle_digest, Digest::of(br#"{"mediaType":"bundle"}"#));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(
        manifest_pushes(&requests),
        vec![
            attestation.manifest_digest.to_string(),
            outcome.subject_digest.referrer_tag(),
            "2.0.0-rc.1".to_string(),
        ]
    );

    let attest_call = requests
        .iter()
        .find(|r| r.url.path() == "/attest")
        .unwrap();
    let body: serde_json::Value = serde_json::from_slice(&attest_call.body).unwrap();
    assert_eq!(body["subjectName"], "registry.example.com/acme/widget");
    assert_eq!(body["subjectDigest"], outcome.subject_digest.as_str());
    assert_eq!(body["version"], "2.0.0-rc.1");
}

#[tokio::test]
async fn test_registry_echoing_other_digest_fails_run() {
    let server = MockServer::start().await;
    mount_blob_endpoints(&server).await;
    Mock::given(method("PUT"))
        .and(path(format!("/v2/{REPO}/manifests/2.0.0-rc.1")))
        .respond_with(ResponseTemplate::new(201).insert_header(
            "Docker-Content-Digest",
            Digest::of(b"rewritten by registry").as_str(),
        ))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let publisher = Publisher::new(registry(&server));

    let err = publisher.publish(&request(&dir)).await.unwrap_err();
    assert!(matches!(
        err,
        PublishError::DigestMismatch { stage: Stage::SubjectManifest, .. }
    ));
}

#[tokio::test]
async fn test_signing_service_rejection_fails_before_any_push() {
    let server = MockServer::start().await;
    mount_blob_endpoints(&server).await;
    Mock::given(method("POST"))
        .and(path("/attest"))
        .respond_with(ResponseTemplate::new(403).set_body_string("not allowed"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let signer = HttpAttestationSigner::new(format!("{}/attest", server.uri())).unwrap();
    let publisher = Publisher::new(registry(&server)).with_signer(Arc::new(signer));

    let err = publisher.publish(&request(&dir)).await.unwrap_err();
    assert!(matches!(
        err,
        PublishError::Attestation {
            source: SigningError::Service { status: 403, .. },
            ..
        }
    ));

    let requests = server.received_requests().await.unwrap();
    assert!(requests.iter().all(|r| r.url.path() == "/attest"));
}

#[tokio::test]
async fn test_rejected_referrer_index_is_reported() {
    let server = MockServer::start().await;
    mount_blob_endpoints(&server).await;
    mount_signing_service(&server, "bundle").await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/v2/acme/widget/manifests/sha256-[0-9a-f]{64}$"))
        .respond_with(ResponseTemplate::new(400).set_body_string("TAG_INVALID"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path_regex(r"^/v2/acme/widget/manifests/sha256:[0-9a-f]{64}$"))
        .respond_with(EchoDigest)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let signer = HttpAttestationSigner::new(format!("{}/attest", server.uri()))
        .unwrap()
        .with_token("signer-token");
    let publisher = Publisher::new(registry(&server)).with_signer(Arc::new(signer));

    let err = publisher.publish(&request(&dir)).await.unwrap_err();
    match err {
        PublishError::Registry { stage, target, .. } => {
            assert_eq!(stage, Stage::ReferrerIndex);
            assert!(target.starts_with("sha256-"));
        }
        other => panic!("unexpected error: {other}"),
    }
}
