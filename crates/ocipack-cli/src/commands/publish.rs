//! Publish command implementation.
//!
//! Publishes staged package archives to an OCI-compatible registry and,
//! unless disabled, attaches a provenance attestation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};
use tokio::io::AsyncReadExt;
use tracing::info;

use ocipack_core::manifest::{PackageMetadata, StagedArchive};
use ocipack_core::{Hasher, PackageVersion};
use ocipack_publish::{
    AttestationSigner, Ed25519DsseSigner, HttpAttestationSigner, PublishOptions, PublishOutcome,
    PublishRequest, Publisher, SigningKeyPair,
};
use ocipack_registry::{RegistryAuth, RegistryClient, RegistryConfig, RetryPolicy, TlsConfig};

/// Output format for the publish result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable summary
    Text,
    /// Outcome as JSON on stdout
    Json,
}

/// Arguments for the publish command.
#[derive(Args)]
pub struct PublishArgs {
    /// Git ref being released (e.g. `refs/tags/v1.2.3`)
    #[arg(long = "ref", env = "OCIPACK_REF")]
    pub git_ref: String,

    /// Commit the archives were built from
    #[arg(long, env = "OCIPACK_COMMIT_SHA")]
    pub commit_sha: String,

    /// Source repository as `owner/name`
    #[arg(long, env = "OCIPACK_REPOSITORY")]
    pub repository: String,

    /// Stable id of the source repository
    #[arg(long, env = "OCIPACK_REPOSITORY_ID")]
    pub repository_id: String,

    /// Stable id of the repository owner
    #[arg(long, env = "OCIPACK_OWNER_ID")]
    pub owner_id: String,

    /// Registry URL (e.g., `<https://registry.example.com>`)
    #[arg(short, long, env = "OCIPACK_REGISTRY_URL")]
    pub registry: String,

    /// Registry repository to push to (defaults to the source repository)
    #[arg(long, env = "OCIPACK_REGISTRY_REPOSITORY")]
    pub registry_repository: Option<String>,

    /// Staged tarball
    #[arg(long, env = "OCIPACK_TAR")]
    pub tar: PathBuf,

    /// Staged zip archive
    #[arg(long, env = "OCIPACK_ZIP")]
    pub zip: PathBuf,

    /// Bearer token for authentication
    #[arg(long, env = "OCIPACK_REGISTRY_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Username for basic authentication
    #[arg(short, long, env = "OCIPACK_REGISTRY_USERNAME")]
    pub username: Option<String>,

    /// Password for basic authentication
    #[arg(long, env = "OCIPACK_REGISTRY_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Publish without an attestation (hosts without a signing service)
    #[arg(long, env = "OCIPACK_ENTERPRISE")]
    pub enterprise: bool,

    /// Path to a base64 Ed25519 private key for local signing
    #[arg(long, conflicts_with_all = ["signing_key", "signer_url"])]
    pub signing_key_file: Option<PathBuf>,

    /// Base64 Ed25519 private key for local signing
    #[arg(long, env = "OCIPACK_SIGNING_KEY", hide_env_values = true, conflicts_with = "signer_url")]
    pub signing_key: Option<String>,

    /// Key ID recorded in local signatures
    #[arg(long, default_value = "default")]
    pub key_id: String,

    /// URL of a signing service that returns sigstore bundles
    #[arg(long, env = "OCIPACK_SIGNER_URL")]
    pub signer_url: Option<String>,

    /// Bearer token for the signing service
    #[arg(long, env = "OCIPACK_SIGNER_TOKEN", hide_env_values = true)]
    pub signer_token: Option<String>,

    /// Path to an additional CA certificate (PEM) for the registry
    #[arg(long)]
    pub ca_cert: Option<PathBuf>,

    /// Skip TLS certificate verification
    #[arg(long)]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(long, default_value = "60")]
    pub timeout: u64,

    /// Attempts per registry request, including the first
    #[arg(long, default_value = "3")]
    pub retries: u32,

    /// Overall limit for the run in seconds
    #[arg(long, env = "OCIPACK_RUN_TIMEOUT")]
    pub run_timeout: Option<u64>,

    /// Output format
    #[arg(long, value_enum, default_value = "text")]
    pub format: OutputFormat,
}

/// Runs the publish command.
///
/// # Errors
///
/// Returns an error if:
/// - The ref is not a release tag
/// - A staged archive cannot be read
/// - Registry authentication fails
/// - Signing, an upload, or digest verification fails
pub async fn run(args: &PublishArgs) -> Result<()> {
    let version = PackageVersion::from_ref(&args.git_ref).context("Not a publishable ref")?;
    let repository = args
        .registry_repository
        .clone()
        .unwrap_or_else(|| args.repository.clone());

    info!(
        registry = %args.registry,
        repository = %repository,
        version = %version,
        attestations = !args.enterprise,
        "Publishing package"
    );

    let tar = stage_archive(&args.tar).await?;
    let zip = stage_archive(&args.zip).await?;
    let signer = build_signer(args)?;

    let config = registry_config(args, &repository)?;
    let client = RegistryClient::connect(config)
        .await
        .context("Failed to authenticate with registry")?;

    let mut options = PublishOptions::default();
    if let Some(secs) = args.run_timeout {
        options = options.with_run_timeout(Duration::from_secs(secs));
    }

    let mut publisher = Publisher::new(client).with_options(options);
    if let Some(signer) = signer {
        publisher = publisher.with_signer(signer);
    }

    let request = PublishRequest {
        tar,
        zip,
        metadata: PackageMetadata {
            repository: args.repository.clone(),
            repository_id: args.repository_id.clone(),
            owner_id: args.owner_id.clone(),
            commit_sha: args.commit_sha.clone(),
            version: version.tag(),
        },
        subject_name: subject_name(&args.registry, &repository)?,
        created_at: chrono::Utc::now(),
    };

    let outcome = match publisher.publish(&request).await {
        Ok(outcome) => outcome,
        Err(e) if e.is_unauthorized() => {
            return Err(anyhow::Error::new(e).context(
                "Registry rejected the credentials; check --token or --username/--password",
            ));
        }
        Err(e) => return Err(anyhow::Error::new(e).context("Failed to publish package")),
    };

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&outcome)?),
        OutputFormat::Text => print_outcome(&outcome, &request.subject_name),
    }

    Ok(())
}

fn print_outcome(outcome: &PublishOutcome, subject_name: &str) {
    println!("Package published successfully!");
    println!();
    println!("  Reference: {subject_name}:{}", outcome.subject_tag);
    println!("  Digest:    {}", outcome.subject_digest);
    if let Some(attestation) = &outcome.attestation {
        println!();
        println!("Attestation:");
        println!("  Manifest:     {}", attestation.manifest_digest);
        println!("  Index:        {}", attestation.index_digest);
        println!("  Referrer tag: {}", attestation.referrer_tag);
    }
}

/// Hashes a staged archive in chunks and records its digest and size.
async fn stage_archive(path: &Path) -> Result<StagedArchive> {
    let read_error = || format!("Failed to read staged archive: {}", path.display());
    let mut file = tokio::fs::File::open(path).await.with_context(read_error)?;

    let mut hasher = Hasher::new();
    let mut chunk = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut chunk).await.with_context(read_error)?;
        if n == 0 {
            break;
        }
        hasher.update(&chunk[..n]);
    }

    let size = hasher.size();
    if size == 0 {
        anyhow::bail!("Staged archive is empty: {}", path.display());
    }
    Ok(StagedArchive::new(path, hasher.finish().hex(), size))
}

/// Picks the attestation signer, or none when attestations are disabled.
fn build_signer(args: &PublishArgs) -> Result<Option<Arc<dyn AttestationSigner>>> {
    if args.enterprise {
        return Ok(None);
    }

    if let Some(url) = &args.signer_url {
        let mut signer =
            HttpAttestationSigner::new(url).context("Failed to create signing service client")?;
        if let Some(token) = &args.signer_token {
            signer = signer.with_token(token);
        }
        return Ok(Some(Arc::new(signer)));
    }

    let key_base64 = if let Some(key_file) = &args.signing_key_file {
        std::fs::read_to_string(key_file)
            .with_context(|| format!("Failed to read key file: {}", key_file.display()))?
    } else if let Some(key) = &args.signing_key {
        key.clone()
    } else {
        anyhow::bail!(
            "No attestation signer configured. Use --signer-url, --signing-key-file or \
             --signing-key (OCIPACK_SIGNING_KEY), or --enterprise to publish without attestation"
        );
    };

    let key_pair = SigningKeyPair::from_base64(&key_base64).context("Invalid signing key format")?;
    Ok(Some(Arc::new(Ed25519DsseSigner::new(
        &key_pair,
        args.key_id.clone(),
    ))))
}

fn registry_config(args: &PublishArgs, repository: &str) -> Result<RegistryConfig> {
    let retry = RetryPolicy::default().with_max_attempts(args.retries.max(1));
    let mut config = RegistryConfig::new(&args.registry, repository)
        .with_timeout(Duration::from_secs(args.timeout))
        .with_retry(retry)
        .with_auth(determine_auth(args)?);

    if args.ca_cert.is_some() || args.insecure {
        let mut tls = TlsConfig::new();
        if let Some(ca_cert) = &args.ca_cert {
            tls = tls.with_ca_cert(ca_cert);
        }
        if args.insecure {
            tls = tls.insecure();
        }
        config = config.with_tls(tls);
    }

    Ok(config)
}

/// Name the attestation refers to the package by: registry host and repository.
fn subject_name(registry: &str, repository: &str) -> Result<String> {
    let url = url::Url::parse(registry)
        .with_context(|| format!("Invalid registry URL: {registry}"))?;
    let host = url
        .host_str()
        .with_context(|| format!("Registry URL has no host: {registry}"))?;

    Ok(match url.port() {
        Some(port) => format!("{host}:{port}/{}", repository.to_lowercase()),
        None => format!("{host}/{}", repository.to_lowercase()),
    })
}

/// Determines the authentication method from CLI arguments.
fn determine_auth(args: &PublishArgs) -> Result<RegistryAuth> {
    if let Some(ref token) = args.token {
        return Ok(RegistryAuth::bearer(token));
    }

    if let (Some(username), Some(password)) = (&args.username, &args.password) {
        return Ok(RegistryAuth::basic(username, password));
    }

    if args.username.is_some() || args.password.is_some() {
        anyhow::bail!("Both --username and --password are required for basic authentication");
    }

    // No auth - useful for local development
    Ok(RegistryAuth::None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{Cli, Commands};
    use clap::Parser;
    use ocipack_core::Digest;

    const REQUIRED: &[&str] = &[
        "ocipack",
        "publish",
        "--ref",
        "refs/tags/v1.2.3",
        "--commit-sha",
        "abc123",
        "--repository",
        "Acme/Widget",
        "--repository-id",
        "1001",
        "--owner-id",
        "2002",
        "--registry",
        "https://registry.example.com",
        "--tar",
        "widget.tar.gz",
        "--zip",
        "widget.zip",
    ];

    fn try_parse(extra: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(REQUIRED.iter().chain(extra).copied())
    }

    fn parse(extra: &[&str]) -> PublishArgs {
        match try_parse(extra).unwrap().command {
            Commands::Publish(args) => args,
            _ => panic!("expected publish"),
        }
    }

    #[test]
    fn test_parse_defaults() {
        let args = parse(&[]);
        assert_eq!(args.git_ref, "refs/tags/v1.2.3");
        assert_eq!(args.format, OutputFormat::Text);
        assert_eq!(args.retries, 3);
        assert!(!args.enterprise);
    }

    #[test]
    fn test_determine_auth_none() {
        let auth = determine_auth(&parse(&[])).unwrap();
        assert!(matches!(auth, RegistryAuth::None));
    }

    #[test]
    fn test_determine_auth_bearer_takes_precedence() {
        let args = parse(&["--token", "t", "--username", "u", "--password", "p"]);
        assert!(matches!(
            determine_auth(&args).unwrap(),
            RegistryAuth::Bearer { token } if token == "t"
        ));
    }

    #[test]
    fn test_determine_auth_basic() {
        let args = parse(&["--username", "user", "--password", "pass"]);
        assert!(matches!(
            determine_auth(&args).unwrap(),
            RegistryAuth::Basic { username, password } if username == "user" && password == "pass"
        ));
    }

    #[test]
    fn test_determine_auth_incomplete_basic() {
        let args = parse(&["--username", "user"]);
        assert!(determine_auth(&args).is_err());
    }

    #[test]
    fn test_registry_config_uses_lowercase_repository() {
        let args = parse(&["--retries", "5", "--insecure"]);
        let config = registry_config(&args, &args.repository).unwrap();
        assert_eq!(config.repository, "acme/widget");
        assert_eq!(config.retry.max_attempts, 5);
        assert!(config.tls.unwrap().insecure_skip_verify);
    }

    #[test]
    fn test_subject_name() {
        assert_eq!(
            subject_name("https://registry.example.com", "Acme/Widget").unwrap(),
            "registry.example.com/acme/widget"
        );
        assert_eq!(
            subject_name("http://localhost:5000/", "acme/widget").unwrap(),
            "localhost:5000/acme/widget"
        );
        assert!(subject_name("not a url", "acme/widget").is_err());
    }

    #[test]
    fn test_enterprise_disables_signer() {
        let args = parse(&["--enterprise"]);
        assert!(build_signer(&args).unwrap().is_none());
    }

    #[test]
    fn test_missing_signer_is_an_error() {
        assert!(build_signer(&parse(&[])).is_err());
    }

    #[test]
    fn test_signing_key_builds_local_signer() {
        let key = SigningKeyPair::generate().to_base64();
        let args = parse(&["--signing-key", &key]);
        assert!(build_signer(&args).unwrap().is_some());
    }

    #[test]
    fn test_signer_sources_conflict() {
        let result = try_parse(&[
            "--signing-key-file",
            "k",
            "--signer-url",
            "https://signer.example.com",
        ]);
        assert!(result.is_err());
        assert!(try_parse(&["--signer-url", "https://signer.example.com"]).is_ok());
    }

    #[tokio::test]
    async fn test_stage_archive_records_digest_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("widget.tar.gz");
        std::fs::write(&path, b"archive").unwrap();

        let staged = stage_archive(&path).await.unwrap();
        assert_eq!(staged.size, 7);
        assert_eq!(staged.sha256, Digest::of(b"archive").hex());

        let empty = dir.path().join("empty.zip");
        std::fs::write(&empty, b"").unwrap();
        assert!(stage_archive(&empty).await.is_err());
        assert!(stage_archive(&dir.path().join("missing.zip")).await.is_err());
    }

    #[tokio::test]
    async fn test_stage_archive_spans_multiple_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("large.zip");
        let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).unwrap();

        let staged = stage_archive(&path).await.unwrap();
        assert_eq!(staged.size, 200_000);
        assert_eq!(staged.sha256, Digest::of(&data).hex());
    }
}
