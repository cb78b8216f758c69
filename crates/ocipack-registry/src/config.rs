//! Configuration types for the registry client.

use std::path::PathBuf;
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Configuration for the registry client.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Registry base URL (e.g., "<https://registry.example.com>").
    pub url: String,

    /// Repository packages are pushed to (e.g., "acme/widget").
    pub repository: String,

    /// Authentication configuration.
    pub auth: RegistryAuth,

    /// Per-request timeout.
    pub timeout: Duration,

    /// Retry policy applied to every blob and manifest request.
    pub retry: RetryPolicy,

    /// TLS configuration for private registries.
    pub tls: Option<TlsConfig>,

    /// User agent string.
    pub user_agent: String,
}

impl RegistryConfig {
    /// Creates a new registry configuration.
    ///
    /// Trailing slashes are trimmed from the URL and the repository name is
    /// lowercased, since OCI repository names must be lowercase.
    ///
    /// # Examples
    ///
    /// ```
    /// use ocipack_registry::RegistryConfig;
    ///
    /// let config = RegistryConfig::new("https://registry.example.com/", "Acme/Widget");
    /// assert_eq!(config.url, "https://registry.example.com");
    /// assert_eq!(config.repository, "acme/widget");
    /// ```
    #[must_use]
    pub fn new(url: impl Into<String>, repository: impl Into<String>) -> Self {
        let url = url.into().trim_end_matches('/').to_string();
        Self {
            url,
            repository: repository.into().to_lowercase(),
            auth: RegistryAuth::None,
            timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
            tls: None,
            user_agent: format!("ocipack-registry/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Sets the authentication method.
    #[must_use]
    pub fn with_auth(mut self, auth: RegistryAuth) -> Self {
        self.auth = auth;
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub const fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the TLS configuration.
    #[must_use]
    pub fn with_tls(mut self, tls: TlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Returns the URL of a repository-scoped distribution API path.
    ///
    /// # Examples
    ///
    /// ```
    /// use ocipack_registry::RegistryConfig;
    ///
    /// let config = RegistryConfig::new("https://registry.example.com", "acme/widget");
    /// assert_eq!(
    ///     config.endpoint("blobs/uploads/"),
    ///     "https://registry.example.com/v2/acme/widget/blobs/uploads/"
    /// );
    /// ```
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/v2/{}/{path}", self.url, self.repository)
    }

    /// Returns the URL of the API version check endpoint.
    #[must_use]
    pub fn base_endpoint(&self) -> String {
        format!("{}/v2/", self.url)
    }

    /// Returns the token scope needed to push to the repository.
    #[must_use]
    pub fn push_scope(&self) -> String {
        format!("repository:{}:pull,push", self.repository)
    }
}

/// Authentication methods for registry access.
#[derive(Clone)]
pub enum RegistryAuth {
    /// No authentication (for local development).
    None,

    /// Username and password (or token) exchanged for a bearer token when
    /// the registry asks for one.
    Basic {
        /// Username.
        username: String,
        /// Password or token.
        password: String,
    },

    /// Pre-issued bearer token, sent as-is.
    Bearer {
        /// Token value.
        token: String,
    },
}

impl RegistryAuth {
    /// Creates basic authentication.
    ///
    /// # Examples
    ///
    /// ```
    /// use ocipack_registry::RegistryAuth;
    ///
    /// let auth = RegistryAuth::basic("user", "pass");
    /// ```
    #[must_use]
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Creates bearer token authentication.
    #[must_use]
    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Bearer {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::Bearer { .. } => f
                .debug_struct("Bearer")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

/// TLS configuration for registries with private certificate authorities.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// Path to an additional CA certificate (PEM).
    pub ca_cert: Option<PathBuf>,

    /// Whether to skip certificate verification (NOT recommended for production).
    pub insecure_skip_verify: bool,
}

impl TlsConfig {
    /// Creates a new TLS configuration with default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ca_cert: None,
            insecure_skip_verify: false,
        }
    }

    /// Sets the CA certificate path.
    #[must_use]
    pub fn with_ca_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.ca_cert = Some(path.into());
        self
    }

    /// Enables insecure mode (skips certificate verification).
    ///
    /// # Warning
    ///
    /// This should only be used for testing. Never use in production.
    #[must_use]
    pub const fn insecure(mut self) -> Self {
        self.insecure_skip_verify = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_new() {
        let config = RegistryConfig::new("https://example.com", "acme/widget");
        assert_eq!(config.url, "https://example.com");
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.retry, RetryPolicy::default());
        assert!(matches!(config.auth, RegistryAuth::None));
    }

    #[test]
    fn test_endpoints() {
        let config = RegistryConfig::new("http://localhost:5000//", "acme/widget");
        assert_eq!(config.base_endpoint(), "http://localhost:5000/v2/");
        assert_eq!(
            config.endpoint("manifests/1.2.3"),
            "http://localhost:5000/v2/acme/widget/manifests/1.2.3"
        );
        assert_eq!(config.push_scope(), "repository:acme/widget:pull,push");
    }

    #[test]
    fn test_basic_auth() {
        let auth = RegistryAuth::basic("user", "pass");
        assert!(matches!(
            auth,
            RegistryAuth::Basic { username, password }
            if username == "user" && password == "pass"
        ));
    }

    #[test]
    fn test_auth_debug_redacts_secrets() {
        let debug = format!("{:?}", RegistryAuth::basic("user", "hunter2"));
        assert!(debug.contains("user"));
        assert!(!debug.contains("hunter2"));

        let debug = format!("{:?}", RegistryAuth::bearer("s3cret"));
        assert!(!debug.contains("s3cret"));
    }

    #[test]
    fn test_tls_config() {
        let tls = TlsConfig::new().with_ca_cert("/path/to/ca.crt");
        assert_eq!(tls.ca_cert, Some(PathBuf::from("/path/to/ca.crt")));
        assert!(!tls.insecure_skip_verify);
        assert!(TlsConfig::new().insecure().insecure_skip_verify);
    }
}
