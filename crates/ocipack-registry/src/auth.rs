//! Credential exchange with the registry's token service.
//!
//! The exchange runs once when a client connects. The resulting
//! `Authorization` header is reused for every request of the run and is
//! never refreshed: an authorization failure later in the run is reported,
//! not papered over with a new token.

use reqwest::header::{HeaderValue, WWW_AUTHENTICATE};
use reqwest::StatusCode;
use serde::Deserialize;

use crate::config::{RegistryAuth, RegistryConfig};
use crate::error::RegistryError;

/// Builds the header for credentials that need no exchange.
pub(crate) fn static_authorization(
    auth: &RegistryAuth,
) -> Result<Option<HeaderValue>, RegistryError> {
    match auth {
        RegistryAuth::None => Ok(None),
        RegistryAuth::Basic { username, password } => {
            basic_header(username, password).map(Some)
        }
        RegistryAuth::Bearer { token } => bearer_header(token).map(Some),
    }
}

/// Resolves the credentials into the header used for the rest of the run.
///
/// Basic credentials probe `GET /v2/`. If the registry answers with a bearer
/// challenge, the credentials are traded for a push-scoped token at the
/// challenge's realm; otherwise they are sent directly.
pub(crate) async fn exchange(
    http: &reqwest::Client,
    config: &RegistryConfig,
) -> Result<Option<HeaderValue>, RegistryError> {
    let RegistryAuth::Basic { username, password } = &config.auth else {
        return static_authorization(&config.auth);
    };

    let probe_url = config.base_endpoint();
    let response = http.get(&probe_url).send().await?;

    if response.status().is_success() {
        tracing::debug!(registry = %config.url, "registry requires no token exchange");
        return basic_header(username, password).map(Some);
    }

    if response.status() != StatusCode::UNAUTHORIZED {
        return Err(RegistryError::AuthenticationFailed {
            message: format!("unexpected status {} from {probe_url}", response.status()),
        });
    }

    let challenge = response
        .headers()
        .get(WWW_AUTHENTICATE)
        .and_then(|v| v.to_str().ok())
        .map(Challenge::parse)
        .ok_or_else(|| RegistryError::AuthenticationFailed {
            message: "registry returned 401 without an authentication challenge".to_string(),
        })?;

    match challenge {
        Challenge::Basic => basic_header(username, password).map(Some),
        Challenge::Bearer { realm, service } => {
            let token =
                request_token(http, config, &realm, service.as_deref(), username, password)
                    .await?;
            bearer_header(&token).map(Some)
        }
        Challenge::Unsupported(scheme) => Err(RegistryError::AuthenticationFailed {
            message: format!("unsupported authentication scheme '{scheme}'"),
        }),
    }
}

async fn request_token(
    http: &reqwest::Client,
    config: &RegistryConfig,
    realm: &str,
    service: Option<&str>,
    username: &str,
    password: &str,
) -> Result<String, RegistryError> {
    let mut url = url::Url::parse(realm).map_err(|_| RegistryError::InvalidUrl {
        url: realm.to_string(),
    })?;
    {
        let mut query = url.query_pairs_mut();
        if let Some(service) = service {
            query.append_pair("service", service);
        }
        query.append_pair("scope", &config.push_scope());
    }

    tracing::debug!(realm, scope = %config.push_scope(), "exchanging credentials for token");

    let response = http
        .get(url)
        .basic_auth(username, Some(password))
        .send()
        .await?;

    if !response.status().is_success() {
        return Err(RegistryError::AuthenticationFailed {
            message: format!(
                "token service returned {}: {}",
                response.status(),
                response.text().await.unwrap_or_default()
            ),
        });
    }

    let body: TokenResponse = response.json().await.map_err(|e| {
        RegistryError::AuthenticationFailed {
            message: format!("malformed token response: {e}"),
        }
    })?;

    body.token
        .or(body.access_token)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| RegistryError::AuthenticationFailed {
            message: "token service returned no token".to_string(),
        })
}

fn basic_header(username: &str, password: &str) -> Result<HeaderValue, RegistryError> {
    let credentials = base64::Engine::encode(
        &base64::engine::general_purpose::STANDARD,
        format!("{username}:{password}"),
    );
    sensitive(&format!("Basic {credentials}"), "Invalid credentials")
}

fn bearer_header(token: &str) -> Result<HeaderValue, RegistryError> {
    sensitive(&format!("Bearer {token}"), "Invalid token")
}

fn sensitive(value: &str, message: &str) -> Result<HeaderValue, RegistryError> {
    let mut header =
        HeaderValue::from_str(value).map_err(|_| RegistryError::AuthenticationFailed {
            message: message.to_string(),
        })?;
    header.set_sensitive(true);
    Ok(header)
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: Option<String>,
    access_token: Option<String>,
}

/// A parsed `WWW-Authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Challenge {
    Basic,
    Bearer {
        realm: String,
        service: Option<String>,
    },
    Unsupported(String),
}

impl Challenge {
    /// Parses `Bearer realm="...",service="...",scope="..."` style headers.
    pub(crate) fn parse(header: &str) -> Self {
        let header = header.trim();
        let (scheme, params) = header.split_once(' ').unwrap_or((header, ""));

        if scheme.eq_ignore_ascii_case("basic") {
            return Self::Basic;
        }
        if !scheme.eq_ignore_ascii_case("bearer") {
            return Self::Unsupported(scheme.to_string());
        }

        let params = parse_params(params);
        let lookup = |key: &str| {
            params
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(key))
                .map(|(_, v)| v.clone())
        };

        match lookup("realm") {
            Some(realm) => Self::Bearer {
                realm,
                service: lookup("service"),
            },
            None => Self::Unsupported("bearer without realm".to_string()),
        }
    }
}

/// Splits `key="value",key2=value2` into pairs, honoring quoted commas.
fn parse_params(input: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut rest = input.trim();

    while !rest.is_empty() {
        let Some((key, after_key)) = rest.split_once('=') else {
            break;
        };
        let key = key.trim().trim_start_matches(',').trim().to_string();
        let after_key = after_key.trim_start();

        let (value, remainder) = if let Some(quoted) = after_key.strip_prefix('"') {
            match quoted.find('"') {
                Some(end) => (quoted[..end].to_string(), &quoted[end + 1..]),
                None => (quoted.to_string(), ""),
            }
        } else {
            match after_key.find(',') {
                Some(end) => (after_key[..end].trim().to_string(), &after_key[end..]),
                None => (after_key.trim().to_string(), ""),
            }
        };

        pairs.push((key, value));
        rest = remainder.trim_start().trim_start_matches(',').trim_start();
    }

    pairs
}
