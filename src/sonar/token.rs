//! Access-token resolution for the SonarQube API.
//!
//! Tokens are resolved through a prioritized chain; the first source that
//! yields a usable value wins:
//!
//! 1. An explicitly configured token (used verbatim, never validated)
//! 2. A provisioned token file on a shared volume (trusted, trimmed)
//! 3. A token cached locally by a previous run (validated against the service)
//! 4. A freshly generated token, created with basic credentials and cached
//!
//! Only a failure of step 4 is fatal; every other step degrades to the next.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::client::normalize_base_url;
use crate::error::TokenError;

/// Token file written by an external provisioning step.
pub const DEFAULT_SHARED_TOKEN_PATH: &str = "/shared/sonar-token";
/// Local cache of an auto-generated token.
pub const DEFAULT_TOKEN_CACHE_PATH: &str = "sonar-token";
/// Name under which auto-generated tokens are registered.
pub const AUTO_TOKEN_NAME: &str = "sonar-gatekeeper-auto";

pub const DEFAULT_USERNAME: &str = "admin";
pub const DEFAULT_PASSWORD: &str = "SonarAdmin1!";

const VALIDATE_PATH: &str = "/api/authentication/validate";
const REVOKE_PATH: &str = "/api/user_tokens/revoke";
const GENERATE_PATH: &str = "/api/user_tokens/generate";

/// Token-management operations of the quality-gate service.
#[async_trait]
pub trait TokenAuthority: Send + Sync {
    /// Whether the service accepts `token`. Never fails; errors mean `false`.
    async fn validate(&self, token: &str) -> bool;

    /// Revoke the token registered under `name`.
    async fn revoke(&self, name: &str) -> Result<(), TokenError>;

    /// Generate a new token registered under `name`.
    async fn generate(&self, name: &str) -> Result<String, TokenError>;
}

/// Basic-auth credentials used to mint tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl Default for BasicCredentials {
    fn default() -> Self {
        Self {
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
        }
    }
}

/// [`TokenAuthority`] backed by the SonarQube REST API.
pub struct HttpTokenAuthority {
    http_client: Client,
    base_url: String,
    credentials: BasicCredentials,
}

impl HttpTokenAuthority {
    pub fn new(service_url: &str, credentials: BasicCredentials) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: normalize_base_url(service_url),
            credentials,
        }
    }

    fn form_post(&self, path: &str, name: &str) -> reqwest::RequestBuilder {
        self.http_client
            .post(format!("{}{}", self.base_url, path))
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body(format!("name={}", name))
    }
}

#[derive(Deserialize)]
struct ValidateResponse {
    #[serde(default)]
    valid: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    token: Option<String>,
}

#[async_trait]
impl TokenAuthority for HttpTokenAuthority {
    async fn validate(&self, token: &str) -> bool {
        let url = format!("{}{}", self.base_url, VALIDATE_PATH);
        let response = match self.http_client.get(&url).bearer_auth(token).send().await {
            Ok(response) if response.status().is_success() => response,
            Ok(response) => {
                debug!(status = response.status().as_u16(), "Token validation rejected");
                return false;
            }
            Err(e) => {
                debug!(error = %e, "Token validation request failed");
                return false;
            }
        };

        response
            .json::<ValidateResponse>()
            .await
            .map(|body| body.valid)
            .unwrap_or(false)
    }

    async fn revoke(&self, name: &str) -> Result<(), TokenError> {
        self.form_post(REVOKE_PATH, name)
            .send()
            .await
            .map_err(|e| TokenError::RequestFailed(e.to_string()))?;
        Ok(())
    }

    async fn generate(&self, name: &str) -> Result<String, TokenError> {
        let response = self
            .form_post(GENERATE_PATH, name)
            .send()
            .await
            .map_err(|e| TokenError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TokenError::GenerationFailed {
                status: status.as_u16(),
                body,
            });
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| TokenError::RequestFailed(format!("Invalid token response: {}", e)))?;

        body.token
            .filter(|token| !token.is_empty())
            .ok_or(TokenError::MissingToken)
    }
}

/// Where each step of the resolution chain looks for a token.
#[derive(Debug, Clone)]
pub struct TokenSources {
    pub explicit_token: Option<String>,
    pub shared_path: PathBuf,
    pub cache_path: PathBuf,
}

impl Default for TokenSources {
    fn default() -> Self {
        Self {
            explicit_token: None,
            shared_path: PathBuf::from(DEFAULT_SHARED_TOKEN_PATH),
            cache_path: PathBuf::from(DEFAULT_TOKEN_CACHE_PATH),
        }
    }
}

/// Which step of the chain produced the token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Explicit,
    Shared,
    Cached,
    Generated,
}

impl std::fmt::Display for TokenSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenSource::Explicit => write!(f, "explicit"),
            TokenSource::Shared => write!(f, "shared"),
            TokenSource::Cached => write!(f, "cached"),
            TokenSource::Generated => write!(f, "generated"),
        }
    }
}

/// A token together with the source it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedToken {
    pub token: String,
    pub source: TokenSource,
}

/// Walks the resolution chain against a [`TokenAuthority`].
pub struct TokenResolver<A> {
    authority: A,
    sources: TokenSources,
}

impl<A: TokenAuthority> TokenResolver<A> {
    pub fn new(authority: A, sources: TokenSources) -> Self {
        Self { authority, sources }
    }

    /// Resolve a token.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError`] only when auto-generation is reached and fails.
    pub async fn resolve(&self) -> Result<ResolvedToken, TokenError> {
        if let Some(token) = self.sources.explicit_token.as_deref().filter(|t| !t.is_empty()) {
            debug!("Using explicitly configured SonarQube token");
            return Ok(ResolvedToken {
                token: token.to_string(),
                source: TokenSource::Explicit,
            });
        }

        if let Some(token) = read_token_file(&self.sources.shared_path).await {
            info!(path = %self.sources.shared_path.display(), "Using provisioned SonarQube token");
            return Ok(ResolvedToken {
                token,
                source: TokenSource::Shared,
            });
        }

        if let Some(cached) = read_token_file(&self.sources.cache_path).await {
            if self.authority.validate(&cached).await {
                info!(path = %self.sources.cache_path.display(), "Using cached SonarQube token");
                return Ok(ResolvedToken {
                    token: cached,
                    source: TokenSource::Cached,
                });
            }
            info!("Cached SonarQube token is invalid, regenerating");
        }

        info!("Generating SonarQube token");
        if let Err(e) = self.authority.revoke(AUTO_TOKEN_NAME).await {
            debug!(error = %e, "Revoking previous token failed (it may not exist)");
        }
        let token = self.authority.generate(AUTO_TOKEN_NAME).await?;

        match tokio::fs::write(&self.sources.cache_path, &token).await {
            Ok(()) => info!(path = %self.sources.cache_path.display(), "Cached generated token"),
            Err(e) => warn!(error = %e, "Could not cache generated token"),
        }

        Ok(ResolvedToken {
            token,
            source: TokenSource::Generated,
        })
    }
}

/// Resolve a token for `service_url` using the HTTP authority.
pub async fn resolve_token(
    service_url: &str,
    sources: TokenSources,
    credentials: BasicCredentials,
) -> Result<String, TokenError> {
    let resolver = TokenResolver::new(HttpTokenAuthority::new(service_url, credentials), sources);
    let resolved = resolver.resolve().await?;
    Ok(resolved.token)
}

/// Read and trim a token file; missing, unreadable or blank files yield `None`.
async fn read_token_file(path: &Path) -> Option<String> {
    let content = tokio::fs::read_to_string(path).await.ok()?;
    let token = content.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
