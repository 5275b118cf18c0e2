//! Authenticated client for the SonarQube Web API.
//!
//! The client performs bearer-authenticated GET requests, decodes JSON bodies
//! into typed responses and maps non-2xx statuses to [`SonarError::Api`] with
//! a human-readable message.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

use super::types::{IssuesSearchResponse, QualityGateProjectStatus, QualityGateResponse, Rule, RulesSearchResponse};
use crate::error::SonarError;

/// Quality gate verdict of one project.
pub const QUALITY_GATE_STATUS_PATH: &str = "/api/qualitygates/project_status";
/// Issue search with paging.
pub const ISSUES_SEARCH_PATH: &str = "/api/issues/search";
/// Rule metadata lookup.
pub const RULES_SEARCH_PATH: &str = "/api/rules/search";
/// Liveness endpoint used by [`SonarClient::ping`].
pub const SYSTEM_STATUS_PATH: &str = "/api/system/status";

/// Per-request timeout. The service is local or on the same network, so
/// anything slower than this is treated as a failure.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Read operations the issue collector needs from the quality-gate service.
///
/// [`SonarClient`] is the production implementation; tests substitute
/// in-memory fakes.
#[async_trait]
pub trait QualityGateApi: Send + Sync {
    /// Fetch the quality gate verdict for a project.
    async fn project_status(&self, project_key: &str) -> Result<QualityGateProjectStatus, SonarError>;

    /// Fetch one page (1-indexed) of unresolved issues for a project.
    async fn search_issues(
        &self,
        project_key: &str,
        page: u32,
        page_size: u32,
    ) -> Result<IssuesSearchResponse, SonarError>;

    /// Look up a rule by key. `Ok(None)` when the service knows no such rule.
    async fn find_rule(&self, rule_key: &str) -> Result<Option<Rule>, SonarError>;
}

/// Bearer-authenticated SonarQube client.
#[derive(Debug, Clone)]
pub struct SonarClient {
    http_client: Client,
    base_url: String,
    token: String,
}

impl SonarClient {
    /// Create a client for `base_url`. Trailing slashes are stripped.
    pub fn new(base_url: &str, token: impl Into<String>) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: normalize_base_url(base_url),
            token: token.into(),
        }
    }

    /// Normalized base URL (no trailing slash).
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Attach the bearer token. An empty token sends no `Authorization` header.
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if self.token.is_empty() {
            request
        } else {
            request.bearer_auth(&self.token)
        }
    }

    /// Build the request URL for `path`, attaching only non-empty parameters.
    pub fn build_url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, SonarError> {
        let raw = format!("{}{}", self.base_url, path);
        let mut url = Url::parse(&raw).map_err(|_| SonarError::InvalidUrl(raw.clone()))?;

        let attached: Vec<_> = params.iter().filter(|(_, value)| !value.is_empty()).collect();
        if !attached.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in attached {
                pairs.append_pair(key, value);
            }
        }

        Ok(url)
    }

    /// Perform a GET request and decode the JSON body into `T`.
    ///
    /// # Errors
    ///
    /// - [`SonarError::Api`] for non-2xx responses, carrying status and endpoint
    /// - [`SonarError::Request`] when no response was received
    /// - [`SonarError::Decode`] when the body does not match `T`
    pub async fn get<T: DeserializeOwned>(&self, path: &str, params: &[(&str, &str)]) -> Result<T, SonarError> {
        let url = self.build_url(path, params)?;
        debug!(endpoint = path, url = %url, "SonarQube GET");

        let response = self
            .authorize(self.http_client.get(url))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| SonarError::Request {
                endpoint: path.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SonarError::Api {
                status: status.as_u16(),
                endpoint: path.to_string(),
                message: format_error(status.as_u16(), path, &body),
            });
        }

        response.json::<T>().await.map_err(|e| SonarError::Decode {
            endpoint: path.to_string(),
            reason: e.to_string(),
        })
    }

    /// Check whether the service is reachable and accepts the token.
    ///
    /// Never fails: transport errors and non-2xx statuses yield `false`.
    pub async fn ping(&self) -> bool {
        let url = format!("{}{}", self.base_url, SYSTEM_STATUS_PATH);
        match self.authorize(self.http_client.get(&url)).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(error = %e, "SonarQube ping failed");
                false
            }
        }
    }
}

#[async_trait]
impl QualityGateApi for SonarClient {
    async fn project_status(&self, project_key: &str) -> Result<QualityGateProjectStatus, SonarError> {
        let response: QualityGateResponse = self
            .get(QUALITY_GATE_STATUS_PATH, &[("projectKey", project_key)])
            .await?;
        Ok(response.project_status)
    }

    async fn search_issues(
        &self,
        project_key: &str,
        page: u32,
        page_size: u32,
    ) -> Result<IssuesSearchResponse, SonarError> {
        let ps = page_size.to_string();
        let p = page.to_string();
        self.get(
            ISSUES_SEARCH_PATH,
            &[
                ("componentKeys", project_key),
                ("resolved", "false"),
                ("ps", &ps),
                ("p", &p),
            ],
        )
        .await
    }

    async fn find_rule(&self, rule_key: &str) -> Result<Option<Rule>, SonarError> {
        let response: RulesSearchResponse = self
            .get(RULES_SEARCH_PATH, &[("rule_key", rule_key), ("ps", "1")])
            .await?;
        Ok(response.rules.into_iter().next())
    }
}

/// Strip trailing slashes from a base URL.
pub fn normalize_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    errors: Vec<ErrorEntry>,
}

#[derive(Deserialize)]
struct ErrorEntry {
    msg: String,
}

/// Build the message for a non-2xx response.
///
/// Known statuses get a canned explanation; any `errors[].msg` found in a
/// JSON body is appended, joined by `"; "`. Unparseable bodies are ignored.
pub fn format_error(status: u16, endpoint: &str, body: &str) -> String {
    let base = match status {
        401 => "Authentication failed - check SONAR_TOKEN".to_string(),
        403 => "Insufficient permissions for this operation".to_string(),
        404 => format!("Resource not found: {}", endpoint),
        500 => "SonarQube internal server error".to_string(),
        _ => format!("SonarQube API error (HTTP {}): {}", status, endpoint),
    };

    let details = serde_json::from_str::<ErrorBody>(body)
        .map(|parsed| {
            parsed
                .errors
                .into_iter()
                .map(|e| e.msg)
                .collect::<Vec<_>>()
                .join("; ")
        })
        .unwrap_or_default();

    if details.is_empty() {
        base
    } else {
        format!("{} - {}", base, details)
    }
}
