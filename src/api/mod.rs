//! Azure DevOps REST client.
//!
//! [`HttpClient`] is the single request sender shared by every API area. It
//! attaches the fixed headers (authorization, JSON content type and a
//! versioned `Accept`), sends the request and classifies the response by
//! status code. The submodules build the per-area payloads on top of it.

pub mod checks;
pub mod contribution;
pub mod github_app;
pub mod security;
pub mod service_endpoint;

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

use crate::config::ResolvedConfig;
use crate::error::ProviderError;

pub use checks::ChecksClient;
pub use github_app::GithubAppClient;
pub use security::SecurityClient;
pub use service_endpoint::ServiceEndpointClient;

/// Timeout applied when the provider configuration does not set one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Accept header for the pipeline checks and contribution endpoints.
pub const CHECKS_ACCEPT: &str = "application/json;api-version=5.1-preview.1;excludeUrls=true;enumsAsNumbers=true;msDateFormat=true;noArrayWrap=true";

/// Accept header for the service endpoint endpoints.
pub const SERVICE_ENDPOINT_ACCEPT: &str = "application/json;api-version=6.0-preview.4;excludeUrls=true;enumsAsNumbers=true;msDateFormat=true;noArrayWrap=true";

/// Accept header for the security namespace, ACL and identity endpoints.
pub const SECURITY_ACCEPT: &str = "application/json;api-version=5.1";

// The API sends `null` for empty collections and strings.
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// How requests authenticate against the organization.
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// Personal access token, sent as `Basic base64(":" + pat)`.
    PersonalAccessToken(String),
    /// OAuth token, sent as `Bearer <token>`.
    Bearer(String),
}

impl Credentials {
    /// Render the `Authorization` header value.
    pub fn header_value(&self) -> String {
        match self {
            Credentials::PersonalAccessToken(pat) => {
                format!("Basic {}", STANDARD.encode(format!(":{}", pat)))
            }
            Credentials::Bearer(token) => format!("Bearer {}", token),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::PersonalAccessToken(_) => f.write_str("PersonalAccessToken(<redacted>)"),
            Credentials::Bearer(_) => f.write_str("Bearer(<redacted>)"),
        }
    }
}

/// Sends requests to one Azure DevOps organization.
#[derive(Debug, Clone)]
pub struct HttpClient {
    base_url: String,
    http: reqwest::Client,
    authorization: String,
}

impl HttpClient {
    /// Build a client for `base_url`. A `None` timeout means [`DEFAULT_TIMEOUT`].
    pub fn new(
        base_url: impl Into<String>,
        credentials: &Credentials,
        timeout: Option<Duration>,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .user_agent(concat!(
                env!("CARGO_PKG_NAME"),
                "/",
                env!("CARGO_PKG_VERSION")
            ))
            .build()?;

        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
            authorization: credentials.header_value(),
        })
    }

    /// Base url every request path is appended to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// A client for another host of the same organization, sharing the
    /// connection pool and credentials.
    pub fn with_base_url(&self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: self.http.clone(),
            authorization: self.authorization.clone(),
        }
    }

    /// Send a request and return the raw response body.
    ///
    /// - `203` means Azure DevOps served a sign-in page: the credentials were rejected.
    /// - `404` becomes [`ProviderError::NotFound`].
    /// - Anything above `399` becomes [`ProviderError::Api`].
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<String>,
        accept: &str,
    ) -> Result<Vec<u8>, ProviderError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(method = %method, url = %url, "Sending Azure DevOps request");

        let mut request = self
            .http
            .request(method.clone(), &url)
            .header(AUTHORIZATION, &self.authorization)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, accept);
        if !query.is_empty() {
            request = request.query(query);
        }
        request = request.body(body.unwrap_or_default());

        let response = request.send().await?;
        let status = response.status();
        debug!(method = %method, url = %url, status = status.as_u16(), "Azure DevOps responded");

        if status == StatusCode::NON_AUTHORITATIVE_INFORMATION {
            warn!(url = %url, "Azure DevOps answered 203, credentials were not accepted");
            return Err(ProviderError::PermissionDenied(
                "resp status code from azure 203 - need auth".to_string(),
            ));
        }

        if status.as_u16() > 399 {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::NOT_FOUND {
                return Err(ProviderError::NotFound(format!("{} {}", method, path)));
            }
            return Err(ProviderError::Api {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    /// Send a request and decode the JSON response body.
    pub async fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<String>,
        accept: &str,
    ) -> Result<T, ProviderError> {
        let bytes = self.send(method, path, query, body, accept).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Every API client, built once per `configure` call and shared by the resources.
#[derive(Debug, Clone)]
pub struct AggregatedClient {
    /// Pipeline checks.
    pub checks: ChecksClient,
    /// Service endpoints.
    pub service_endpoints: ServiceEndpointClient,
    /// GitHub App service connections.
    pub github_apps: GithubAppClient,
    /// Security namespaces, ACLs and identities.
    pub security: SecurityClient,
}

impl AggregatedClient {
    /// Build all clients from a resolved provider configuration.
    pub fn new(config: &ResolvedConfig) -> Result<Arc<Self>, ProviderError> {
        let http = HttpClient::new(
            config.org_service_url.clone(),
            &config.credentials,
            Some(config.timeout),
        )?;
        Ok(Arc::new(Self::from_http(http)))
    }

    /// Build all clients on top of one request sender.
    pub fn from_http(http: HttpClient) -> Self {
        Self {
            checks: ChecksClient::new(http.clone()),
            service_endpoints: ServiceEndpointClient::new(http.clone()),
            github_apps: GithubAppClient::new(http.clone()),
            security: SecurityClient::new(http),
        }
    }
}
