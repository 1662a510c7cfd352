//! GitHub App service connections.
//!
//! These connections cannot be created through the service endpoint API.
//! The web UI creates them through a hierarchy query that installs the
//! Azure Pipelines app connection on a repository, and that is what this
//! client does too. Fetching goes through the endpoint details data provider.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::contribution::{HierarchyQuery, SourcePage};
use super::service_endpoint::{delete_endpoint, ServiceEndpoint};
use super::HttpClient;
use crate::error::ProviderError;

/// Contribution creating a GitHub App connection for a repository.
pub const RECOMMENDATION_DATA_PROVIDER: &str =
    "ms.vss-build-web.app-serviceconnections-recommendation-data-provider";

/// Contribution returning the details of a service endpoint.
pub const ENDPOINT_DETAILS_DATA_PROVIDER: &str =
    "ms.vss-serviceEndpoints-web.service-endpoints-details-data-provider";

/// Authorization scheme of GitHub App connections.
pub const INSTALLATION_TOKEN_SCHEME: &str = "InstallationToken";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct AddProperties {
    source_provider: &'static str,
    repository_id: String,
    repository_name: String,
    connection_id: String,
    strong_box_key: &'static str,
    source_page: SourcePage,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct DetailsProperties {
    project_id: String,
    service_endpoint_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecommendationData {
    #[serde(default)]
    common_connection_id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EndpointDetailsData {
    #[serde(default)]
    service_endpoint: Option<ServiceEndpoint>,
}

/// Client for GitHub App connections.
#[derive(Debug, Clone)]
pub struct GithubAppClient {
    http: HttpClient,
}

impl GithubAppClient {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Create a connection for `repo` (`owner/name`) from the GitHub
    /// connection `connection_id`. Returns the id of the new connection.
    pub async fn add(
        &self,
        project_id: &str,
        repo: &str,
        connection_id: &str,
    ) -> Result<String, ProviderError> {
        let query = HierarchyQuery::new(
            RECOMMENDATION_DATA_PROVIDER,
            AddProperties {
                source_provider: "github",
                repository_id: repo.to_string(),
                repository_name: repo.to_string(),
                connection_id: connection_id.to_string(),
                strong_box_key: "useWellKnownStrongBoxLocation",
                source_page: SourcePage::project(project_id),
            },
        );
        debug!(project_id, repo, "Adding GitHub App connection");

        let response = self.http.hierarchy_query(&query).await?;
        let data: Option<RecommendationData> = response.provider(RECOMMENDATION_DATA_PROVIDER)?;
        match data.map(|d| d.common_connection_id) {
            Some(id) if !id.is_empty() => Ok(id),
            _ => Err(ProviderError::Api {
                status: 200,
                body: format!("no connection id returned for repository {}", repo),
            }),
        }
    }

    /// Fetch a GitHub App connection. `None` when it does not exist.
    pub async fn get(
        &self,
        project_id: &str,
        connection_id: &str,
    ) -> Result<Option<ServiceEndpoint>, ProviderError> {
        let query = HierarchyQuery::new(
            ENDPOINT_DETAILS_DATA_PROVIDER,
            DetailsProperties {
                project_id: project_id.to_string(),
                service_endpoint_id: connection_id.to_string(),
            },
        );

        let response = self.http.hierarchy_query(&query).await?;
        let data: Option<EndpointDetailsData> =
            response.provider(ENDPOINT_DETAILS_DATA_PROVIDER)?;
        let Some(endpoint) = data.and_then(|d| d.service_endpoint) else {
            return Ok(None);
        };

        if endpoint.authorization.scheme != INSTALLATION_TOKEN_SCHEME {
            return Err(ProviderError::Validation(format!(
                "service connection {} is not a GitHub App connection (scheme {:?})",
                connection_id, endpoint.authorization.scheme
            )));
        }
        Ok(Some(endpoint))
    }

    /// Delete a connection from a project.
    pub async fn delete(&self, project_id: &str, connection_id: &str) -> Result<(), ProviderError> {
        delete_endpoint(&self.http, project_id, connection_id).await
    }
}
