//! The contribution hierarchy query.
//!
//! Azure DevOps exposes several UI data providers through one endpoint,
//! `/_apis/Contribution/HierarchyQuery`. A request names the contributions it
//! wants and passes their properties. The response is keyed by contribution
//! id, so each caller decodes only the provider it asked for.

use std::collections::HashMap;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{HttpClient, CHECKS_ACCEPT};
use crate::error::ProviderError;

/// Path of the hierarchy query endpoint, relative to the organization url.
pub const HIERARCHY_QUERY_PATH: &str = "/_apis/Contribution/HierarchyQuery";

/// Request body for a hierarchy query.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyQuery<P> {
    /// Contributions to evaluate.
    pub contribution_ids: Vec<String>,
    /// Properties handed to the data providers.
    pub data_provider_context: DataProviderContext<P>,
}

/// Wrapper around the data provider properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataProviderContext<P> {
    /// Provider specific properties.
    pub properties: P,
}

impl<P> HierarchyQuery<P> {
    /// Query a single contribution.
    pub fn new(contribution_id: impl Into<String>, properties: P) -> Self {
        Self {
            contribution_ids: vec![contribution_id.into()],
            data_provider_context: DataProviderContext { properties },
        }
    }
}

/// `sourcePage.routeValues.project`, used by project scoped data providers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcePage {
    /// Route values of the page the query pretends to come from.
    pub route_values: RouteValues,
}

/// Route values of a [`SourcePage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteValues {
    /// Project id.
    pub project: String,
}

impl SourcePage {
    /// Source page for a project.
    pub fn project(project_id: impl Into<String>) -> Self {
        Self {
            route_values: RouteValues {
                project: project_id.into(),
            },
        }
    }
}

/// Error reported by a data provider inside an otherwise successful response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DataProviderException {
    /// Exception message.
    #[serde(default)]
    pub message: String,
}

/// Response of a hierarchy query, still untyped per provider.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyQueryResponse {
    /// Data keyed by contribution id.
    #[serde(default)]
    pub data_providers: HashMap<String, serde_json::Value>,
    /// Exceptions keyed by contribution id.
    #[serde(default)]
    pub data_provider_exceptions: HashMap<String, DataProviderException>,
}

impl HierarchyQueryResponse {
    /// Decode the data of one contribution.
    ///
    /// Returns `Ok(None)` when the provider is absent or `null`, and an error
    /// when the provider reported an exception.
    pub fn provider<T: DeserializeOwned>(
        &self,
        contribution_id: &str,
    ) -> Result<Option<T>, ProviderError> {
        if let Some(exception) = self.data_provider_exceptions.get(contribution_id) {
            if !exception.message.is_empty() {
                return Err(ProviderError::Api {
                    status: 200,
                    body: format!("{}: {}", contribution_id, exception.message),
                });
            }
        }

        match self.data_providers.get(contribution_id) {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => Ok(Some(T::deserialize(value)?)),
        }
    }
}

impl HttpClient {
    /// POST a hierarchy query and return the untyped response.
    pub async fn hierarchy_query<P: Serialize>(
        &self,
        query: &HierarchyQuery<P>,
    ) -> Result<HierarchyQueryResponse, ProviderError> {
        let body = serde_json::to_string(query)?;
        self.send_json(
            Method::POST,
            HIERARCHY_QUERY_PATH,
            &[],
            Some(body),
            CHECKS_ACCEPT,
        )
        .await
    }
}
