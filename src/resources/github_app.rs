//! GitHub App service connection of a repository.

use serde_json::Value;
use tracing::{debug, info};

use super::data::parse_import_id;
use super::{Resource, ResourceData};
use crate::api::AggregatedClient;
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema, Validator};

pub const RESOURCE_NAME: &str = "bblnazuredevops_serviceendpoint_githubapp";

/// Installs the Azure Pipelines GitHub App connection on a repository.
/// Every attribute forces a replacement.
pub struct GithubAppResource;

impl GithubAppResource {
    fn app_id(state: &ResourceData) -> Result<&str, ProviderError> {
        match state.get_str("app_id").filter(|id| !id.is_empty()) {
            Some(id) => Ok(id),
            None => state.required_id(RESOURCE_NAME),
        }
    }
}

#[async_trait::async_trait]
impl Resource for GithubAppResource {
    fn name(&self) -> &'static str {
        RESOURCE_NAME
    }

    fn schema(&self) -> Schema {
        let required = || {
            Attribute::required_string()
                .with_force_new()
                .with_validator(Validator::NotWhitespace)
        };
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute("project_id", required())
            .with_attribute(
                "connection_id",
                required().with_description("GitHub service connection authorizing the app"),
            )
            .with_attribute("repo", required().with_description("Repository as owner/name"))
            .with_attribute("app_id", Attribute::computed_string())
    }

    async fn create(&self, client: &AggregatedClient, mut planned: ResourceData) -> Result<Value, ProviderError> {
        let app_id = client
            .github_apps
            .add(
                planned.required_str("project_id")?,
                planned.required_str("repo")?,
                planned.required_str("connection_id")?,
            )
            .await?;
        info!(app_id = %app_id, "Created GitHub App connection");

        planned.set_id(app_id.clone());
        planned.set("app_id", app_id);
        Ok(planned.into_value())
    }

    async fn read(&self, client: &AggregatedClient, mut state: ResourceData) -> Result<Value, ProviderError> {
        let project_id = state.required_str("project_id")?.to_string();
        let app_id = Self::app_id(&state)?.to_string();

        let Some(endpoint) = client.github_apps.get(&project_id, &app_id).await? else {
            debug!(app_id = %app_id, "GitHub App connection not found, removing from state");
            return Ok(Value::Null);
        };

        let id = endpoint.id.unwrap_or(app_id);
        state.set_id(id.clone());
        state.set("app_id", id);
        Ok(state.into_value())
    }

    async fn update(
        &self,
        _client: &AggregatedClient,
        _prior: ResourceData,
        _planned: ResourceData,
    ) -> Result<Value, ProviderError> {
        Err(ProviderError::Unimplemented(
            "github apps cannot be updated, delete then re-create".to_string(),
        ))
    }

    async fn delete(&self, client: &AggregatedClient, state: ResourceData) -> Result<(), ProviderError> {
        let project_id = state.required_str("project_id")?;
        client.github_apps.delete(project_id, Self::app_id(&state)?).await
    }

    fn import_state(&self, id: &str) -> Result<ResourceData, ProviderError> {
        let parts = parse_import_id(id, 2, "<project_id>/<id>")?;
        let mut data = ResourceData::default();
        data.set("project_id", parts[0]);
        data.set_id(parts[1]);
        data.set("app_id", parts[1]);
        Ok(data)
    }
}
