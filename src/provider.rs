//! The Azure DevOps provider: resource registry plus the configured clients.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::api::AggregatedClient;
use crate::config::{ProviderConfig, ENV_ACCESS_TOKEN, ENV_ORG_SERVICE_URL, ENV_PERSONAL_ACCESS_TOKEN};
use crate::error::ProviderError;
use crate::resources::{self, Resource, ResourceData};
use crate::schema::{Attribute, Diagnostic, ProviderSchema, Schema, Validator};
use crate::service::ProviderService;
use crate::types::{ImportedResource, PlanResult};
use crate::validation;

/// Provider for Azure DevOps pipeline checks, service endpoints and build
/// permissions.
pub struct AzureDevOpsProvider {
    resources: BTreeMap<&'static str, Arc<dyn Resource>>,
    client: RwLock<Option<Arc<AggregatedClient>>>,
}

impl Default for AzureDevOpsProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl AzureDevOpsProvider {
    pub fn new() -> Self {
        Self {
            resources: resources::all()
                .into_iter()
                .map(|resource| (resource.name(), resource))
                .collect(),
            client: RwLock::new(None),
        }
    }

    /// A provider already holding clients, skipping `configure`.
    pub fn with_client(client: Arc<AggregatedClient>) -> Self {
        let provider = Self::new();
        Self {
            client: RwLock::new(Some(client)),
            ..provider
        }
    }

    /// Schema of the provider block.
    pub fn provider_config_schema() -> Schema {
        Schema::v0()
            .with_attribute(
                "org_service_url",
                Attribute::optional_string()
                    .with_env_default(ENV_ORG_SERVICE_URL)
                    .with_validator(Validator::HttpUrlNoTrailingSlash)
                    .with_description("The url of the Azure DevOps organization"),
            )
            .with_attribute(
                "personal_access_token",
                Attribute::optional_string()
                    .sensitive()
                    .with_env_default(ENV_PERSONAL_ACCESS_TOKEN)
                    .with_description("Personal access token, sent as basic auth"),
            )
            .with_attribute(
                "access_token",
                Attribute::optional_string()
                    .sensitive()
                    .with_env_default(ENV_ACCESS_TOKEN)
                    .with_description("OAuth token, sent as a bearer token"),
            )
            .with_attribute(
                "request_timeout_seconds",
                Attribute::optional_int64()
                    .with_validator(Validator::NoZeroValues)
                    .with_description("Request timeout in seconds, 60 by default"),
            )
    }

    fn resource(&self, resource_type: &str) -> Result<&Arc<dyn Resource>, ProviderError> {
        self.resources
            .get(resource_type)
            .ok_or_else(|| ProviderError::UnknownResource(resource_type.to_string()))
    }

    async fn client(&self) -> Result<Arc<AggregatedClient>, ProviderError> {
        self.client.read().await.clone().ok_or_else(|| {
            ProviderError::Configuration("provider has not been configured".to_string())
        })
    }
}

#[async_trait::async_trait]
impl ProviderService for AzureDevOpsProvider {
    fn schema(&self) -> ProviderSchema {
        self.resources.values().fold(
            ProviderSchema::new().with_provider_config(Self::provider_config_schema()),
            |schema, resource| schema.with_resource(resource.name(), resource.schema()),
        )
    }

    async fn validate_provider_config(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        Ok(validation::validate(&Self::provider_config_schema(), &config))
    }

    #[instrument(skip(self, config), name = "provider.configure")]
    async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, ProviderError> {
        let diagnostics = validation::validate(&Self::provider_config_schema(), &config);
        if diagnostics.iter().any(Diagnostic::is_error) {
            return Ok(diagnostics);
        }

        let resolved = ProviderConfig::from_value(config)?
            .with_env_defaults()
            .resolve()?;
        let client = AggregatedClient::new(&resolved)?;
        *self.client.write().await = Some(client);
        info!(org_service_url = %resolved.org_service_url, "Provider configured");
        Ok(diagnostics)
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        debug!("Stopping provider");
        *self.client.write().await = None;
        Ok(())
    }

    #[instrument(skip(self, config), name = "provider.validate_resource_config")]
    async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, ProviderError> {
        let schema = self.resource(resource_type)?.schema();
        let config = ResourceData::from_config(&schema, config)?.into_value();
        Ok(validation::validate(&schema, &config))
    }

    #[instrument(skip(self, prior_state, proposed_state, _config), name = "provider.plan")]
    async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
        _config: Value,
    ) -> Result<PlanResult, ProviderError> {
        let schema = self.resource(resource_type)?.schema();
        let proposed = ResourceData::from_config(&schema, proposed_state)?.into_value();
        let prior = prior_state.unwrap_or(Value::Null);
        let plan = PlanResult::diff(&schema, &prior, &proposed);
        debug!(
            changes = plan.changes.len(),
            requires_replace = plan.requires_replace,
            "Planned"
        );
        Ok(plan)
    }

    #[instrument(skip(self, planned_state), name = "provider.create")]
    async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let planned = ResourceData::from_config(&resource.schema(), planned_state)?;
        resource.create(&*self.client().await?, planned).await
    }

    #[instrument(skip(self, current_state), name = "provider.read")]
    async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let state = ResourceData::from_state(current_state)?;
        resource.read(&*self.client().await?, state).await
    }

    #[instrument(skip(self, prior_state, planned_state), name = "provider.update")]
    async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, ProviderError> {
        let resource = self.resource(resource_type)?;
        let prior = ResourceData::from_state(prior_state)?;
        let planned = ResourceData::from_config(&resource.schema(), planned_state)?;
        resource.update(&*self.client().await?, prior, planned).await
    }

    #[instrument(skip(self, current_state), name = "provider.delete")]
    async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), ProviderError> {
        let resource = self.resource(resource_type)?;
        let state = ResourceData::from_state(current_state)?;
        resource.delete(&*self.client().await?, state).await
    }

    #[instrument(skip(self), name = "provider.import_resource")]
    async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, ProviderError> {
        let resource = self.resource(resource_type)?;
        let seed = resource.import_state(id)?;
        let state = resource.read(&*self.client().await?, seed).await?;
        if state.is_null() {
            return Err(ProviderError::NotFound(format!("{} {}", resource_type, id)));
        }
        Ok(vec![ImportedResource::new(resource_type, state)])
    }
}
