//! Resource types managed by the provider.
//!
//! Each resource maps its flat attribute state onto one of the API clients in
//! [`crate::api`]. The provider looks resources up by type name and hands
//! them the clients built by `configure`.

pub mod build_permissions;
pub mod checks;
pub mod data;
pub mod github_app;
pub mod service_endpoint;

use std::sync::Arc;

use serde_json::Value;

use crate::api::AggregatedClient;
use crate::error::ProviderError;
use crate::schema::Schema;

pub use data::ResourceData;

/// Prefix of every resource type name.
pub const TYPE_PREFIX: &str = "bblnazuredevops_";

/// Lifecycle of one resource type.
#[async_trait::async_trait]
pub trait Resource: Send + Sync {
    /// Full type name, e.g. `bblnazuredevops_check_exclusivelock`.
    fn name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    /// Create the remote object and return the new state.
    async fn create(&self, client: &AggregatedClient, planned: ResourceData)
        -> Result<Value, ProviderError>;

    /// Refresh state. `Value::Null` when the remote object is gone.
    async fn read(&self, client: &AggregatedClient, state: ResourceData) -> Result<Value, ProviderError>;

    async fn update(
        &self,
        client: &AggregatedClient,
        prior: ResourceData,
        planned: ResourceData,
    ) -> Result<Value, ProviderError>;

    async fn delete(&self, client: &AggregatedClient, state: ResourceData) -> Result<(), ProviderError>;

    /// Turn an import id into the minimal state `read` needs.
    fn import_state(&self, id: &str) -> Result<ResourceData, ProviderError> {
        let _ = id;
        Err(ProviderError::Unimplemented(format!(
            "{} does not support import",
            self.name()
        )))
    }
}

/// Every resource type of the provider.
pub fn all() -> Vec<Arc<dyn Resource>> {
    vec![
        Arc::new(build_permissions::BuildPermissionsResource),
        Arc::new(checks::PipelineCheck::<crate::api::checks::InvokeRestApi>::new()),
        Arc::new(checks::PipelineCheck::<crate::api::checks::ManualApproval>::new()),
        Arc::new(checks::PipelineCheck::<crate::api::checks::ExclusiveLock>::new()),
        Arc::new(service_endpoint::EndpointResource::<service_endpoint::GenericWebhook>::new()),
        Arc::new(service_endpoint::EndpointResource::<service_endpoint::BabylonAwsIam>::new()),
        Arc::new(service_endpoint::EndpointResource::<service_endpoint::BabylonVault>::new()),
        Arc::new(github_app::GithubAppResource),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_resource_names() {
        let mut names: Vec<_> = all().iter().map(|r| r.name()).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "bblnazuredevops_build_permissions",
                "bblnazuredevops_check_exclusivelock",
                "bblnazuredevops_check_invokerestapi",
                "bblnazuredevops_check_manualapproval",
                "bblnazuredevops_serviceendpoint_babylonawsiam",
                "bblnazuredevops_serviceendpoint_babylonvault",
                "bblnazuredevops_serviceendpoint_genericwebhook",
                "bblnazuredevops_serviceendpoint_githubapp",
            ]
        );
        assert!(names.iter().all(|n| n.starts_with(TYPE_PREFIX)));
    }

    #[test]
    fn test_every_schema_has_id() {
        for resource in all() {
            let schema = resource.schema();
            let id = schema.attribute("id").unwrap();
            assert!(id.flags.computed, "{} id must be computed", resource.name());
        }
    }
}
