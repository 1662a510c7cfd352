//! Check resources: one generic resource over every [`CheckKind`].

use std::marker::PhantomData;

use serde_json::{json, Value};
use tracing::{debug, info};

use super::data::parse_import_id;
use super::{Resource, ResourceData};
use crate::api::checks::{
    CheckKind, Configuration, ExclusiveLock, ExclusiveLockValues, InvokeRestApi,
    InvokeRestApiValues, ManualApproval, ManualApprovalValues,
};
use crate::api::AggregatedClient;
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema, Validator};

const IMPORT_FORMAT: &str = "<project_id>/<resource_id>/<check_id>";

/// What a check kind adds on top of the shared check attributes.
pub trait CheckAttributes: CheckKind {
    const RESOURCE_NAME: &'static str;

    /// Add the kind's attributes to the shared schema.
    fn kind_schema(schema: Schema) -> Schema;

    /// User values from configuration.
    fn values(data: &ResourceData) -> Result<Self::Values, ProviderError>;

    /// Write the kind's settings back into state.
    fn flatten(settings: &Self::Settings, data: &mut ResourceData) -> Result<(), ProviderError>;
}

impl CheckAttributes for InvokeRestApi {
    const RESOURCE_NAME: &'static str = "bblnazuredevops_check_invokerestapi";

    fn kind_schema(schema: Schema) -> Schema {
        schema
            .with_attribute(
                "service_connection_id",
                Attribute::required_string().with_validator(Validator::NotWhitespace),
            )
            .with_attribute("linked_variable_group", Attribute::optional_string())
            .with_attribute("retry_interval", Attribute::optional_int64().with_computed())
            .with_attribute("display_name", Attribute::required_string())
            .with_attribute("method", Attribute::required_string())
            .with_attribute(
                "use_callback",
                Attribute::required_bool()
                    .with_description("Wait for the service to call back instead of evaluating the response"),
            )
            .with_attribute("body", Attribute::optional_string())
            .with_attribute("url_suffix", Attribute::optional_string())
            .with_attribute("success_criteria", Attribute::optional_string())
            .with_attribute("headers", Attribute::optional_string_map())
    }

    fn values(data: &ResourceData) -> Result<Self::Values, ProviderError> {
        Ok(InvokeRestApiValues {
            service_connection_id: data.required_str("service_connection_id")?.to_string(),
            linked_variable_group: data
                .get_str("linked_variable_group")
                .filter(|g| !g.is_empty())
                .map(str::to_string),
            timeout: data.get_i64("timeout"),
            retry_interval: data.get_i64("retry_interval"),
            display_name: data.get_string("display_name"),
            method: data.get_string("method"),
            use_callback: data.required_bool("use_callback")?,
            body: data.get_string("body"),
            url_suffix: data.get_string("url_suffix"),
            success_criteria: data.get_string("success_criteria"),
            headers: data.get_string_map("headers"),
        })
    }

    fn flatten(settings: &Self::Settings, data: &mut ResourceData) -> Result<(), ProviderError> {
        data.set("display_name", settings.display_name.clone());
        data.set("use_callback", settings.use_callback()?);
        data.set_string_map("headers", &settings.headers()?);
        data.set("retry_interval", settings.retry_interval);
        data.set_non_empty(
            "linked_variable_group",
            settings.linked_variable_group.as_deref().unwrap_or_default(),
        );

        let inputs = &settings.inputs;
        data.set("service_connection_id", inputs.connected_service_name.clone());
        data.set("method", inputs.method.clone());
        data.set_non_empty("body", &inputs.body);
        data.set_non_empty("url_suffix", &inputs.url_suffix);
        data.set_non_empty("success_criteria", &inputs.success_criteria);
        Ok(())
    }
}

impl CheckAttributes for ManualApproval {
    const RESOURCE_NAME: &'static str = "bblnazuredevops_check_manualapproval";

    fn kind_schema(schema: Schema) -> Schema {
        schema
            .with_attribute(
                "approvers",
                Attribute::required_string_list().with_validator(Validator::NoZeroValues),
            )
            .with_attribute("allow_self_approve", Attribute::required_bool())
            .with_attribute(
                "approve_in_order",
                Attribute::optional_bool().with_default(json!(false)),
            )
            .with_attribute(
                "minimum_approvers",
                Attribute::optional_int64().with_default(json!(0)),
            )
            .with_attribute("instructions", Attribute::optional_string())
    }

    fn values(data: &ResourceData) -> Result<Self::Values, ProviderError> {
        Ok(ManualApprovalValues {
            approvers: data.get_string_list("approvers"),
            instructions: data.get_string("instructions"),
            allow_self_approval: data.required_bool("allow_self_approve")?,
            timeout: data.get_i64("timeout"),
            approve_in_order: data.get_bool("approve_in_order").unwrap_or(false),
            minimum_approvers: data.get_i64("minimum_approvers").unwrap_or(0),
        })
    }

    fn flatten(settings: &Self::Settings, data: &mut ResourceData) -> Result<(), ProviderError> {
        data.set("approvers", settings.approver_ids());
        data.set("allow_self_approve", !settings.requester_cannot_be_approver);
        data.set("approve_in_order", settings.approve_in_order());
        data.set("minimum_approvers", settings.min_required_approvers);
        data.set_non_empty("instructions", &settings.instructions);
        Ok(())
    }
}

impl CheckAttributes for ExclusiveLock {
    const RESOURCE_NAME: &'static str = "bblnazuredevops_check_exclusivelock";

    fn kind_schema(schema: Schema) -> Schema {
        schema
    }

    fn values(data: &ResourceData) -> Result<Self::Values, ProviderError> {
        Ok(ExclusiveLockValues {
            timeout: data.get_i64("timeout"),
        })
    }

    fn flatten(_settings: &Self::Settings, _data: &mut ResourceData) -> Result<(), ProviderError> {
        Ok(())
    }
}

/// A pipeline check on a protected resource. The id is the check id.
pub struct PipelineCheck<K> {
    kind: PhantomData<fn() -> K>,
}

impl<K> PipelineCheck<K> {
    pub fn new() -> Self {
        Self { kind: PhantomData }
    }
}

impl<K> Default for PipelineCheck<K> {
    fn default() -> Self {
        Self::new()
    }
}

fn check_id(data: &ResourceData, resource_type: &str) -> Result<i64, ProviderError> {
    let id = data.required_id(resource_type)?;
    id.parse()
        .map_err(|_| ProviderError::Validation(format!("check id {:?} is not an integer", id)))
}

/// Copy a configuration returned by the API into state.
fn flatten_configuration<K: CheckAttributes>(
    configuration: &Configuration<K>,
    data: &mut ResourceData,
) -> Result<(), ProviderError> {
    data.set_id(configuration.id.to_string());
    data.set("timeout", configuration.timeout);
    if !configuration.resource.id.is_empty() {
        data.set("resource_id", configuration.resource.id.clone());
    }
    if !configuration.resource.resource_type.is_empty() {
        data.set("type", configuration.resource.resource_type.clone());
    }
    K::flatten(&configuration.settings, data)
}

#[async_trait::async_trait]
impl<K> Resource for PipelineCheck<K>
where
    K: CheckAttributes + 'static,
    K::Values: Send + Sync,
{
    fn name(&self) -> &'static str {
        K::RESOURCE_NAME
    }

    fn schema(&self) -> Schema {
        let schema = Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "project_id",
                Attribute::required_string()
                    .with_force_new()
                    .with_validator(Validator::NotWhitespace),
            )
            .with_attribute(
                "resource_id",
                Attribute::required_string()
                    .with_force_new()
                    .with_validator(Validator::NotWhitespace),
            )
            .with_attribute(
                "type",
                Attribute::required_string()
                    .with_description("Type of the protected resource, e.g. endpoint or queue"),
            )
            .with_attribute("timeout", Attribute::optional_int64().with_computed());
        K::kind_schema(schema).with_description(format!("{} check", K::TYPE_NAME))
    }

    async fn create(
        &self,
        client: &AggregatedClient,
        mut planned: ResourceData,
    ) -> Result<Value, ProviderError> {
        let values = K::values(&planned)?;
        let project_id = planned.required_str("project_id")?.to_string();
        let resource_id = planned.required_str("resource_id")?.to_string();
        let resource_type = planned.required_str("type")?.to_string();

        let created = client
            .checks
            .add::<K>(&project_id, &resource_type, &resource_id, &values)
            .await?;
        info!(check_id = created.id, check_type = K::TYPE_NAME, "Created check");

        flatten_configuration::<K>(&created, &mut planned)?;
        Ok(planned.into_value())
    }

    async fn read(&self, client: &AggregatedClient, mut state: ResourceData) -> Result<Value, ProviderError> {
        let check_id = check_id(&state, K::RESOURCE_NAME)?;
        let project_id = state.required_str("project_id")?.to_string();
        let resource_id = state.required_str("resource_id")?.to_string();

        let Some(found) = client
            .checks
            .get_by_id::<K>(&project_id, &resource_id, check_id)
            .await?
        else {
            debug!(check_id, "Check not found, removing from state");
            return Ok(Value::Null);
        };

        flatten_configuration::<K>(&found.check_configuration, &mut state)?;
        Ok(state.into_value())
    }

    async fn update(
        &self,
        client: &AggregatedClient,
        prior: ResourceData,
        mut planned: ResourceData,
    ) -> Result<Value, ProviderError> {
        let check_id = check_id(&prior, K::RESOURCE_NAME)?;
        let values = K::values(&planned)?;
        let project_id = planned.required_str("project_id")?.to_string();
        let resource_id = planned.required_str("resource_id")?.to_string();
        let resource_type = planned.required_str("type")?.to_string();

        let updated = client
            .checks
            .update::<K>(&project_id, &resource_type, &resource_id, check_id, &values)
            .await?;

        flatten_configuration::<K>(&updated, &mut planned)?;
        Ok(planned.into_value())
    }

    async fn delete(&self, client: &AggregatedClient, state: ResourceData) -> Result<(), ProviderError> {
        let check_id = check_id(&state, K::RESOURCE_NAME)?;
        let project_id = state.required_str("project_id")?;
        client.checks.delete(project_id, check_id).await
    }

    fn import_state(&self, id: &str) -> Result<ResourceData, ProviderError> {
        let parts = parse_import_id(id, 3, IMPORT_FORMAT)?;
        if parts[2].parse::<i64>().is_err() {
            return Err(ProviderError::InvalidRequest(format!(
                "invalid import id {:?}, check id must be an integer",
                id
            )));
        }
        let mut data = ResourceData::default();
        data.set("project_id", parts[0]);
        data.set("resource_id", parts[1]);
        data.set_id(parts[2]);
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::contribution::HIERARCHY_QUERY_PATH;
    use crate::api::{Credentials, HttpClient};
    use mockito::{Matcher, Server};

    fn client(url: &str) -> AggregatedClient {
        AggregatedClient::from_http(
            HttpClient::new(
                url,
                &Credentials::PersonalAccessToken("token".to_string()),
                None,
            )
            .unwrap(),
        )
    }

    fn state(value: Value) -> ResourceData {
        ResourceData::from_state(value).unwrap()
    }

    fn hierarchy_body(list: Value) -> String {
        json!({
            "dataProviders": {
                "ms.vss-pipelinechecks.checks-data-provider": { "checkConfigurationDataList": list }
            }
        })
        .to_string()
    }

    fn invoke_configuration() -> Value {
        json!({
            "id": 46,
            "type": { "id": "FE1DE3EE-A436-41B4-BB20-F6EB4CB879A7", "name": "Task Check" },
            "timeout": 43200,
            "resource": { "type": "endpoint", "id": "res" },
            "settings": {
                "displayName": "notify",
                "definitionRef": { "id": "9c3e8943-130d-4c78-ac63-8af81df62dfb", "name": "InvokeRESTAPI", "version": "1.152.3" },
                "inputs": {
                    "connectedServiceNameSelector": "connectedServiceName",
                    "connectedServiceName": "sc-1",
                    "method": "POST",
                    "waitForCompletion": "true",
                    "body": "",
                    "urlSuffix": "/hook",
                    "successCriteria": "",
                    "headers": "{\"Content-Type\":\"application/json\"}"
                },
                "retryInterval": 5,
                "linkedVariableGroup": null
            }
        })
    }

    #[tokio::test]
    async fn test_invoke_rest_api_create() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/proj/_apis/pipelines/checks/configurations")
            .match_body(Matcher::PartialJson(json!({
                "type": { "id": "fe1de3ee-a436-41b4-bb20-f6eb4cb879a7" },
                "resource": { "type": "endpoint", "id": "res" },
                "timeout": 43200,
                "settings": {
                    "displayName": "notify",
                    "retryInterval": 5,
                    "inputs": {
                        "connectedServiceName": "sc-1",
                        "waitForCompletion": "true",
                        "urlSuffix": "/hook",
                        "headers": "{\"Content-Type\":\"application/json\"}"
                    }
                }
            })))
            .with_status(200)
            .with_body(invoke_configuration().to_string())
            .create_async()
            .await;

        let resource = PipelineCheck::<InvokeRestApi>::new();
        let planned = state(json!({
            "project_id": "proj",
            "resource_id": "res",
            "type": "endpoint",
            "service_connection_id": "sc-1",
            "display_name": "notify",
            "method": "POST",
            "use_callback": true,
            "url_suffix": "/hook",
            "headers": { "Content-Type": "application/json" }
        }));

        let created = resource.create(&client(&server.url()), planned).await.unwrap();
        mock.assert_async().await;
        assert_eq!(created["id"], "46");
        assert_eq!(created["timeout"], 43200);
        assert_eq!(created["retry_interval"], 5);
        assert_eq!(created["use_callback"], true);
        assert_eq!(created["body"], Value::Null);
        assert_eq!(created["headers"], json!({ "Content-Type": "application/json" }));
    }

    #[tokio::test]
    async fn test_invoke_rest_api_read_bad_wait_for_completion() {
        let mut server = Server::new_async().await;
        let mut config = invoke_configuration();
        config["settings"]["inputs"]["waitForCompletion"] = json!("maybe");
        let _mock = server
            .mock("POST", HIERARCHY_QUERY_PATH)
            .with_status(200)
            .with_body(hierarchy_body(json!([{ "checkConfiguration": config }])))
            .create_async()
            .await;

        let resource = PipelineCheck::<InvokeRestApi>::new();
        let err = resource
            .read(
                &client(&server.url()),
                state(json!({"id": "46", "project_id": "proj", "resource_id": "res"})),
            )
            .await
            .unwrap_err();
        assert!(err.message().contains("waitForCompletion"));
    }

    #[tokio::test]
    async fn test_manual_approval_read() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", HIERARCHY_QUERY_PATH)
            .match_body(Matcher::PartialJson(json!({
                "dataProviderContext": { "properties": { "resourceId": "res" } }
            })))
            .with_status(200)
            .with_body(hierarchy_body(json!([
                { "checkConfiguration": invoke_configuration() },
                { "checkConfiguration": {
                    "id": 47,
                    "type": { "id": "8c6f20a7-a545-4486-9777-f762fafe0d4d", "name": "Approval" },
                    "timeout": 600,
                    "resource": { "type": "queue", "id": "res" },
                    "settings": {
                        "approvers": [{ "id": "a-1", "displayName": "Ana" }, { "id": "a-2" }],
                        "executionOrder": 2,
                        "instructions": "",
                        "blockedApprovers": [],
                        "minRequiredApprovers": 1,
                        "requesterCannotBeApprover": true
                    }
                }}
            ])))
            .create_async()
            .await;

        let resource = PipelineCheck::<ManualApproval>::new();
        let read = resource
            .read(
                &client(&server.url()),
                state(json!({"id": "47", "project_id": "proj", "resource_id": "res", "type": "endpoint"})),
            )
            .await
            .unwrap();

        assert_eq!(read["approvers"], json!(["a-1", "a-2"]));
        assert_eq!(read["allow_self_approve"], false);
        assert_eq!(read["approve_in_order"], true);
        assert_eq!(read["minimum_approvers"], 1);
        assert_eq!(read["instructions"], Value::Null);
        assert_eq!(read["timeout"], 600);
        assert_eq!(read["type"], "queue");
    }

    #[tokio::test]
    async fn test_read_missing_or_other_kind_is_null() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", HIERARCHY_QUERY_PATH)
            .with_status(200)
            .with_body(hierarchy_body(json!([{ "checkConfiguration": invoke_configuration() }])))
            .create_async()
            .await;
        let client = client(&server.url());

        // id 46 is an invoke check, not a lock
        let read = PipelineCheck::<ExclusiveLock>::new()
            .read(&client, state(json!({"id": "46", "project_id": "proj", "resource_id": "res"})))
            .await
            .unwrap();
        assert!(read.is_null());

        let read = PipelineCheck::<ExclusiveLock>::new()
            .read(&client, state(json!({"id": "99", "project_id": "proj", "resource_id": "res"})))
            .await
            .unwrap();
        assert!(read.is_null());
    }

    #[tokio::test]
    async fn test_exclusive_lock_update_and_delete() {
        let mut server = Server::new_async().await;
        let update = server
            .mock("PATCH", "/proj/_apis/pipelines/checks/configurations/48")
            .match_body(Matcher::Json(json!({
                "type": { "id": "2EF31AD6-BAA0-403A-8B45-2CBC9B4E5563", "name": "ExclusiveLock" },
                "settings": {},
                "resource": { "type": "endpoint", "id": "res" },
                "timeout": 120,
                "id": "48"
            })))
            .with_status(200)
            .with_body(
                json!({
                    "id": 48,
                    "type": { "id": "2EF31AD6-BAA0-403A-8B45-2CBC9B4E5563", "name": "ExclusiveLock" },
                    "timeout": 120,
                    "resource": { "type": "endpoint", "id": "res" },
                    "settings": {}
                })
                .to_string(),
            )
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/proj/_apis/pipelines/checks/configurations/48")
            .with_status(204)
            .create_async()
            .await;

        let client = client(&server.url());
        let resource = PipelineCheck::<ExclusiveLock>::new();
        let prior = state(json!({
            "id": "48", "project_id": "proj", "resource_id": "res", "type": "endpoint", "timeout": 60
        }));
        let planned = state(json!({
            "project_id": "proj", "resource_id": "res", "type": "endpoint", "timeout": 120
        }));

        let updated = resource.update(&client, prior, planned).await.unwrap();
        update.assert_async().await;
        assert_eq!(updated["id"], "48");
        assert_eq!(updated["timeout"], 120);

        resource
            .delete(&client, ResourceData::from_state(updated).unwrap())
            .await
            .unwrap();
        delete.assert_async().await;
    }

    #[test]
    fn test_values_accept_integral_floats() {
        let data = state(json!({
            "approvers": ["a-1"],
            "allow_self_approve": true,
            "timeout": 120.0,
            "minimum_approvers": 2.0
        }));
        let values = ManualApproval::values(&data).unwrap();
        assert_eq!(values.timeout, Some(120));
        assert_eq!(values.minimum_approvers, 2);
    }

    #[test]
    fn test_import_state() {
        let resource = PipelineCheck::<ManualApproval>::new();
        let data = resource.import_state("proj/res/47").unwrap();
        assert_eq!(data.id(), Some("47"));
        assert_eq!(data.get_str("project_id"), Some("proj"));
        assert_eq!(data.get_str("resource_id"), Some("res"));

        assert!(resource.import_state("proj/res/abc").is_err());
        assert!(resource.import_state("proj/47").is_err());
    }

    #[test]
    fn test_schemas() {
        let schema = PipelineCheck::<InvokeRestApi>::new().schema();
        assert!(schema.is_force_new("project_id"));
        assert!(schema.is_force_new("resource_id"));
        assert!(!schema.is_force_new("type"));
        assert!(schema.attribute("use_callback").unwrap().flags.required);
        assert!(schema.attribute("timeout").unwrap().flags.computed);

        let schema = PipelineCheck::<ManualApproval>::new().schema();
        assert_eq!(schema.attribute("minimum_approvers").unwrap().default, Some(json!(0)));

        let schema = PipelineCheck::<ExclusiveLock>::new().schema();
        assert_eq!(schema.attributes.len(), 5);
    }

    #[test]
    fn test_invalid_check_id() {
        let err = check_id(&state(json!({"id": "abc"})), "x").unwrap_err();
        assert!(err.message().contains("not an integer"));
        assert!(check_id(&state(json!({})), "x").is_err());
    }
}
