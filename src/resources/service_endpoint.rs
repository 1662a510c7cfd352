//! Service endpoint resources.
//!
//! Every endpoint kind shares the project, name and description attributes
//! and the CRUD calls. A kind decides the endpoint type, the authorization
//! block and the data map.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use serde_json::{json, Value};
use tracing::{debug, info};

use super::data::parse_import_id;
use super::{Resource, ResourceData};
use crate::api::service_endpoint::{EndpointAuthorization, ServiceEndpoint};
use crate::api::AggregatedClient;
use crate::error::ProviderError;
use crate::schema::{Attribute, Schema, Validator};

const IMPORT_FORMAT: &str = "<project_id>/<id>";

/// Description used when configuration does not set one.
pub const DEFAULT_DESCRIPTION: &str = "Managed by Terraform";

const SCHEME_USERNAME_PASSWORD: &str = "UsernamePassword";
const SCHEME_NONE: &str = "None";

/// One kind of service endpoint.
pub trait EndpointKind: Send + Sync + 'static {
    const RESOURCE_NAME: &'static str;
    /// The endpoint `type`.
    const ENDPOINT_TYPE: &'static str;
    /// Attributes never returned by the API.
    const SECRETS: &'static [&'static str];

    fn kind_schema(schema: Schema) -> Schema;

    /// Fill url, authorization and data from configuration.
    fn expand(data: &ResourceData, endpoint: &mut ServiceEndpoint) -> Result<(), ProviderError>;

    /// Write the kind's attributes back into state. Secrets are left alone.
    fn flatten(endpoint: &ServiceEndpoint, data: &mut ResourceData);
}

/// Generic webhook: a url with optional basic auth.
#[derive(Debug, Clone, Copy)]
pub struct GenericWebhook;

pub const ENV_GENERIC_WEBHOOK_URL: &str = "AZDO_GENERIC_WEBHOOK_URL";
pub const ENV_GENERIC_WEBHOOK_USERNAME: &str = "AZDO_GENERIC_WEBHOOK_USERNAME";
pub const ENV_GENERIC_WEBHOOK_PASSWORD: &str = "AZDO_GENERIC_WEBHOOK_PASSWORD";

impl EndpointKind for GenericWebhook {
    const RESOURCE_NAME: &'static str = "bblnazuredevops_serviceendpoint_genericwebhook";
    const ENDPOINT_TYPE: &'static str = "generic";
    const SECRETS: &'static [&'static str] = &["password"];

    fn kind_schema(schema: Schema) -> Schema {
        schema
            .with_attribute(
                "url",
                Attribute::required_string()
                    .with_env_default(ENV_GENERIC_WEBHOOK_URL)
                    .with_description("The endpoint URL"),
            )
            .with_attribute(
                "username",
                Attribute::optional_string()
                    .with_env_default(ENV_GENERIC_WEBHOOK_USERNAME)
                    .with_description("The username for the endpoint"),
            )
            .with_secret(
                "password",
                Attribute::optional_string()
                    .with_env_default(ENV_GENERIC_WEBHOOK_PASSWORD)
                    .with_description("The password for the endpoint"),
            )
    }

    fn expand(data: &ResourceData, endpoint: &mut ServiceEndpoint) -> Result<(), ProviderError> {
        endpoint.url = data.required_str("url")?.to_string();
        endpoint.authorization = EndpointAuthorization {
            scheme: SCHEME_USERNAME_PASSWORD.to_string(),
            parameters: BTreeMap::from([
                ("username".to_string(), data.get_string("username")),
                ("password".to_string(), data.get_string("password")),
            ]),
        };
        Ok(())
    }

    fn flatten(endpoint: &ServiceEndpoint, data: &mut ResourceData) {
        data.set("url", endpoint.url.clone());
        data.set_non_empty(
            "username",
            endpoint
                .authorization
                .parameters
                .get("username")
                .map(String::as_str)
                .unwrap_or_default(),
        );
    }
}

/// Babylon AWS IAM: an IAM user assuming a global role.
#[derive(Debug, Clone, Copy)]
pub struct BabylonAwsIam;

pub const AWS_IAM_DEFAULT_SESSION_NAME: &str = "azure-pipelines-task";
const AWS_URL: &str = "https://aws.amazon.com/";

impl EndpointKind for BabylonAwsIam {
    const RESOURCE_NAME: &'static str = "bblnazuredevops_serviceendpoint_babylonawsiam";
    const ENDPOINT_TYPE: &'static str = "babylon-service-endpoint-aws-iam";
    const SECRETS: &'static [&'static str] = &["password"];

    fn kind_schema(schema: Schema) -> Schema {
        schema
            .with_attribute(
                "username",
                Attribute::required_string().with_description("AWS Access Key ID of the IAM user"),
            )
            .with_secret(
                "password",
                Attribute::required_string()
                    .with_description("AWS Secret Access Key of the IAM user"),
            )
            .with_attribute(
                "global_role_arn",
                Attribute::required_string()
                    .with_description("The Amazon Resource Name (ARN) of the role to assume"),
            )
            .with_attribute(
                "global_sts_session_name",
                Attribute::optional_string()
                    .with_default(json!(AWS_IAM_DEFAULT_SESSION_NAME))
                    .with_description("Session name used when assuming the role"),
            )
    }

    fn expand(data: &ResourceData, endpoint: &mut ServiceEndpoint) -> Result<(), ProviderError> {
        endpoint.url = AWS_URL.to_string();
        let session_name = data
            .get_str("global_sts_session_name")
            .unwrap_or(AWS_IAM_DEFAULT_SESSION_NAME);
        endpoint.authorization = EndpointAuthorization {
            scheme: SCHEME_USERNAME_PASSWORD.to_string(),
            parameters: BTreeMap::from([
                ("username".to_string(), data.required_str("username")?.to_string()),
                ("password".to_string(), data.required_str("password")?.to_string()),
                (
                    "globalRoleArn".to_string(),
                    data.required_str("global_role_arn")?.to_string(),
                ),
                ("globalStsSessionName".to_string(), session_name.to_string()),
            ]),
        };
        Ok(())
    }

    fn flatten(endpoint: &ServiceEndpoint, data: &mut ResourceData) {
        let parameters = &endpoint.authorization.parameters;
        for (attribute, parameter) in [
            ("username", "username"),
            ("global_role_arn", "globalRoleArn"),
            ("global_sts_session_name", "globalStsSessionName"),
        ] {
            data.set_non_empty(
                attribute,
                parameters.get(parameter).map(String::as_str).unwrap_or_default(),
            );
        }
    }
}

/// Babylon Vault: a Vault server and the role to log in as.
#[derive(Debug, Clone, Copy)]
pub struct BabylonVault;

impl EndpointKind for BabylonVault {
    const RESOURCE_NAME: &'static str = "bblnazuredevops_serviceendpoint_babylonvault";
    const ENDPOINT_TYPE: &'static str = "babylon-service-endpoint-vault";
    const SECRETS: &'static [&'static str] = &[];

    fn kind_schema(schema: Schema) -> Schema {
        schema
            .with_attribute(
                "url",
                Attribute::required_string()
                    .with_validator(Validator::HttpUrlNoTrailingSlash)
                    .with_description("Url for the Vault Server"),
            )
            .with_attribute(
                "vault_role",
                Attribute::required_string().with_description("Vault role to log in as"),
            )
    }

    fn expand(data: &ResourceData, endpoint: &mut ServiceEndpoint) -> Result<(), ProviderError> {
        endpoint.url = data.required_str("url")?.to_string();
        endpoint.authorization = EndpointAuthorization {
            scheme: SCHEME_NONE.to_string(),
            parameters: BTreeMap::new(),
        };
        endpoint.data = BTreeMap::from([(
            "vaultRole".to_string(),
            data.required_str("vault_role")?.to_string(),
        )]);
        Ok(())
    }

    fn flatten(endpoint: &ServiceEndpoint, data: &mut ResourceData) {
        data.set("url", endpoint.url.clone());
        data.set_non_empty(
            "vault_role",
            endpoint.data.get("vaultRole").map(String::as_str).unwrap_or_default(),
        );
    }
}

/// A service endpoint resource of kind `K`.
pub struct EndpointResource<K> {
    kind: PhantomData<fn() -> K>,
}

impl<K> EndpointResource<K> {
    pub fn new() -> Self {
        Self { kind: PhantomData }
    }
}

impl<K> Default for EndpointResource<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EndpointKind> EndpointResource<K> {
    fn expand(data: &ResourceData) -> Result<ServiceEndpoint, ProviderError> {
        let mut endpoint = ServiceEndpoint::new(
            data.required_str("project_id")?,
            data.required_str("service_endpoint_name")?,
            data.get_str("description").unwrap_or(DEFAULT_DESCRIPTION),
        );
        endpoint.endpoint_type = K::ENDPOINT_TYPE.to_string();
        K::expand(data, &mut endpoint)?;
        Ok(endpoint)
    }

    /// Fresh state from an endpoint. Secrets come from `known`.
    fn flatten(
        endpoint: &ServiceEndpoint,
        project_id: &str,
        known: &ResourceData,
    ) -> Result<ResourceData, ProviderError> {
        let id = endpoint.id.as_deref().filter(|id| !id.is_empty()).ok_or_else(|| {
            ProviderError::Api {
                status: 200,
                body: format!("service endpoint {:?} was returned without an id", endpoint.name),
            }
        })?;

        let mut data = ResourceData::default();
        data.set_id(id);
        data.set("project_id", project_id);
        data.set("service_endpoint_name", endpoint.name.clone());
        data.set("description", endpoint.description.clone());
        data.set("authorization", json!({ "scheme": endpoint.authorization.scheme }));
        K::flatten(endpoint, &mut data);
        for secret in K::SECRETS {
            data.keep_secret(known, secret);
        }
        Ok(data)
    }

    /// State after a create or update, memoizing the applied secrets.
    fn applied(
        endpoint: &ServiceEndpoint,
        planned: &ResourceData,
    ) -> Result<Value, ProviderError> {
        let mut data = Self::flatten(endpoint, planned.required_str("project_id")?, planned)?;
        for secret in K::SECRETS {
            data.set_secret_hash(secret);
        }
        Ok(data.into_value())
    }
}

#[async_trait::async_trait]
impl<K: EndpointKind> Resource for EndpointResource<K> {
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
                "service_endpoint_name",
                Attribute::required_string()
                    .with_force_new()
                    .with_validator(Validator::NotWhitespace),
            )
            .with_attribute(
                "description",
                Attribute::optional_string().with_default(json!(DEFAULT_DESCRIPTION)),
            )
            .with_attribute("authorization", Attribute::computed_string_map());
        K::kind_schema(schema)
    }

    async fn create(&self, client: &AggregatedClient, planned: ResourceData) -> Result<Value, ProviderError> {
        let endpoint = Self::expand(&planned)?;
        let created = client.service_endpoints.create(&endpoint).await?;
        info!(
            endpoint_id = created.id.as_deref().unwrap_or_default(),
            endpoint_type = K::ENDPOINT_TYPE,
            "Created service endpoint"
        );
        Self::applied(&created, &planned)
    }

    async fn read(&self, client: &AggregatedClient, state: ResourceData) -> Result<Value, ProviderError> {
        let id = state.required_id(K::RESOURCE_NAME)?;
        let project_id = state.required_str("project_id")?;
        let Some(endpoint) = client.service_endpoints.get(project_id, id).await? else {
            debug!(endpoint_id = id, "Service endpoint not found, removing from state");
            return Ok(Value::Null);
        };
        Ok(Self::flatten(&endpoint, project_id, &state)?.into_value())
    }

    async fn update(
        &self,
        client: &AggregatedClient,
        prior: ResourceData,
        planned: ResourceData,
    ) -> Result<Value, ProviderError> {
        let id = prior.required_id(K::RESOURCE_NAME)?;
        let endpoint = Self::expand(&planned)?;
        let updated = client.service_endpoints.update(id, &endpoint).await?;
        Self::applied(&updated, &planned)
    }

    async fn delete(&self, client: &AggregatedClient, state: ResourceData) -> Result<(), ProviderError> {
        let id = state.required_id(K::RESOURCE_NAME)?;
        let project_id = state.required_str("project_id")?;
        client.service_endpoints.delete(project_id, id).await
    }

    fn import_state(&self, id: &str) -> Result<ResourceData, ProviderError> {
        let parts = parse_import_id(id, 2, IMPORT_FORMAT)?;
        let mut data = ResourceData::default();
        data.set("project_id", parts[0]);
        data.set_id(parts[1]);
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Credentials, HttpClient};
    use crate::resources::data::secret_hash;
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

    fn config<K: EndpointKind>(value: Value) -> ResourceData {
        ResourceData::from_config_with(&EndpointResource::<K>::new().schema(), value, |_| None).unwrap()
    }

    #[tokio::test]
    async fn test_aws_iam_create() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/_apis/serviceendpoint/endpoints")
            .match_body(Matcher::PartialJson(json!({
                "name": "aws",
                "type": "babylon-service-endpoint-aws-iam",
                "url": "https://aws.amazon.com/",
                "owner": "library",
                "description": "Managed by Terraform",
                "authorization": {
                    "scheme": "UsernamePassword",
                    "parameters": {
                        "username": "AKIA",
                        "password": "s3cret",
                        "globalRoleArn": "arn:aws:iam::1:role/ci",
                        "globalStsSessionName": "azure-pipelines-task"
                    }
                },
                "serviceEndpointProjectReferences": [
                    { "projectReference": { "id": "proj" }, "name": "aws" }
                ]
            })))
            .with_status(200)
            .with_body(
                json!({
                    "id": "se-1",
                    "name": "aws",
                    "type": "babylon-service-endpoint-aws-iam",
                    "url": "https://aws.amazon.com/",
                    "description": "Managed by Terraform",
                    "authorization": {
                        "scheme": "UsernamePassword",
                        "parameters": {
                            "username": "AKIA",
                            "globalRoleArn": "arn:aws:iam::1:role/ci",
                            "globalStsSessionName": "azure-pipelines-task"
                        }
                    },
                    "isReady": true
                })
                .to_string(),
            )
            .create_async()
            .await;

        let planned = config::<BabylonAwsIam>(json!({
            "project_id": "proj",
            "service_endpoint_name": "aws",
            "username": "AKIA",
            "password": "s3cret",
            "global_role_arn": "arn:aws:iam::1:role/ci"
        }));
        let created = EndpointResource::<BabylonAwsIam>::new()
            .create(&client(&server.url()), planned)
            .await
            .unwrap();
        mock.assert_async().await;

        assert_eq!(created["id"], "se-1");
        assert_eq!(created["authorization"], json!({"scheme": "UsernamePassword"}));
        assert_eq!(created["password"], "s3cret");
        assert_eq!(created["password_hash"], secret_hash("s3cret"));
        assert_eq!(created["global_sts_session_name"], "azure-pipelines-task");
    }

    #[tokio::test]
    async fn test_generic_webhook_read_keeps_secret() {
        let mut server = Server::new_async().await;
        let _found = server
            .mock("GET", "/proj/_apis/serviceendpoint/endpoints/se-2")
            .with_status(200)
            .with_body(
                json!({
                    "id": "se-2",
                    "name": "hook",
                    "type": "generic",
                    "url": "https://hooks.babylon.test",
                    "description": null,
                    "authorization": { "scheme": "UsernamePassword", "parameters": { "username": "bot" } }
                })
                .to_string(),
            )
            .create_async()
            .await;
        let _gone = server
            .mock("GET", "/proj/_apis/serviceendpoint/endpoints/se-3")
            .with_status(200)
            .with_body("")
            .create_async()
            .await;

        let client = client(&server.url());
        let resource = EndpointResource::<GenericWebhook>::new();
        let state = ResourceData::from_state(json!({
            "id": "se-2",
            "project_id": "proj",
            "password": "pw",
            "password_hash": secret_hash("pw"),
            "stale": true
        }))
        .unwrap();

        let read = resource.read(&client, state).await.unwrap();
        assert_eq!(read["url"], "https://hooks.babylon.test");
        assert_eq!(read["username"], "bot");
        assert_eq!(read["description"], "");
        assert_eq!(read["password"], "pw");
        assert_eq!(read["password_hash"], secret_hash("pw"));
        assert!(read.get("stale").is_none());

        let state = ResourceData::from_state(json!({"id": "se-3", "project_id": "proj"})).unwrap();
        assert!(resource.read(&client, state).await.unwrap().is_null());
    }

    #[tokio::test]
    async fn test_vault_update_and_delete() {
        let mut server = Server::new_async().await;
        let update = server
            .mock("PUT", "/_apis/serviceendpoint/endpoints/se-4")
            .match_body(Matcher::PartialJson(json!({
                "id": "se-4",
                "type": "babylon-service-endpoint-vault",
                "url": "https://vault.babylon.test",
                "authorization": { "scheme": "None" },
                "data": { "vaultRole": "deployer" }
            })))
            .with_status(200)
            .with_body(
                json!({
                    "id": "se-4",
                    "name": "vault",
                    "type": "babylon-service-endpoint-vault",
                    "url": "https://vault.babylon.test",
                    "description": "Managed by Terraform",
                    "authorization": { "scheme": "None", "parameters": null },
                    "data": { "vaultRole": "deployer" }
                })
                .to_string(),
            )
            .create_async()
            .await;
        let delete = server
            .mock("DELETE", "/_apis/serviceendpoint/endpoints/se-4")
            .match_query(Matcher::UrlEncoded("projectIds".into(), "proj".into()))
            .with_status(204)
            .create_async()
            .await;

        let client = client(&server.url());
        let resource = EndpointResource::<BabylonVault>::new();
        let prior = ResourceData::from_state(json!({"id": "se-4", "project_id": "proj"})).unwrap();
        let planned = config::<BabylonVault>(json!({
            "project_id": "proj",
            "service_endpoint_name": "vault",
            "url": "https://vault.babylon.test",
            "vault_role": "deployer"
        }));

        let updated = resource.update(&client, prior, planned).await.unwrap();
        update.assert_async().await;
        assert_eq!(updated["vault_role"], "deployer");
        assert_eq!(updated["authorization"]["scheme"], "None");

        resource
            .delete(&client, ResourceData::from_state(updated).unwrap())
            .await
            .unwrap();
        delete.assert_async().await;
    }

    #[test]
    fn test_generic_webhook_env_defaults() {
        let schema = EndpointResource::<GenericWebhook>::new().schema();
        let data = ResourceData::from_config_with(
            &schema,
            json!({"project_id": "proj", "service_endpoint_name": "hook"}),
            |key| match key {
                ENV_GENERIC_WEBHOOK_URL => Some("https://env.babylon.test".to_string()),
                ENV_GENERIC_WEBHOOK_PASSWORD => Some("env-pw".to_string()),
                _ => None,
            },
        )
        .unwrap();

        let endpoint = EndpointResource::<GenericWebhook>::expand(&data).unwrap();
        assert_eq!(endpoint.url, "https://env.babylon.test");
        assert_eq!(endpoint.authorization.parameters["password"], "env-pw");
        assert_eq!(endpoint.authorization.parameters["username"], "");
        assert_eq!(endpoint.description, DEFAULT_DESCRIPTION);
    }

    #[test]
    fn test_schemas() {
        let schema = EndpointResource::<GenericWebhook>::new().schema();
        assert!(schema.is_force_new("service_endpoint_name"));
        assert!(schema.attribute("password").unwrap().flags.sensitive);
        assert!(schema.attribute("password_hash").unwrap().flags.computed);

        let schema = EndpointResource::<BabylonVault>::new().schema();
        assert_eq!(
            schema.attribute("url").unwrap().validators,
            vec![Validator::HttpUrlNoTrailingSlash]
        );
        assert!(schema.attribute("password").is_none());
    }

    #[test]
    fn test_import_state() {
        let resource = EndpointResource::<BabylonVault>::new();
        let data = resource.import_state("proj/se-4").unwrap();
        assert_eq!(data.id(), Some("se-4"));
        assert_eq!(data.get_str("project_id"), Some("proj"));
        assert!(resource.import_state("se-4").is_err());
    }
}
