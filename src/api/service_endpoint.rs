//! Service endpoints (service connections).

use std::collections::BTreeMap;

use reqwest::Method;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use super::{null_as_default, HttpClient, SERVICE_ENDPOINT_ACCEPT};
use crate::error::ProviderError;

/// Owner of endpoints created outside of a pipeline library UI.
pub const OWNER_LIBRARY: &str = "library";

// Masked secrets come back as `"password": null`; those entries are dropped.
fn string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let map: Option<BTreeMap<String, Option<String>>> = Option::deserialize(deserializer)?;
    Ok(map
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, value)| value.map(|value| (key, value)))
        .collect())
}

/// `authorization` of an endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointAuthorization {
    #[serde(default)]
    pub scheme: String,
    /// Scheme parameters. Secret values never come back from the API.
    #[serde(default, deserialize_with = "string_map")]
    pub parameters: BTreeMap<String, String>,
}

/// `{ "id": ... }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectReference {
    #[serde(default)]
    pub id: String,
}

/// Project an endpoint is shared with.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpointProjectReference {
    pub project_reference: ProjectReference,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// A service endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceEndpoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default)]
    pub endpoint_type: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub url: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub owner: String,
    #[serde(default)]
    pub authorization: EndpointAuthorization,
    #[serde(default, deserialize_with = "string_map")]
    pub data: BTreeMap<String, String>,
    #[serde(default)]
    pub is_ready: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub service_endpoint_project_references: Vec<ServiceEndpointProjectReference>,
}

impl ServiceEndpoint {
    /// A new endpoint owned by the library and shared with one project.
    pub fn new(
        project_id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let description = description.into();
        Self {
            service_endpoint_project_references: vec![ServiceEndpointProjectReference {
                project_reference: ProjectReference {
                    id: project_id.into(),
                },
                name: name.clone(),
                description: description.clone(),
            }],
            name,
            description,
            owner: OWNER_LIBRARY.to_string(),
            ..Default::default()
        }
    }

    /// Id of the first project the endpoint is shared with.
    pub fn project_id(&self) -> Option<&str> {
        self.service_endpoint_project_references
            .first()
            .map(|r| r.project_reference.id.as_str())
    }
}

/// Client for `/_apis/serviceendpoint/endpoints`.
#[derive(Debug, Clone)]
pub struct ServiceEndpointClient {
    http: HttpClient,
}

const ENDPOINTS_PATH: &str = "/_apis/serviceendpoint/endpoints";

impl ServiceEndpointClient {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    /// Create an endpoint.
    pub async fn create(&self, endpoint: &ServiceEndpoint) -> Result<ServiceEndpoint, ProviderError> {
        debug!(name = %endpoint.name, endpoint_type = %endpoint.endpoint_type, "Creating service endpoint");
        self.http
            .send_json(
                Method::POST,
                ENDPOINTS_PATH,
                &[],
                Some(serde_json::to_string(endpoint)?),
                SERVICE_ENDPOINT_ACCEPT,
            )
            .await
    }

    /// Fetch an endpoint. `None` when it does not exist.
    pub async fn get(
        &self,
        project_id: &str,
        endpoint_id: &str,
    ) -> Result<Option<ServiceEndpoint>, ProviderError> {
        let path = format!("/{}{}/{}", project_id, ENDPOINTS_PATH, endpoint_id);
        let body = match self
            .http
            .send(Method::GET, &path, &[], None, SERVICE_ENDPOINT_ACCEPT)
            .await
        {
            Ok(body) => body,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };

        // A deleted endpoint comes back as `200` with an empty body.
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        let endpoint: Option<ServiceEndpoint> = serde_json::from_slice(&body)?;
        Ok(endpoint.filter(|e| e.id.is_some()))
    }

    /// Replace an endpoint.
    pub async fn update(
        &self,
        endpoint_id: &str,
        endpoint: &ServiceEndpoint,
    ) -> Result<ServiceEndpoint, ProviderError> {
        debug!(endpoint_id, "Updating service endpoint");
        let mut endpoint = endpoint.clone();
        endpoint.id = Some(endpoint_id.to_string());
        self.http
            .send_json(
                Method::PUT,
                &format!("{}/{}", ENDPOINTS_PATH, endpoint_id),
                &[],
                Some(serde_json::to_string(&endpoint)?),
                SERVICE_ENDPOINT_ACCEPT,
            )
            .await
    }

    /// Delete an endpoint from a project.
    pub async fn delete(&self, project_id: &str, endpoint_id: &str) -> Result<(), ProviderError> {
        delete_endpoint(&self.http, project_id, endpoint_id).await
    }
}

/// DELETE `/_apis/serviceendpoint/endpoints/{id}?projectIds={project}`.
pub(crate) async fn delete_endpoint(
    http: &HttpClient,
    project_id: &str,
    endpoint_id: &str,
) -> Result<(), ProviderError> {
    debug!(project_id, endpoint_id, "Deleting service endpoint");
    http.send(
        Method::DELETE,
        &format!("{}/{}", ENDPOINTS_PATH, endpoint_id),
        &[("projectIds", project_id)],
        None,
        SERVICE_ENDPOINT_ACCEPT,
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::Credentials;
    use mockito::{Matcher, Server};
    use serde_json::json;

    fn client(url: &str) -> ServiceEndpointClient {
        ServiceEndpointClient::new(
            HttpClient::new(
                url,
                &Credentials::PersonalAccessToken("token".to_string()),
                None,
            )
            .unwrap(),
        )
    }

    fn webhook() -> ServiceEndpoint {
        let mut endpoint = ServiceEndpoint::new("proj", "hooks", "Managed by Terraform");
        endpoint.endpoint_type = "generic".to_string();
        endpoint.url = "https://hooks.example.com".to_string();
        endpoint.authorization = EndpointAuthorization {
            scheme: "UsernamePassword".to_string(),
            parameters: BTreeMap::from([
                ("username".to_string(), "bot".to_string()),
                ("password".to_string(), "s3cret".to_string()),
            ]),
        };
        endpoint
    }

    #[test]
    fn test_new_endpoint_shape() {
        let value = serde_json::to_value(webhook()).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["owner"], "library");
        assert_eq!(value["type"], "generic");
        assert_eq!(
            value["serviceEndpointProjectReferences"],
            json!([{
                "projectReference": { "id": "proj" },
                "name": "hooks",
                "description": "Managed by Terraform"
            }])
        );
    }

    #[tokio::test]
    async fn test_create_and_update() {
        let mut server = Server::new_async().await;
        let create = server
            .mock("POST", ENDPOINTS_PATH)
            .match_header("accept", SERVICE_ENDPOINT_ACCEPT)
            .match_body(Matcher::PartialJson(json!({
                "name": "hooks",
                "authorization": { "scheme": "UsernamePassword" }
            })))
            .with_status(200)
            .with_body(
                json!({
                    "id": "se-1",
                    "name": "hooks",
                    "type": "generic",
                    "url": "https://hooks.example.com",
                    "authorization": { "scheme": "UsernamePassword", "parameters": { "username": "bot" } },
                    "isReady": true
                })
                .to_string(),
            )
            .create_async()
            .await;
        let update = server
            .mock("PUT", "/_apis/serviceendpoint/endpoints/se-1")
            .match_body(Matcher::PartialJson(json!({ "id": "se-1", "url": "https://other.example.com" })))
            .with_status(200)
            .with_body(json!({ "id": "se-1", "url": "https://other.example.com" }).to_string())
            .create_async()
            .await;

        let endpoints = client(&server.url());
        let created = endpoints.create(&webhook()).await.unwrap();
        assert_eq!(created.id.as_deref(), Some("se-1"));
        assert!(created.is_ready);
        assert!(!created.authorization.parameters.contains_key("password"));

        let mut changed = webhook();
        changed.url = "https://other.example.com".to_string();
        let updated = endpoints.update("se-1", &changed).await.unwrap();
        assert_eq!(updated.url, "https://other.example.com");

        create.assert_async().await;
        update.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_missing_endpoint_is_none() {
        let mut server = Server::new_async().await;
        let _gone = server
            .mock("GET", "/proj/_apis/serviceendpoint/endpoints/gone")
            .with_status(404)
            .create_async()
            .await;
        let _empty = server
            .mock("GET", "/proj/_apis/serviceendpoint/endpoints/empty")
            .with_status(200)
            .with_body("")
            .create_async()
            .await;
        let _found = server
            .mock("GET", "/proj/_apis/serviceendpoint/endpoints/se-1")
            .with_status(200)
            .with_body(
                json!({
                    "id": "se-1",
                    "name": "hooks",
                    "description": null,
                    "data": null,
                    "authorization": { "scheme": "UsernamePassword", "parameters": null }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let endpoints = client(&server.url());
        assert!(endpoints.get("proj", "gone").await.unwrap().is_none());
        assert!(endpoints.get("proj", "empty").await.unwrap().is_none());
        let found = endpoints.get("proj", "se-1").await.unwrap().unwrap();
        assert_eq!(found.name, "hooks");
    }

    #[tokio::test]
    async fn test_get_drops_masked_secrets() {
        let mut server = Server::new_async().await;
        let _found = server
            .mock("GET", "/proj/_apis/serviceendpoint/endpoints/se-2")
            .with_status(200)
            .with_body(
                json!({
                    "id": "se-2",
                    "name": "hooks",
                    "data": { "vaultRole": "deployer", "token": null },
                    "authorization": {
                        "scheme": "UsernamePassword",
                        "parameters": { "username": "bot", "password": null }
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let found = client(&server.url())
            .get("proj", "se-2")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            found.authorization.parameters,
            BTreeMap::from([("username".to_string(), "bot".to_string())])
        );
        assert_eq!(found.data.len(), 1);
        assert_eq!(found.data["vaultRole"], "deployer");
    }

    #[tokio::test]
    async fn test_delete_scopes_to_project() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("DELETE", "/_apis/serviceendpoint/endpoints/se-1?projectIds=proj")
            .match_header("accept", SERVICE_ENDPOINT_ACCEPT)
            .with_status(204)
            .create_async()
            .await;

        client(&server.url()).delete("proj", "se-1").await.unwrap();
        mock.assert_async().await;
    }
}
