//! Invoke REST API check: a task check running the `InvokeRESTAPI` task
//! against a generic service connection.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::CheckKind;
use crate::error::ProviderError;

/// Headers sent when the user does not configure any: the pipeline variables
/// a callback needs to report back to the run.
pub const DEFAULT_HEADERS: &str = "{\n\"Content-Type\":\"application/json\", \n\"PlanUrl\": \"$(system.CollectionUri)\", \n\"ProjectId\": \"$(system.TeamProjectId)\", \n\"HubName\": \"$(system.HostType)\", \n\"PlanId\": \"$(system.PlanId)\", \n\"JobId\": \"$(system.JobId)\", \n\"TimelineId\": \"$(system.TimelineId)\", \n\"TaskInstanceId\": \"$(system.TaskInstanceId)\", \n\"AuthToken\": \"$(system.AccessToken)\"\n}";

const DEFAULT_RETRY_INTERVAL: i64 = 5;

/// Marker type for the invoke REST API check.
#[derive(Debug, Clone, Copy)]
pub struct InvokeRestApi;

/// User values of an invoke REST API check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InvokeRestApiValues {
    pub service_connection_id: String,
    pub linked_variable_group: Option<String>,
    pub timeout: Option<i64>,
    pub retry_interval: Option<i64>,
    pub display_name: String,
    pub method: String,
    /// `true` waits for the callback, `false` evaluates the response.
    pub use_callback: bool,
    pub body: String,
    pub url_suffix: String,
    pub success_criteria: String,
    pub headers: BTreeMap<String, String>,
}

/// Task reference of the check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefinitionRef {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub version: String,
}

impl DefinitionRef {
    /// `InvokeRESTAPI@1.152.3`.
    pub fn invoke_rest_api() -> Self {
        Self {
            id: "9c3e8943-130d-4c78-ac63-8af81df62dfb".to_string(),
            name: "InvokeRESTAPI".to_string(),
            version: "1.152.3".to_string(),
        }
    }
}

/// Task inputs. The API stores every input as a string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeRestApiInputs {
    #[serde(default)]
    pub connected_service_name_selector: String,
    #[serde(default)]
    pub method: String,
    #[serde(default)]
    pub wait_for_completion: String,
    #[serde(default)]
    pub connected_service_name: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub url_suffix: String,
    #[serde(default)]
    pub success_criteria: String,
    #[serde(default)]
    pub headers: String,
}

impl Default for InvokeRestApiInputs {
    fn default() -> Self {
        Self {
            connected_service_name_selector: "connectedServiceName".to_string(),
            method: String::new(),
            wait_for_completion: "false".to_string(),
            connected_service_name: String::new(),
            body: String::new(),
            url_suffix: String::new(),
            success_criteria: String::new(),
            headers: DEFAULT_HEADERS.to_string(),
        }
    }
}

/// `settings` of an invoke REST API check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeRestApiSettings {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub definition_ref: DefinitionRef,
    #[serde(default)]
    pub inputs: InvokeRestApiInputs,
    #[serde(default)]
    pub retry_interval: i64,
    pub linked_variable_group: Option<String>,
}

impl Default for InvokeRestApiSettings {
    fn default() -> Self {
        Self {
            display_name: String::new(),
            definition_ref: DefinitionRef::invoke_rest_api(),
            inputs: InvokeRestApiInputs::default(),
            retry_interval: DEFAULT_RETRY_INTERVAL,
            linked_variable_group: None,
        }
    }
}

impl InvokeRestApiSettings {
    /// `waitForCompletion` as a boolean.
    pub fn use_callback(&self) -> Result<bool, ProviderError> {
        self.inputs.wait_for_completion.parse().map_err(|_| {
            ProviderError::Validation(format!(
                "waitForCompletion is not a boolean: {:?}",
                self.inputs.wait_for_completion
            ))
        })
    }

    /// The `headers` input decoded into a map. Non-string values are kept as
    /// their JSON text.
    pub fn headers(&self) -> Result<BTreeMap<String, String>, ProviderError> {
        if self.inputs.headers.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        let raw: BTreeMap<String, serde_json::Value> =
            serde_json::from_str(&self.inputs.headers).map_err(|e| {
                ProviderError::Validation(format!("headers is not a JSON object: {}", e))
            })?;
        Ok(raw
            .into_iter()
            .map(|(k, v)| match v {
                serde_json::Value::String(s) => (k, s),
                other => (k, other.to_string()),
            })
            .collect())
    }
}

impl CheckKind for InvokeRestApi {
    type Values = InvokeRestApiValues;
    type Settings = InvokeRestApiSettings;

    const TYPE_ID: &'static str = "fe1de3ee-a436-41b4-bb20-f6eb4cb879a7";
    const TYPE_NAME: &'static str = "Task Check";
    const DEFAULT_TIMEOUT: i64 = 43200;

    fn settings(values: &Self::Values) -> Result<Self::Settings, ProviderError> {
        let mut settings = InvokeRestApiSettings::default();
        settings.display_name = values.display_name.clone();
        if let Some(retry_interval) = values.retry_interval {
            settings.retry_interval = retry_interval;
        }
        settings.linked_variable_group = values
            .linked_variable_group
            .clone()
            .filter(|g| !g.is_empty());

        let inputs = &mut settings.inputs;
        inputs.connected_service_name = values.service_connection_id.clone();
        inputs.method = values.method.clone();
        inputs.wait_for_completion = values.use_callback.to_string();
        inputs.body = values.body.clone();
        inputs.url_suffix = values.url_suffix.clone();
        inputs.success_criteria = values.success_criteria.clone();
        inputs.headers = serde_json::to_string(&values.headers)?;

        Ok(settings)
    }

    fn timeout(values: &Self::Values) -> Option<i64> {
        values.timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn values() -> InvokeRestApiValues {
        InvokeRestApiValues {
            service_connection_id: "sc-1".to_string(),
            display_name: "notify".to_string(),
            method: "POST".to_string(),
            use_callback: true,
            body: "{}".to_string(),
            url_suffix: "/hook".to_string(),
            success_criteria: "eq(root['status'], 'ok')".to_string(),
            headers: BTreeMap::from([("X-Team".to_string(), "infra".to_string())]),
            ..Default::default()
        }
    }

    #[test]
    fn test_template_defaults() {
        let payload = InvokeRestApi::template(super::super::CheckResource::new("endpoint", "r"));
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["type"]["id"], InvokeRestApi::TYPE_ID);
        assert_eq!(value["type"]["name"], "Task Check");
        assert_eq!(value["timeout"], 43200);
        assert_eq!(value["settings"]["retryInterval"], 5);
        assert!(value["settings"]["linkedVariableGroup"].is_null());
        assert_eq!(value["settings"]["definitionRef"]["version"], "1.152.3");
        assert_eq!(
            value["settings"]["inputs"]["connectedServiceNameSelector"],
            "connectedServiceName"
        );
        assert_eq!(value["settings"]["inputs"]["waitForCompletion"], "false");

        let defaults: serde_json::Value = serde_json::from_str(DEFAULT_HEADERS).unwrap();
        assert_eq!(defaults["AuthToken"], "$(system.AccessToken)");
        assert_eq!(defaults.as_object().unwrap().len(), 9);
    }

    #[test]
    fn test_payload_maps_values() {
        let payload = InvokeRestApi::payload("endpoint", "r1", &values()).unwrap();
        let value = serde_json::to_value(&payload).unwrap();
        let inputs = &value["settings"]["inputs"];

        assert_eq!(value["settings"]["displayName"], "notify");
        assert_eq!(inputs["connectedServiceName"], "sc-1");
        assert_eq!(inputs["method"], "POST");
        assert_eq!(inputs["waitForCompletion"], "true");
        assert_eq!(inputs["urlSuffix"], "/hook");
        assert_eq!(inputs["headers"], "{\"X-Team\":\"infra\"}");
        assert_eq!(value["resource"], json!({ "type": "endpoint", "id": "r1" }));
        // unset optional values keep the template
        assert_eq!(value["timeout"], 43200);
        assert_eq!(value["settings"]["retryInterval"], 5);
        assert!(value["settings"]["linkedVariableGroup"].is_null());
    }

    #[test]
    fn test_payload_overrides() {
        let values = InvokeRestApiValues {
            timeout: Some(600),
            retry_interval: Some(10),
            linked_variable_group: Some("vg".to_string()),
            ..values()
        };
        let value = serde_json::to_value(InvokeRestApi::payload("queue", "q", &values).unwrap())
            .unwrap();
        assert_eq!(value["timeout"], 600);
        assert_eq!(value["settings"]["retryInterval"], 10);
        assert_eq!(value["settings"]["linkedVariableGroup"], "vg");

        let empty_group = InvokeRestApiValues {
            linked_variable_group: Some(String::new()),
            ..values
        };
        let settings = InvokeRestApi::settings(&empty_group).unwrap();
        assert!(settings.linked_variable_group.is_none());
    }

    #[test]
    fn test_reading_settings_back() {
        let settings = InvokeRestApi::settings(&values()).unwrap();
        assert!(settings.use_callback().unwrap());
        assert_eq!(settings.headers().unwrap(), values().headers);
    }

    #[test]
    fn test_bad_wait_for_completion_is_error() {
        let mut settings = InvokeRestApiSettings::default();
        settings.inputs.wait_for_completion = "sometimes".to_string();
        assert!(settings.use_callback().is_err());
    }

    #[test]
    fn test_headers_parsing() {
        let mut settings = InvokeRestApiSettings::default();
        settings.inputs.headers = String::new();
        assert!(settings.headers().unwrap().is_empty());

        settings.inputs.headers = "{\"n\": 1, \"s\": \"x\"}".to_string();
        let headers = settings.headers().unwrap();
        assert_eq!(headers["n"], "1");
        assert_eq!(headers["s"], "x");

        settings.inputs.headers = "[1,2]".to_string();
        assert!(settings.headers().is_err());
    }
}
