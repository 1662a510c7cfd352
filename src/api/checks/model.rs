//! Wire types shared by every check kind.

use serde::{Deserialize, Serialize};

/// Check type, e.g. `{"id": "2EF31AD6-...", "name": "ExclusiveLock"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckType {
    /// Type id.
    #[serde(default)]
    pub id: String,
    /// Type name.
    #[serde(default)]
    pub name: String,
}

impl CheckType {
    /// Whether two type ids name the same check type. The API is not
    /// consistent about the case of these ids.
    pub fn matches(&self, id: &str) -> bool {
        self.id.eq_ignore_ascii_case(id)
    }
}

/// The protected resource a check is attached to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResource {
    /// Resource type, e.g. `endpoint`, `environment` or `queue`.
    #[serde(rename = "type", default)]
    pub resource_type: String,
    /// Resource id.
    #[serde(default)]
    pub id: String,
    /// Display name. Only present in responses.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl CheckResource {
    /// A resource reference as sent in payloads.
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id: id.into(),
            name: None,
        }
    }
}

/// `createdBy` / `modifiedBy`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRef {
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub unique_name: String,
    #[serde(default)]
    pub descriptor: String,
}

/// `_links`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Links {
    #[serde(rename = "self", default)]
    pub self_link: Href,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Href {
    #[serde(default)]
    pub href: String,
}

/// Body of a create or update call.
///
/// Only the settings differ between check kinds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckPayload<S> {
    #[serde(rename = "type")]
    pub check_type: CheckType,
    pub settings: S,
    pub resource: CheckResource,
    pub timeout: i64,
    /// Set on updates only, as a string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

impl<S> CheckPayload<S> {
    /// The same payload addressed at an existing check.
    pub fn with_id(mut self, id: i64) -> Self {
        self.id = Some(id.to_string());
        self
    }
}

/// A check configuration as returned by the API.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckConfiguration<S> {
    #[serde(default)]
    pub settings: S,
    #[serde(default)]
    pub created_by: Option<IdentityRef>,
    #[serde(default)]
    pub created_on: Option<String>,
    #[serde(default)]
    pub modified_by: Option<IdentityRef>,
    #[serde(default)]
    pub modified_on: Option<String>,
    #[serde(default)]
    pub timeout: i64,
    #[serde(rename = "_links", default)]
    pub links: Option<Links>,
    pub id: i64,
    #[serde(rename = "type", default)]
    pub check_type: CheckType,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub resource: CheckResource,
}

/// One entry of `checkConfigurationDataList`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckConfigurationData<T> {
    #[serde(default)]
    pub definition_ref_id: Option<String>,
    pub check_configuration: T,
}

/// Data of the checks data provider.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChecksDataProvider {
    #[serde(default, deserialize_with = "crate::api::null_as_default")]
    pub check_configuration_data_list: Vec<CheckConfigurationData<serde_json::Value>>,
}

/// Properties of the checks data provider query.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ChecksQueryProperties {
    pub resource_id: String,
    pub source_page: crate::api::contribution::SourcePage,
}
