//! Security namespaces, access control entries and identities.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{HttpClient, SECURITY_ACCEPT};
use crate::error::ProviderError;

/// The `Build` security namespace.
pub const BUILD_NAMESPACE_ID: &str = "33344d9c-fc72-4d6f-aba5-fa317101a7e9";

/// Desired state of one permission bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PermissionValue {
    Allow,
    Deny,
    NotSet,
}

impl PermissionValue {
    /// All accepted spellings, lower case.
    pub const VALUES: [&'static str; 3] = ["allow", "deny", "notset"];

    /// State of `bit` in an ACE. Deny wins over allow.
    pub fn from_bits(bit: i64, allow: i64, deny: i64) -> Self {
        if deny & bit != 0 {
            PermissionValue::Deny
        } else if allow & bit != 0 {
            PermissionValue::Allow
        } else {
            PermissionValue::NotSet
        }
    }

    /// Apply this value for `bit` to an `(allow, deny)` pair.
    pub fn apply(self, bit: i64, allow: i64, deny: i64) -> (i64, i64) {
        match self {
            PermissionValue::Allow => (allow | bit, deny & !bit),
            PermissionValue::Deny => (allow & !bit, deny | bit),
            PermissionValue::NotSet => (allow & !bit, deny & !bit),
        }
    }
}

impl FromStr for PermissionValue {
    type Err = ProviderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "allow" => Ok(PermissionValue::Allow),
            "deny" => Ok(PermissionValue::Deny),
            "notset" => Ok(PermissionValue::NotSet),
            other => Err(ProviderError::Validation(format!(
                "invalid permission value {:?}, expected one of {:?}",
                other,
                Self::VALUES
            ))),
        }
    }
}

impl fmt::Display for PermissionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PermissionValue::Allow => "allow",
            PermissionValue::Deny => "deny",
            PermissionValue::NotSet => "notset",
        })
    }
}

/// Security token of a build definition, or of every build of a project.
pub fn build_token(
    project_id: Option<&str>,
    build_id: Option<&str>,
    project_level: bool,
) -> Result<String, ProviderError> {
    let project_id = project_id
        .filter(|p| !p.is_empty())
        .ok_or_else(|| ProviderError::Validation("failed to get 'project_id' from schema".to_string()))?;

    match (build_id, project_level) {
        (None, true) => Ok(project_id.to_string()),
        (Some(_), true) => Err(ProviderError::Validation(
            "build_id cannot be set when project_level is true".to_string(),
        )),
        (None, false) => Err(ProviderError::Validation(
            "build_id required when project_level is not true".to_string(),
        )),
        (Some(build_id), false) if build_id.trim().is_empty() => Err(ProviderError::Validation(
            "build_id cannot be empty when project_level is not true".to_string(),
        )),
        (Some(build_id), false) => Ok(format!("{}/{}", project_id, build_id)),
    }
}

/// Compute the `(allow, deny)` pair for the requested permissions.
///
/// `actions` maps action names to bits. Unknown action names are an error.
pub fn apply_permissions(
    actions: &BTreeMap<String, i64>,
    permissions: &BTreeMap<String, PermissionValue>,
    start: (i64, i64),
) -> Result<(i64, i64), ProviderError> {
    permissions
        .iter()
        .try_fold(start, |(allow, deny), (name, value)| {
            let bit = actions.get(name).ok_or_else(|| {
                ProviderError::Validation(format!("unknown permission {:?}", name))
            })?;
            Ok(value.apply(*bit, allow, deny))
        })
}

/// Read the requested permissions back from an ACE.
pub fn read_permissions<'a>(
    actions: &BTreeMap<String, i64>,
    names: impl IntoIterator<Item = &'a String>,
    allow: i64,
    deny: i64,
) -> BTreeMap<String, PermissionValue> {
    names
        .into_iter()
        .filter_map(|name| {
            actions
                .get(name)
                .map(|bit| (name.clone(), PermissionValue::from_bits(*bit, allow, deny)))
        })
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
struct ListResponse<T> {
    #[serde(default = "Vec::new")]
    value: Vec<T>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SecurityNamespace {
    #[serde(default)]
    actions: Vec<ActionDefinition>,
}

/// One action of a security namespace.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDefinition {
    pub bit: i64,
    pub name: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Identity {
    #[serde(default)]
    descriptor: Option<String>,
}

/// An access control entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AceBits {
    #[serde(default)]
    pub allow: i64,
    #[serde(default)]
    pub deny: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccessControlList {
    #[serde(default)]
    aces_dictionary: BTreeMap<String, AceBits>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccessControlEntry<'a> {
    descriptor: &'a str,
    allow: i64,
    deny: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SetEntriesRequest<'a> {
    token: &'a str,
    merge: bool,
    access_control_entries: Vec<AccessControlEntry<'a>>,
}

/// Client for security namespaces, ACLs and identities.
#[derive(Debug, Clone)]
pub struct SecurityClient {
    http: HttpClient,
    identity: HttpClient,
}

/// Host serving the identities API for an organization url.
pub fn identity_base_url(org_service_url: &str) -> String {
    let trimmed = org_service_url.trim_end_matches('/');
    for scheme in ["https://", "http://"] {
        if let Some(rest) = trimmed.strip_prefix(scheme) {
            if rest == "dev.azure.com" || rest.starts_with("dev.azure.com/") {
                return format!("{}vssps.{}", scheme, rest);
            }
        }
    }
    trimmed.to_string()
}

impl SecurityClient {
    pub fn new(http: HttpClient) -> Self {
        let identity = http.with_base_url(identity_base_url(http.base_url()));
        Self { http, identity }
    }

    /// Action names of a namespace mapped to their bits.
    pub async fn actions(&self, namespace_id: &str) -> Result<BTreeMap<String, i64>, ProviderError> {
        let response: ListResponse<SecurityNamespace> = self
            .http
            .send_json(
                Method::GET,
                &format!("/_apis/securitynamespaces/{}", namespace_id),
                &[],
                None,
                SECURITY_ACCEPT,
            )
            .await?;

        let namespace = response.value.into_iter().next().ok_or_else(|| {
            ProviderError::NotFound(format!("security namespace {}", namespace_id))
        })?;
        Ok(namespace
            .actions
            .into_iter()
            .map(|a| (a.name, a.bit))
            .collect())
    }

    /// Identity descriptor of a subject descriptor (e.g. `vssgp.Uy0x...`).
    pub async fn identity_descriptor(&self, subject_descriptor: &str) -> Result<String, ProviderError> {
        let response: ListResponse<Option<Identity>> = self
            .identity
            .send_json(
                Method::GET,
                "/_apis/identities",
                &[("subjectDescriptors", subject_descriptor)],
                None,
                SECURITY_ACCEPT,
            )
            .await?;

        response
            .value
            .into_iter()
            .flatten()
            .find_map(|identity| identity.descriptor)
            .ok_or_else(|| ProviderError::NotFound(format!("identity {}", subject_descriptor)))
    }

    /// The ACE of `descriptor` under `token`, if any.
    pub async fn get_ace(
        &self,
        namespace_id: &str,
        token: &str,
        descriptor: &str,
    ) -> Result<Option<AceBits>, ProviderError> {
        let response: ListResponse<AccessControlList> = self
            .http
            .send_json(
                Method::GET,
                &format!("/_apis/accesscontrollists/{}", namespace_id),
                &[("token", token), ("descriptors", descriptor)],
                None,
                SECURITY_ACCEPT,
            )
            .await?;

        Ok(response.value.into_iter().find_map(|acl| {
            acl.aces_dictionary
                .into_iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(descriptor))
                .map(|(_, ace)| ace)
        }))
    }

    /// Replace the ACE of `descriptor` under `token`.
    pub async fn set_ace(
        &self,
        namespace_id: &str,
        token: &str,
        descriptor: &str,
        ace: AceBits,
    ) -> Result<(), ProviderError> {
        debug!(namespace_id, token, allow = ace.allow, deny = ace.deny, "Setting access control entry");
        let request = SetEntriesRequest {
            token,
            merge: false,
            access_control_entries: vec![AccessControlEntry {
                descriptor,
                allow: ace.allow,
                deny: ace.deny,
            }],
        };
        self.http
            .send(
                Method::POST,
                &format!("/_apis/accesscontrolentries/{}", namespace_id),
                &[],
                Some(serde_json::to_string(&request)?),
                SECURITY_ACCEPT,
            )
            .await?;
        Ok(())
    }
}
