//! Permissions of a principal on a build definition or on every build of a
//! project.

use std::collections::BTreeMap;

use serde_json::{json, Value};
use tracing::{debug, info};

use super::{Resource, ResourceData};
use crate::api::security::{
    apply_permissions, build_token, read_permissions, AceBits, PermissionValue, BUILD_NAMESPACE_ID,
};
use crate::api::AggregatedClient;
use crate::error::ProviderError;
use crate::schema::{Attribute, AttributeFlags, AttributeType, Schema, Validator};

pub const RESOURCE_NAME: &str = "bblnazuredevops_build_permissions";

/// ACE of one principal in the `Build` namespace.
pub struct BuildPermissionsResource;

/// Where the ACE lives and whom it belongs to.
struct Target {
    token: String,
    principal: String,
    descriptor: String,
    actions: BTreeMap<String, i64>,
}

impl BuildPermissionsResource {
    fn token(data: &ResourceData) -> Result<String, ProviderError> {
        build_token(
            data.get_str("project_id"),
            data.get_str("build_id").filter(|b| !b.is_empty()),
            data.get_bool("project_level").unwrap_or(false),
        )
    }

    async fn target(client: &AggregatedClient, data: &ResourceData) -> Result<Target, ProviderError> {
        let token = Self::token(data)?;
        let principal = data.required_str("principal")?.to_string();
        let actions = client.security.actions(BUILD_NAMESPACE_ID).await?;
        let descriptor = client.security.identity_descriptor(&principal).await?;
        Ok(Target {
            token,
            principal,
            descriptor,
            actions,
        })
    }

    fn requested(data: &ResourceData) -> Result<BTreeMap<String, PermissionValue>, ProviderError> {
        let mut requested = BTreeMap::new();
        for (name, value) in data.get_string_map("permissions") {
            requested.insert(name, value.parse::<PermissionValue>()?);
        }
        Ok(requested)
    }

    /// Write the ACE for `permissions` and return the new state.
    async fn apply(
        &self,
        client: &AggregatedClient,
        mut planned: ResourceData,
    ) -> Result<Value, ProviderError> {
        let target = Self::target(client, &planned).await?;
        let permissions = Self::requested(&planned)?;

        let start = if planned.get_bool("replace").unwrap_or(true) {
            (0, 0)
        } else {
            client
                .security
                .get_ace(BUILD_NAMESPACE_ID, &target.token, &target.descriptor)
                .await?
                .map_or((0, 0), |ace| (ace.allow, ace.deny))
        };
        let (allow, deny) = apply_permissions(&target.actions, &permissions, start)?;
        client
            .security
            .set_ace(
                BUILD_NAMESPACE_ID,
                &target.token,
                &target.descriptor,
                AceBits { allow, deny },
            )
            .await?;
        info!(token = %target.token, allow, deny, "Applied build permissions");

        planned.set_id(format!("{}#{}", target.token, target.principal));
        self.refresh(client, planned, &target).await?.ok_or_else(|| {
            ProviderError::Api {
                status: 200,
                body: format!("access control entry for token {} not found after update", target.token),
            }
        })
    }

    async fn refresh(
        &self,
        client: &AggregatedClient,
        mut state: ResourceData,
        target: &Target,
    ) -> Result<Option<Value>, ProviderError> {
        let Some(ace) = client
            .security
            .get_ace(BUILD_NAMESPACE_ID, &target.token, &target.descriptor)
            .await?
        else {
            debug!(token = %target.token, "Permissions not found, removing from state");
            return Ok(None);
        };

        let configured = state.get_string_map("permissions");
        let current: BTreeMap<String, String> =
            read_permissions(&target.actions, configured.keys(), ace.allow, ace.deny)
                .into_iter()
                .map(|(name, value)| {
                    let value = value.to_string();
                    match configured.get(&name) {
                        Some(spelling) if spelling.eq_ignore_ascii_case(&value) => {
                            (name, spelling.clone())
                        }
                        _ => (name, value),
                    }
                })
                .collect();
        state.set_string_map("permissions", &current);
        Ok(Some(state.into_value()))
    }
}

#[async_trait::async_trait]
impl Resource for BuildPermissionsResource {
    fn name(&self) -> &'static str {
        RESOURCE_NAME
    }

    fn schema(&self) -> Schema {
        let permission_values = PermissionValue::VALUES.iter().map(|v| v.to_string()).collect();
        Schema::v0()
            .with_attribute("id", Attribute::computed_string())
            .with_attribute(
                "principal",
                Attribute::required_string()
                    .with_force_new()
                    .with_validator(Validator::NotWhitespace)
                    .with_description("Subject descriptor of a user or group"),
            )
            .with_attribute(
                "permissions",
                Attribute::new(
                    AttributeType::map(AttributeType::String),
                    AttributeFlags::required(),
                )
                .with_validator(Validator::OneOf(permission_values))
                .with_case_insensitive(),
            )
            .with_attribute(
                "replace",
                Attribute::optional_bool()
                    .with_default(json!(true))
                    .with_description("Replace the whole ACE instead of merging into it"),
            )
            .with_attribute(
                "project_id",
                Attribute::required_string()
                    .with_force_new()
                    .with_validator(Validator::Uuid),
            )
            .with_attribute("build_id", Attribute::optional_string())
            .with_attribute(
                "project_level",
                Attribute::optional_bool().with_default(json!(false)),
            )
    }

    async fn create(&self, client: &AggregatedClient, planned: ResourceData) -> Result<Value, ProviderError> {
        self.apply(client, planned).await
    }

    async fn read(&self, client: &AggregatedClient, state: ResourceData) -> Result<Value, ProviderError> {
        let target = Self::target(client, &state).await?;
        Ok(self
            .refresh(client, state, &target)
            .await?
            .unwrap_or(Value::Null))
    }

    async fn update(
        &self,
        client: &AggregatedClient,
        _prior: ResourceData,
        planned: ResourceData,
    ) -> Result<Value, ProviderError> {
        self.apply(client, planned).await
    }

    async fn delete(&self, client: &AggregatedClient, state: ResourceData) -> Result<(), ProviderError> {
        let target = Self::target(client, &state).await?;
        let cleared: BTreeMap<String, PermissionValue> = Self::requested(&state)?
            .into_keys()
            .map(|name| (name, PermissionValue::NotSet))
            .collect();
        let (allow, deny) = apply_permissions(&target.actions, &cleared, (0, 0))?;
        client
            .security
            .set_ace(
                BUILD_NAMESPACE_ID,
                &target.token,
                &target.descriptor,
                AceBits { allow, deny },
            )
            .await
    }
}
