//! Pipeline checks.
//!
//! Every check kind shares the same endpoints and envelope. A kind only
//! contributes its type, its settings object and the default timeout, which
//! is what [`CheckKind`] captures. Listing goes through the checks data
//! provider of the hierarchy query, which returns every check of a resource
//! regardless of kind.

mod exclusive_lock;
mod invoke_rest_api;
mod manual_approval;
mod model;

use std::fmt;

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

pub use exclusive_lock::{ExclusiveLock, ExclusiveLockSettings, ExclusiveLockValues};
pub use invoke_rest_api::{
    InvokeRestApi, InvokeRestApiInputs, InvokeRestApiSettings, InvokeRestApiValues,
    DefinitionRef, DEFAULT_HEADERS,
};
pub use manual_approval::{Approver, ManualApproval, ManualApprovalSettings, ManualApprovalValues};
pub use model::{
    CheckConfiguration, CheckConfigurationData, CheckPayload, CheckResource, CheckType, Href,
    IdentityRef, Links,
};

use super::contribution::{HierarchyQuery, SourcePage};
use super::{HttpClient, CHECKS_ACCEPT};
use crate::error::ProviderError;
use model::{ChecksDataProvider, ChecksQueryProperties};

/// Contribution serving the checks of a resource.
pub const CHECKS_DATA_PROVIDER: &str = "ms.vss-pipelinechecks.checks-data-provider";

/// A kind of pipeline check.
pub trait CheckKind {
    /// Values supplied by the user.
    type Values;
    /// The `settings` object, used both in payloads and in responses.
    type Settings: Serialize + DeserializeOwned + Default + Clone + fmt::Debug + Send + Sync;

    /// Check type id.
    const TYPE_ID: &'static str;
    /// Check type name.
    const TYPE_NAME: &'static str;
    /// Timeout sent when the user does not set one.
    const DEFAULT_TIMEOUT: i64;

    /// Settings for the given values, starting from the default settings.
    fn settings(values: &Self::Values) -> Result<Self::Settings, ProviderError>;

    /// Timeout set by the user, if any.
    fn timeout(values: &Self::Values) -> Option<i64>;

    /// The check type object.
    fn check_type() -> CheckType {
        CheckType {
            id: Self::TYPE_ID.to_string(),
            name: Self::TYPE_NAME.to_string(),
        }
    }

    /// The default payload before any user value is applied.
    fn template(resource: CheckResource) -> CheckPayload<Self::Settings> {
        CheckPayload {
            check_type: Self::check_type(),
            settings: Self::Settings::default(),
            resource,
            timeout: Self::DEFAULT_TIMEOUT,
            id: None,
        }
    }

    /// The create payload for a resource.
    fn payload(
        resource_type: &str,
        resource_id: &str,
        values: &Self::Values,
    ) -> Result<CheckPayload<Self::Settings>, ProviderError> {
        let mut payload = Self::template(CheckResource::new(resource_type, resource_id));
        payload.settings = Self::settings(values)?;
        if let Some(timeout) = Self::timeout(values) {
            payload.timeout = timeout;
        }
        Ok(payload)
    }
}

/// Typed configuration of a check kind.
pub type Configuration<K> = CheckConfiguration<<K as CheckKind>::Settings>;

/// Client for `/_apis/pipelines/checks/configurations`.
#[derive(Debug, Clone)]
pub struct ChecksClient {
    http: HttpClient,
}

impl ChecksClient {
    pub fn new(http: HttpClient) -> Self {
        Self { http }
    }

    fn configurations_path(project: &str) -> String {
        format!("/{}/_apis/pipelines/checks/configurations", project)
    }

    fn configuration_path(project: &str, check_id: i64) -> String {
        format!("{}/{}", Self::configurations_path(project), check_id)
    }

    /// Create a check on a resource.
    pub async fn add<K: CheckKind>(
        &self,
        project: &str,
        resource_type: &str,
        resource_id: &str,
        values: &K::Values,
    ) -> Result<Configuration<K>, ProviderError> {
        let payload = K::payload(resource_type, resource_id, values)?;
        debug!(check_type = K::TYPE_NAME, project, resource_id, "Adding check");
        self.http
            .send_json(
                Method::POST,
                &Self::configurations_path(project),
                &[],
                Some(serde_json::to_string(&payload)?),
                CHECKS_ACCEPT,
            )
            .await
    }

    /// Replace the settings of an existing check.
    pub async fn update<K: CheckKind>(
        &self,
        project: &str,
        resource_type: &str,
        resource_id: &str,
        check_id: i64,
        values: &K::Values,
    ) -> Result<Configuration<K>, ProviderError> {
        let payload = K::payload(resource_type, resource_id, values)?.with_id(check_id);
        debug!(check_type = K::TYPE_NAME, project, check_id, "Updating check");
        self.http
            .send_json(
                Method::PATCH,
                &Self::configuration_path(project, check_id),
                &[],
                Some(serde_json::to_string(&payload)?),
                CHECKS_ACCEPT,
            )
            .await
    }

    /// Delete a check.
    pub async fn delete(&self, project: &str, check_id: i64) -> Result<(), ProviderError> {
        debug!(project, check_id, "Deleting check");
        self.http
            .send(
                Method::DELETE,
                &Self::configuration_path(project, check_id),
                &[],
                None,
                CHECKS_ACCEPT,
            )
            .await?;
        Ok(())
    }

    /// Every check attached to a resource, still untyped.
    pub async fn list_all(
        &self,
        project: &str,
        resource_id: &str,
    ) -> Result<Vec<CheckConfigurationData<serde_json::Value>>, ProviderError> {
        let query = HierarchyQuery::new(
            CHECKS_DATA_PROVIDER,
            ChecksQueryProperties {
                resource_id: resource_id.to_string(),
                source_page: SourcePage::project(project),
            },
        );
        let response = self.http.hierarchy_query(&query).await?;
        let provider: Option<ChecksDataProvider> = response.provider(CHECKS_DATA_PROVIDER)?;
        Ok(provider
            .map(|p| p.check_configuration_data_list)
            .unwrap_or_default())
    }

    /// Look a check up by id among the checks of its resource.
    ///
    /// Returns `None` when no check has this id or when the check with this
    /// id is of another kind.
    pub async fn get_by_id<K: CheckKind>(
        &self,
        project: &str,
        resource_id: &str,
        check_id: i64,
    ) -> Result<Option<CheckConfigurationData<Configuration<K>>>, ProviderError> {
        let list = self.list_all(project, resource_id).await?;
        find_check::<K>(list, check_id)
    }
}

fn find_check<K: CheckKind>(
    list: Vec<CheckConfigurationData<serde_json::Value>>,
    check_id: i64,
) -> Result<Option<CheckConfigurationData<Configuration<K>>>, ProviderError> {
    let Some(found) = list.into_iter().find(|data| {
        data.check_configuration
            .get("id")
            .and_then(serde_json::Value::as_i64)
            == Some(check_id)
    }) else {
        return Ok(None);
    };

    let check_type: CheckType = found
        .check_configuration
        .get("type")
        .cloned()
        .map(serde_json::from_value)
        .transpose()?
        .unwrap_or_default();
    if !check_type.matches(K::TYPE_ID) {
        debug!(
            check_id,
            found = %check_type.name,
            expected = K::TYPE_NAME,
            "Check id belongs to another check type"
        );
        return Ok(None);
    }

    let check_configuration: Configuration<K> =
        serde_json::from_value(found.check_configuration)?;
    Ok(Some(CheckConfigurationData {
        definition_ref_id: found.definition_ref_id,
        check_configuration,
    }))
}
