//! Manual approval check.

use serde::{Deserialize, Serialize};

use super::CheckKind;
use crate::error::ProviderError;

/// Marker type for the manual approval check.
#[derive(Debug, Clone, Copy)]
pub struct ManualApproval;

/// User values of a manual approval check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManualApprovalValues {
    /// Approver identity ids.
    pub approvers: Vec<String>,
    pub instructions: String,
    pub allow_self_approval: bool,
    pub timeout: Option<i64>,
    pub approve_in_order: bool,
    pub minimum_approvers: i64,
}

/// An approver. Responses also carry the display name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Approver {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing)]
    pub display_name: Option<String>,
}

/// `settings` of a manual approval check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualApprovalSettings {
    #[serde(default)]
    pub approvers: Vec<Approver>,
    /// `1` for any order, `2` for in order.
    #[serde(default = "any_order")]
    pub execution_order: i64,
    #[serde(default)]
    pub instructions: String,
    #[serde(default)]
    pub blocked_approvers: Vec<serde_json::Value>,
    #[serde(default)]
    pub min_required_approvers: i64,
    #[serde(default)]
    pub requester_cannot_be_approver: bool,
}

const EXECUTION_ORDER_ANY: i64 = 1;
const EXECUTION_ORDER_IN_ORDER: i64 = 2;

fn any_order() -> i64 {
    EXECUTION_ORDER_ANY
}

impl Default for ManualApprovalSettings {
    fn default() -> Self {
        Self {
            approvers: Vec::new(),
            execution_order: EXECUTION_ORDER_ANY,
            instructions: String::new(),
            blocked_approvers: Vec::new(),
            min_required_approvers: 0,
            requester_cannot_be_approver: false,
        }
    }
}

impl ManualApprovalSettings {
    /// Whether approvers must approve in the listed order.
    pub fn approve_in_order(&self) -> bool {
        self.execution_order == EXECUTION_ORDER_IN_ORDER
    }

    /// Approver ids in the order the API returned them.
    pub fn approver_ids(&self) -> Vec<String> {
        self.approvers.iter().map(|a| a.id.clone()).collect()
    }
}

impl CheckKind for ManualApproval {
    type Values = ManualApprovalValues;
    type Settings = ManualApprovalSettings;

    const TYPE_ID: &'static str = "8C6F20A7-A545-4486-9777-F762FAFE0D4D";
    const TYPE_NAME: &'static str = "Approval";
    const DEFAULT_TIMEOUT: i64 = 43200;

    fn settings(values: &Self::Values) -> Result<Self::Settings, ProviderError> {
        Ok(ManualApprovalSettings {
            approvers: values
                .approvers
                .iter()
                .map(|id| Approver {
                    id: id.clone(),
                    display_name: None,
                })
                .collect(),
            execution_order: if values.approve_in_order {
                EXECUTION_ORDER_IN_ORDER
            } else {
                EXECUTION_ORDER_ANY
            },
            instructions: values.instructions.clone(),
            min_required_approvers: values.minimum_approvers,
            requester_cannot_be_approver: !values.allow_self_approval,
            ..ManualApprovalSettings::default()
        })
    }

    fn timeout(values: &Self::Values) -> Option<i64> {
        values.timeout
    }
}
