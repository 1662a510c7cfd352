//! Plan, import and metadata types exchanged with the host.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::schema::Schema;

/// A change to a single attribute during a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeChange {
    /// The path to the attribute that changed.
    pub path: String,
    /// The value before the change (None if creating).
    pub before: Option<Value>,
    /// The value after the change (None if deleting).
    pub after: Option<Value>,
}

impl AttributeChange {
    /// Create a new attribute change.
    pub fn new(path: impl Into<String>, before: Option<Value>, after: Option<Value>) -> Self {
        Self {
            path: path.into(),
            before,
            after,
        }
    }

    /// Create a change for a new attribute.
    pub fn added(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, None, Some(value))
    }

    /// Create a change for a removed attribute.
    pub fn removed(path: impl Into<String>, value: Value) -> Self {
        Self::new(path, Some(value), None)
    }

    /// Create a change for a modified attribute.
    pub fn modified(path: impl Into<String>, before: Value, after: Value) -> Self {
        Self::new(path, Some(before), Some(after))
    }
}

/// The result of a plan operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanResult {
    /// The planned state after the operation.
    pub planned_state: Value,
    /// The list of attribute changes.
    pub changes: Vec<AttributeChange>,
    /// Whether the resource requires replacement.
    pub requires_replace: bool,
}

impl PlanResult {
    /// Create a plan result with no changes.
    pub fn no_change(state: Value) -> Self {
        Self {
            planned_state: state,
            changes: Vec::new(),
            requires_replace: false,
        }
    }

    /// Create a plan result with changes.
    pub fn with_changes(
        planned_state: Value,
        changes: Vec<AttributeChange>,
        requires_replace: bool,
    ) -> Self {
        Self {
            planned_state,
            changes,
            requires_replace,
        }
    }

    /// Plan the move from `prior` to `proposed`.
    ///
    /// Only top-level attributes are compared. `null` and a missing key are
    /// the same. Computed attributes the configuration leaves unset keep
    /// their prior value. A `null` prior state is a create and never
    /// requires replacement.
    pub fn diff(schema: &Schema, prior: &Value, proposed: &Value) -> Self {
        let mut planned = proposed.clone();
        if let (Some(planned_obj), Some(prior_obj)) = (planned.as_object_mut(), prior.as_object()) {
            for (name, attr) in &schema.attributes {
                let unset = planned_obj.get(name).map_or(true, Value::is_null);
                if attr.flags.computed && unset {
                    if let Some(prior_value) = prior_obj.get(name).filter(|v| !v.is_null()) {
                        planned_obj.insert(name.clone(), prior_value.clone());
                    }
                }
            }
        }

        let creating = prior.is_null();
        let mut names: Vec<String> = prior
            .as_object()
            .into_iter()
            .chain(planned.as_object())
            .flat_map(|obj| obj.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();

        let mut changes = Vec::new();
        let mut requires_replace = false;
        for name in &names {
            let before = prior.get(name).filter(|v| !v.is_null());
            let after = planned.get(name).filter(|v| !v.is_null());
            if before == after {
                continue;
            }
            let case_insensitive = schema.attribute(name).is_some_and(|a| a.case_insensitive);
            if let (true, Some(before), Some(after)) = (case_insensitive, before, after) {
                if eq_ignore_case(before, after) {
                    // keep the stored spelling so state does not churn
                    let before = before.clone();
                    if let Some(planned_obj) = planned.as_object_mut() {
                        planned_obj.insert(name.clone(), before);
                    }
                    continue;
                }
            }
            if !creating && schema.is_force_new(name) {
                requires_replace = true;
            }
            changes.push(AttributeChange::new(name.clone(), before.cloned(), after.cloned()));
        }

        Self::with_changes(planned, changes, requires_replace)
    }
}

fn eq_ignore_case(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::String(a), Value::String(b)) => a.eq_ignore_ascii_case(b),
        (Value::Object(a), Value::Object(b)) => {
            a.len() == b.len()
                && a.iter()
                    .all(|(key, value)| b.get(key).is_some_and(|other| eq_ignore_case(value, other)))
        }
        (Value::Array(a), Value::Array(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(a, b)| eq_ignore_case(a, b))
        }
        _ => a == b,
    }
}

/// An imported resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportedResource {
    /// The resource type.
    pub resource_type: String,
    /// The imported state.
    pub state: Value,
}

impl ImportedResource {
    /// Create a new imported resource.
    pub fn new(resource_type: impl Into<String>, state: Value) -> Self {
        Self {
            resource_type: resource_type.into(),
            state,
        }
    }
}

/// Provider metadata returned by `metadata`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ProviderMetadata {
    /// List of resource type names.
    pub resources: Vec<String>,
    /// Server capabilities.
    pub capabilities: ServerCapabilities,
}

/// Server capability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerCapabilities {
    /// Whether the provider supports planning destroy operations.
    pub plan_destroy: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Attribute;
    use serde_json::json;

    #[test]
    fn test_attribute_change_constructors() {
        let added = AttributeChange::added("display_name", json!("notify"));
        assert!(added.before.is_none());
        assert_eq!(added.after, Some(json!("notify")));

        let removed = AttributeChange::removed("body", json!("{}"));
        assert_eq!(removed.before, Some(json!("{}")));
        assert!(removed.after.is_none());

        let modified = AttributeChange::modified("timeout", json!(60), json!(120));
        assert_eq!(modified.before, Some(json!(60)));
        assert_eq!(modified.after, Some(json!(120)));
    }

    #[test]
    fn test_plan_result() {
        let no_change = PlanResult::no_change(json!({"id": "46"}));
        assert!(no_change.changes.is_empty());
        assert!(!no_change.requires_replace);
    }

    fn schema() -> Schema {
        Schema::v0()
            .with_attribute("project_id", Attribute::required_string().with_force_new())
            .with_attribute("timeout", Attribute::optional_int64())
            .with_attribute("id", Attribute::computed_string())
    }

    #[test]
    fn test_diff_in_place_update() {
        let prior = json!({"id": "46", "project_id": "p", "timeout": 60});
        let proposed = json!({"project_id": "p", "timeout": 120});

        let plan = PlanResult::diff(&schema(), &prior, &proposed);
        assert!(!plan.requires_replace);
        assert_eq!(
            plan.changes,
            vec![AttributeChange::modified("timeout", json!(60), json!(120))]
        );
        // computed id carried over
        assert_eq!(plan.planned_state["id"], "46");
    }

    #[test]
    fn test_diff_force_new_requires_replace() {
        let prior = json!({"id": "46", "project_id": "p", "timeout": 60});
        let proposed = json!({"project_id": "q", "timeout": 60});

        let plan = PlanResult::diff(&schema(), &prior, &proposed);
        assert!(plan.requires_replace);
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.changes[0].path, "project_id");
    }

    #[test]
    fn test_diff_null_equals_missing() {
        let prior = json!({"id": "46", "project_id": "p", "timeout": null});
        let proposed = json!({"project_id": "p"});

        let plan = PlanResult::diff(&schema(), &prior, &proposed);
        assert!(plan.changes.is_empty());
    }

    #[test]
    fn test_diff_create() {
        let plan = PlanResult::diff(&schema(), &Value::Null, &json!({"project_id": "p"}));
        assert!(!plan.requires_replace);
        assert_eq!(
            plan.changes,
            vec![AttributeChange::added("project_id", json!("p"))]
        );
    }

    #[test]
    fn test_diff_case_insensitive_map() {
        let schema = Schema::v0().with_attribute(
            "permissions",
            Attribute::optional_string_map().with_case_insensitive(),
        );
        let prior = json!({"permissions": {"ViewBuilds": "allow"}});

        let plan = PlanResult::diff(&schema, &prior, &json!({"permissions": {"ViewBuilds": "Allow"}}));
        assert!(plan.changes.is_empty());
        assert_eq!(plan.planned_state["permissions"]["ViewBuilds"], "allow");

        let plan = PlanResult::diff(&schema, &prior, &json!({"permissions": {"ViewBuilds": "Deny"}}));
        assert_eq!(plan.changes.len(), 1);
        assert_eq!(plan.planned_state["permissions"]["ViewBuilds"], "Deny");

        let plan = PlanResult::diff(
            &schema,
            &prior,
            &json!({"permissions": {"ViewBuilds": "allow", "QueueBuilds": "deny"}}),
        );
        assert_eq!(plan.changes.len(), 1);
    }

    #[test]
    fn test_imported_resource() {
        let imported = ImportedResource::new(
            "bblnazuredevops_check_exclusivelock",
            json!({"id": "46"}),
        );
        assert_eq!(imported.resource_type, "bblnazuredevops_check_exclusivelock");
        assert_eq!(imported.state["id"], "46");
    }
}
