//! Exclusive lock check. It has no settings of its own.

use serde::{Deserialize, Serialize};

use super::CheckKind;
use crate::error::ProviderError;

/// Marker type for the exclusive lock check.
#[derive(Debug, Clone, Copy)]
pub struct ExclusiveLock;

/// User values of an exclusive lock check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusiveLockValues {
    pub timeout: Option<i64>,
}

/// Always `{}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusiveLockSettings {}

impl CheckKind for ExclusiveLock {
    type Values = ExclusiveLockValues;
    type Settings = ExclusiveLockSettings;

    const TYPE_ID: &'static str = "2EF31AD6-BAA0-403A-8B45-2CBC9B4E5563";
    const TYPE_NAME: &'static str = "ExclusiveLock";
    const DEFAULT_TIMEOUT: i64 = 60;

    fn settings(_values: &Self::Values) -> Result<Self::Settings, ProviderError> {
        Ok(ExclusiveLockSettings {})
    }

    fn timeout(values: &Self::Values) -> Option<i64> {
        values.timeout
    }
}
