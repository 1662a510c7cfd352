//! Provider configuration.
//!
//! The provider block accepts the organization URL and a credential. Each
//! value falls back to an environment variable when it is not set in
//! configuration, matching what pipelines already export.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::{Credentials, DEFAULT_TIMEOUT};
use crate::error::ProviderError;

/// Environment variable holding the organization URL.
pub const ENV_ORG_SERVICE_URL: &str = "AZDO_ORG_SERVICE_URL";
/// Environment variable holding a personal access token.
pub const ENV_PERSONAL_ACCESS_TOKEN: &str = "AZDO_PERSONAL_ACCESS_TOKEN";
/// Environment variable holding an OAuth bearer token (e.g. `System.AccessToken`).
pub const ENV_ACCESS_TOKEN: &str = "AZDO_ACCESS_TOKEN";

/// Raw provider configuration as sent by the host.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// The url of the Azure DevOps organization, e.g. `https://dev.azure.com/babylon`.
    #[serde(default)]
    pub org_service_url: Option<String>,
    /// Personal access token, sent as basic auth.
    #[serde(default)]
    pub personal_access_token: Option<String>,
    /// OAuth access token, sent as a bearer token.
    #[serde(default)]
    pub access_token: Option<String>,
    /// Request timeout in seconds. Defaults to 60.
    #[serde(default)]
    pub request_timeout_seconds: Option<u64>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("org_service_url", &self.org_service_url)
            .field(
                "personal_access_token",
                &self.personal_access_token.as_ref().map(|_| "<redacted>"),
            )
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "<redacted>"),
            )
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

/// Configuration after environment defaults have been applied and checked.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// Organization URL without a trailing slash.
    pub org_service_url: String,
    /// Credentials used for every request.
    pub credentials: Credentials,
    /// Request timeout.
    pub timeout: Duration,
}

impl ProviderConfig {
    /// Parse the host's JSON configuration. `null` is treated as an empty block.
    pub fn from_value(value: serde_json::Value) -> Result<Self, ProviderError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        Ok(serde_json::from_value(value)?)
    }

    /// Fill unset values from the process environment.
    pub fn with_env_defaults(self) -> Self {
        self.with_defaults_from(|key| std::env::var(key).ok())
    }

    /// Fill unset values using the given lookup. Explicit values always win.
    pub fn with_defaults_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if is_blank(&self.org_service_url) {
            self.org_service_url = non_empty(ENV_ORG_SERVICE_URL);
        }
        if is_blank(&self.personal_access_token) {
            self.personal_access_token = non_empty(ENV_PERSONAL_ACCESS_TOKEN);
        }
        if is_blank(&self.access_token) {
            self.access_token = non_empty(ENV_ACCESS_TOKEN);
        }
        self
    }

    /// Check the configuration and pick the credential to use.
    ///
    /// A personal access token takes precedence over a bearer token.
    pub fn resolve(&self) -> Result<ResolvedConfig, ProviderError> {
        let url = self
            .org_service_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or_else(|| {
                ProviderError::Configuration(format!(
                    "org_service_url must be set in the provider block or via {}",
                    ENV_ORG_SERVICE_URL
                ))
            })?;

        if !(url.starts_with("https://") || url.starts_with("http://")) {
            return Err(ProviderError::Configuration(format!(
                "org_service_url must be an http(s) url, got {:?}",
                url
            )));
        }

        let credentials = match (
            non_blank(&self.personal_access_token),
            non_blank(&self.access_token),
        ) {
            (Some(pat), _) => Credentials::PersonalAccessToken(pat.to_string()),
            (None, Some(token)) => Credentials::Bearer(token.to_string()),
            (None, None) => {
                return Err(ProviderError::Configuration(format!(
                    "personal_access_token must be set in the provider block or via {} (or {} for a bearer token)",
                    ENV_PERSONAL_ACCESS_TOKEN, ENV_ACCESS_TOKEN
                )))
            }
        };

        let timeout = match self.request_timeout_seconds {
            Some(0) => {
                return Err(ProviderError::Configuration(
                    "request_timeout_seconds must be greater than zero".to_string(),
                ))
            }
            Some(secs) => Duration::from_secs(secs),
            None => DEFAULT_TIMEOUT,
        };

        Ok(ResolvedConfig {
            org_service_url: url.trim_end_matches('/').to_string(),
            credentials,
            timeout,
        })
    }
}

fn is_blank(value: &Option<String>) -> bool {
    non_blank(value).is_none()
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_explicit_values_win_over_env() {
        let config = ProviderConfig::from_value(json!({
            "org_service_url": "https://dev.azure.com/explicit/",
            "personal_access_token": "pat"
        }))
        .unwrap()
        .with_defaults_from(env(&[
            (ENV_ORG_SERVICE_URL, "https://dev.azure.com/env"),
            (ENV_PERSONAL_ACCESS_TOKEN, "env-pat"),
        ]));

        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.org_service_url, "https://dev.azure.com/explicit");
        assert_eq!(
            resolved.credentials,
            Credentials::PersonalAccessToken("pat".to_string())
        );
        assert_eq!(resolved.timeout, DEFAULT_TIMEOUT);
    }

    #[test]
    fn test_env_defaults_fill_blanks() {
        let config = ProviderConfig::from_value(json!({ "org_service_url": "" }))
            .unwrap()
            .with_defaults_from(env(&[
                (ENV_ORG_SERVICE_URL, "https://dev.azure.com/env"),
                (ENV_ACCESS_TOKEN, "bearer-token"),
            ]));

        let resolved = config.resolve().unwrap();
        assert_eq!(resolved.org_service_url, "https://dev.azure.com/env");
        assert_eq!(
            resolved.credentials,
            Credentials::Bearer("bearer-token".to_string())
        );
    }

    #[test]
    fn test_null_config_is_empty() {
        let config = ProviderConfig::from_value(serde_json::Value::Null).unwrap();
        assert_eq!(config, ProviderConfig::default());
    }

    #[test]
    fn test_missing_url_is_configuration_error() {
        let err = ProviderConfig {
            personal_access_token: Some("pat".to_string()),
            ..Default::default()
        }
        .resolve()
        .unwrap_err();
        assert!(matches!(err, ProviderError::Configuration(_)));
        assert!(err.message().contains("org_service_url"));
    }

    #[test]
    fn test_missing_credentials_is_configuration_error() {
        let err = ProviderConfig {
            org_service_url: Some("https://dev.azure.com/org".to_string()),
            ..Default::default()
        }
        .resolve()
        .unwrap_err();
        assert!(err.message().contains("personal_access_token"));
    }

    #[test]
    fn test_rejects_non_http_url_and_zero_timeout() {
        let base = ProviderConfig {
            org_service_url: Some("dev.azure.com/org".to_string()),
            personal_access_token: Some("pat".to_string()),
            ..Default::default()
        };
        assert!(base.resolve().is_err());

        let zero = ProviderConfig {
            org_service_url: Some("https://dev.azure.com/org".to_string()),
            request_timeout_seconds: Some(0),
            ..base
        };
        assert!(zero.resolve().is_err());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let config = ProviderConfig {
            personal_access_token: Some("super-secret".to_string()),
            ..Default::default()
        };
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("super-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
