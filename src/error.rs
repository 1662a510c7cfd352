//! Error types for the Azure DevOps provider.

use thiserror::Error;

/// Errors that can occur while talking to Azure DevOps or handling resource state.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The requested remote object was not found.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// A resource or provider attribute failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// An internal provider error occurred.
    #[error("SDK error: {0}")]
    Sdk(String),

    /// The provider is missing configuration or was configured incorrectly.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The requested resource type is unknown.
    #[error("Unknown resource type: {0}")]
    UnknownResource(String),

    /// A JSON payload could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HTTP request could not be sent or its body could not be read.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Azure DevOps answered with an error status.
    #[error("Azure DevOps returned status {status}: {body}")]
    Api {
        /// HTTP status code of the response.
        status: u16,
        /// Response body, possibly empty.
        body: String,
    },

    /// Authentication or authorization failed.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The operation is not supported for this resource.
    #[error("Unimplemented: {0}")]
    Unimplemented(String),

    /// The request from the host was malformed.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ProviderError {
    /// Get the error message as a string.
    ///
    /// Returns a reference to the error message for any variant.
    pub fn message(&self) -> &str {
        match self {
            Self::NotFound(msg) => msg,
            Self::Validation(msg) => msg,
            Self::Sdk(msg) => msg,
            Self::Configuration(msg) => msg,
            Self::UnknownResource(msg) => msg,
            Self::Serialization(_err) => "serialization error (see Debug output)",
            Self::Http(_err) => "http error (see Debug output)",
            Self::Api { body, .. } => body,
            Self::PermissionDenied(msg) => msg,
            Self::Unimplemented(msg) => msg,
            Self::InvalidRequest(msg) => msg,
        }
    }

    /// Returns true if the error means the remote object does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Api { status: 404, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProviderError::NotFound("check 46".to_string());
        assert_eq!(format!("{}", err), "Resource not found: check 46");

        let err = ProviderError::Validation("invalid input".to_string());
        assert_eq!(format!("{}", err), "Validation error: invalid input");

        let err = ProviderError::UnknownResource("bblnazuredevops_nope".to_string());
        assert_eq!(
            format!("{}", err),
            "Unknown resource type: bblnazuredevops_nope"
        );
    }

    #[test]
    fn test_api_error_display() {
        let err = ProviderError::Api {
            status: 409,
            body: "conflict".to_string(),
        };
        assert_eq!(
            format!("{}", err),
            "Azure DevOps returned status 409: conflict"
        );
        assert_eq!(err.message(), "conflict");
    }

    #[test]
    fn test_is_not_found() {
        assert!(ProviderError::NotFound("x".to_string()).is_not_found());
        assert!(ProviderError::Api {
            status: 404,
            body: String::new()
        }
        .is_not_found());
        assert!(!ProviderError::Api {
            status: 500,
            body: String::new()
        }
        .is_not_found());
        assert!(!ProviderError::Validation("x".to_string()).is_not_found());
    }

    #[test]
    fn test_message_method() {
        let err = ProviderError::PermissionDenied("needs auth".to_string());
        assert_eq!(err.message(), "needs auth");

        let err = ProviderError::Configuration("invalid config".to_string());
        assert_eq!(err.message(), "invalid config");

        let err = ProviderError::InvalidRequest("bad request".to_string());
        assert_eq!(err.message(), "bad request");
    }
}
