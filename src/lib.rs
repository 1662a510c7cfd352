//! Azure DevOps provider
//!
//! This crate maps declarative resource blocks onto the Azure DevOps REST
//! API: pipeline checks, service endpoints, GitHub App connections and build
//! permissions.
//!
//! # Overview
//!
//! - **api**: typed clients for the REST endpoints, sharing one [`api::HttpClient`]
//! - **resources**: one [`resources::Resource`] per resource type, translating
//!   between attribute values and API payloads
//! - **ProviderService trait**: the host-facing seam, implemented by
//!   [`AzureDevOpsProvider`]
//! - **Schema types**: attribute descriptions, validators and diagnostics
//! - **Error types**: [`ProviderError`], returned by every fallible call
//! - **Logging**: `tracing` spans and events, written to stderr
//!
//! # Quick Start
//!
//! ```ignore
//! use bblnazuredevops_provider::{init_logging, AzureDevOpsProvider, ProviderService};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     init_logging();
//!
//!     let provider = AzureDevOpsProvider::new();
//!     let diagnostics = provider
//!         .configure(json!({
//!             "org_service_url": "https://dev.azure.com/babylon",
//!             "personal_access_token": std::env::var("BABYLON_PAT")?
//!         }))
//!         .await?;
//!     assert!(diagnostics.is_empty());
//!
//!     let planned = provider
//!         .plan(
//!             "bblnazuredevops_check_exclusivelock",
//!             None,
//!             json!({ "project_id": "proj", "resource_id": "res", "type": "endpoint" }),
//!             json!({}),
//!         )
//!         .await?
//!         .planned_state;
//!     let state = provider
//!         .create("bblnazuredevops_check_exclusivelock", planned)
//!         .await?;
//!     println!("created check {}", state["id"]);
//!     Ok(())
//! }
//! ```
//!
//! # Credentials
//!
//! `personal_access_token` is sent as basic auth, `access_token` as a bearer
//! token. Both fall back to `AZDO_PERSONAL_ACCESS_TOKEN` and
//! `AZDO_ACCESS_TOKEN`; the organization url falls back to
//! `AZDO_ORG_SERVICE_URL`.

#![warn(clippy::all)]

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod provider;
pub mod resources;
pub mod schema;
pub mod service;
pub mod testing;
pub mod types;
pub mod validation;

// Re-export main types at crate root
pub use error::ProviderError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use provider::AzureDevOpsProvider;
pub use schema::ProviderSchema;
pub use service::ProviderService;
pub use types::{AttributeChange, ImportedResource, PlanResult, ProviderMetadata, ServerCapabilities};
pub use validation::{is_valid, validate, validate_result};

// Re-export async_trait for convenience
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
