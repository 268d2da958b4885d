//! Infrastructure provider integration
//!
//! Everything that talks to the cloud lives behind the [`InfraProvider`]
//! trait: security groups, log groups, the compute cluster, task
//! definitions, the service, and task observation. The AWS implementation
//! is the real thing; the in-memory implementation backs the tests.

mod aws;
mod memory;
mod traits;
mod types;

pub use aws::AwsProvider;
pub use memory::MemoryProvider;
pub use traits::InfraProvider;
pub use types::{
    ChangeAction, ClusterState, Endpoint, ResourceChange, ResourceKind, ServiceState,
    TaskDefinitionSpec, TaskHealth, TaskObservation,
};

use thiserror::Error;

/// Provider-level failures, surfaced with the failed operation so the
/// operator can retry manually
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{operation} failed: {detail}")]
    Api { operation: String, detail: String },

    #[error("No usable subnets: {0}")]
    NoSubnets(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    pub fn api(operation: impl Into<String>, detail: impl std::fmt::Display) -> Self {
        ProviderError::Api {
            operation: operation.into(),
            detail: detail.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;
