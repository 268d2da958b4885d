use async_trait::async_trait;

use super::types::{ChangeAction, ClusterState, ServiceState};
use super::Result;
use crate::descriptor::{DeploymentDescriptor, IngressRule};

/// The seam between convergence and the cloud.
///
/// Every `ensure_*` starts from observed remote state and is idempotent,
/// so a partial apply is always recoverable by running convergence again.
/// Mutating calls report what they did through [`ChangeAction`]; none of
/// them retry on their own.
#[async_trait]
pub trait InfraProvider: Send + Sync {
    /// Ensure the named security group exists and allows the given
    /// ingress. Returns the group id and what had to change.
    async fn ensure_security_group(
        &self,
        descriptor: &DeploymentDescriptor,
        name: &str,
        ingress: &[IngressRule],
    ) -> Result<(String, ChangeAction)>;

    /// Ensure the log group exists with the requested retention.
    async fn ensure_log_group(&self, name: &str, retention_days: i32) -> Result<ChangeAction>;

    /// Ensure the compute cluster exists and is active.
    async fn ensure_cluster(&self, name: &str) -> Result<ChangeAction>;

    /// Observed state of the deployed service, or `None` before the first
    /// apply.
    async fn describe_service(&self, cluster: &str, service: &str)
        -> Result<Option<ServiceState>>;

    /// Register a new task definition revision; returns its ARN.
    async fn register_task_definition(
        &self,
        descriptor: &DeploymentDescriptor,
        log_group: &str,
    ) -> Result<String>;

    /// Create the service pointing at the given task definition.
    async fn create_service(
        &self,
        descriptor: &DeploymentDescriptor,
        task_definition_arn: &str,
        security_group_id: &str,
    ) -> Result<()>;

    /// Point the existing service at a task definition / desired count.
    async fn update_service(
        &self,
        descriptor: &DeploymentDescriptor,
        task_definition_arn: &str,
    ) -> Result<()>;

    /// Snapshot the service's tasks. Refreshed on every call.
    async fn observe(&self, cluster: &str, service: &str) -> Result<ClusterState>;

    /// Delete the service; `false` when it was already gone.
    async fn delete_service(&self, cluster: &str, service: &str) -> Result<bool>;

    /// Delete the cluster; `false` when it was already gone.
    async fn delete_cluster(&self, name: &str) -> Result<bool>;

    /// Delete the log group; `false` when it was already gone.
    async fn delete_log_group(&self, name: &str) -> Result<bool>;

    /// Delete the managed security group; `false` when it was already
    /// gone.
    async fn delete_security_group(&self, name: &str) -> Result<bool>;
}
