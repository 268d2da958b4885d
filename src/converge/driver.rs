use std::sync::Arc;
use tracing::{debug, info};

use super::plan::{ApplyResult, ConvergencePlan};
use crate::descriptor::{validate_descriptor, DeploymentDescriptor};
use crate::error::Result;
use crate::provider::{ChangeAction, InfraProvider, ResourceKind, TaskDefinitionSpec};

/// Reconciles cloud resources with a deployment descriptor.
///
/// Resources are handled in dependency order: security group, log group,
/// cluster, task definition, service. Each step starts from observed
/// state, so convergence can be re-run from any partial-apply state.
pub struct ConvergenceDriver<P: InfraProvider> {
    provider: Arc<P>,
}

impl<P: InfraProvider> ConvergenceDriver<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }

    /// Converge everything the descriptor names. The descriptor is
    /// consumed: one descriptor, one apply cycle, one result.
    pub async fn apply(&self, descriptor: DeploymentDescriptor) -> Result<ApplyResult> {
        // Fatal before any remote call
        validate_descriptor(&descriptor)?;

        info!("🚀 Converging deployment '{}'", descriptor.name);
        let mut plan = ConvergencePlan::default();

        let sg_name = descriptor.security_group_name();
        let ingress = descriptor.effective_ingress();
        let (sg_id, sg_action) = self
            .provider
            .ensure_security_group(&descriptor, &sg_name, &ingress)
            .await?;
        plan.record(ResourceKind::SecurityGroup, sg_action, &sg_id);

        let log_group = descriptor.log_group_name();
        let log_action = self
            .provider
            .ensure_log_group(&log_group, descriptor.log_retention_days)
            .await?;
        plan.record(ResourceKind::LogGroup, log_action, &log_group);

        let cluster = descriptor.cluster_name();
        let cluster_action = self.provider.ensure_cluster(&cluster).await?;
        plan.record(ResourceKind::Cluster, cluster_action, &cluster);

        // A task definition revision is immutable; registering always
        // creates a new one. Diff against what the service runs and only
        // register when the descriptor actually differs.
        let desired_spec = TaskDefinitionSpec::from_descriptor(&descriptor);
        let existing = self
            .provider
            .describe_service(&cluster, &descriptor.name)
            .await?;

        let (task_definition_arn, td_action) = match &existing {
            Some(service) if service.spec.as_ref() == Some(&desired_spec) => {
                debug!("Task definition unchanged, reusing {}", service.task_definition_arn);
                (service.task_definition_arn.clone(), ChangeAction::Unchanged)
            }
            Some(_) => {
                let arn = self
                    .provider
                    .register_task_definition(&descriptor, &log_group)
                    .await?;
                (arn, ChangeAction::Updated)
            }
            None => {
                let arn = self
                    .provider
                    .register_task_definition(&descriptor, &log_group)
                    .await?;
                (arn, ChangeAction::Created)
            }
        };
        plan.record(ResourceKind::TaskDefinition, td_action, &task_definition_arn);

        match existing {
            None => {
                self.provider
                    .create_service(&descriptor, &task_definition_arn, &sg_id)
                    .await?;
                plan.record(ResourceKind::Service, ChangeAction::Created, &descriptor.name);
            }
            Some(service)
                if service.task_definition_arn != task_definition_arn
                    || service.desired_count != descriptor.desired_count =>
            {
                self.provider
                    .update_service(&descriptor, &task_definition_arn)
                    .await?;
                plan.record(ResourceKind::Service, ChangeAction::Updated, &descriptor.name);
            }
            Some(_) => {
                plan.record(
                    ResourceKind::Service,
                    ChangeAction::Unchanged,
                    &descriptor.name,
                );
            }
        }

        if plan.is_noop() {
            info!("✅ Deployment '{}' already converged", descriptor.name);
        } else {
            info!("✅ Deployment '{}' converged: {}", descriptor.name, plan);
        }

        Ok(ApplyResult {
            plan,
            cluster,
            service: descriptor.name,
            desired_count: descriptor.desired_count,
            endpoint: None,
        })
    }

    /// Tear down everything a descriptor's apply would create. Resources
    /// already gone are reported unchanged, so destroy is idempotent too.
    pub async fn destroy(&self, descriptor: &DeploymentDescriptor) -> Result<ConvergencePlan> {
        validate_descriptor(descriptor)?;

        info!("Destroying deployment '{}'", descriptor.name);
        let mut plan = ConvergencePlan::default();
        let cluster = descriptor.cluster_name();

        let removed = self
            .provider
            .delete_service(&cluster, &descriptor.name)
            .await?;
        plan.record(
            ResourceKind::Service,
            removal_action(removed),
            &descriptor.name,
        );

        let removed = self.provider.delete_cluster(&cluster).await?;
        plan.record(ResourceKind::Cluster, removal_action(removed), &cluster);

        let log_group = descriptor.log_group_name();
        let removed = self.provider.delete_log_group(&log_group).await?;
        plan.record(ResourceKind::LogGroup, removal_action(removed), &log_group);

        let sg_name = descriptor.security_group_name();
        let removed = self.provider.delete_security_group(&sg_name).await?;
        plan.record(ResourceKind::SecurityGroup, removal_action(removed), &sg_name);

        info!("Destroy of '{}' finished: {}", descriptor.name, plan);
        Ok(plan)
    }
}

fn removal_action(removed: bool) -> ChangeAction {
    if removed {
        ChangeAction::Removed
    } else {
        ChangeAction::Unchanged
    }
}
