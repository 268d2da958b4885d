//! AWS implementation of the infrastructure provider.
//!
//! EC2 for the network edge (default VPC discovery, security groups),
//! CloudWatch Logs for the task log group, ECS for the cluster, task
//! definition and Fargate service. Failures surface with the AWS
//! operation name and the SDK's error chain; nothing here retries.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_cloudwatchlogs as cwlogs;
use aws_sdk_ec2 as ec2;
use aws_sdk_ecs as ecs;
use ecs::types::{
    AssignPublicIp, AwsVpcConfiguration, Compatibility, ContainerDefinition, KeyValuePair,
    LaunchType, LogConfiguration, LogDriver, NetworkConfiguration, NetworkMode, PortMapping,
    TransportProtocol,
};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

use super::traits::InfraProvider;
use super::types::{
    ChangeAction, ClusterState, ServiceState, TaskDefinitionSpec, TaskHealth, TaskObservation,
};
use super::{ProviderError, Result};
use crate::descriptor::{DeploymentDescriptor, IngressRule};

/// Provider backed by the AWS APIs
pub struct AwsProvider {
    ec2: ec2::Client,
    ecs: ecs::Client,
    logs: cwlogs::Client,
    region: String,
}

fn api_err<E>(operation: &'static str, err: E) -> ProviderError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ProviderError::api(operation, ecs::error::DisplayErrorContext(err))
}

impl AwsProvider {
    /// Build clients from the ambient AWS configuration, with optional
    /// region/profile overrides.
    pub async fn from_env(region: Option<String>, profile: Option<String>) -> Result<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region));
        }
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        let sdk_config = loader.load().await;

        let region = sdk_config
            .region()
            .map(|r| r.to_string())
            .ok_or_else(|| {
                ProviderError::api(
                    "aws configuration",
                    "no region configured (set FARGATE_REGION, AWS_REGION or a profile region)",
                )
            })?;

        debug!("AWS provider ready in region {}", region);

        Ok(Self {
            ec2: ec2::Client::new(&sdk_config),
            ecs: ecs::Client::new(&sdk_config),
            logs: cwlogs::Client::new(&sdk_config),
            region,
        })
    }

    /// Resolve the VPC and subnets to place tasks in. Explicit subnet ids
    /// win; otherwise every subnet of the account's default VPC is used.
    async fn resolve_network(
        &self,
        descriptor: &DeploymentDescriptor,
    ) -> Result<(String, Vec<String>)> {
        if !descriptor.network.subnets.is_empty() {
            let out = self
                .ec2
                .describe_subnets()
                .set_subnet_ids(Some(descriptor.network.subnets.clone()))
                .send()
                .await
                .map_err(|e| api_err("ec2:DescribeSubnets", e))?;

            let vpc_id = out
                .subnets()
                .first()
                .and_then(|s| s.vpc_id())
                .ok_or_else(|| {
                    ProviderError::NoSubnets("none of the configured subnet ids exist".to_string())
                })?
                .to_string();

            return Ok((vpc_id, descriptor.network.subnets.clone()));
        }

        let vpcs = self
            .ec2
            .describe_vpcs()
            .filters(
                ec2::types::Filter::builder()
                    .name("is-default")
                    .values("true")
                    .build(),
            )
            .send()
            .await
            .map_err(|e| api_err("ec2:DescribeVpcs", e))?;

        let vpc_id = vpcs
            .vpcs()
            .first()
            .and_then(|v| v.vpc_id())
            .ok_or_else(|| {
                ProviderError::NoSubnets(
                    "account has no default VPC; set network.subnets in the descriptor"
                        .to_string(),
                )
            })?
            .to_string();

        let subnets = self
            .ec2
            .describe_subnets()
            .filters(
                ec2::types::Filter::builder()
                    .name("vpc-id")
                    .values(vpc_id.clone())
                    .build(),
            )
            .send()
            .await
            .map_err(|e| api_err("ec2:DescribeSubnets", e))?;

        let subnet_ids: Vec<String> = subnets
            .subnets()
            .iter()
            .filter_map(|s| s.subnet_id().map(str::to_string))
            .collect();

        if subnet_ids.is_empty() {
            return Err(ProviderError::NoSubnets(format!(
                "default VPC {} has no subnets",
                vpc_id
            )));
        }

        Ok((vpc_id, subnet_ids))
    }

    async fn find_security_group(
        &self,
        name: &str,
        vpc_id: &str,
    ) -> Result<Option<ec2::types::SecurityGroup>> {
        let out = self
            .ec2
            .describe_security_groups()
            .filters(
                ec2::types::Filter::builder()
                    .name("group-name")
                    .values(name)
                    .build(),
            )
            .filters(
                ec2::types::Filter::builder()
                    .name("vpc-id")
                    .values(vpc_id)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| api_err("ec2:DescribeSecurityGroups", e))?;

        Ok(out.security_groups().first().cloned())
    }

    async fn authorize_ingress(&self, group_id: &str, rule: &IngressRule) -> Result<()> {
        let permission = ec2::types::IpPermission::builder()
            .ip_protocol(rule.protocol.clone())
            .from_port(i32::from(rule.port))
            .to_port(i32::from(rule.port))
            .ip_ranges(
                ec2::types::IpRange::builder()
                    .cidr_ip(rule.cidr.clone())
                    .build(),
            )
            .build();

        self.ec2
            .authorize_security_group_ingress()
            .group_id(group_id)
            .ip_permissions(permission)
            .send()
            .await
            .map_err(|e| api_err("ec2:AuthorizeSecurityGroupIngress", e))?;

        info!(
            "Opened {}/{} from {} on security group {}",
            rule.port, rule.protocol, rule.cidr, group_id
        );
        Ok(())
    }

    /// Resolve public addresses for the given ENI ids in one call.
    async fn public_ips_for_enis(&self, eni_ids: Vec<String>) -> Result<HashMap<String, String>> {
        if eni_ids.is_empty() {
            return Ok(HashMap::new());
        }

        let out = self
            .ec2
            .describe_network_interfaces()
            .set_network_interface_ids(Some(eni_ids))
            .send()
            .await
            .map_err(|e| api_err("ec2:DescribeNetworkInterfaces", e))?;

        let mut by_eni = HashMap::new();
        for eni in out.network_interfaces() {
            if let (Some(id), Some(public_ip)) = (
                eni.network_interface_id(),
                eni.association().and_then(|a| a.public_ip()),
            ) {
                by_eni.insert(id.to_string(), public_ip.to_string());
            }
        }
        Ok(by_eni)
    }

    async fn task_definition_spec(&self, arn: &str) -> Result<Option<TaskDefinitionSpec>> {
        let out = self
            .ecs
            .describe_task_definition()
            .task_definition(arn)
            .send()
            .await
            .map_err(|e| api_err("ecs:DescribeTaskDefinition", e))?;

        let Some(task_definition) = out.task_definition() else {
            return Ok(None);
        };
        let Some(container) = task_definition.container_definitions().first() else {
            return Ok(None);
        };

        let env: BTreeMap<String, String> = container
            .environment()
            .iter()
            .filter_map(|kv| match (kv.name(), kv.value()) {
                (Some(name), Some(value)) => Some((name.to_string(), value.to_string())),
                _ => None,
            })
            .collect();

        Ok(Some(TaskDefinitionSpec {
            image: container.image().unwrap_or_default().to_string(),
            container_port: container
                .port_mappings()
                .first()
                .and_then(|p| p.container_port())
                .unwrap_or_default() as u16,
            cpu: task_definition
                .cpu()
                .and_then(|c| c.parse().ok())
                .unwrap_or_default(),
            memory: task_definition
                .memory()
                .and_then(|m| m.parse().ok())
                .unwrap_or_default(),
            env,
        }))
    }
}

#[async_trait]
impl InfraProvider for AwsProvider {
    async fn ensure_security_group(
        &self,
        descriptor: &DeploymentDescriptor,
        name: &str,
        ingress: &[IngressRule],
    ) -> Result<(String, ChangeAction)> {
        let (vpc_id, _) = self.resolve_network(descriptor).await?;

        if let Some(existing) = self.find_security_group(name, &vpc_id).await? {
            let group_id = existing
                .group_id()
                .ok_or_else(|| {
                    ProviderError::Malformed(format!("security group {} has no id", name))
                })?
                .to_string();

            let mut action = ChangeAction::Unchanged;
            for rule in ingress {
                let covered = existing.ip_permissions().iter().any(|perm| {
                    perm.from_port() == Some(i32::from(rule.port))
                        && perm.to_port() == Some(i32::from(rule.port))
                        && perm.ip_protocol() == Some(rule.protocol.as_str())
                        && perm
                            .ip_ranges()
                            .iter()
                            .any(|range| range.cidr_ip() == Some(rule.cidr.as_str()))
                });
                if !covered {
                    self.authorize_ingress(&group_id, rule).await?;
                    action = ChangeAction::Updated;
                }
            }
            return Ok((group_id, action));
        }

        let created = self
            .ec2
            .create_security_group()
            .group_name(name)
            .description(format!("managed by fargate-deploy for {}", descriptor.name))
            .vpc_id(&vpc_id)
            .send()
            .await
            .map_err(|e| api_err("ec2:CreateSecurityGroup", e))?;

        let group_id = created
            .group_id()
            .ok_or_else(|| {
                ProviderError::Malformed("CreateSecurityGroup returned no group id".to_string())
            })?
            .to_string();

        info!("Created security group {} ({})", name, group_id);

        for rule in ingress {
            self.authorize_ingress(&group_id, rule).await?;
        }

        Ok((group_id, ChangeAction::Created))
    }

    async fn ensure_log_group(&self, name: &str, retention_days: i32) -> Result<ChangeAction> {
        let out = self
            .logs
            .describe_log_groups()
            .log_group_name_prefix(name)
            .send()
            .await
            .map_err(|e| api_err("logs:DescribeLogGroups", e))?;

        let existing = out
            .log_groups()
            .iter()
            .find(|lg| lg.log_group_name() == Some(name))
            .cloned();

        match existing {
            Some(lg) if lg.retention_in_days() == Some(retention_days) => {
                Ok(ChangeAction::Unchanged)
            }
            Some(_) => {
                self.logs
                    .put_retention_policy()
                    .log_group_name(name)
                    .retention_in_days(retention_days)
                    .send()
                    .await
                    .map_err(|e| api_err("logs:PutRetentionPolicy", e))?;
                info!("Set retention on log group {} to {} days", name, retention_days);
                Ok(ChangeAction::Updated)
            }
            None => {
                self.logs
                    .create_log_group()
                    .log_group_name(name)
                    .send()
                    .await
                    .map_err(|e| api_err("logs:CreateLogGroup", e))?;
                self.logs
                    .put_retention_policy()
                    .log_group_name(name)
                    .retention_in_days(retention_days)
                    .send()
                    .await
                    .map_err(|e| api_err("logs:PutRetentionPolicy", e))?;
                info!("Created log group {}", name);
                Ok(ChangeAction::Created)
            }
        }
    }

    async fn ensure_cluster(&self, name: &str) -> Result<ChangeAction> {
        let out = self
            .ecs
            .describe_clusters()
            .clusters(name)
            .send()
            .await
            .map_err(|e| api_err("ecs:DescribeClusters", e))?;

        let active = out
            .clusters()
            .iter()
            .any(|c| c.status() == Some("ACTIVE"));

        if active {
            return Ok(ChangeAction::Unchanged);
        }

        self.ecs
            .create_cluster()
            .cluster_name(name)
            .send()
            .await
            .map_err(|e| api_err("ecs:CreateCluster", e))?;

        info!("Created cluster {}", name);
        Ok(ChangeAction::Created)
    }

    async fn describe_service(
        &self,
        cluster: &str,
        service: &str,
    ) -> Result<Option<ServiceState>> {
        let out = self
            .ecs
            .describe_services()
            .cluster(cluster)
            .services(service)
            .send()
            .await
            .map_err(|e| api_err("ecs:DescribeServices", e))?;

        let Some(svc) = out
            .services()
            .iter()
            .find(|s| s.status() == Some("ACTIVE"))
        else {
            return Ok(None);
        };

        let Some(task_definition_arn) = svc.task_definition().map(str::to_string) else {
            return Ok(None);
        };

        let spec = self.task_definition_spec(&task_definition_arn).await?;

        Ok(Some(ServiceState {
            task_definition_arn,
            desired_count: svc.desired_count().max(0) as u32,
            spec,
        }))
    }

    async fn register_task_definition(
        &self,
        descriptor: &DeploymentDescriptor,
        log_group: &str,
    ) -> Result<String> {
        let env: Vec<KeyValuePair> = descriptor
            .env
            .iter()
            .map(|(k, v)| KeyValuePair::builder().name(k).value(v).build())
            .collect();

        let log_configuration = LogConfiguration::builder()
            .log_driver(LogDriver::Awslogs)
            .options("awslogs-group", log_group)
            .options("awslogs-region", self.region.clone())
            .options("awslogs-stream-prefix", "ecs")
            .build()
            .map_err(|e| api_err("ecs:RegisterTaskDefinition", e))?;

        let container = ContainerDefinition::builder()
            .name(descriptor.name.clone())
            .image(descriptor.image.clone())
            .essential(true)
            .port_mappings(
                PortMapping::builder()
                    .container_port(i32::from(descriptor.container_port))
                    .host_port(i32::from(descriptor.container_port))
                    .protocol(TransportProtocol::Tcp)
                    .build(),
            )
            .set_environment(Some(env))
            .log_configuration(log_configuration)
            .build();

        let out = self
            .ecs
            .register_task_definition()
            .family(descriptor.family())
            .requires_compatibilities(Compatibility::Fargate)
            .network_mode(NetworkMode::Awsvpc)
            .cpu(descriptor.cpu.to_string())
            .memory(descriptor.memory.to_string())
            .set_execution_role_arn(descriptor.execution_role_arn.clone())
            .container_definitions(container)
            .send()
            .await
            .map_err(|e| api_err("ecs:RegisterTaskDefinition", e))?;

        let arn = out
            .task_definition()
            .and_then(|td| td.task_definition_arn())
            .ok_or_else(|| {
                ProviderError::Malformed("RegisterTaskDefinition returned no ARN".to_string())
            })?
            .to_string();

        info!("Registered task definition {}", arn);
        Ok(arn)
    }

    async fn create_service(
        &self,
        descriptor: &DeploymentDescriptor,
        task_definition_arn: &str,
        security_group_id: &str,
    ) -> Result<()> {
        let (_, subnets) = self.resolve_network(descriptor).await?;

        let assign_public_ip = if descriptor.network.assign_public_ip {
            AssignPublicIp::Enabled
        } else {
            AssignPublicIp::Disabled
        };

        let awsvpc = AwsVpcConfiguration::builder()
            .set_subnets(Some(subnets))
            .security_groups(security_group_id)
            .assign_public_ip(assign_public_ip)
            .build()
            .map_err(|e| api_err("ecs:CreateService", e))?;

        self.ecs
            .create_service()
            .cluster(descriptor.cluster_name())
            .service_name(&descriptor.name)
            .task_definition(task_definition_arn)
            .desired_count(descriptor.desired_count as i32)
            .launch_type(LaunchType::Fargate)
            .network_configuration(
                NetworkConfiguration::builder()
                    .awsvpc_configuration(awsvpc)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| api_err("ecs:CreateService", e))?;

        info!(
            "Created service {} ({} task{})",
            descriptor.name,
            descriptor.desired_count,
            if descriptor.desired_count == 1 { "" } else { "s" }
        );
        Ok(())
    }

    async fn update_service(
        &self,
        descriptor: &DeploymentDescriptor,
        task_definition_arn: &str,
    ) -> Result<()> {
        self.ecs
            .update_service()
            .cluster(descriptor.cluster_name())
            .service(&descriptor.name)
            .task_definition(task_definition_arn)
            .desired_count(descriptor.desired_count as i32)
            .send()
            .await
            .map_err(|e| api_err("ecs:UpdateService", e))?;

        info!("Updated service {}", descriptor.name);
        Ok(())
    }

    async fn observe(&self, cluster: &str, service: &str) -> Result<ClusterState> {
        let listed = self
            .ecs
            .list_tasks()
            .cluster(cluster)
            .service_name(service)
            .send()
            .await
            .map_err(|e| api_err("ecs:ListTasks", e))?;

        let task_arns = listed.task_arns().to_vec();
        if task_arns.is_empty() {
            return Ok(ClusterState::empty());
        }

        let described = self
            .ecs
            .describe_tasks()
            .cluster(cluster)
            .set_tasks(Some(task_arns))
            .send()
            .await
            .map_err(|e| api_err("ecs:DescribeTasks", e))?;

        // Collect the ENI of each task, then resolve public addresses in
        // a single EC2 call.
        let mut eni_by_task: HashMap<String, String> = HashMap::new();
        for task in described.tasks() {
            let Some(arn) = task.task_arn() else { continue };
            let eni = task.attachments().iter().find_map(|attachment| {
                if attachment.r#type() != Some("ElasticNetworkInterface") {
                    return None;
                }
                attachment.details().iter().find_map(|kv| {
                    if kv.name() == Some("networkInterfaceId") {
                        kv.value().map(str::to_string)
                    } else {
                        None
                    }
                })
            });
            if let Some(eni) = eni {
                eni_by_task.insert(arn.to_string(), eni);
            }
        }

        let public_by_eni = self
            .public_ips_for_enis(eni_by_task.values().cloned().collect())
            .await?;

        let tasks = described
            .tasks()
            .iter()
            .map(|task| {
                let task_arn = task.task_arn().unwrap_or_default().to_string();
                let public_ip = eni_by_task
                    .get(&task_arn)
                    .and_then(|eni| public_by_eni.get(eni))
                    .cloned();
                let private_ip = task
                    .containers()
                    .first()
                    .and_then(|c| c.network_interfaces().first())
                    .and_then(|ni| ni.private_ipv4_address())
                    .map(str::to_string);

                TaskObservation {
                    status: TaskHealth::from_status(task.last_status().unwrap_or_default()),
                    private_ip,
                    public_ip,
                    started_at: task.started_at().and_then(|t| {
                        chrono::DateTime::from_timestamp(t.secs(), t.subsec_nanos())
                    }),
                    task_arn,
                }
            })
            .collect();

        Ok(ClusterState {
            tasks,
            observed_at: chrono::Utc::now(),
        })
    }

    async fn delete_service(&self, cluster: &str, service: &str) -> Result<bool> {
        if self.describe_service(cluster, service).await?.is_none() {
            return Ok(false);
        }

        self.ecs
            .delete_service()
            .cluster(cluster)
            .service(service)
            .force(true)
            .send()
            .await
            .map_err(|e| api_err("ecs:DeleteService", e))?;

        info!("Deleted service {}", service);
        Ok(true)
    }

    async fn delete_cluster(&self, name: &str) -> Result<bool> {
        let out = self
            .ecs
            .describe_clusters()
            .clusters(name)
            .send()
            .await
            .map_err(|e| api_err("ecs:DescribeClusters", e))?;

        if !out.clusters().iter().any(|c| c.status() == Some("ACTIVE")) {
            return Ok(false);
        }

        self.ecs
            .delete_cluster()
            .cluster(name)
            .send()
            .await
            .map_err(|e| api_err("ecs:DeleteCluster", e))?;

        info!("Deleted cluster {}", name);
        Ok(true)
    }

    async fn delete_log_group(&self, name: &str) -> Result<bool> {
        let out = self
            .logs
            .describe_log_groups()
            .log_group_name_prefix(name)
            .send()
            .await
            .map_err(|e| api_err("logs:DescribeLogGroups", e))?;

        if !out
            .log_groups()
            .iter()
            .any(|lg| lg.log_group_name() == Some(name))
        {
            return Ok(false);
        }

        self.logs
            .delete_log_group()
            .log_group_name(name)
            .send()
            .await
            .map_err(|e| api_err("logs:DeleteLogGroup", e))?;

        info!("Deleted log group {}", name);
        Ok(true)
    }

    async fn delete_security_group(&self, name: &str) -> Result<bool> {
        // The group may live in any VPC we can see; match by name only.
        let out = self
            .ec2
            .describe_security_groups()
            .filters(
                ec2::types::Filter::builder()
                    .name("group-name")
                    .values(name)
                    .build(),
            )
            .send()
            .await
            .map_err(|e| api_err("ec2:DescribeSecurityGroups", e))?;

        let Some(group_id) = out
            .security_groups()
            .first()
            .and_then(|g| g.group_id())
            .map(str::to_string)
        else {
            return Ok(false);
        };

        // Deletion fails while ENIs of draining tasks are still attached;
        // the operator re-runs destroy once they are gone.
        self.ec2
            .delete_security_group()
            .group_id(&group_id)
            .send()
            .await
            .map_err(|e| {
                warn!("Security group {} still in use?", group_id);
                api_err("ec2:DeleteSecurityGroup", e)
            })?;

        info!("Deleted security group {} ({})", name, group_id);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    #[ignore] // needs AWS credentials and a region
    async fn test_from_env() {
        let provider = AwsProvider::from_env(None, None).await;
        assert!(provider.is_ok());
    }

    #[tokio::test]
    #[ignore] // needs AWS credentials and a default VPC
    async fn test_resolve_default_network() {
        let provider = AwsProvider::from_env(None, None).await.unwrap();
        let descriptor: DeploymentDescriptor = toml::from_str(
            r#"
            name = "smoke"
            image = "nginx:alpine"
            container_port = 80
        "#,
        )
        .unwrap();
        let (vpc, subnets) = provider.resolve_network(&descriptor).await.unwrap();
        assert!(vpc.starts_with("vpc-"));
        assert!(!subnets.is_empty());
    }
}
