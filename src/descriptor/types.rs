use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use validator::Validate;

use crate::error::{Error, Result};

/// Declarative specification of a deployed containerized workload.
///
/// Immutable once submitted: the convergence driver takes ownership of the
/// descriptor for one apply cycle and it is discarded afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DeploymentDescriptor {
    /// Service name, also used to derive the cluster, log group and
    /// security group names
    #[validate(length(min = 1, max = 255, message = "service name is required"))]
    pub name: String,

    /// Container image reference (exactly one per descriptor)
    #[validate(length(min = 1, message = "container image reference is required"))]
    pub image: String,

    /// Port the container listens on (exactly one per descriptor)
    #[validate(range(min = 1, message = "container port must be in 1-65535"))]
    pub container_port: u16,

    /// CPU reservation in Fargate CPU units (256 = 0.25 vCPU)
    #[serde(default = "default_cpu")]
    pub cpu: u32,

    /// Memory reservation in MiB
    #[serde(default = "default_memory")]
    pub memory: u32,

    /// Number of task copies the service should keep running
    #[validate(range(min = 1, message = "desired count must be at least 1"))]
    #[serde(default = "default_desired_count")]
    pub desired_count: u32,

    /// IAM role the tasks use to pull the image and ship logs
    #[serde(default)]
    pub execution_role_arn: Option<String>,

    /// Environment passed to the container
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Network placement of the tasks
    #[serde(default)]
    pub network: NetworkPlacement,

    /// CloudWatch log retention in days
    #[serde(default = "default_log_retention")]
    pub log_retention_days: i32,
}

/// Where the tasks land on the network and who may reach them
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkPlacement {
    /// Subnet ids for task placement; empty means "use the default VPC"
    #[serde(default)]
    pub subnets: Vec<String>,

    /// Name of the managed security group; derived from the service name
    /// when absent
    #[serde(default)]
    pub security_group: Option<String>,

    /// Ingress rules; empty means "open the container port to the world"
    #[serde(default)]
    pub ingress: Vec<IngressRule>,

    /// Whether tasks get a public address (required for a reachable
    /// endpoint without a load balancer)
    #[serde(default = "default_true")]
    pub assign_public_ip: bool,
}

/// One allowed inbound flow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngressRule {
    pub port: u16,

    #[serde(default = "default_cidr")]
    pub cidr: String,

    #[serde(default = "default_protocol")]
    pub protocol: String,
}

impl Default for NetworkPlacement {
    fn default() -> Self {
        Self {
            subnets: Vec::new(),
            security_group: None,
            ingress: Vec::new(),
            assign_public_ip: true,
        }
    }
}

fn default_cpu() -> u32 {
    256
}

fn default_memory() -> u32 {
    512
}

fn default_desired_count() -> u32 {
    1
}

fn default_log_retention() -> i32 {
    7
}

fn default_true() -> bool {
    true
}

fn default_cidr() -> String {
    "0.0.0.0/0".to_string()
}

fn default_protocol() -> String {
    "tcp".to_string()
}

impl DeploymentDescriptor {
    /// Load a descriptor from a file, picking the parser by extension.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Descriptor(format!("Failed to read {}: {}", path.display(), e))
        })?;

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_ascii_lowercase();

        match ext.as_str() {
            "toml" => toml::from_str(&raw)
                .map_err(|e| Error::Descriptor(format!("Invalid TOML in {}: {}", path.display(), e))),
            "yaml" | "yml" => serde_yaml_ng::from_str(&raw)
                .map_err(|e| Error::Descriptor(format!("Invalid YAML in {}: {}", path.display(), e))),
            "json" => serde_json::from_str(&raw)
                .map_err(|e| Error::Descriptor(format!("Invalid JSON in {}: {}", path.display(), e))),
            other => Err(Error::Descriptor(format!(
                "Unsupported descriptor format '{}' (expected toml, yaml or json)",
                other
            ))),
        }
    }

    /// Task definition family name
    pub fn family(&self) -> String {
        format!("{}-task", self.name)
    }

    /// Cluster the service runs in
    pub fn cluster_name(&self) -> String {
        format!("{}-cluster", self.name)
    }

    /// CloudWatch log group for the tasks
    pub fn log_group_name(&self) -> String {
        format!("/ecs/{}", self.name)
    }

    /// Name of the security group guarding the tasks
    pub fn security_group_name(&self) -> String {
        self.network
            .security_group
            .clone()
            .unwrap_or_else(|| format!("{}-svc", self.name))
    }

    /// Ingress rules to enforce; falls back to opening the container port
    /// to the world when the descriptor names none.
    pub fn effective_ingress(&self) -> Vec<IngressRule> {
        if self.network.ingress.is_empty() {
            vec![IngressRule {
                port: self.container_port,
                cidr: default_cidr(),
                protocol: default_protocol(),
            }]
        } else {
            self.network.ingress.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
            name = "chatbot"
            image = "123456789012.dkr.ecr.us-east-1.amazonaws.com/chatbot:v1"
            container_port = 8080
        "#
    }

    #[test]
    fn test_defaults_applied() {
        let descriptor: DeploymentDescriptor = toml::from_str(minimal_toml()).unwrap();
        assert_eq!(descriptor.cpu, 256);
        assert_eq!(descriptor.memory, 512);
        assert_eq!(descriptor.desired_count, 1);
        assert!(descriptor.network.assign_public_ip);
        assert!(descriptor.network.subnets.is_empty());
    }

    #[test]
    fn test_derived_names() {
        let descriptor: DeploymentDescriptor = toml::from_str(minimal_toml()).unwrap();
        assert_eq!(descriptor.family(), "chatbot-task");
        assert_eq!(descriptor.cluster_name(), "chatbot-cluster");
        assert_eq!(descriptor.log_group_name(), "/ecs/chatbot");
        assert_eq!(descriptor.security_group_name(), "chatbot-svc");
    }

    #[test]
    fn test_effective_ingress_fallback() {
        let descriptor: DeploymentDescriptor = toml::from_str(minimal_toml()).unwrap();
        let rules = descriptor.effective_ingress();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].port, 8080);
        assert_eq!(rules[0].cidr, "0.0.0.0/0");
    }

    #[test]
    fn test_explicit_ingress_wins() {
        let raw = r#"
            name = "chatbot"
            image = "chatbot:v1"
            container_port = 8080

            [[network.ingress]]
            port = 8080
            cidr = "10.0.0.0/8"
        "#;
        let descriptor: DeploymentDescriptor = toml::from_str(raw).unwrap();
        let rules = descriptor.effective_ingress();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].cidr, "10.0.0.0/8");
        assert_eq!(rules[0].protocol, "tcp");
    }
}
