use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::descriptor::DeploymentDescriptor;

/// Lifecycle state of one observed task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskHealth {
    Provisioning,
    Pending,
    Running,
    Deprovisioning,
    Stopped,
    Unknown,
}

impl TaskHealth {
    /// Map the provider's last-status string onto the lifecycle enum
    pub fn from_status(status: &str) -> Self {
        match status.to_ascii_uppercase().as_str() {
            "PROVISIONING" => TaskHealth::Provisioning,
            "PENDING" | "ACTIVATING" => TaskHealth::Pending,
            "RUNNING" => TaskHealth::Running,
            "DEACTIVATING" | "STOPPING" | "DEPROVISIONING" => TaskHealth::Deprovisioning,
            "STOPPED" => TaskHealth::Stopped,
            _ => TaskHealth::Unknown,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self, TaskHealth::Running)
    }
}

impl fmt::Display for TaskHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskHealth::Provisioning => "PROVISIONING",
            TaskHealth::Pending => "PENDING",
            TaskHealth::Running => "RUNNING",
            TaskHealth::Deprovisioning => "DEPROVISIONING",
            TaskHealth::Stopped => "STOPPED",
            TaskHealth::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// One running (or starting, or dying) copy of the workload
#[derive(Debug, Clone)]
pub struct TaskObservation {
    pub task_arn: String,
    pub status: TaskHealth,
    pub private_ip: Option<String>,
    pub public_ip: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Read-only snapshot of the service's tasks.
///
/// Re-fetched on every poll; it has no identity beyond the moment it was
/// observed.
#[derive(Debug, Clone)]
pub struct ClusterState {
    pub tasks: Vec<TaskObservation>,
    pub observed_at: DateTime<Utc>,
}

impl ClusterState {
    pub fn empty() -> Self {
        Self {
            tasks: Vec::new(),
            observed_at: Utc::now(),
        }
    }

    pub fn running_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.status.is_running()).count()
    }

    /// First running task that is actually reachable from outside
    pub fn first_reachable(&self) -> Option<&TaskObservation> {
        self.tasks
            .iter()
            .find(|t| t.status.is_running() && t.public_ip.is_some())
    }
}

/// What convergence did to one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Created,
    Updated,
    Unchanged,
    Removed,
}

impl fmt::Display for ChangeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeAction::Created => "created",
            ChangeAction::Updated => "updated",
            ChangeAction::Unchanged => "unchanged",
            ChangeAction::Removed => "removed",
        };
        f.write_str(s)
    }
}

/// The resource classes convergence manages, in dependency order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    SecurityGroup,
    LogGroup,
    Cluster,
    TaskDefinition,
    Service,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::SecurityGroup => "security-group",
            ResourceKind::LogGroup => "log-group",
            ResourceKind::Cluster => "cluster",
            ResourceKind::TaskDefinition => "task-definition",
            ResourceKind::Service => "service",
        };
        f.write_str(s)
    }
}

/// One line of a convergence plan
#[derive(Debug, Clone)]
pub struct ResourceChange {
    pub kind: ResourceKind,
    pub action: ChangeAction,
    pub id: String,
}

/// Network address where the deployed application answers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub ip: String,
    pub port: u16,
}

impl Endpoint {
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.ip, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// The part of a registered task definition that convergence diffs.
///
/// Registering a task definition always creates a new revision, so the
/// driver compares this snapshot first and only registers when something
/// actually differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDefinitionSpec {
    pub image: String,
    pub container_port: u16,
    pub cpu: u32,
    pub memory: u32,
    pub env: BTreeMap<String, String>,
}

impl TaskDefinitionSpec {
    pub fn from_descriptor(descriptor: &DeploymentDescriptor) -> Self {
        Self {
            image: descriptor.image.clone(),
            container_port: descriptor.container_port,
            cpu: descriptor.cpu,
            memory: descriptor.memory,
            env: descriptor.env.clone(),
        }
    }
}

/// Observed state of the deployed service, if it exists
#[derive(Debug, Clone)]
pub struct ServiceState {
    pub task_definition_arn: String,
    pub desired_count: u32,
    /// Resolved spec of the task definition the service currently runs;
    /// `None` when the provider could not describe it
    pub spec: Option<TaskDefinitionSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_health_from_status() {
        assert_eq!(TaskHealth::from_status("RUNNING"), TaskHealth::Running);
        assert_eq!(TaskHealth::from_status("running"), TaskHealth::Running);
        assert_eq!(TaskHealth::from_status("PENDING"), TaskHealth::Pending);
        assert_eq!(TaskHealth::from_status("STOPPED"), TaskHealth::Stopped);
        assert_eq!(TaskHealth::from_status("whatever"), TaskHealth::Unknown);
    }

    #[test]
    fn test_endpoint_url() {
        let endpoint = Endpoint {
            ip: "198.51.100.7".to_string(),
            port: 8080,
        };
        assert_eq!(endpoint.url(), "http://198.51.100.7:8080");
        assert_eq!(endpoint.to_string(), "198.51.100.7:8080");
    }

    #[test]
    fn test_cluster_state_helpers() {
        let state = ClusterState {
            tasks: vec![
                TaskObservation {
                    task_arn: "arn:1".to_string(),
                    status: TaskHealth::Pending,
                    private_ip: None,
                    public_ip: None,
                    started_at: None,
                },
                TaskObservation {
                    task_arn: "arn:2".to_string(),
                    status: TaskHealth::Running,
                    private_ip: Some("10.0.0.5".to_string()),
                    public_ip: Some("198.51.100.7".to_string()),
                    started_at: None,
                },
            ],
            observed_at: Utc::now(),
        };
        assert_eq!(state.running_count(), 1);
        assert_eq!(state.first_reachable().unwrap().task_arn, "arn:2");
    }
}
