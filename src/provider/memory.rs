//! In-memory provider used by the test suite.
//!
//! Deterministic stand-in for the cloud: resources live in a single
//! mutex-guarded table, every mutating call bumps a counter (so tests can
//! assert idempotence), and task observation fabricates the steady state
//! the real provider would eventually report. Addresses come from the
//! TEST-NET-1 range.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use super::traits::InfraProvider;
use super::types::{
    ChangeAction, ClusterState, ServiceState, TaskDefinitionSpec, TaskHealth, TaskObservation,
};
use super::{ProviderError, Result};
use crate::descriptor::{DeploymentDescriptor, IngressRule};

#[derive(Debug, Clone)]
struct SecurityGroupRecord {
    id: String,
    ingress: Vec<IngressRule>,
}

#[derive(Debug, Clone)]
struct ServiceRecord {
    task_definition_arn: String,
    desired_count: u32,
    spec: TaskDefinitionSpec,
}

#[derive(Debug, Default)]
struct MemoryState {
    security_groups: HashMap<String, SecurityGroupRecord>,
    log_groups: HashMap<String, i32>,
    clusters: Vec<String>,
    revisions: HashMap<String, u32>,
    task_definitions: HashMap<String, TaskDefinitionSpec>,
    services: HashMap<(String, String), ServiceRecord>,
}

/// Fake provider with observable mutation counts
#[derive(Default)]
pub struct MemoryProvider {
    state: Mutex<MemoryState>,
    calls: AtomicU64,
    mutations: AtomicU64,
    hold_pending: bool,
}

impl MemoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks never leave PENDING; used to exercise poll timeouts.
    pub fn holding_tasks_pending() -> Self {
        Self {
            hold_pending: true,
            ..Self::default()
        }
    }

    /// Total provider calls, mutating or not
    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls that changed remote state
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    fn mutate(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl InfraProvider for MemoryProvider {
    async fn ensure_security_group(
        &self,
        _descriptor: &DeploymentDescriptor,
        name: &str,
        ingress: &[IngressRule],
    ) -> Result<(String, ChangeAction)> {
        self.touch();
        let mut state = self.state.lock().unwrap();

        if let Some(record) = state.security_groups.get_mut(name) {
            let mut action = ChangeAction::Unchanged;
            for rule in ingress {
                if !record.ingress.contains(rule) {
                    record.ingress.push(rule.clone());
                    action = ChangeAction::Updated;
                }
            }
            let id = record.id.clone();
            if action == ChangeAction::Updated {
                self.mutate();
            }
            return Ok((id, action));
        }

        let id = format!("sg-{:08x}", state.security_groups.len() + 1);
        state.security_groups.insert(
            name.to_string(),
            SecurityGroupRecord {
                id: id.clone(),
                ingress: ingress.to_vec(),
            },
        );
        self.mutate();
        Ok((id, ChangeAction::Created))
    }

    async fn ensure_log_group(&self, name: &str, retention_days: i32) -> Result<ChangeAction> {
        self.touch();
        let mut state = self.state.lock().unwrap();

        match state.log_groups.get(name) {
            Some(days) if *days == retention_days => Ok(ChangeAction::Unchanged),
            Some(_) => {
                state.log_groups.insert(name.to_string(), retention_days);
                self.mutate();
                Ok(ChangeAction::Updated)
            }
            None => {
                state.log_groups.insert(name.to_string(), retention_days);
                self.mutate();
                Ok(ChangeAction::Created)
            }
        }
    }

    async fn ensure_cluster(&self, name: &str) -> Result<ChangeAction> {
        self.touch();
        let mut state = self.state.lock().unwrap();

        if state.clusters.iter().any(|c| c == name) {
            return Ok(ChangeAction::Unchanged);
        }
        state.clusters.push(name.to_string());
        self.mutate();
        Ok(ChangeAction::Created)
    }

    async fn describe_service(
        &self,
        cluster: &str,
        service: &str,
    ) -> Result<Option<ServiceState>> {
        self.touch();
        let state = self.state.lock().unwrap();

        Ok(state
            .services
            .get(&(cluster.to_string(), service.to_string()))
            .map(|record| ServiceState {
                task_definition_arn: record.task_definition_arn.clone(),
                desired_count: record.desired_count,
                spec: Some(record.spec.clone()),
            }))
    }

    async fn register_task_definition(
        &self,
        descriptor: &DeploymentDescriptor,
        _log_group: &str,
    ) -> Result<String> {
        self.touch();
        let mut state = self.state.lock().unwrap();

        let family = descriptor.family();
        let revision = state.revisions.entry(family.clone()).or_insert(0);
        *revision += 1;
        let arn = format!(
            "arn:aws:ecs:local:000000000000:task-definition/{}:{}",
            family, revision
        );
        state
            .task_definitions
            .insert(arn.clone(), TaskDefinitionSpec::from_descriptor(descriptor));
        self.mutate();
        Ok(arn)
    }

    async fn create_service(
        &self,
        descriptor: &DeploymentDescriptor,
        task_definition_arn: &str,
        _security_group_id: &str,
    ) -> Result<()> {
        self.touch();
        let mut state = self.state.lock().unwrap();

        let spec = state
            .task_definitions
            .get(task_definition_arn)
            .cloned()
            .ok_or_else(|| {
                ProviderError::NotFound(format!("task definition {}", task_definition_arn))
            })?;

        state.services.insert(
            (descriptor.cluster_name(), descriptor.name.clone()),
            ServiceRecord {
                task_definition_arn: task_definition_arn.to_string(),
                desired_count: descriptor.desired_count,
                spec,
            },
        );
        self.mutate();
        Ok(())
    }

    async fn update_service(
        &self,
        descriptor: &DeploymentDescriptor,
        task_definition_arn: &str,
    ) -> Result<()> {
        self.touch();
        let mut state = self.state.lock().unwrap();

        let spec = state
            .task_definitions
            .get(task_definition_arn)
            .cloned()
            .ok_or_else(|| {
                ProviderError::NotFound(format!("task definition {}", task_definition_arn))
            })?;

        let key = (descriptor.cluster_name(), descriptor.name.clone());
        let record = state
            .services
            .get_mut(&key)
            .ok_or_else(|| ProviderError::NotFound(format!("service {}", descriptor.name)))?;

        record.task_definition_arn = task_definition_arn.to_string();
        record.desired_count = descriptor.desired_count;
        record.spec = spec;
        self.mutate();
        Ok(())
    }

    async fn observe(&self, cluster: &str, service: &str) -> Result<ClusterState> {
        self.touch();
        let state = self.state.lock().unwrap();

        let Some(record) = state
            .services
            .get(&(cluster.to_string(), service.to_string()))
        else {
            return Ok(ClusterState::empty());
        };

        let status = if self.hold_pending {
            TaskHealth::Pending
        } else {
            TaskHealth::Running
        };

        let tasks = (0..record.desired_count)
            .map(|i| TaskObservation {
                task_arn: format!("arn:aws:ecs:local:000000000000:task/{}/{}", service, i),
                status,
                private_ip: Some(format!("10.0.0.{}", i + 10)),
                public_ip: if status.is_running() {
                    Some(format!("192.0.2.{}", i + 1))
                } else {
                    None
                },
                started_at: if status.is_running() {
                    Some(Utc::now())
                } else {
                    None
                },
            })
            .collect();

        Ok(ClusterState {
            tasks,
            observed_at: Utc::now(),
        })
    }

    async fn delete_service(&self, cluster: &str, service: &str) -> Result<bool> {
        self.touch();
        let mut state = self.state.lock().unwrap();
        let removed = state
            .services
            .remove(&(cluster.to_string(), service.to_string()))
            .is_some();
        if removed {
            self.mutate();
        }
        Ok(removed)
    }

    async fn delete_cluster(&self, name: &str) -> Result<bool> {
        self.touch();
        let mut state = self.state.lock().unwrap();
        let before = state.clusters.len();
        state.clusters.retain(|c| c != name);
        let removed = state.clusters.len() != before;
        if removed {
            self.mutate();
        }
        Ok(removed)
    }

    async fn delete_log_group(&self, name: &str) -> Result<bool> {
        self.touch();
        let mut state = self.state.lock().unwrap();
        let removed = state.log_groups.remove(name).is_some();
        if removed {
            self.mutate();
        }
        Ok(removed)
    }

    async fn delete_security_group(&self, name: &str) -> Result<bool> {
        self.touch();
        let mut state = self.state.lock().unwrap();
        let removed = state.security_groups.remove(name).is_some();
        if removed {
            self.mutate();
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> DeploymentDescriptor {
        toml::from_str(
            r#"
            name = "chatbot"
            image = "chatbot:v1"
            container_port = 8080
            desired_count = 2
        "#,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_security_group_idempotent() {
        let provider = MemoryProvider::new();
        let descriptor = descriptor();
        let rules = descriptor.effective_ingress();

        let (id, action) = provider
            .ensure_security_group(&descriptor, "chatbot-svc", &rules)
            .await
            .unwrap();
        assert_eq!(action, ChangeAction::Created);

        let (id2, action) = provider
            .ensure_security_group(&descriptor, "chatbot-svc", &rules)
            .await
            .unwrap();
        assert_eq!(id, id2);
        assert_eq!(action, ChangeAction::Unchanged);
        assert_eq!(provider.mutation_count(), 1);
    }

    #[tokio::test]
    async fn test_observe_reports_desired_count_tasks() {
        let provider = MemoryProvider::new();
        let descriptor = descriptor();

        let arn = provider
            .register_task_definition(&descriptor, "/ecs/chatbot")
            .await
            .unwrap();
        provider
            .create_service(&descriptor, &arn, "sg-00000001")
            .await
            .unwrap();

        let state = provider
            .observe(&descriptor.cluster_name(), &descriptor.name)
            .await
            .unwrap();
        assert_eq!(state.tasks.len(), 2);
        assert_eq!(state.running_count(), 2);
        assert!(state.first_reachable().is_some());
    }

    #[tokio::test]
    async fn test_pending_provider_never_runs() {
        let provider = MemoryProvider::holding_tasks_pending();
        let descriptor = descriptor();

        let arn = provider
            .register_task_definition(&descriptor, "/ecs/chatbot")
            .await
            .unwrap();
        provider
            .create_service(&descriptor, &arn, "sg-00000001")
            .await
            .unwrap();

        let state = provider
            .observe(&descriptor.cluster_name(), &descriptor.name)
            .await
            .unwrap();
        assert_eq!(state.running_count(), 0);
        assert!(state.first_reachable().is_none());
    }
}
