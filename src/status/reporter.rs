use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::provider::{ClusterState, Endpoint, InfraProvider};

/// Fixed-interval poll schedule
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(300),
        }
    }
}

/// Polls cluster state until the deployment is reachable or time runs out.
///
/// Polling is the only suspension point; there are no retries beyond the
/// repeated poll itself, and cancelling leaves the remote resources
/// untouched.
pub struct StatusReporter<P: InfraProvider> {
    provider: Arc<P>,
    settings: PollSettings,
}

impl<P: InfraProvider> StatusReporter<P> {
    pub fn new(provider: Arc<P>, settings: PollSettings) -> Self {
        Self { provider, settings }
    }

    /// Wait for a running task with a public address and return its
    /// endpoint. Errors with [`Error::Timeout`] when nothing becomes
    /// reachable in time, and [`Error::Cancelled`] when the caller aborts.
    pub async fn wait_until_running(
        &self,
        cluster: &str,
        service: &str,
        port: u16,
        cancel: &CancellationToken,
    ) -> Result<Endpoint> {
        let started = tokio::time::Instant::now();

        loop {
            if cancel.is_cancelled() {
                return Err(Error::Cancelled(format!("service {}", service)));
            }

            let state = self.provider.observe(cluster, service).await?;
            debug!(
                "Observed {}/{}: {} task(s), {} running",
                cluster,
                service,
                state.tasks.len(),
                state.running_count()
            );

            if let Some(task) = state.first_reachable() {
                if let Some(ip) = &task.public_ip {
                    let endpoint = Endpoint {
                        ip: ip.clone(),
                        port,
                    };
                    info!(
                        "Service {} is running at {} (task {})",
                        service, endpoint, task.task_arn
                    );
                    return Ok(endpoint);
                }
            }

            if started.elapsed() >= self.settings.timeout {
                return Err(Error::Timeout {
                    what: format!("service {} to reach RUNNING", service),
                    elapsed_secs: self.settings.timeout.as_secs(),
                });
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(Error::Cancelled(format!("service {}", service)));
                }
                _ = tokio::time::sleep(self.settings.interval) => {}
            }
        }
    }

    /// One snapshot of the service's tasks, no waiting.
    pub async fn snapshot(&self, cluster: &str, service: &str) -> Result<ClusterState> {
        Ok(self.provider.observe(cluster, service).await?)
    }
}
