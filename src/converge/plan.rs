use std::fmt;

use crate::provider::{ChangeAction, Endpoint, ResourceChange, ResourceKind};

/// What one convergence pass did, resource by resource
#[derive(Debug, Clone, Default)]
pub struct ConvergencePlan {
    pub changes: Vec<ResourceChange>,
}

impl ConvergencePlan {
    pub(crate) fn record(
        &mut self,
        kind: ResourceKind,
        action: ChangeAction,
        id: impl Into<String>,
    ) {
        self.changes.push(ResourceChange {
            kind,
            action,
            id: id.into(),
        });
    }

    /// True when the pass touched nothing
    pub fn is_noop(&self) -> bool {
        self.changes
            .iter()
            .all(|c| c.action == ChangeAction::Unchanged)
    }

    fn count(&self, action: ChangeAction) -> usize {
        self.changes.iter().filter(|c| c.action == action).count()
    }
}

impl fmt::Display for ConvergencePlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} removed, {} unchanged",
            self.count(ChangeAction::Created),
            self.count(ChangeAction::Updated),
            self.count(ChangeAction::Removed),
            self.count(ChangeAction::Unchanged),
        )
    }
}

/// Outcome of one convergence attempt.
///
/// Produced exactly once per apply invocation. The endpoint is attached
/// after the status reporter saw a task actually running; an apply with
/// `--no-wait` leaves it empty.
#[derive(Debug, Clone)]
pub struct ApplyResult {
    pub plan: ConvergencePlan,
    pub cluster: String,
    pub service: String,
    pub desired_count: u32,
    pub endpoint: Option<Endpoint>,
}

impl ApplyResult {
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_summary_and_noop() {
        let mut plan = ConvergencePlan::default();
        plan.record(ResourceKind::Cluster, ChangeAction::Unchanged, "c");
        plan.record(ResourceKind::Service, ChangeAction::Unchanged, "s");
        assert!(plan.is_noop());
        assert_eq!(plan.to_string(), "0 created, 0 updated, 0 removed, 2 unchanged");

        plan.record(ResourceKind::TaskDefinition, ChangeAction::Created, "td");
        assert!(!plan.is_noop());
        assert_eq!(plan.to_string(), "1 created, 0 updated, 0 removed, 2 unchanged");
    }
}
