use std::sync::Arc;

use fargate_deploy_rs::converge::ConvergenceDriver;
use fargate_deploy_rs::descriptor::DeploymentDescriptor;
use fargate_deploy_rs::error::Error;
use fargate_deploy_rs::provider::{ChangeAction, InfraProvider, MemoryProvider, ResourceKind};

fn descriptor(image: &str, desired_count: u32) -> DeploymentDescriptor {
    toml::from_str(&format!(
        r#"
        name = "chatbot"
        image = "{}"
        container_port = 8080
        desired_count = {}
    "#,
        image, desired_count
    ))
    .unwrap()
}

#[tokio::test]
async fn test_first_apply_creates_all_resources() {
    let provider = Arc::new(MemoryProvider::new());
    let driver = ConvergenceDriver::new(provider.clone());

    let result = driver.apply(descriptor("chatbot:v1", 1)).await.unwrap();

    assert_eq!(result.plan.changes.len(), 5);
    assert!(result
        .plan
        .changes
        .iter()
        .all(|c| c.action == ChangeAction::Created));
    assert_eq!(result.cluster, "chatbot-cluster");
    assert_eq!(result.service, "chatbot");
    assert!(result.endpoint.is_none());
    assert!(provider.mutation_count() > 0);
}

#[tokio::test]
async fn test_reapply_unchanged_descriptor_is_noop() {
    let provider = Arc::new(MemoryProvider::new());
    let driver = ConvergenceDriver::new(provider.clone());

    driver.apply(descriptor("chatbot:v1", 1)).await.unwrap();
    let mutations_after_first = provider.mutation_count();

    let second = driver.apply(descriptor("chatbot:v1", 1)).await.unwrap();

    assert!(second.plan.is_noop());
    assert_eq!(provider.mutation_count(), mutations_after_first);
}

#[tokio::test]
async fn test_invalid_descriptor_never_reaches_provider() {
    let provider = Arc::new(MemoryProvider::new());
    let driver = ConvergenceDriver::new(provider.clone());

    let mut bad = descriptor("chatbot:v1", 1);
    bad.image = String::new();

    let err = driver.apply(bad).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(provider.call_count(), 0);

    let mut bad_port = descriptor("chatbot:v1", 1);
    bad_port.container_port = 0;

    let err = driver.apply(bad_port).await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_image_change_rolls_the_task_definition() {
    let provider = Arc::new(MemoryProvider::new());
    let driver = ConvergenceDriver::new(provider.clone());

    driver.apply(descriptor("chatbot:v1", 1)).await.unwrap();
    let result = driver.apply(descriptor("chatbot:v2", 1)).await.unwrap();

    let action_of = |kind: ResourceKind| {
        result
            .plan
            .changes
            .iter()
            .find(|c| c.kind == kind)
            .map(|c| c.action)
            .unwrap()
    };

    assert_eq!(action_of(ResourceKind::TaskDefinition), ChangeAction::Updated);
    assert_eq!(action_of(ResourceKind::Service), ChangeAction::Updated);
    assert_eq!(action_of(ResourceKind::Cluster), ChangeAction::Unchanged);
    assert_eq!(action_of(ResourceKind::LogGroup), ChangeAction::Unchanged);
    assert_eq!(action_of(ResourceKind::SecurityGroup), ChangeAction::Unchanged);
}

#[tokio::test]
async fn test_scaling_only_touches_the_service() {
    let provider = Arc::new(MemoryProvider::new());
    let driver = ConvergenceDriver::new(provider.clone());

    driver.apply(descriptor("chatbot:v1", 1)).await.unwrap();
    let result = driver.apply(descriptor("chatbot:v1", 3)).await.unwrap();

    let service = result
        .plan
        .changes
        .iter()
        .find(|c| c.kind == ResourceKind::Service)
        .unwrap();
    let task_definition = result
        .plan
        .changes
        .iter()
        .find(|c| c.kind == ResourceKind::TaskDefinition)
        .unwrap();

    assert_eq!(service.action, ChangeAction::Updated);
    assert_eq!(task_definition.action, ChangeAction::Unchanged);
}

#[tokio::test]
async fn test_observed_running_never_exceeds_desired() {
    let provider = Arc::new(MemoryProvider::new());
    let driver = ConvergenceDriver::new(provider.clone());

    let desired = 3;
    let result = driver.apply(descriptor("chatbot:v1", desired)).await.unwrap();

    let state = provider
        .observe(&result.cluster, &result.service)
        .await
        .unwrap();
    assert!(state.running_count() as u32 <= desired);
}

#[tokio::test]
async fn test_destroy_removes_everything_and_is_idempotent() {
    let provider = Arc::new(MemoryProvider::new());
    let driver = ConvergenceDriver::new(provider.clone());

    let spec = descriptor("chatbot:v1", 1);
    driver.apply(spec.clone()).await.unwrap();

    let plan = driver.destroy(&spec).await.unwrap();
    assert!(plan
        .changes
        .iter()
        .all(|c| c.action == ChangeAction::Removed));

    // Everything already gone; a second destroy changes nothing
    let plan = driver.destroy(&spec).await.unwrap();
    assert!(plan.is_noop());

    let state = provider
        .observe(&spec.cluster_name(), &spec.name)
        .await
        .unwrap();
    assert!(state.tasks.is_empty());
}

#[tokio::test]
async fn test_reapply_after_destroy_recreates() {
    let provider = Arc::new(MemoryProvider::new());
    let driver = ConvergenceDriver::new(provider.clone());

    let spec = descriptor("chatbot:v1", 1);
    driver.apply(spec.clone()).await.unwrap();
    driver.destroy(&spec).await.unwrap();

    let result = driver.apply(spec).await.unwrap();
    assert!(!result.plan.is_noop());
    let service = result
        .plan
        .changes
        .iter()
        .find(|c| c.kind == ResourceKind::Service)
        .unwrap();
    assert_eq!(service.action, ChangeAction::Created);
}
