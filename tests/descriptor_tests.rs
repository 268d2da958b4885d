use std::io::Write;

use fargate_deploy_rs::descriptor::{validate_descriptor, DeploymentDescriptor};
use fargate_deploy_rs::error::Error;

fn write_descriptor(dir: &tempfile::TempDir, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    path
}

#[test]
fn test_load_toml_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_descriptor(
        &dir,
        "deployment.toml",
        r#"
            name = "chatbot"
            image = "chatbot:v1"
            container_port = 8080
            desired_count = 2

            [network]
            subnets = ["subnet-aaa", "subnet-bbb"]
        "#,
    );

    let descriptor = DeploymentDescriptor::from_path(&path).unwrap();
    assert_eq!(descriptor.name, "chatbot");
    assert_eq!(descriptor.desired_count, 2);
    assert_eq!(descriptor.network.subnets.len(), 2);
    assert!(validate_descriptor(&descriptor).is_ok());
}

#[test]
fn test_load_yaml_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_descriptor(
        &dir,
        "deployment.yaml",
        r#"
name: chatbot
image: chatbot:v1
container_port: 8080
env:
  RUST_LOG: info
"#,
    );

    let descriptor = DeploymentDescriptor::from_path(&path).unwrap();
    assert_eq!(descriptor.env.get("RUST_LOG").map(String::as_str), Some("info"));
    assert!(validate_descriptor(&descriptor).is_ok());
}

#[test]
fn test_load_json_descriptor() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_descriptor(
        &dir,
        "deployment.json",
        r#"{ "name": "chatbot", "image": "chatbot:v1", "container_port": 8080 }"#,
    );

    let descriptor = DeploymentDescriptor::from_path(&path).unwrap();
    assert_eq!(descriptor.cpu, 256);
}

#[test]
fn test_unsupported_extension_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_descriptor(&dir, "deployment.ini", "name=chatbot");

    let err = DeploymentDescriptor::from_path(&path).unwrap_err();
    assert!(matches!(err, Error::Descriptor(_)));
}

#[test]
fn test_missing_file_rejected() {
    let err = DeploymentDescriptor::from_path("does-not-exist.toml").unwrap_err();
    assert!(matches!(err, Error::Descriptor(_)));
}

#[test]
fn test_malformed_toml_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_descriptor(&dir, "deployment.toml", "name = ");

    let err = DeploymentDescriptor::from_path(&path).unwrap_err();
    assert!(matches!(err, Error::Descriptor(_)));
}

#[test]
fn test_loaded_descriptor_with_bad_port_fails_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = write_descriptor(
        &dir,
        "deployment.toml",
        r#"
            name = "chatbot"
            image = "chatbot:v1"
            container_port = 0
        "#,
    );

    let descriptor = DeploymentDescriptor::from_path(&path).unwrap();
    let err = validate_descriptor(&descriptor).unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
}
