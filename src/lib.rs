//! # fargate-deploy-rs
//!
//! Descriptor-driven deployment applier for containerized workloads on
//! AWS ECS Fargate.
//!
//! A declarative deployment descriptor (image, port, sizing, task count,
//! network placement) is validated offline, converged against live cloud
//! state, and the resulting tasks are polled until the service answers on
//! a public endpoint.

pub mod config;
pub mod converge;
pub mod descriptor;
pub mod error;
pub mod logging;
pub mod provider;
pub mod status;

#[cfg(feature = "docker-preflight")]
pub mod artifact;

pub use converge::{ApplyResult, ConvergenceDriver, ConvergencePlan};
pub use descriptor::DeploymentDescriptor;
pub use error::{Error, Result};
pub use status::StatusReporter;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Validation("missing image".to_string());
        assert!(err.to_string().contains("missing image"));
    }
}
