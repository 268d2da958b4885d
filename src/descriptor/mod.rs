//! Deployment descriptor model
//!
//! A descriptor is the declarative input to the applier: one container
//! image, one exposed port, sizing, desired task count and network
//! placement. It is loaded from a TOML/YAML/JSON file, validated offline,
//! and then consumed by a single convergence cycle.

mod types;
mod validation;

pub use types::{DeploymentDescriptor, IngressRule, NetworkPlacement};
pub use validation::validate_descriptor;
