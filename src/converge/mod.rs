//! Convergence of cloud state onto a descriptor
//!
//! The driver reconciles the five managed resources in dependency order
//! and reports one [`ApplyResult`] per invocation. Re-applying an
//! unchanged descriptor is a no-op.

mod driver;
mod plan;

pub use driver::ConvergenceDriver;
pub use plan::{ApplyResult, ConvergencePlan};
