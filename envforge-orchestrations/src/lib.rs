//! Envforge Orchestrations - environment lifecycle workflows and the stack controller
//!
//! This crate provides the ordered workflows that initialize and delete
//! environments, the gateway they use to drive infrastructure stacks, and the
//! controller that keeps an environment stack's workload membership in sync.
//!
//! # Usage
//!
//! ```rust,no_run
//! use envforge_orchestrations::orchestrations::{InitEnvironment, LogProgress};
//! use envforge_orchestrations::InitEnvironmentInput;
//! use std::sync::Arc;
//!
//! # async fn example(services: envforge_orchestrations::orchestrations::EnvironmentServices) -> anyhow::Result<()> {
//! let output = InitEnvironment::new(services, Arc::new(LogProgress))
//!     .run(InitEnvironmentInput {
//!         app: "phonetool".to_string(),
//!         name: "test".to_string(),
//!         prod: false,
//!         custom_config: None,
//!     })
//!     .await?;
//! println!("{} is in {}", output.record.name, output.record.region);
//! # Ok(())
//! # }
//! ```

// Orchestration exports
pub mod names;
pub mod step_names;
pub mod types;
pub mod orchestrations;

// Infrastructure access
pub mod aws;
pub mod error;
pub mod stack;
pub mod store;

pub mod cluster;
pub mod describe;
pub mod reconciler;

#[cfg(test)]
mod testing;

// Re-export key types for convenience
pub use error::{EnvironmentError, StackError, StepError};
pub use types::*;
