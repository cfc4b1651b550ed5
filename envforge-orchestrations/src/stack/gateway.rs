//! Typed contract over the declarative-infrastructure control plane

use async_trait::async_trait;
use envforge_models::{ResourceEvent, StackStatus};
use std::time::Duration;

use super::{Parameter, StackDescription, StackSpec};
use crate::error::StackError;

/// Polling cadence and upper bound for waits on the control plane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
            timeout: Duration::from_secs(3600),
        }
    }
}

/// Every call that mutates a stack waits for a terminal status unless noted.
#[async_trait]
pub trait StackGateway: Send + Sync {
    /// Fails with [`StackError::AlreadyExists`] when the stack is present.
    async fn create_and_wait(&self, spec: &StackSpec) -> Result<(), StackError>;

    /// "No updates are to be performed" counts as success.
    async fn update_and_wait(&self, spec: &StackSpec) -> Result<(), StackError>;

    /// A missing stack counts as deleted.
    async fn delete_and_wait(&self, name: &str, role_arn: Option<&str>) -> Result<(), StackError>;

    async fn describe_stack(&self, name: &str) -> Result<StackDescription, StackError>;

    /// Most recent events first.
    async fn list_stack_events(&self, name: &str) -> Result<Vec<ResourceEvent>, StackError>;

    async fn template_body(&self, name: &str) -> Result<String, StackError>;

    /// Issue a parameter-only update against the current template without waiting.
    ///
    /// Fails with [`StackError::UpdateInProgress`] when another update holds the stack.
    async fn update_parameters(
        &self,
        name: &str,
        parameters: &[Parameter],
        role_arn: Option<&str>,
    ) -> Result<(), StackError>;

    /// Poll until the stack leaves every `*_IN_PROGRESS` status.
    async fn wait_until_stable(&self, name: &str) -> Result<StackStatus, StackError>;
}
