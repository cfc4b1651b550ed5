//! Stack specifications, the control-plane gateway, and the deployer built on it

pub mod cloudformation;
pub mod deployer;
pub mod environment;
pub mod gateway;
pub mod workload;

use envforge_models::StackStatus;
use std::collections::BTreeMap;

pub use cloudformation::CloudFormationGateway;
pub use deployer::StackDeployer;
pub use environment::EnvironmentStack;
pub use gateway::{StackGateway, WaitConfig};
pub use workload::WorkloadStack;

/// A single stack parameter
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub key: String,
    pub value: String,
    /// Keep the value the stack already has; `value` is ignored
    pub use_previous: bool,
}

impl Parameter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            use_previous: false,
        }
    }

    pub fn previous(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: String::new(),
            use_previous: true,
        }
    }
}

/// Everything submitted to the control plane for one create or update
#[derive(Debug, Clone, PartialEq)]
pub struct StackSpec {
    pub name: String,
    /// None reuses the stack's current template
    pub template_body: Option<String>,
    pub parameters: Vec<Parameter>,
    pub tags: BTreeMap<String, String>,
    /// Role the control plane assumes while acting on the stack
    pub role_arn: Option<String>,
    pub termination_protection: bool,
    /// Parameters whose live value survives an update
    pub preserved_on_update: Vec<String>,
}

impl StackSpec {
    pub fn from_config(config: &dyn StackConfiguration) -> anyhow::Result<Self> {
        Ok(Self {
            name: config.stack_name(),
            template_body: Some(config.template()?),
            parameters: config.parameters(),
            tags: config.tags(),
            role_arn: config.role_arn(),
            termination_protection: config.termination_protection(),
            preserved_on_update: config.preserved_on_update().iter().map(|p| p.to_string()).collect(),
        })
    }

    /// Same spec with the preserved parameters switched to their previous values.
    pub fn for_update(&self) -> Self {
        let parameters = self
            .parameters
            .iter()
            .map(|p| {
                if self.preserved_on_update.contains(&p.key) {
                    Parameter::previous(&p.key)
                } else {
                    p.clone()
                }
            })
            .collect();
        Self {
            parameters,
            ..self.clone()
        }
    }
}

/// Snapshot of a stack returned by describe
#[derive(Debug, Clone, PartialEq)]
pub struct StackDescription {
    pub name: String,
    /// Stack ARN
    pub id: String,
    pub status: StackStatus,
    pub parameters: BTreeMap<String, String>,
    pub outputs: BTreeMap<String, String>,
    pub tags: BTreeMap<String, String>,
}

impl StackDescription {
    /// Region and account parsed from the stack ARN.
    pub fn region_and_account(&self) -> Option<(&str, &str)> {
        let mut parts = self.id.split(':');
        let region = parts.nth(3)?;
        let account = parts.next()?;
        if region.is_empty() || account.is_empty() {
            return None;
        }
        Some((region, account))
    }
}

/// A kind of stack the deployer knows how to submit
pub trait StackConfiguration: Send + Sync {
    fn stack_name(&self) -> String;

    fn template(&self) -> anyhow::Result<String>;

    fn parameters(&self) -> Vec<Parameter>;

    fn tags(&self) -> BTreeMap<String, String>;

    fn role_arn(&self) -> Option<String> {
        None
    }

    fn termination_protection(&self) -> bool {
        false
    }

    fn preserved_on_update(&self) -> &[&'static str] {
        &[]
    }
}
