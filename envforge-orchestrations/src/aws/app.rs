//! Application-level infrastructure: DNS delegation and the per-environment stack set

use anyhow::{bail, Context};
use async_trait::async_trait;
use aws_sdk_cloudformation::types::StackSetOperationStatus;
use aws_sdk_cloudformation::Client;
use envforge_models::Application;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::names::{parameters, stacks};
use crate::reconciler::{recompute, same_members, MembershipOp};
use crate::stack::{Parameter, StackGateway, StackSpec};

#[async_trait]
pub trait AppDeployer: Send + Sync {
    /// Allow `account_id` to manage records in the application's hosted zone.
    async fn delegate_dns_permissions(&self, app: &Application, account_id: &str) -> anyhow::Result<()>;

    /// Make (account, region) a deployment target of the application.
    async fn add_env_to_app(&self, app: &Application, account_id: &str, region: &str) -> anyhow::Result<()>;
}

pub struct CloudFormationAppDeployer {
    client: Client,
    gateway: Arc<dyn StackGateway>,
    poll_interval: Duration,
}

impl CloudFormationAppDeployer {
    pub fn new(client: Client, gateway: Arc<dyn StackGateway>, poll_interval: Duration) -> Self {
        Self {
            client,
            gateway,
            poll_interval,
        }
    }

    async fn wait_for_operation(&self, stack_set: &str, operation_id: &str) -> anyhow::Result<()> {
        loop {
            let output = self
                .client
                .describe_stack_set_operation()
                .stack_set_name(stack_set)
                .operation_id(operation_id)
                .send()
                .await
                .with_context(|| format!("describe operation {} of stack set {}", operation_id, stack_set))?;
            let status = output.stack_set_operation().and_then(|op| op.status());
            match status {
                Some(StackSetOperationStatus::Succeeded) => return Ok(()),
                Some(StackSetOperationStatus::Failed) | Some(StackSetOperationStatus::Stopped) => {
                    bail!(
                        "operation {} of stack set {} ended in {}",
                        operation_id,
                        stack_set,
                        status.map(|s| s.as_str()).unwrap_or_default()
                    )
                }
                _ => {
                    debug!("Stack set operation {} still running", operation_id);
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }
    }
}

/// Parameters for a roles-stack update that only changes the delegated accounts.
pub(crate) fn delegation_update(
    current: &std::collections::BTreeMap<String, String>,
    account_id: &str,
) -> Option<Vec<Parameter>> {
    let existing = current
        .get(parameters::APP_DNS_DELEGATED_ACCOUNTS)
        .map(String::as_str)
        .unwrap_or_default();
    let updated = recompute(existing, account_id, MembershipOp::Add);
    if same_members(existing, &updated) {
        return None;
    }
    let mut params: Vec<Parameter> = current
        .keys()
        .filter(|key| key.as_str() != parameters::APP_DNS_DELEGATED_ACCOUNTS)
        .map(Parameter::previous)
        .collect();
    params.push(Parameter::new(parameters::APP_DNS_DELEGATED_ACCOUNTS, updated));
    Some(params)
}

#[async_trait]
impl AppDeployer for CloudFormationAppDeployer {
    async fn delegate_dns_permissions(&self, app: &Application, account_id: &str) -> anyhow::Result<()> {
        let name = stacks::app_roles(&app.name);
        let stack = self.gateway.describe_stack(&name).await?;
        let Some(parameters) = delegation_update(&stack.parameters, account_id) else {
            info!("Account {} already has DNS permissions for {}", account_id, app.name);
            return Ok(());
        };
        info!("Granting account {} DNS permissions for {}", account_id, app.name);
        let spec = StackSpec {
            name,
            template_body: None,
            parameters,
            tags: Default::default(),
            role_arn: None,
            termination_protection: false,
            preserved_on_update: Vec::new(),
        };
        self.gateway.update_and_wait(&spec).await?;
        Ok(())
    }

    async fn add_env_to_app(&self, app: &Application, account_id: &str, region: &str) -> anyhow::Result<()> {
        let stack_set = stacks::app_stack_set(&app.name);
        let existing = self
            .client
            .list_stack_instances()
            .stack_set_name(&stack_set)
            .stack_instance_account(account_id)
            .stack_instance_region(region)
            .send()
            .await
            .with_context(|| format!("list stack instances of {}", stack_set))?;
        if !existing.summaries().is_empty() {
            info!("Stack set {} already targets {} in {}", stack_set, account_id, region);
            return Ok(());
        }

        let created = self
            .client
            .create_stack_instances()
            .stack_set_name(&stack_set)
            .accounts(account_id)
            .regions(region)
            .send()
            .await
            .with_context(|| format!("add {} in {} to stack set {}", account_id, region, stack_set))?;
        let Some(operation_id) = created.operation_id() else {
            return Ok(());
        };
        info!("Waiting for stack set {} operation {}", stack_set, operation_id);
        self.wait_for_operation(&stack_set, operation_id).await
    }
}
