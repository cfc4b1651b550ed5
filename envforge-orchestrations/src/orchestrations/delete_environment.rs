//! Delete environment orchestration
//!
//! The order matters: the stack is deleted with the execution role, the
//! execution role is deleted while the manager role still exists, and the
//! record goes last so an interrupted run can simply be started again.

use anyhow::{anyhow, bail, Context};
use envforge_models::EnvironmentRecord;
use tracing::info;

use super::steps::{run_steps, Step, StepFuture};
use super::{EnvironmentClients, EnvironmentServices};
use crate::aws::deployed_services;
use crate::error::{EnvironmentError, StepError};
use crate::names::{orchestrations, stacks};
use crate::stack::{Parameter, StackSpec};
use crate::step_names::delete as step;
use crate::types::{DeleteEnvironmentInput, DeleteEnvironmentOutput};

const EXECUTION_ROLE_RESOURCE: &str = "  CloudformationExecutionRole:\n";
const MANAGER_ROLE_RESOURCE: &str = "  EnvironmentManagerRole:\n";
const RETAIN_POLICY: &str = "    DeletionPolicy: Retain\n";

/// Insert `DeletionPolicy: Retain` for each environment role missing it.
///
/// Returns None when both roles already carry the policy. A template where a
/// role has neither the policy nor a recognizable header is an error, since
/// deleting the stack would then take the role with it.
pub fn add_retain_policies(template: &str) -> anyhow::Result<Option<String>> {
    let crlf = template.contains("\r\n");
    let mut body = if crlf {
        template.replace("\r\n", "\n")
    } else {
        template.to_string()
    };
    let mut changed = false;
    for resource in [EXECUTION_ROLE_RESOURCE, MANAGER_ROLE_RESOURCE] {
        let retained = format!("\n{}{}", resource, RETAIN_POLICY.trim_end_matches('\n'));
        if body.contains(&retained) {
            continue;
        }
        if !body.contains(resource) {
            bail!(
                "environment template has no {} resource to retain",
                resource.trim().trim_end_matches(':')
            );
        }
        body = body.replacen(resource, &format!("{}{}", resource, RETAIN_POLICY), 1);
        changed = true;
    }
    if !changed {
        return Ok(None);
    }
    Ok(Some(if crlf { body.replace('\n', "\r\n") } else { body }))
}

pub struct DeleteEnvironment {
    services: EnvironmentServices,
}

struct DeleteContext {
    services: EnvironmentServices,
    input: DeleteEnvironmentInput,
    record: Option<EnvironmentRecord>,
    clients: Option<EnvironmentClients>,
    retain_policy_added: bool,
}

impl DeleteContext {
    fn record(&self) -> anyhow::Result<&EnvironmentRecord> {
        self.record.as_ref().ok_or_else(|| anyhow!("environment not loaded"))
    }

    fn clients(&self) -> anyhow::Result<&EnvironmentClients> {
        self.clients.as_ref().ok_or_else(|| anyhow!("environment not loaded"))
    }

    fn stack_name(&self) -> String {
        stacks::environment(&self.input.app, &self.input.name)
    }
}

impl DeleteEnvironment {
    pub fn new(services: EnvironmentServices) -> Self {
        Self { services }
    }

    fn steps() -> Vec<Step<DeleteContext>> {
        vec![
            Step::new(step::LOAD_ENVIRONMENT, load_environment),
            Step::new(step::CHECK_NO_DEPLOYED_WORKLOADS, check_no_deployed_workloads),
            Step::new(step::RETAIN_ENVIRONMENT_ROLES, retain_environment_roles),
            Step::new(step::DELETE_ENVIRONMENT_STACK, delete_environment_stack),
            Step::new(step::DELETE_ENVIRONMENT_ROLES, delete_environment_roles),
            Step::new(step::REMOVE_ENVIRONMENT_RECORD, remove_environment_record),
        ]
    }

    pub async fn run(&self, input: DeleteEnvironmentInput) -> Result<DeleteEnvironmentOutput, StepError> {
        info!("Deleting environment {} from application {}", input.name, input.app);
        let mut ctx = DeleteContext {
            services: self.services.clone(),
            input,
            record: None,
            clients: None,
            retain_policy_added: false,
        };
        run_steps(orchestrations::DELETE_ENVIRONMENT, &Self::steps(), &mut ctx).await?;

        info!("Deleted environment {}", ctx.input.name);
        Ok(DeleteEnvironmentOutput {
            app: ctx.input.app,
            name: ctx.input.name,
            retain_policy_added: ctx.retain_policy_added,
        })
    }
}

fn load_environment(ctx: &mut DeleteContext) -> StepFuture<'_> {
    Box::pin(async move {
        let DeleteEnvironmentInput { app, name } = &ctx.input;
        let record = ctx
            .services
            .store
            .get_environment(app, name)
            .await
            .with_context(|| format!("get environment {}", name))?
            .ok_or_else(|| EnvironmentError::EnvironmentNotFound {
                app: app.clone(),
                env: name.clone(),
            })?;
        let clients = ctx
            .services
            .access
            .clients_for(&record)
            .await
            .with_context(|| {
                format!(
                    "reach environment {} as {} in {}",
                    record.name, record.manager_role_arn, record.region
                )
            })?;
        ctx.record = Some(record);
        ctx.clients = Some(clients);
        Ok(())
    })
}

fn check_no_deployed_workloads(ctx: &mut DeleteContext) -> StepFuture<'_> {
    Box::pin(async move {
        let resources = ctx.clients()?.resources.as_ref();
        let services = deployed_services(resources, &ctx.input.app, &ctx.input.name).await?;
        if !services.is_empty() {
            return Err(EnvironmentError::WorkloadsStillDeployed {
                env: ctx.input.name.clone(),
                services,
            }
            .into());
        }
        Ok(())
    })
}

fn retain_environment_roles(ctx: &mut DeleteContext) -> StepFuture<'_> {
    Box::pin(async move {
        let name = ctx.stack_name();
        let gateway = &ctx.clients()?.gateway;
        let body = match gateway.template_body(&name).await {
            Ok(body) => body,
            Err(e) if e.is_not_found() => {
                info!("Environment stack {} is already gone", name);
                return Ok(());
            }
            Err(e) => return Err(e).with_context(|| format!("get template of environment stack {}", name)),
        };
        let Some(updated) = add_retain_policies(&body)
            .with_context(|| format!("add retain policies to environment stack {}", name))?
        else {
            return Ok(());
        };

        info!("Adding retain policies to the roles of environment stack {}", name);
        let stack = gateway
            .describe_stack(&name)
            .await
            .with_context(|| format!("describe environment stack {}", name))?;
        let spec = StackSpec {
            name: name.clone(),
            template_body: Some(updated),
            parameters: stack.parameters.keys().map(Parameter::previous).collect(),
            tags: stack.tags.clone(),
            role_arn: Some(ctx.record()?.execution_role_arn.clone()),
            termination_protection: false,
            preserved_on_update: Vec::new(),
        };
        gateway
            .update_and_wait(&spec)
            .await
            .context("update environment stack to retain environment roles")?;
        ctx.retain_policy_added = true;
        Ok(())
    })
}

fn delete_environment_stack(ctx: &mut DeleteContext) -> StepFuture<'_> {
    Box::pin(async move {
        let record = ctx.record()?;
        ctx.clients()?
            .deployer
            .delete_and_wait(&ctx.stack_name(), Some(&record.execution_role_arn))
            .await
            .with_context(|| format!("delete environment {} stack", record.name))?;
        Ok(())
    })
}

fn delete_environment_roles(ctx: &mut DeleteContext) -> StepFuture<'_> {
    Box::pin(async move {
        let record = ctx.record()?;
        let roles = &ctx.clients()?.roles;
        for arn in [&record.execution_role_arn, &record.manager_role_arn] {
            roles
                .delete_role(arn)
                .await
                .with_context(|| format!("delete role {}", arn))?;
        }
        Ok(())
    })
}

fn remove_environment_record(ctx: &mut DeleteContext) -> StepFuture<'_> {
    Box::pin(async move {
        ctx.services
            .store
            .delete_environment(&ctx.input.app, &ctx.input.name)
            .await
            .with_context(|| format!("remove environment {} record", ctx.input.name))?;
        Ok(())
    })
}
