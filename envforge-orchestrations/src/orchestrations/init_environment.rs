//! Init environment orchestration
//!
//! Persistence runs last so a run that stops early never leaves a record
//! for an environment that was not fully provisioned.

use anyhow::{anyhow, Context};
use envforge_models::{Application, EnvironmentRecord, ResourceEvent};
use std::sync::Arc;
use tracing::info;

use super::progress::{Milestone, ProgressSink, ProgressTracker};
use super::steps::{run_steps, Step, StepFuture};
use super::EnvironmentServices;
use crate::error::{EnvironmentError, StepError};
use crate::names::{orchestrations, outputs};
use crate::stack::{EnvironmentStack, StackConfiguration, StackSpec};
use crate::step_names::init as step;
use crate::types::{InitEnvironmentInput, InitEnvironmentOutput};

pub struct InitEnvironment {
    services: EnvironmentServices,
    progress: Arc<dyn ProgressSink>,
}

struct InitContext {
    services: EnvironmentServices,
    progress: Arc<dyn ProgressSink>,
    input: InitEnvironmentInput,
    application: Option<Application>,
    env_account: Option<String>,
    record: Option<EnvironmentRecord>,
    stack_created: bool,
}

impl InitContext {
    fn application(&self) -> anyhow::Result<&Application> {
        self.application.as_ref().ok_or_else(|| anyhow!("application not loaded"))
    }

    fn record(&self) -> anyhow::Result<&EnvironmentRecord> {
        self.record.as_ref().ok_or_else(|| anyhow!("environment not described"))
    }
}

impl InitEnvironment {
    pub fn new(services: EnvironmentServices, progress: Arc<dyn ProgressSink>) -> Self {
        Self { services, progress }
    }

    fn steps() -> Vec<Step<InitContext>> {
        vec![
            Step::new(step::VALIDATE_INPUT, validate_input),
            Step::new(step::LOAD_APPLICATION, load_application),
            Step::new(step::DELEGATE_DNS, delegate_dns),
            Step::new(step::DEPLOY_ENVIRONMENT_STACK, deploy_environment_stack),
            Step::new(step::DESCRIBE_ENVIRONMENT, describe_environment),
            Step::new(step::ADD_ENVIRONMENT_TO_APP, add_environment_to_app),
            Step::new(step::STORE_ENVIRONMENT, store_environment),
        ]
    }

    pub async fn run(&self, input: InitEnvironmentInput) -> Result<InitEnvironmentOutput, StepError> {
        info!("Initializing environment {} in application {}", input.name, input.app);
        let mut ctx = InitContext {
            services: self.services.clone(),
            progress: self.progress.clone(),
            input,
            application: None,
            env_account: None,
            record: None,
            stack_created: false,
        };
        run_steps(orchestrations::INIT_ENVIRONMENT, &Self::steps(), &mut ctx).await?;

        let record = ctx.record.ok_or_else(|| StepError {
            orchestration: orchestrations::INIT_ENVIRONMENT,
            step: step::STORE_ENVIRONMENT,
            source: anyhow!("no environment record was produced"),
        })?;
        info!("Environment {} is ready", record.name);
        Ok(InitEnvironmentOutput {
            record,
            stack_created: ctx.stack_created,
        })
    }
}

fn validate_input(ctx: &mut InitContext) -> StepFuture<'_> {
    Box::pin(async move {
        ctx.input.validate()?;
        Ok(())
    })
}

fn load_application(ctx: &mut InitContext) -> StepFuture<'_> {
    Box::pin(async move {
        let app = ctx
            .services
            .store
            .get_application(&ctx.input.app)
            .await
            .with_context(|| format!("get application {}", ctx.input.app))?
            .ok_or_else(|| EnvironmentError::ApplicationNotFound(ctx.input.app.clone()))?;
        ctx.application = Some(app);
        Ok(())
    })
}

fn delegate_dns(ctx: &mut InitContext) -> StepFuture<'_> {
    Box::pin(async move {
        let identity = ctx.services.identity.caller_identity().await?;
        let app = ctx.application()?;
        if !app.requires_dns_delegation() {
            info!("Application {} has no domain, skipping DNS delegation", app.name);
        } else if identity.account == app.account_id {
            info!("Environment shares the application account, skipping DNS delegation");
        } else {
            ctx.services
                .app_deployer
                .delegate_dns_permissions(app, &identity.account)
                .await
                .with_context(|| format!("grant DNS permissions to account {}", identity.account))?;
        }
        ctx.env_account = Some(identity.account);
        Ok(())
    })
}

fn deploy_environment_stack(ctx: &mut InitContext) -> StepFuture<'_> {
    Box::pin(async move {
        let tools_account = ctx
            .services
            .app_identity
            .caller_identity()
            .await
            .context("get identity of the application account")?;
        let config = EnvironmentStack::new(
            ctx.application()?.clone(),
            ctx.input.name.clone(),
            ctx.input.custom_config.clone(),
            tools_account.root_user_arn,
        );
        let spec = StackSpec::from_config(&config)?;
        let (public_subnets, private_subnets) = config.subnet_counts();
        let mut tracker = ProgressTracker::new(Milestone::for_environment(config.imports_vpc()))
            .expect(Milestone::InternetGateway, 2)
            .expect(Milestone::PublicSubnets, public_subnets)
            .expect(Milestone::PrivateSubnets, private_subnets);
        let progress = ctx.progress.clone();
        let mut on_event = |event: &ResourceEvent| {
            if let Some(update) = tracker.observe(event) {
                progress.report(&update);
            }
        };

        match ctx.services.deployer.create_and_stream(&spec, &mut on_event).await {
            Ok(()) => {
                ctx.stack_created = true;
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                info!("Environment stack {} already exists", config.stack_name());
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("deploy environment {}", ctx.input.name)),
        }
    })
}

fn describe_environment(ctx: &mut InitContext) -> StepFuture<'_> {
    Box::pin(async move {
        let name = crate::names::stacks::environment(&ctx.input.app, &ctx.input.name);
        let stack = ctx
            .services
            .gateway
            .describe_stack(&name)
            .await
            .with_context(|| format!("describe environment {}", ctx.input.name))?;

        let (region, account) = stack
            .region_and_account()
            .ok_or_else(|| anyhow!("parse account and region from stack ID {}", stack.id))?;
        let output = |key: &str| {
            stack
                .outputs
                .get(key)
                .cloned()
                .ok_or_else(|| anyhow!("environment stack {} has no output {}", name, key))
        };
        let record = EnvironmentRecord {
            app: ctx.input.app.clone(),
            name: ctx.input.name.clone(),
            account_id: account.to_string(),
            region: region.to_string(),
            manager_role_arn: output(outputs::ENVIRONMENT_MANAGER_ROLE_ARN)?,
            execution_role_arn: output(outputs::CFN_EXECUTION_ROLE_ARN)?,
            prod: ctx.input.prod,
            custom_config: ctx.input.custom_config.clone(),
        };
        if let Some(expected) = &ctx.env_account {
            if expected != &record.account_id {
                info!("Environment stack lives in account {}, caller is {}", record.account_id, expected);
            }
        }
        ctx.record = Some(record);
        Ok(())
    })
}

fn add_environment_to_app(ctx: &mut InitContext) -> StepFuture<'_> {
    Box::pin(async move {
        let app = ctx.application()?;
        let record = ctx.record()?;
        ctx.services
            .app_deployer
            .add_env_to_app(app, &record.account_id, &record.region)
            .await
            .with_context(|| format!("add environment {} to application {}", record.name, app.name))?;
        Ok(())
    })
}

fn store_environment(ctx: &mut InitContext) -> StepFuture<'_> {
    Box::pin(async move {
        let record = ctx.record()?;
        ctx.services
            .store
            .create_environment(record)
            .await
            .with_context(|| format!("store environment {}", record.name))?;
        Ok(())
    })
}
