use anyhow::Result;
use std::sync::Arc;

use envforge_models::{AdjustVpc, CustomizeEnv, ImportVpc};
use envforge_orchestrations::describe::EnvDescriber;
use envforge_orchestrations::orchestrations::{
    DeleteEnvironment, InitEnvironment, MilestoneState, MilestoneUpdate, ProgressSink,
};
use envforge_orchestrations::types::{DeleteEnvironmentInput, InitEnvironmentInput};

use super::{environment_access, environment_services, AwsOptions};
use crate::cli::{EnvCommand, InitArgs};
use crate::config::Config;
use crate::db;

/// Prints milestone transitions as the environment stack comes up
struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn report(&self, update: &MilestoneUpdate) {
        match &update.state {
            MilestoneState::InProgress => println!("  ... {}", update.milestone),
            MilestoneState::Complete => println!("  ✓ {}", update.milestone),
            MilestoneState::Failed(reason) => println!("  ✗ {}: {}", update.milestone, reason),
        }
    }
}

pub async fn handle_command(command: EnvCommand, aws: &AwsOptions, config: &Config) -> Result<()> {
    match command {
        EnvCommand::Init(args) => run_init(args, aws, config).await,
        EnvCommand::Delete { app, name } => run_delete(app, name, aws, config).await,
        EnvCommand::Show { app, name, output } => run_show(app, name, output, config).await,
        EnvCommand::Ls { app, output } => run_list(app, output, config).await,
    }
}

fn custom_config(args: &InitArgs) -> Option<CustomizeEnv> {
    if args.default_config {
        return None;
    }
    let import_vpc = args.import_vpc_id.as_ref().map(|id| ImportVpc {
        id: id.clone(),
        public_subnet_ids: args.import_public_subnets.clone(),
        private_subnet_ids: args.import_private_subnets.clone(),
    });
    let overridden = args.override_vpc_cidr.is_some()
        || !args.override_public_cidrs.is_empty()
        || !args.override_private_cidrs.is_empty();
    let adjust_vpc = overridden.then(|| AdjustVpc {
        cidr: args.override_vpc_cidr.clone().unwrap_or_default(),
        public_subnet_cidrs: args.override_public_cidrs.clone(),
        private_subnet_cidrs: args.override_private_cidrs.clone(),
    });
    let config = CustomizeEnv { import_vpc, adjust_vpc };
    (!config.is_empty()).then_some(config)
}

async fn run_init(args: InitArgs, aws: &AwsOptions, config: &Config) -> Result<()> {
    let input = InitEnvironmentInput {
        app: args.app.clone(),
        name: args.name.clone(),
        prod: args.prod,
        custom_config: custom_config(&args),
    };
    input.validate()?;

    let services = environment_services(aws, config).await?;
    println!("Creating environment {} in application {}", input.name, input.app);

    let output = InitEnvironment::new(services, Arc::new(ConsoleProgress)).run(input).await?;

    if !output.stack_created {
        println!("Environment stack already existed, reusing it");
    }
    println!("✓ Environment {} is ready", output.record.name);
    println!("  Account: {}", output.record.account_id);
    println!("  Region:  {}", output.record.region);
    Ok(())
}

async fn run_delete(app: String, name: String, aws: &AwsOptions, config: &Config) -> Result<()> {
    let services = environment_services(aws, config).await?;
    println!("Deleting environment {} from application {}", name, app);

    let output = DeleteEnvironment::new(services)
        .run(DeleteEnvironmentInput { app, name })
        .await?;

    if output.retain_policy_added {
        println!("  Added retain policies to the environment roles before deleting the stack");
    }
    println!("✓ Deleted environment {}", output.name);
    Ok(())
}

async fn run_show(app: String, name: String, output: String, config: &Config) -> Result<()> {
    let store = db::connect_store(config.database_url()?).await?;
    let describer = EnvDescriber::new(Arc::new(store), environment_access(config).await);
    let description = describer.describe(&app, &name).await?;

    if output == "json" {
        println!("{}", serde_json::to_string_pretty(&description)?);
        return Ok(());
    }

    let record = &description.record;
    println!("Environment: {}", record.name);
    println!("{}", "=".repeat(60));
    println!();
    println!("  Application:        {}", record.app);
    println!("  Production:         {}", record.prod);
    println!("  Account:            {}", record.account_id);
    println!("  Region:             {}", record.region);
    println!("  Template Version:   {}", description.template_version);
    println!("  Cluster:            {}", description.cluster_arn);
    println!();
    println!("Roles:");
    println!("  Manager:            {}", record.manager_role_arn);
    println!("  Execution:          {}", record.execution_role_arn);
    println!();
    println!("Services:");
    if description.services.is_empty() {
        println!("  (none deployed)");
    }
    for service in &description.services {
        println!("  {}", service);
    }
    if !description.tags.is_empty() {
        println!();
        println!("Tags:");
        for (key, value) in &description.tags {
            println!("  {:<22}{}", key, value);
        }
    }
    Ok(())
}

async fn run_list(app: String, output: String, config: &Config) -> Result<()> {
    use envforge_orchestrations::store::ConfigStore;

    let store = db::connect_store(config.database_url()?).await?;
    let environments = store.list_environments(&app).await?;

    if output == "json" {
        println!("{}", serde_json::to_string_pretty(&environments)?);
        return Ok(());
    }

    println!("{:<20} {:<15} {:<15} {:<6}", "NAME", "ACCOUNT", "REGION", "PROD");
    println!("{}", "-".repeat(60));
    for env in &environments {
        println!("{:<20} {:<15} {:<15} {:<6}", env.name, env.account_id, env.region, env.prod);
    }
    println!();
    println!("{} environment(s) found", environments.len());
    Ok(())
}
