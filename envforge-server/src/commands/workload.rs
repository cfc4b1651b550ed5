use anyhow::{Context, Result};

use envforge_orchestrations::names::stacks;
use envforge_orchestrations::orchestrations::EnvironmentAccess;
use envforge_orchestrations::stack::{StackDeployer, WorkloadStack};
use envforge_orchestrations::store::ConfigStore;

use super::{aws_session, environment_access, stack_gateway, AwsOptions};
use crate::cli::SvcCommand;
use crate::config::Config;
use crate::db;

pub async fn handle_command(command: SvcCommand, aws: &AwsOptions, config: &Config) -> Result<()> {
    let store = db::connect_store(config.database_url()?).await?;
    let access = environment_access(config).await;

    match command {
        SvcCommand::Deploy {
            app,
            env,
            name,
            template,
            params,
        } => {
            let record = store
                .get_environment(&app, &env)
                .await?
                .with_context(|| format!("couldn't find environment {} in the application {}", env, app))?;
            let template_body = std::fs::read_to_string(&template)
                .with_context(|| format!("Failed to read template {}", template.display()))?;
            let workload = WorkloadStack {
                app,
                env,
                name,
                template_body,
                parameters: WorkloadStack::parse_parameters(&params)?,
                role_arn: Some(record.execution_role_arn.clone()),
            };
            let deployer = access.clients_for(&record).await?.deployer;

            println!("Deploying workload {} to environment {}", workload.name, workload.env);
            deployer.deploy_and_wait(&workload).await?;
            println!("✓ Deployed workload {}", workload.name);
        }
        SvcCommand::Delete { app, env, name } => {
            let record = store.get_environment(&app, &env).await?;
            let stack = stacks::workload(&app, &env, &name);
            // Without a record the stack can only be reached through the CLI session.
            let (deployer, role) = match &record {
                Some(record) => (
                    access.clients_for(record).await?.deployer,
                    Some(record.execution_role_arn.clone()),
                ),
                None => {
                    let session = aws_session(aws).await;
                    let gateway = stack_gateway(&session, config);
                    (StackDeployer::new(gateway, config.stack_poll_interval), None)
                }
            };

            println!("Deleting workload stack {}", stack);
            deployer
                .delete_and_wait(&stack, role.as_deref())
                .await
                .with_context(|| format!("delete workload {}", name))?;
            println!("✓ Deleted workload {}", name);
        }
    }
    Ok(())
}
