pub mod app;
pub mod controller;
pub mod environment;
pub mod workload;

use anyhow::Result;
use aws_config::SdkConfig;
use std::sync::Arc;

use envforge_orchestrations::aws::{
    load_sdk_config, AwsSession, CloudFormationAppDeployer, ManagerRoleAccess, StsIdentity,
};
use envforge_orchestrations::orchestrations::{EnvironmentAccess, EnvironmentServices};
use envforge_orchestrations::stack::{CloudFormationGateway, StackDeployer, StackGateway};

use crate::config::Config;
use crate::db;

/// Global AWS flags shared by every command
///
/// They select where a new environment is created. Application-level
/// resources always go through the default credential chain, and existing
/// environments are reached through their manager role.
#[derive(Debug, Clone, Default)]
pub struct AwsOptions {
    pub profile: Option<String>,
    pub region: Option<String>,
}

pub async fn sdk_config(aws: &AwsOptions) -> SdkConfig {
    load_sdk_config(aws.profile.as_deref(), aws.region.as_deref()).await
}

pub async fn aws_session(aws: &AwsOptions) -> AwsSession {
    AwsSession::new(&sdk_config(aws).await)
}

pub fn stack_gateway(session: &AwsSession, config: &Config) -> Arc<dyn StackGateway> {
    Arc::new(CloudFormationGateway::new(
        session.cloudformation.clone(),
        config.wait_config(),
    ))
}

/// Manager-role access to existing environments, assumed from the default credentials.
pub async fn environment_access(config: &Config) -> Arc<dyn EnvironmentAccess> {
    let base = sdk_config(&AwsOptions::default()).await;
    Arc::new(ManagerRoleAccess::new(
        base,
        config.wait_config(),
        config.stack_poll_interval,
    ))
}

/// Wire every collaborator the environment orchestrations need.
pub async fn environment_services(aws: &AwsOptions, config: &Config) -> Result<EnvironmentServices> {
    let env_session = aws_session(aws).await;
    let app_session = aws_session(&AwsOptions::default()).await;
    let store = db::connect_store(config.database_url()?).await?;
    let gateway = stack_gateway(&env_session, config);

    Ok(EnvironmentServices {
        deployer: StackDeployer::new(gateway.clone(), config.stack_poll_interval),
        app_deployer: Arc::new(CloudFormationAppDeployer::new(
            app_session.cloudformation.clone(),
            stack_gateway(&app_session, config),
            config.stack_poll_interval,
        )),
        gateway,
        store: Arc::new(store),
        identity: Arc::new(StsIdentity::new(env_session.sts.clone())),
        app_identity: Arc::new(StsIdentity::new(app_session.sts.clone())),
        access: environment_access(config).await,
    })
}
