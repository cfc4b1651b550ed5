//! Reaching an existing environment through its manager role

use async_trait::async_trait;
use aws_config::sts::AssumeRoleProvider;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use envforge_models::EnvironmentRecord;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::{AwsSession, IamRoleDeleter, TaggingResourceGetter};
use crate::orchestrations::{EnvironmentAccess, EnvironmentClients};
use crate::stack::{CloudFormationGateway, StackDeployer, WaitConfig};

const SESSION_NAME: &str = "envforge";

/// Assumes `record.manager_role_arn` in `record.region`, starting from `base` credentials
pub struct ManagerRoleAccess {
    base: SdkConfig,
    wait: WaitConfig,
    event_poll_interval: Duration,
}

impl ManagerRoleAccess {
    pub fn new(base: SdkConfig, wait: WaitConfig, event_poll_interval: Duration) -> Self {
        Self {
            base,
            wait,
            event_poll_interval,
        }
    }

    async fn session(&self, record: &EnvironmentRecord) -> AwsSession {
        let region = Region::new(record.region.clone());
        let provider = AssumeRoleProvider::builder(record.manager_role_arn.clone())
            .session_name(SESSION_NAME)
            .configure(&self.base)
            .region(region.clone())
            .build()
            .await;
        let config = aws_config::defaults(BehaviorVersion::latest())
            .credentials_provider(provider)
            .region(region)
            .load()
            .await;
        AwsSession::new(&config)
    }
}

#[async_trait]
impl EnvironmentAccess for ManagerRoleAccess {
    async fn clients_for(&self, record: &EnvironmentRecord) -> anyhow::Result<EnvironmentClients> {
        debug!(
            "Assuming {} in {} for environment {}",
            record.manager_role_arn, record.region, record.name
        );
        let session = self.session(record).await;
        let gateway = Arc::new(CloudFormationGateway::new(session.cloudformation.clone(), self.wait));
        Ok(EnvironmentClients {
            deployer: StackDeployer::new(gateway.clone(), self.event_poll_interval),
            gateway,
            roles: Arc::new(IamRoleDeleter::new(session.iam.clone())),
            resources: Arc::new(TaggingResourceGetter::new(session.tagging.clone())),
        })
    }
}
