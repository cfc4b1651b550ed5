//! IAM role deletion

use anyhow::anyhow;
use async_trait::async_trait;
use aws_sdk_iam::{Client, Error as IamError};
use tracing::{debug, info};

use super::role_name_from_arn;

#[async_trait]
pub trait RoleDeleter: Send + Sync {
    /// Delete the role and everything attached to it. A missing role is success.
    async fn delete_role(&self, role_arn: &str) -> anyhow::Result<()>;
}

pub struct IamRoleDeleter {
    client: Client,
}

impl IamRoleDeleter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn delete_inline_policies(&self, role: &str) -> Result<(), IamError> {
        let listed = self.client.list_role_policies().role_name(role).send().await?;
        for policy in listed.policy_names() {
            debug!("Deleting inline policy {} of role {}", policy, role);
            self.client
                .delete_role_policy()
                .role_name(role)
                .policy_name(policy)
                .send()
                .await?;
        }
        Ok(())
    }

    async fn detach_managed_policies(&self, role: &str) -> Result<(), IamError> {
        let listed = self.client.list_attached_role_policies().role_name(role).send().await?;
        for policy_arn in listed.attached_policies().iter().filter_map(|p| p.policy_arn()) {
            debug!("Detaching policy {} from role {}", policy_arn, role);
            self.client
                .detach_role_policy()
                .role_name(role)
                .policy_arn(policy_arn)
                .send()
                .await?;
        }
        Ok(())
    }

    async fn delete_role_by_name(&self, role: &str) -> Result<(), IamError> {
        self.delete_inline_policies(role).await?;
        self.detach_managed_policies(role).await?;
        self.client.delete_role().role_name(role).send().await?;
        Ok(())
    }
}

#[async_trait]
impl RoleDeleter for IamRoleDeleter {
    async fn delete_role(&self, role_arn: &str) -> anyhow::Result<()> {
        let role = role_name_from_arn(role_arn).ok_or_else(|| anyhow!("parse role name from ARN {}", role_arn))?;
        match self.delete_role_by_name(role).await {
            Ok(()) => {
                info!("Deleted role {}", role);
                Ok(())
            }
            Err(IamError::NoSuchEntityException(_)) => {
                info!("Role {} is already gone", role);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
