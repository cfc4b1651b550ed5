//! Caller identity

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use aws_sdk_sts::Client;

use super::SdkField;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub account: String,
    pub arn: String,
    /// `arn:<partition>:iam::<account>:root`
    pub root_user_arn: String,
}

impl CallerIdentity {
    pub fn new(account: impl Into<String>, arn: impl Into<String>) -> Self {
        let account = account.into();
        let arn = arn.into();
        let partition = arn.split(':').nth(1).filter(|p| !p.is_empty()).unwrap_or("aws");
        let root_user_arn = format!("arn:{}:iam::{}:root", partition, account);
        Self {
            account,
            arn,
            root_user_arn,
        }
    }
}

#[async_trait]
pub trait IdentityService: Send + Sync {
    async fn caller_identity(&self) -> anyhow::Result<CallerIdentity>;
}

pub struct StsIdentity {
    client: Client,
}

impl StsIdentity {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IdentityService for StsIdentity {
    async fn caller_identity(&self) -> anyhow::Result<CallerIdentity> {
        let output = self
            .client
            .get_caller_identity()
            .send()
            .await
            .context("get caller identity")?;
        let account = output.account().field().ok_or_else(|| anyhow!("caller identity has no account"))?;
        let arn = output.arn().field().ok_or_else(|| anyhow!("caller identity has no ARN"))?;
        Ok(CallerIdentity::new(account, arn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_user_arn_keeps_partition() {
        let identity = CallerIdentity::new("1234", "arn:aws-cn:iam::1234:user/bob");
        assert_eq!(identity.root_user_arn, "arn:aws-cn:iam::1234:root");
    }
}
