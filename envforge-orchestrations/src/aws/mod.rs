//! AWS session construction and the service collaborators built on it

pub mod access;
pub mod app;
pub mod iam;
pub mod identity;
pub mod tagging;

use aws_config::{BehaviorVersion, Region, SdkConfig};

pub use access::ManagerRoleAccess;
pub use app::{AppDeployer, CloudFormationAppDeployer};
pub use iam::{IamRoleDeleter, RoleDeleter};
pub use identity::{CallerIdentity, IdentityService, StsIdentity};
pub use tagging::{deployed_services, ResourceGetter, TaggedResource, TaggingResourceGetter};

/// Load SDK configuration from the default provider chain.
pub async fn load_sdk_config(profile: Option<&str>, region: Option<&str>) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest());
    if let Some(profile) = profile {
        loader = loader.profile_name(profile);
    }
    if let Some(region) = region {
        loader = loader.region(Region::new(region.to_string()));
    }
    loader.load().await
}

/// Service clients sharing one SDK configuration
#[derive(Clone)]
pub struct AwsSession {
    pub cloudformation: aws_sdk_cloudformation::Client,
    pub iam: aws_sdk_iam::Client,
    pub tagging: aws_sdk_resourcegroupstagging::Client,
    pub sts: aws_sdk_sts::Client,
}

impl AwsSession {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            cloudformation: aws_sdk_cloudformation::Client::new(config),
            iam: aws_sdk_iam::Client::new(config),
            tagging: aws_sdk_resourcegroupstagging::Client::new(config),
            sts: aws_sdk_sts::Client::new(config),
        }
    }
}

/// Reads SDK getters uniformly whether the model marks the member required or not.
pub(crate) trait SdkField<'a, T: ?Sized> {
    fn field(self) -> Option<&'a T>;
}

impl<'a, T: ?Sized> SdkField<'a, T> for &'a T {
    fn field(self) -> Option<&'a T> {
        Some(self)
    }
}

impl<'a, T: ?Sized> SdkField<'a, T> for Option<&'a T> {
    fn field(self) -> Option<&'a T> {
        self
    }
}

/// Role name from a role ARN such as `arn:aws:iam::1234:role/path/name`.
pub fn role_name_from_arn(arn: &str) -> Option<&str> {
    let resource = arn.split(':').nth(5)?;
    let name = resource.strip_prefix("role/")?.rsplit('/').next()?;
    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_name_from_arn() {
        assert_eq!(
            role_name_from_arn("arn:aws:iam::1234:role/phonetool-test-CFNExecutionRole"),
            Some("phonetool-test-CFNExecutionRole")
        );
        assert_eq!(role_name_from_arn("arn:aws:iam::1234:role/service-role/manager"), Some("manager"));
        assert_eq!(role_name_from_arn("arn:aws:iam::1234:user/bob"), None);
        assert_eq!(role_name_from_arn("not-an-arn"), None);
    }
}
