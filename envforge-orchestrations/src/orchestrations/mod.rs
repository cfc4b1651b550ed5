//! Environment lifecycle orchestrations

pub mod delete_environment;
pub mod init_environment;
pub mod progress;
pub mod steps;

use async_trait::async_trait;
use envforge_models::EnvironmentRecord;
use std::sync::Arc;

use crate::aws::{AppDeployer, IdentityService, ResourceGetter, RoleDeleter};
use crate::stack::{StackDeployer, StackGateway};
use crate::store::ConfigStore;

pub use delete_environment::DeleteEnvironment;
pub use init_environment::InitEnvironment;
pub use progress::{LogProgress, Milestone, MilestoneState, MilestoneUpdate, ProgressSink};

/// Collaborators shared by the environment orchestrations
///
/// `gateway`, `deployer` and `identity` act in the account and region the new
/// environment is created in. `app_deployer` and `app_identity` act in the
/// application's account. Existing environments are reached through `access`.
#[derive(Clone)]
pub struct EnvironmentServices {
    pub gateway: Arc<dyn StackGateway>,
    pub deployer: StackDeployer,
    pub store: Arc<dyn ConfigStore>,
    pub app_deployer: Arc<dyn AppDeployer>,
    pub identity: Arc<dyn IdentityService>,
    pub app_identity: Arc<dyn IdentityService>,
    pub access: Arc<dyn EnvironmentAccess>,
}

/// Clients bound to one environment's account and region
#[derive(Clone)]
pub struct EnvironmentClients {
    pub gateway: Arc<dyn StackGateway>,
    pub deployer: StackDeployer,
    pub roles: Arc<dyn RoleDeleter>,
    pub resources: Arc<dyn ResourceGetter>,
}

#[async_trait]
pub trait EnvironmentAccess: Send + Sync {
    /// Clients acting as the environment's manager role in its region.
    async fn clients_for(&self, record: &EnvironmentRecord) -> anyhow::Result<EnvironmentClients>;
}
