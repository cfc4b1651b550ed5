//! Name constants for envforge orchestrations and the stacks they drive
//!
//! Orchestration names follow the convention: {crate-name}::{type}::{name}

/// Orchestration names
pub mod orchestrations {
    /// Create a new environment inside an existing application
    ///
    /// **Input:** [`crate::types::InitEnvironmentInput`]
    /// **Output:** [`crate::types::InitEnvironmentOutput`]
    /// **Steps:** see [`crate::step_names::init`]
    /// **Re-runnable:** Yes, persistence is the last step
    pub const INIT_ENVIRONMENT: &str = "envforge-orchestrations::orchestration::init-environment";

    /// Tear down an environment, its retained roles, and its record
    ///
    /// **Input:** [`crate::types::DeleteEnvironmentInput`]
    /// **Output:** [`crate::types::DeleteEnvironmentOutput`]
    /// **Steps:** see [`crate::step_names::delete`]
    /// **Re-runnable:** Yes, the record is removed last
    pub const DELETE_ENVIRONMENT: &str = "envforge-orchestrations::orchestration::delete-environment";
}

/// Stack naming rules
pub mod stacks {
    /// `<app>-<env>`
    pub fn environment(app: &str, env: &str) -> String {
        format!("{}-{}", app, env)
    }

    /// `<app>-<env>-<workload>`
    pub fn workload(app: &str, env: &str, workload: &str) -> String {
        format!("{}-{}-{}", app, env, workload)
    }

    /// Application-level roles stack holding the DNS delegation list
    pub fn app_roles(app: &str) -> String {
        format!("{}-infrastructure-roles", app)
    }

    /// Application stack set with one instance per (account, region)
    pub fn app_stack_set(app: &str) -> String {
        format!("{}-infrastructure", app)
    }
}

/// Environment stack parameters
pub mod parameters {
    pub const APP_NAME: &str = "AppName";
    pub const ENVIRONMENT_NAME: &str = "EnvironmentName";
    pub const TOOLS_ACCOUNT_PRINCIPAL_ARN: &str = "ToolsAccountPrincipalARN";
    pub const APP_DNS_NAME: &str = "AppDNSName";
    pub const ALB_WORKLOADS: &str = "ALBWorkloads";
    pub const EFS_WORKLOADS: &str = "EFSWorkloads";
    pub const NAT_WORKLOADS: &str = "NATWorkloads";

    /// Membership parameters owned by the environment controller
    pub const MEMBERSHIP: [&str; 3] = [ALB_WORKLOADS, EFS_WORKLOADS, NAT_WORKLOADS];

    /// Accounts allowed to manage records in the application's hosted zone
    pub const APP_DNS_DELEGATED_ACCOUNTS: &str = "AppDNSDelegatedAccounts";
}

/// Environment stack outputs
pub mod outputs {
    pub const VPC_ID: &str = "VpcId";
    pub const CLUSTER_ID: &str = "ClusterId";
    pub const ENVIRONMENT_MANAGER_ROLE_ARN: &str = "EnvironmentManagerRoleARN";
    pub const CFN_EXECUTION_ROLE_ARN: &str = "CFNExecutionRoleARN";
}
