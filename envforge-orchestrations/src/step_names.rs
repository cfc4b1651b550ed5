//! Name constants for orchestration steps
//!
//! Each step documents its retry-safety contract. A failed run reports the
//! name of the step that stopped it.

/// Steps of [`crate::names::orchestrations::INIT_ENVIRONMENT`], in execution order
pub mod init {
    /// Check the environment name and flag combinations
    ///
    /// **Idempotent:** Yes (pure)
    pub const VALIDATE_INPUT: &str = "validate-input";

    /// Load the parent application record
    ///
    /// **Idempotent:** Yes (read only)
    /// **Fails with:** [`crate::error::EnvironmentError::ApplicationNotFound`]
    pub const LOAD_APPLICATION: &str = "load-application";

    /// Grant DNS permissions to the environment account
    ///
    /// **Idempotent:** Yes (no update when the account is already delegated)
    /// **Operations:**
    /// - Resolves the caller's account
    /// - Skips when the application has no domain or the accounts match
    /// - Adds the account to `AppDNSDelegatedAccounts` on the roles stack
    pub const DELEGATE_DNS: &str = "delegate-dns";

    /// Create the environment stack and stream its progress
    ///
    /// **Idempotent:** Yes (an existing stack counts as success)
    /// **Operations:**
    /// - Renders the environment template
    /// - Creates the stack and waits for a terminal status
    /// - Translates resource events into progress milestones
    pub const DEPLOY_ENVIRONMENT_STACK: &str = "deploy-environment-stack";

    /// Read role ARNs, account and region back from the stack
    ///
    /// **Idempotent:** Yes (read only)
    pub const DESCRIBE_ENVIRONMENT: &str = "describe-environment";

    /// Register the (account, region) pair with the application stack set
    ///
    /// **Idempotent:** Yes (no-op when the instance exists)
    pub const ADD_ENVIRONMENT_TO_APP: &str = "add-environment-to-app";

    /// Persist the environment record
    ///
    /// **Idempotent:** Yes (upsert keyed by app and name)
    pub const STORE_ENVIRONMENT: &str = "store-environment";
}

/// Steps of [`crate::names::orchestrations::DELETE_ENVIRONMENT`], in execution order
pub mod delete {
    /// Load the persisted environment record
    ///
    /// **Idempotent:** Yes (read only)
    /// **Fails with:** [`crate::error::EnvironmentError::EnvironmentNotFound`]
    pub const LOAD_ENVIRONMENT: &str = "load-environment";

    /// Refuse to continue while workload stacks are tagged with the environment
    ///
    /// **Idempotent:** Yes (read only)
    /// **Fails with:** [`crate::error::EnvironmentError::WorkloadsStillDeployed`]
    pub const CHECK_NO_DEPLOYED_WORKLOADS: &str = "check-no-deployed-workloads";

    /// Make sure both environment roles survive stack deletion
    ///
    /// **Idempotent:** Yes (template already carrying both policies is left alone)
    /// **Operations:**
    /// - Reads the stack's template body
    /// - Inserts `DeletionPolicy: Retain` for each role missing it
    /// - Pushes one template update with all parameters unchanged
    pub const RETAIN_ENVIRONMENT_ROLES: &str = "retain-environment-roles";

    /// Delete the environment stack using the execution role
    ///
    /// **Idempotent:** Yes (a missing stack counts as deleted)
    pub const DELETE_ENVIRONMENT_STACK: &str = "delete-environment-stack";

    /// Delete the execution role, then the manager role
    ///
    /// **Idempotent:** Yes (a missing role counts as deleted)
    pub const DELETE_ENVIRONMENT_ROLES: &str = "delete-environment-roles";

    /// Remove the persisted environment record
    ///
    /// **Idempotent:** Yes
    pub const REMOVE_ENVIRONMENT_RECORD: &str = "remove-environment-record";
}
