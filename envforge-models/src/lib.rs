use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Tag key identifying the application a stack belongs to
pub const APP_TAG_KEY: &str = "envforge-application";
/// Tag key identifying the environment a stack belongs to
pub const ENV_TAG_KEY: &str = "envforge-environment";
/// Tag key identifying the workload a stack belongs to
pub const SERVICE_TAG_KEY: &str = "envforge-service";

/// Lifecycle status of a stack as reported by the control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackStatus {
    NotFound,
    CreateInProgress,
    CreateComplete,
    CreateFailed,
    RollbackInProgress,
    RollbackComplete,
    RollbackFailed,
    UpdateInProgress,
    UpdateCompleteCleanupInProgress,
    UpdateComplete,
    UpdateFailed,
    UpdateRollbackInProgress,
    UpdateRollbackCompleteCleanupInProgress,
    UpdateRollbackComplete,
    UpdateRollbackFailed,
    DeleteInProgress,
    DeleteComplete,
    DeleteFailed,
    ReviewInProgress,
    Other(String),
}

impl StackStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "CREATE_IN_PROGRESS" => Self::CreateInProgress,
            "CREATE_COMPLETE" => Self::CreateComplete,
            "CREATE_FAILED" => Self::CreateFailed,
            "ROLLBACK_IN_PROGRESS" => Self::RollbackInProgress,
            "ROLLBACK_COMPLETE" => Self::RollbackComplete,
            "ROLLBACK_FAILED" => Self::RollbackFailed,
            "UPDATE_IN_PROGRESS" => Self::UpdateInProgress,
            "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS" => Self::UpdateCompleteCleanupInProgress,
            "UPDATE_COMPLETE" => Self::UpdateComplete,
            "UPDATE_FAILED" => Self::UpdateFailed,
            "UPDATE_ROLLBACK_IN_PROGRESS" => Self::UpdateRollbackInProgress,
            "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS" => {
                Self::UpdateRollbackCompleteCleanupInProgress
            }
            "UPDATE_ROLLBACK_COMPLETE" => Self::UpdateRollbackComplete,
            "UPDATE_ROLLBACK_FAILED" => Self::UpdateRollbackFailed,
            "DELETE_IN_PROGRESS" => Self::DeleteInProgress,
            "DELETE_COMPLETE" => Self::DeleteComplete,
            "DELETE_FAILED" => Self::DeleteFailed,
            "REVIEW_IN_PROGRESS" => Self::ReviewInProgress,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::CreateInProgress => "CREATE_IN_PROGRESS",
            Self::CreateComplete => "CREATE_COMPLETE",
            Self::CreateFailed => "CREATE_FAILED",
            Self::RollbackInProgress => "ROLLBACK_IN_PROGRESS",
            Self::RollbackComplete => "ROLLBACK_COMPLETE",
            Self::RollbackFailed => "ROLLBACK_FAILED",
            Self::UpdateInProgress => "UPDATE_IN_PROGRESS",
            Self::UpdateCompleteCleanupInProgress => "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS",
            Self::UpdateComplete => "UPDATE_COMPLETE",
            Self::UpdateFailed => "UPDATE_FAILED",
            Self::UpdateRollbackInProgress => "UPDATE_ROLLBACK_IN_PROGRESS",
            Self::UpdateRollbackCompleteCleanupInProgress => {
                "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS"
            }
            Self::UpdateRollbackComplete => "UPDATE_ROLLBACK_COMPLETE",
            Self::UpdateRollbackFailed => "UPDATE_ROLLBACK_FAILED",
            Self::DeleteInProgress => "DELETE_IN_PROGRESS",
            Self::DeleteComplete => "DELETE_COMPLETE",
            Self::DeleteFailed => "DELETE_FAILED",
            Self::ReviewInProgress => "REVIEW_IN_PROGRESS",
            Self::Other(status) => status,
        }
    }

    /// The control plane is still acting on the stack; waiting must continue.
    pub fn is_in_progress(&self) -> bool {
        self.as_str().ends_with("_IN_PROGRESS")
    }
}

impl fmt::Display for StackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a stack's event history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceEvent {
    /// Unique id assigned by the control plane
    pub event_id: String,
    /// Logical id of the resource inside the template
    pub logical_name: String,
    /// Resource type, e.g. "AWS::EC2::VPC"
    pub resource_type: String,
    /// Resource status, e.g. "CREATE_COMPLETE"
    pub status: String,
    pub status_reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ResourceEvent {
    /// Failure events carry a non-empty reason and a `*_FAILED` status.
    pub fn failure_reason(&self) -> Option<&str> {
        if !self.status.ends_with("FAILED") {
            return None;
        }
        self.status_reason.as_deref().filter(|reason| !reason.is_empty())
    }
}

/// Application record, the parent of every environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Application {
    pub name: String,
    /// Account hosting the application-level stacks
    pub account_id: String,
    /// Hosted zone owned by the application, if any
    pub domain: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl Application {
    pub fn requires_dns_delegation(&self) -> bool {
        self.domain.as_deref().is_some_and(|domain| !domain.is_empty())
    }
}

/// Existing network resources an environment is deployed into
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportVpc {
    pub id: String,
    pub public_subnet_ids: Vec<String>,
    pub private_subnet_ids: Vec<String>,
}

/// CIDR overrides for the network resources an environment creates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdjustVpc {
    pub cidr: String,
    pub public_subnet_cidrs: Vec<String>,
    pub private_subnet_cidrs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CustomizeEnv {
    pub import_vpc: Option<ImportVpc>,
    pub adjust_vpc: Option<AdjustVpc>,
}

impl CustomizeEnv {
    pub fn is_empty(&self) -> bool {
        self.import_vpc.is_none() && self.adjust_vpc.is_none()
    }
}

/// Persisted environment record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentRecord {
    pub app: String,
    pub name: String,
    pub account_id: String,
    pub region: String,
    pub manager_role_arn: String,
    pub execution_role_arn: String,
    pub prod: bool,
    pub custom_config: Option<CustomizeEnv>,
}

// ============================================================================
// Custom resource protocol
// ============================================================================

/// Request types understood by the environment controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestType {
    Create,
    Update,
    Delete,
}

impl RequestType {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Create" => Some(Self::Create),
            "Update" => Some(Self::Update),
            "Delete" => Some(Self::Delete),
            _ => None,
        }
    }
}

/// Properties the environment controller resource passes to its handler
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ControllerProperties {
    #[serde(rename = "EnvStackName", alias = "EnvStack", default)]
    pub env_stack_name: String,
    #[serde(rename = "WorkloadName", alias = "Workload", default)]
    pub workload_name: String,
    #[serde(rename = "ParameterNames", alias = "Parameters", default)]
    pub parameter_names: Vec<String>,
}

/// Custom-resource invocation delivered by the control plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomResourceRequest {
    /// Kept raw so unsupported values can be echoed back
    pub request_type: String,
    pub request_id: String,
    #[serde(rename = "ResponseURL")]
    pub response_url: String,
    #[serde(default)]
    pub stack_id: String,
    #[serde(default)]
    pub logical_resource_id: String,
    #[serde(default)]
    pub physical_resource_id: Option<String>,
    #[serde(default)]
    pub resource_properties: ControllerProperties,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseStatus {
    Success,
    Failed,
}

/// Body PUT to the request's response URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CustomResourceResponse {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub reason: Option<String>,
    pub physical_resource_id: String,
    pub stack_id: String,
    pub request_id: String,
    pub logical_resource_id: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}
