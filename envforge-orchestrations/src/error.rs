//! Typed errors surfaced by the stack, environment, and step layers

use thiserror::Error;

/// Control-plane failures, classified from the raw API error
#[derive(Debug, Error)]
pub enum StackError {
    #[error("stack {0} not found")]
    NotFound(String),

    #[error("stack {0} already exists")]
    AlreadyExists(String),

    /// Another operation holds the stack, e.g. `UPDATE_COMPLETE_CLEANUP_IN_PROGRESS`.
    #[error("stack {0} has an operation in progress and can not be updated")]
    UpdateInProgress(String),

    /// Never surfaced to callers; update paths turn it into success.
    #[error("no updates are to be performed on stack {0}")]
    NoUpdates(String),

    #[error("timed out after {seconds}s waiting for stack {name} to stabilize")]
    WaitTimeout { name: String, seconds: u64 },

    #[error("stack {name} ended in unexpected status {status}")]
    UnexpectedStatus { name: String, status: String },

    /// Original failure with detail appended from the stack's events
    #[error("{source}: {detail}")]
    Deployment {
        #[source]
        source: Box<StackError>,
        detail: String,
    },

    #[error("{operation} stack {name}: {message}")]
    Api {
        name: String,
        operation: &'static str,
        message: String,
    },
}

impl StackError {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Deployment { source, .. } => source.is_not_found(),
            _ => false,
        }
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }

    pub fn is_update_in_progress(&self) -> bool {
        matches!(self, Self::UpdateInProgress(_))
    }
}

/// True for "is in <STATUS>_IN_PROGRESS state and can not be updated" rejections.
fn is_in_progress_rejection(message: &str) -> bool {
    let Some(end) = message.find(" state and can not be updated") else {
        return false;
    };
    message[..end]
        .rsplit(' ')
        .next()
        .is_some_and(|status| status.ends_with("_IN_PROGRESS"))
}

/// Classify a control-plane error by its code and message.
pub fn classify_error(
    name: &str,
    operation: &'static str,
    code: Option<&str>,
    message: &str,
) -> StackError {
    if code == Some("AlreadyExistsException") || message.contains("already exists") {
        return StackError::AlreadyExists(name.to_string());
    }
    if message.contains("does not exist") {
        return StackError::NotFound(name.to_string());
    }
    if is_in_progress_rejection(message) {
        return StackError::UpdateInProgress(name.to_string());
    }
    if message.contains("No updates are to be performed") {
        return StackError::NoUpdates(name.to_string());
    }
    StackError::Api {
        name: name.to_string(),
        operation,
        message: message.to_string(),
    }
}

/// Environment-level validation and lookup failures
#[derive(Debug, Error)]
pub enum EnvironmentError {
    #[error("couldn't find application {0}")]
    ApplicationNotFound(String),

    #[error("couldn't find environment {env} in the application {app}")]
    EnvironmentNotFound { app: String, env: String },

    #[error("service '{}' still exist within the environment {env}", .services.join(", "))]
    WorkloadsStillDeployed { env: String, services: Vec<String> },

    #[error("no cluster found in environment {0}")]
    ClusterNotFound(String),

    #[error("more than one cluster is found in environment {0}")]
    MultipleClusters(String),

    #[error("{0}")]
    InvalidInput(String),
}

/// Failure of one named step inside an orchestration run
#[derive(Debug, Error)]
#[error("{orchestration}: step {step} failed: {source:#}")]
pub struct StepError {
    pub orchestration: &'static str,
    pub step: &'static str,
    #[source]
    pub source: anyhow::Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_conditions() {
        assert!(classify_error("s", "create", Some("AlreadyExistsException"), "Stack [s] already exists")
            .is_already_exists());
        assert!(classify_error("s", "describe", Some("ValidationError"), "Stack with id s does not exist")
            .is_not_found());
        assert!(classify_error(
            "s",
            "update",
            Some("ValidationError"),
            "Stack:arn:aws:cloudformation:us-west-2:1234:stack/s/guid is in UPDATE_IN_PROGRESS state and can not be updated."
        )
        .is_update_in_progress());
        assert!(matches!(
            classify_error("s", "update", Some("ValidationError"), "No updates are to be performed."),
            StackError::NoUpdates(_)
        ));
    }

    #[test]
    fn test_any_in_progress_state_is_a_conflict() {
        for status in [
            "UPDATE_COMPLETE_CLEANUP_IN_PROGRESS",
            "UPDATE_ROLLBACK_IN_PROGRESS",
            "UPDATE_ROLLBACK_COMPLETE_CLEANUP_IN_PROGRESS",
        ] {
            let message = format!(
                "Stack:arn:aws:cloudformation:us-west-2:1234:stack/s/guid is in {} state and can not be updated.",
                status
            );
            assert!(classify_error("s", "update", Some("ValidationError"), &message).is_update_in_progress());
        }
        let settled = "Stack:arn:aws:cloudformation:us-west-2:1234:stack/s/guid is in UPDATE_ROLLBACK_FAILED state and can not be updated.";
        assert!(!classify_error("s", "update", Some("ValidationError"), settled).is_update_in_progress());
    }

    #[test]
    fn test_classify_other_errors_keep_message() {
        let err = classify_error("s", "update", Some("AccessDenied"), "not authorized");
        assert_eq!(err.to_string(), "update stack s: not authorized");
    }

    #[test]
    fn test_deployment_error_appends_detail() {
        let err = StackError::Deployment {
            source: Box::new(StackError::UnexpectedStatus {
                name: "phonetool-test".to_string(),
                status: "ROLLBACK_COMPLETE".to_string(),
            }),
            detail: "Resource limit exceeded".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "stack phonetool-test ended in unexpected status ROLLBACK_COMPLETE: Resource limit exceeded"
        );
    }

    #[test]
    fn test_workloads_still_deployed_lists_every_service() {
        let err = EnvironmentError::WorkloadsStillDeployed {
            env: "test".to_string(),
            services: vec!["frontend".to_string(), "backend".to_string()],
        };
        assert_eq!(err.to_string(), "service 'frontend, backend' still exist within the environment test");
    }
}
