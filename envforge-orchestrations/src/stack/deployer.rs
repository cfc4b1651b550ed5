//! Create-or-update deployment with failure enrichment from stack events

use envforge_models::ResourceEvent;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::gateway::StackGateway;
use super::{StackConfiguration, StackSpec};
use crate::error::StackError;

/// Drives stacks to a terminal status through a [`StackGateway`]
#[derive(Clone)]
pub struct StackDeployer {
    gateway: Arc<dyn StackGateway>,
    event_poll_interval: Duration,
}

impl StackDeployer {
    pub fn new(gateway: Arc<dyn StackGateway>, event_poll_interval: Duration) -> Self {
        Self {
            gateway,
            event_poll_interval,
        }
    }

    /// Render the configuration and deploy it.
    pub async fn deploy_and_wait(&self, config: &dyn StackConfiguration) -> anyhow::Result<()> {
        let spec = StackSpec::from_config(config)?;
        self.deploy_spec(&spec).await?;
        Ok(())
    }

    /// Create the stack, switching to an update when it already exists.
    pub async fn deploy_spec(&self, spec: &StackSpec) -> Result<(), StackError> {
        let result = match self.gateway.create_and_wait(spec).await {
            Err(e) if e.is_already_exists() => {
                info!("Stack {} already exists, updating", spec.name);
                self.gateway.update_and_wait(&spec.for_update()).await
            }
            other => other,
        };
        match result {
            Ok(()) => Ok(()),
            Err(e) => Err(self.enrich(&spec.name, e).await),
        }
    }

    /// Create the stack while reporting its new events as they appear.
    ///
    /// Events already present before the create call are never reported.
    /// [`StackError::AlreadyExists`] is returned unchanged so callers can decide
    /// whether an existing stack is acceptable.
    pub async fn create_and_stream(
        &self,
        spec: &StackSpec,
        on_event: &mut (dyn FnMut(&ResourceEvent) + Send),
    ) -> Result<(), StackError> {
        let mut seen: HashSet<String> = match self.gateway.list_stack_events(&spec.name).await {
            Ok(events) => events.into_iter().map(|event| event.event_id).collect(),
            Err(_) => HashSet::new(),
        };
        let deploy = self.gateway.create_and_wait(spec);
        tokio::pin!(deploy);
        let mut ticker = tokio::time::interval(self.event_poll_interval);

        let result = loop {
            tokio::select! {
                result = &mut deploy => break result,
                _ = ticker.tick() => {
                    self.emit_new_events(&spec.name, &mut seen, on_event).await;
                }
            }
        };

        match result {
            Ok(()) => {
                self.emit_new_events(&spec.name, &mut seen, on_event).await;
                Ok(())
            }
            Err(e) if e.is_already_exists() => Err(e),
            Err(e) => {
                self.emit_new_events(&spec.name, &mut seen, on_event).await;
                Err(self.enrich(&spec.name, e).await)
            }
        }
    }

    /// Delete the stack; a missing stack counts as deleted.
    pub async fn delete_and_wait(&self, name: &str, role_arn: Option<&str>) -> Result<(), StackError> {
        match self.gateway.delete_and_wait(name, role_arn).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(self.enrich(name, e).await),
        }
    }

    /// Append the first failure reason found in the stack's events.
    async fn enrich(&self, name: &str, err: StackError) -> StackError {
        match self.gateway.list_stack_events(name).await {
            Ok(events) => match events.iter().find_map(ResourceEvent::failure_reason) {
                Some(reason) => StackError::Deployment {
                    source: Box::new(err),
                    detail: reason.to_string(),
                },
                None => err,
            },
            Err(describe_err) => {
                warn!("Failed to read events of stack {}: {}", name, describe_err);
                StackError::Deployment {
                    source: Box::new(err),
                    detail: format!("describe stack: {}", describe_err),
                }
            }
        }
    }

    async fn emit_new_events(
        &self,
        name: &str,
        seen: &mut HashSet<String>,
        on_event: &mut (dyn FnMut(&ResourceEvent) + Send),
    ) {
        let events = match self.gateway.list_stack_events(name).await {
            Ok(events) => events,
            Err(e) => {
                debug!("Skipping event poll for {}: {}", name, e);
                return;
            }
        };
        for event in events.iter().rev() {
            if seen.insert(event.event_id.clone()) {
                on_event(event);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stack::Parameter;
    use crate::testing::{event, stack_description, FakeStackGateway};
    use std::collections::BTreeMap;

    fn spec() -> StackSpec {
        StackSpec {
            name: "phonetool-test".to_string(),
            template_body: Some("template".to_string()),
            parameters: vec![Parameter::new("AppName", "phonetool"), Parameter::new("ALBWorkloads", "")],
            tags: BTreeMap::new(),
            role_arn: None,
            termination_protection: false,
            preserved_on_update: vec!["ALBWorkloads".to_string()],
        }
    }

    fn deployer(gateway: &Arc<FakeStackGateway>) -> StackDeployer {
        StackDeployer::new(gateway.clone(), Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_deploy_creates_new_stack() {
        let gateway = Arc::new(FakeStackGateway::new());
        deployer(&gateway).deploy_spec(&spec()).await.unwrap();
        assert_eq!(gateway.calls(), vec!["create_and_wait phonetool-test"]);
    }

    #[tokio::test]
    async fn test_deploy_switches_to_update_when_stack_exists() {
        let gateway = Arc::new(FakeStackGateway::new());
        gateway.insert_stack(stack_description("phonetool-test", &[("ALBWorkloads", "api")], &[]));

        deployer(&gateway).deploy_spec(&spec()).await.unwrap();

        assert_eq!(
            gateway.calls(),
            vec!["create_and_wait phonetool-test", "update_and_wait phonetool-test"]
        );
        let update = gateway.last_update_spec().unwrap();
        assert_eq!(update.parameters[1], Parameter::previous("ALBWorkloads"));
    }

    #[tokio::test]
    async fn test_deploy_twice_is_a_no_op_update() {
        let gateway = Arc::new(FakeStackGateway::new());
        let deployer = deployer(&gateway);
        deployer.deploy_spec(&spec()).await.unwrap();
        deployer.deploy_spec(&spec()).await.unwrap();
        assert_eq!(gateway.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_failure_is_enriched_with_first_failure_event() {
        let gateway = Arc::new(FakeStackGateway::new());
        gateway.fail_create_with(StackError::UnexpectedStatus {
            name: "phonetool-test".to_string(),
            status: "ROLLBACK_COMPLETE".to_string(),
        });
        gateway.set_events(
            "phonetool-test",
            vec![
                event("3", "phonetool-test", "AWS::CloudFormation::Stack", "ROLLBACK_COMPLETE", None),
                event("2", "Cluster", "AWS::ECS::Cluster", "CREATE_FAILED", Some("Resource limit exceeded")),
                event("1", "VPC", "AWS::EC2::VPC", "CREATE_FAILED", Some("older failure")),
            ],
        );

        let err = deployer(&gateway).deploy_spec(&spec()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "stack phonetool-test ended in unexpected status ROLLBACK_COMPLETE: Resource limit exceeded"
        );
    }

    #[tokio::test]
    async fn test_enrichment_failure_is_appended_not_swallowed() {
        let gateway = Arc::new(FakeStackGateway::new());
        gateway.fail_create_with(StackError::UnexpectedStatus {
            name: "phonetool-test".to_string(),
            status: "ROLLBACK_COMPLETE".to_string(),
        });
        gateway.fail_events_with("throttled");

        let err = deployer(&gateway).deploy_spec(&spec()).await.unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("stack phonetool-test ended in unexpected status ROLLBACK_COMPLETE: describe stack:"));
        assert!(message.contains("throttled"));
    }

    #[tokio::test]
    async fn test_delete_treats_missing_stack_as_success() {
        let gateway = Arc::new(FakeStackGateway::new());
        deployer(&gateway).delete_and_wait("phonetool-gone", None).await.unwrap();
    }

    #[tokio::test]
    async fn test_create_and_stream_reports_events_oldest_first() {
        let gateway = Arc::new(FakeStackGateway::new());
        gateway.emit_on_create(
            "phonetool-test",
            vec![
                event("2", "Cluster", "AWS::ECS::Cluster", "CREATE_COMPLETE", None),
                event("1", "VPC", "AWS::EC2::VPC", "CREATE_COMPLETE", None),
            ],
        );
        let mut seen = Vec::new();
        deployer(&gateway)
            .create_and_stream(&spec(), &mut |e: &ResourceEvent| seen.push(e.logical_name.clone()))
            .await
            .unwrap();
        assert_eq!(seen, vec!["VPC", "Cluster"]);
    }

    #[tokio::test]
    async fn test_create_and_stream_skips_only_events_that_predate_the_create() {
        let gateway = Arc::new(FakeStackGateway::new());
        gateway.set_events(
            "phonetool-test",
            vec![event("old", "phonetool-test", "AWS::CloudFormation::Stack", "DELETE_COMPLETE", None)],
        );
        let mut behind = event("1", "VPC", "AWS::EC2::VPC", "CREATE_COMPLETE", None);
        behind.timestamp -= chrono::Duration::hours(1);
        gateway.emit_on_create("phonetool-test", vec![behind]);

        let mut seen = Vec::new();
        deployer(&gateway)
            .create_and_stream(&spec(), &mut |e: &ResourceEvent| seen.push(e.event_id.clone()))
            .await
            .unwrap();
        assert_eq!(seen, vec!["1"]);
    }

    #[tokio::test]
    async fn test_create_and_stream_passes_already_exists_through() {
        let gateway = Arc::new(FakeStackGateway::new());
        gateway.insert_stack(stack_description("phonetool-test", &[], &[]));
        let err = deployer(&gateway)
            .create_and_stream(&spec(), &mut |_: &ResourceEvent| {})
            .await
            .unwrap_err();
        assert!(err.is_already_exists());
    }
}
