//! CloudFormation implementation of [`StackGateway`]

use async_trait::async_trait;
use aws_sdk_cloudformation::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_sdk_cloudformation::types::{
    Capability, Parameter as CfnParameter, Stack, StackEvent, Tag as CfnTag, TemplateStage,
};
use aws_sdk_cloudformation::Client;
use chrono::{DateTime, Utc};
use envforge_models::{ResourceEvent, StackStatus};
use std::collections::BTreeMap;
use tokio::time::Instant;
use tracing::{debug, info};

use super::gateway::{StackGateway, WaitConfig};
use super::{Parameter, StackDescription, StackSpec};
use crate::aws::SdkField;
use crate::error::{classify_error, StackError};

const CAPABILITIES: [Capability; 3] = [
    Capability::CapabilityIam,
    Capability::CapabilityNamedIam,
    Capability::CapabilityAutoExpand,
];

pub struct CloudFormationGateway {
    client: Client,
    wait: WaitConfig,
}

impl CloudFormationGateway {
    pub fn new(client: Client, wait: WaitConfig) -> Self {
        Self { client, wait }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    async fn expect_status(&self, name: &str, expected: StackStatus) -> Result<(), StackError> {
        let status = self.wait_until_stable(name).await?;
        if status == expected {
            Ok(())
        } else {
            Err(StackError::UnexpectedStatus {
                name: name.to_string(),
                status: status.to_string(),
            })
        }
    }
}

fn sdk_error<E, R>(name: &str, operation: &'static str, err: SdkError<E, R>) -> StackError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = match err.message() {
        Some(message) => message.to_string(),
        None => DisplayErrorContext(&err).to_string(),
    };
    classify_error(name, operation, err.code(), &message)
}

fn to_cfn_parameters(parameters: &[Parameter]) -> Vec<CfnParameter> {
    parameters
        .iter()
        .map(|p| {
            let builder = CfnParameter::builder().parameter_key(&p.key);
            if p.use_previous {
                builder.use_previous_value(true).build()
            } else {
                builder.parameter_value(&p.value).build()
            }
        })
        .collect()
}

fn to_cfn_tags(name: &str, tags: &BTreeMap<String, String>) -> Result<Option<Vec<CfnTag>>, StackError> {
    if tags.is_empty() {
        return Ok(None);
    }
    tags.iter()
        .map(|(key, value)| {
            // TagBuilder::build is infallible in the resolved SDK version
            Ok::<_, StackError>(CfnTag::builder().key(key).value(value).build())
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn to_description(stack: &Stack) -> StackDescription {
    let parameters = stack
        .parameters()
        .iter()
        .filter_map(|p| Some((p.parameter_key()?.to_string(), p.parameter_value().unwrap_or_default().to_string())))
        .collect();
    let outputs = stack
        .outputs()
        .iter()
        .filter_map(|o| Some((o.output_key()?.to_string(), o.output_value().unwrap_or_default().to_string())))
        .collect();
    let tags = stack
        .tags()
        .iter()
        .filter_map(|t| Some((t.key().field()?.to_string(), t.value().field()?.to_string())))
        .collect();
    StackDescription {
        name: stack.stack_name().field().unwrap_or_default().to_string(),
        id: stack.stack_id().unwrap_or_default().to_string(),
        status: stack
            .stack_status()
            .field()
            .map(|s| StackStatus::parse(s.as_str()))
            .unwrap_or(StackStatus::Other("UNKNOWN".to_string())),
        parameters,
        outputs,
        tags,
    }
}

fn to_resource_event(event: &StackEvent) -> ResourceEvent {
    let timestamp = event
        .timestamp()
        .field()
        .and_then(|t| DateTime::<Utc>::from_timestamp(t.secs(), t.subsec_nanos()))
        .unwrap_or_default();
    ResourceEvent {
        event_id: event.event_id().field().unwrap_or_default().to_string(),
        logical_name: event.logical_resource_id().unwrap_or_default().to_string(),
        resource_type: event.resource_type().unwrap_or_default().to_string(),
        status: event.resource_status().map(|s| s.as_str().to_string()).unwrap_or_default(),
        status_reason: event.resource_status_reason().map(str::to_string),
        timestamp,
    }
}

#[async_trait]
impl StackGateway for CloudFormationGateway {
    async fn create_and_wait(&self, spec: &StackSpec) -> Result<(), StackError> {
        info!("Creating stack {}", spec.name);
        self.client
            .create_stack()
            .stack_name(&spec.name)
            .set_template_body(spec.template_body.clone())
            .set_parameters(Some(to_cfn_parameters(&spec.parameters)))
            .set_tags(to_cfn_tags(&spec.name, &spec.tags)?)
            .set_role_arn(spec.role_arn.clone())
            .set_capabilities(Some(CAPABILITIES.to_vec()))
            .enable_termination_protection(spec.termination_protection)
            .send()
            .await
            .map_err(|e| sdk_error(&spec.name, "create", e))?;
        self.expect_status(&spec.name, StackStatus::CreateComplete).await
    }

    async fn update_and_wait(&self, spec: &StackSpec) -> Result<(), StackError> {
        info!("Updating stack {}", spec.name);
        let request = self
            .client
            .update_stack()
            .stack_name(&spec.name)
            .set_parameters(Some(to_cfn_parameters(&spec.parameters)))
            .set_tags(to_cfn_tags(&spec.name, &spec.tags)?)
            .set_role_arn(spec.role_arn.clone())
            .set_capabilities(Some(CAPABILITIES.to_vec()));
        let request = match &spec.template_body {
            Some(body) => request.template_body(body),
            None => request.use_previous_template(true),
        };
        match request.send().await.map_err(|e| sdk_error(&spec.name, "update", e)) {
            Ok(_) => {}
            Err(StackError::NoUpdates(_)) => {
                debug!("Stack {} has no updates to perform", spec.name);
                return Ok(());
            }
            Err(e) => return Err(e),
        }
        self.expect_status(&spec.name, StackStatus::UpdateComplete).await
    }

    async fn delete_and_wait(&self, name: &str, role_arn: Option<&str>) -> Result<(), StackError> {
        info!("Deleting stack {}", name);
        match self
            .client
            .delete_stack()
            .stack_name(name)
            .set_role_arn(role_arn.map(str::to_string))
            .send()
            .await
            .map_err(|e| sdk_error(name, "delete", e))
        {
            Ok(_) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        }
        match self.wait_until_stable(name).await? {
            StackStatus::NotFound | StackStatus::DeleteComplete => Ok(()),
            status => Err(StackError::UnexpectedStatus {
                name: name.to_string(),
                status: status.to_string(),
            }),
        }
    }

    async fn describe_stack(&self, name: &str) -> Result<StackDescription, StackError> {
        let output = self
            .client
            .describe_stacks()
            .stack_name(name)
            .send()
            .await
            .map_err(|e| sdk_error(name, "describe", e))?;
        output
            .stacks()
            .first()
            .map(to_description)
            .ok_or_else(|| StackError::NotFound(name.to_string()))
    }

    async fn list_stack_events(&self, name: &str) -> Result<Vec<ResourceEvent>, StackError> {
        let output = self
            .client
            .describe_stack_events()
            .stack_name(name)
            .send()
            .await
            .map_err(|e| sdk_error(name, "describe events for", e))?;
        Ok(output.stack_events().iter().map(to_resource_event).collect())
    }

    async fn template_body(&self, name: &str) -> Result<String, StackError> {
        let output = self
            .client
            .get_template()
            .stack_name(name)
            .template_stage(TemplateStage::Original)
            .send()
            .await
            .map_err(|e| sdk_error(name, "get template of", e))?;
        Ok(output.template_body().unwrap_or_default().to_string())
    }

    async fn update_parameters(
        &self,
        name: &str,
        parameters: &[Parameter],
        role_arn: Option<&str>,
    ) -> Result<(), StackError> {
        self.client
            .update_stack()
            .stack_name(name)
            .use_previous_template(true)
            .set_parameters(Some(to_cfn_parameters(parameters)))
            .set_role_arn(role_arn.map(str::to_string))
            .set_capabilities(Some(CAPABILITIES.to_vec()))
            .send()
            .await
            .map_err(|e| sdk_error(name, "update", e))?;
        Ok(())
    }

    async fn wait_until_stable(&self, name: &str) -> Result<StackStatus, StackError> {
        let started = Instant::now();
        loop {
            let status = match self.describe_stack(name).await {
                Ok(stack) => stack.status,
                Err(e) if e.is_not_found() => return Ok(StackStatus::NotFound),
                Err(e) => return Err(e),
            };
            if !status.is_in_progress() {
                debug!("Stack {} reached {}", name, status);
                return Ok(status);
            }
            if started.elapsed() >= self.wait.timeout {
                return Err(StackError::WaitTimeout {
                    name: name.to_string(),
                    seconds: self.wait.timeout.as_secs(),
                });
            }
            tokio::time::sleep(self.wait.poll_interval).await;
        }
    }
}
