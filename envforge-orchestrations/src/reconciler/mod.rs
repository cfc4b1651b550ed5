//! Environment controller: the custom-resource handler that keeps an
//! environment stack's membership parameters in step with its workloads.
//!
//! Every invocation sends exactly one response before its deadline. The
//! reconcile loop runs in its own task so a panic or an expired deadline still
//! turns into a FAILED response.

pub mod params;
pub mod response;

use anyhow::{anyhow, bail};
use envforge_models::{
    ControllerProperties, CustomResourceRequest, CustomResourceResponse, RequestType, ResponseStatus, StackStatus,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::error::StackError;
use crate::names::outputs;
use crate::stack::{Parameter, StackGateway};
pub use params::{parse_members, recompute, same_members, MembershipOp};
pub use response::{HttpResponseSender, ResponseSender};

#[derive(Clone)]
pub struct EnvController {
    gateway: Arc<dyn StackGateway>,
    sender: Arc<dyn ResponseSender>,
}

impl EnvController {
    pub fn new(gateway: Arc<dyn StackGateway>, sender: Arc<dyn ResponseSender>) -> Self {
        Self { gateway, sender }
    }

    /// Handle one invocation and deliver its response.
    ///
    /// Returns the response that was sent; an error means the send itself failed.
    pub async fn handle(
        &self,
        request: CustomResourceRequest,
        deadline: Instant,
    ) -> anyhow::Result<CustomResourceResponse> {
        let props = &request.resource_properties;
        info!(
            "Environment controller request {} ({}) for stack {} workload {}",
            request.request_id, request.request_type, props.env_stack_name, props.workload_name
        );

        let outcome = match RequestType::parse(&request.request_type) {
            None => Err(anyhow!("Unsupported request type {}", request.request_type)),
            Some(request_type) => self.run_until(deadline, props.clone(), op_for(request_type)).await,
        };

        let response = build_response(&request, outcome);
        match response.status {
            ResponseStatus::Success => info!("Request {} succeeded", request.request_id),
            ResponseStatus::Failed => warn!(
                "Request {} failed: {}",
                request.request_id,
                response.reason.as_deref().unwrap_or_default()
            ),
        }
        self.sender.send(&request.response_url, &response).await?;
        Ok(response)
    }

    /// Answer a request that could not be decoded, if it names a response URL.
    ///
    /// Returns None when there is nowhere to send the response.
    pub async fn reject_malformed(
        &self,
        raw: &serde_json::Value,
        reason: &str,
    ) -> anyhow::Result<Option<CustomResourceResponse>> {
        let field = |key: &str| {
            raw.get(key)
                .and_then(serde_json::Value::as_str)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
        };
        let Some(url) = field("ResponseURL") else {
            warn!("Malformed request without a response URL: {}", reason);
            return Ok(None);
        };
        let logical_resource_id = field("LogicalResourceId").unwrap_or_default();
        let response = CustomResourceResponse {
            status: ResponseStatus::Failed,
            reason: Some(reason.to_string()),
            physical_resource_id: field("PhysicalResourceId")
                .or_else(|| (!logical_resource_id.is_empty()).then(|| logical_resource_id.clone()))
                .unwrap_or_else(|| "envcontroller".to_string()),
            stack_id: field("StackId").unwrap_or_default(),
            request_id: field("RequestId").unwrap_or_default(),
            logical_resource_id,
            data: BTreeMap::new(),
        };
        warn!("Rejecting malformed request {}: {}", response.request_id, reason);
        self.sender.send(&url, &response).await?;
        Ok(Some(response))
    }

    async fn run_until(
        &self,
        deadline: Instant,
        props: ControllerProperties,
        op: MembershipOp,
    ) -> anyhow::Result<BTreeMap<String, String>> {
        let gateway = self.gateway.clone();
        let task = tokio::spawn(async move { reconcile(gateway.as_ref(), &props, op).await });
        let abort = task.abort_handle();

        match tokio::time::timeout_at(deadline, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => {
                error!("Environment controller task failed: {}", join_err);
                Err(anyhow!("unexpected fault: {}", join_err))
            }
            Err(_) => {
                abort.abort();
                Err(anyhow!("timed out before the environment stack update finished"))
            }
        }
    }
}

fn op_for(request_type: RequestType) -> MembershipOp {
    match request_type {
        RequestType::Create | RequestType::Update => MembershipOp::Add,
        RequestType::Delete => MembershipOp::Remove,
    }
}

/// Parameter updates needed to apply `op`, computed from the live values.
pub fn changed_parameters(
    current: &BTreeMap<String, String>,
    parameter_names: &[String],
    workload: &str,
    op: MembershipOp,
) -> BTreeMap<String, String> {
    let mut changes = BTreeMap::new();
    for name in parameter_names {
        let Some(value) = current.get(name) else {
            warn!("Environment stack has no parameter {}, skipping", name);
            continue;
        };
        let updated = recompute(value, workload, op);
        if !same_members(value, &updated) {
            changes.insert(name.clone(), updated);
        }
    }
    changes
}

/// Re-read, recompute, and update until the change lands or fails for good.
async fn reconcile(
    gateway: &dyn StackGateway,
    props: &ControllerProperties,
    op: MembershipOp,
) -> anyhow::Result<BTreeMap<String, String>> {
    let name = props.env_stack_name.as_str();
    loop {
        let stack = match gateway.describe_stack(name).await {
            Ok(stack) => stack,
            Err(e) if e.is_not_found() => bail!("Cannot find environment stack {}", name),
            Err(e) => return Err(e.into()),
        };

        let changes = changed_parameters(&stack.parameters, &props.parameter_names, &props.workload_name, op);
        if changes.is_empty() {
            info!("Environment stack {} already reflects workload {}", name, props.workload_name);
            return Ok(stack.outputs);
        }

        let parameters: Vec<Parameter> = stack
            .parameters
            .keys()
            .map(|key| match changes.get(key) {
                Some(value) => Parameter::new(key, value),
                None => Parameter::previous(key),
            })
            .collect();
        let role_arn = stack.outputs.get(outputs::CFN_EXECUTION_ROLE_ARN).map(String::as_str);

        match gateway.update_parameters(name, &parameters, role_arn).await {
            Ok(()) => break,
            Err(StackError::NoUpdates(_)) => return Ok(stack.outputs),
            Err(e) if e.is_update_in_progress() => {
                info!("Environment stack {} is busy, waiting before retrying", name);
                gateway.wait_until_stable(name).await?;
            }
            Err(e) => return Err(e.into()),
        }
    }

    // The update was accepted; a failed wait is reported, never re-issued.
    match gateway.wait_until_stable(name).await? {
        StackStatus::UpdateComplete => {}
        status => {
            return Err(StackError::UnexpectedStatus {
                name: name.to_string(),
                status: status.to_string(),
            }
            .into())
        }
    }
    Ok(gateway.describe_stack(name).await?.outputs)
}

fn build_response(
    request: &CustomResourceRequest,
    outcome: anyhow::Result<BTreeMap<String, String>>,
) -> CustomResourceResponse {
    let props = &request.resource_properties;
    let physical_resource_id = request
        .physical_resource_id
        .clone()
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| format!("envcontroller/{}/{}", props.env_stack_name, props.workload_name));
    let (status, reason, data) = match outcome {
        Ok(data) => (ResponseStatus::Success, None, data),
        Err(e) => (ResponseStatus::Failed, Some(format!("{:#}", e)), BTreeMap::new()),
    };
    CustomResourceResponse {
        status,
        reason,
        physical_resource_id,
        stack_id: request.stack_id.clone(),
        request_id: request.request_id.clone(),
        logical_resource_id: request.logical_resource_id.clone(),
        data,
    }
}
