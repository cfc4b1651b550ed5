use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::time::Instant;

use envforge_models::CustomResourceRequest;
use envforge_orchestrations::reconciler::{EnvController, HttpResponseSender};

use super::{aws_session, stack_gateway, AwsOptions};
use crate::api::{self, AppState};
use crate::cli::ControllerCommand;
use crate::config::Config;

pub async fn handle_command(command: ControllerCommand, aws: &AwsOptions, config: &Config) -> Result<()> {
    let session = aws_session(aws).await;
    let controller = Arc::new(EnvController::new(
        stack_gateway(&session, config),
        Arc::new(HttpResponseSender::default()),
    ));

    match command {
        ControllerCommand::Serve { port } => {
            let port = port.unwrap_or(config.controller_port);
            tracing::info!(
                "Starting environment controller, response deadline {}s",
                config.controller_deadline.as_secs()
            );
            api::start_server(
                port,
                AppState {
                    controller,
                    deadline: config.controller_deadline,
                },
            )
            .await
        }
        ControllerCommand::Invoke { event } => run_invoke(&controller, &event, config).await,
    }
}

async fn run_invoke(controller: &EnvController, event: &Path, config: &Config) -> Result<()> {
    let deadline = Instant::now() + config.controller_deadline;
    let raw = std::fs::read_to_string(event)
        .with_context(|| format!("Failed to read request {}", event.display()))?;
    let raw: serde_json::Value =
        serde_json::from_str(&raw).with_context(|| format!("Failed to parse request {}", event.display()))?;

    let response = match serde_json::from_value::<CustomResourceRequest>(raw.clone()) {
        Ok(request) => controller.handle(request, deadline).await?,
        Err(e) => {
            let reason = format!("Malformed request: {}", e);
            controller
                .reject_malformed(&raw, &reason)
                .await?
                .with_context(|| format!("{} has no ResponseURL: {}", event.display(), reason))?
        }
    };
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
