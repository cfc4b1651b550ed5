//! Environment description: record, stack tags, template version, cluster, and services

use anyhow::Context;
use envforge_models::EnvironmentRecord;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::aws::deployed_services;
use crate::cluster::ClusterLocator;
use crate::error::EnvironmentError;
use crate::names::stacks;
use crate::orchestrations::EnvironmentAccess;
use crate::stack::environment::LEGACY_TEMPLATE_VERSION;
use crate::store::ConfigStore;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnvironmentDescription {
    pub record: EnvironmentRecord,
    pub tags: BTreeMap<String, String>,
    pub template_version: String,
    pub cluster_arn: String,
    /// Services with a stack deployed in the environment
    pub services: Vec<String>,
}

/// `Metadata.Version` of a template body, or the legacy version when absent.
pub fn template_version(body: &str) -> anyhow::Result<String> {
    let template: serde_yaml::Value = serde_yaml::from_str(body).context("parse environment template")?;
    let version = template
        .get("Metadata")
        .and_then(|metadata| metadata.get("Version"))
        .and_then(|version| version.as_str())
        .unwrap_or(LEGACY_TEMPLATE_VERSION);
    Ok(version.to_string())
}

pub struct EnvDescriber {
    store: Arc<dyn ConfigStore>,
    access: Arc<dyn EnvironmentAccess>,
}

impl EnvDescriber {
    pub fn new(store: Arc<dyn ConfigStore>, access: Arc<dyn EnvironmentAccess>) -> Self {
        Self { store, access }
    }

    pub async fn describe(&self, app: &str, env: &str) -> anyhow::Result<EnvironmentDescription> {
        let record = self
            .store
            .get_environment(app, env)
            .await?
            .ok_or_else(|| EnvironmentError::EnvironmentNotFound {
                app: app.to_string(),
                env: env.to_string(),
            })?;
        let clients = self.access.clients_for(&record).await?;
        let name = stacks::environment(app, env);
        let stack = clients
            .gateway
            .describe_stack(&name)
            .await
            .with_context(|| format!("describe environment stack {}", name))?;
        let body = clients
            .gateway
            .template_body(&name)
            .await
            .with_context(|| format!("get template of environment stack {}", name))?;
        let cluster_arn = ClusterLocator::new(clients.resources.clone()).cluster_arn(app, env).await?;
        let services = deployed_services(clients.resources.as_ref(), app, env).await?;

        Ok(EnvironmentDescription {
            record,
            tags: stack.tags,
            template_version: template_version(&body)?,
            cluster_arn,
            services,
        })
    }
}
