//! Locate the ECS cluster of an environment through resource tags

use envforge_models::{APP_TAG_KEY, ENV_TAG_KEY};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::aws::tagging::{ResourceGetter, CLUSTER_RESOURCE_TYPE};
use crate::error::EnvironmentError;

pub struct ClusterLocator {
    resources: Arc<dyn ResourceGetter>,
}

impl ClusterLocator {
    pub fn new(resources: Arc<dyn ResourceGetter>) -> Self {
        Self { resources }
    }

    /// ARN of the single cluster tagged with the application and environment.
    pub async fn cluster_arn(&self, app: &str, env: &str) -> anyhow::Result<String> {
        let tags = BTreeMap::from([
            (APP_TAG_KEY.to_string(), app.to_string()),
            (ENV_TAG_KEY.to_string(), env.to_string()),
        ]);
        let mut clusters = self
            .resources
            .get_resources_by_tags(CLUSTER_RESOURCE_TYPE, &tags)
            .await?;
        match clusters.len() {
            0 => Err(EnvironmentError::ClusterNotFound(env.to_string()).into()),
            1 => Ok(clusters.remove(0).arn),
            _ => Err(EnvironmentError::MultipleClusters(env.to_string()).into()),
        }
    }
}
