//! Resource lookup by tags

use anyhow::Context;
use async_trait::async_trait;
use aws_sdk_resourcegroupstagging::types::TagFilter;
use aws_sdk_resourcegroupstagging::Client;
use envforge_models::{APP_TAG_KEY, ENV_TAG_KEY, SERVICE_TAG_KEY};
use std::collections::BTreeMap;

use super::SdkField;

/// Resource type filter for stacks
pub const STACK_RESOURCE_TYPE: &str = "cloudformation:stack";
/// Resource type filter for ECS clusters
pub const CLUSTER_RESOURCE_TYPE: &str = "ecs:cluster";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedResource {
    pub arn: String,
    pub tags: BTreeMap<String, String>,
}

#[async_trait]
pub trait ResourceGetter: Send + Sync {
    /// Resources of `resource_type` carrying every tag; an empty value matches any value.
    async fn get_resources_by_tags(
        &self,
        resource_type: &str,
        tags: &BTreeMap<String, String>,
    ) -> anyhow::Result<Vec<TaggedResource>>;
}

pub struct TaggingResourceGetter {
    client: Client,
}

impl TaggingResourceGetter {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

fn tag_filters(tags: &BTreeMap<String, String>) -> Vec<TagFilter> {
    tags.iter()
        .map(|(key, value)| {
            let values = (!value.is_empty()).then(|| vec![value.clone()]);
            TagFilter::builder().key(key).set_values(values).build()
        })
        .collect()
}

#[async_trait]
impl ResourceGetter for TaggingResourceGetter {
    async fn get_resources_by_tags(
        &self,
        resource_type: &str,
        tags: &BTreeMap<String, String>,
    ) -> anyhow::Result<Vec<TaggedResource>> {
        let mut resources = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let output = self
                .client
                .get_resources()
                .resource_type_filters(resource_type)
                .set_tag_filters(Some(tag_filters(tags)))
                .set_pagination_token(token.take())
                .send()
                .await
                .with_context(|| format!("get {} resources by tags", resource_type))?;

            for mapping in output.resource_tag_mapping_list() {
                let Some(arn) = mapping.resource_arn() else {
                    continue;
                };
                let tags = mapping
                    .tags()
                    .iter()
                    .filter_map(|t| Some((t.key().field()?.to_string(), t.value().field()?.to_string())))
                    .collect();
                resources.push(TaggedResource {
                    arn: arn.to_string(),
                    tags,
                });
            }

            match output.pagination_token() {
                Some(next) if !next.is_empty() => token = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(resources)
    }
}

/// Names of the services whose stacks are tagged into the environment.
pub async fn deployed_services(resources: &dyn ResourceGetter, app: &str, env: &str) -> anyhow::Result<Vec<String>> {
    let tags = BTreeMap::from([
        (APP_TAG_KEY.to_string(), app.to_string()),
        (ENV_TAG_KEY.to_string(), env.to_string()),
        (SERVICE_TAG_KEY.to_string(), String::new()),
    ]);
    let stacks = resources
        .get_resources_by_tags(STACK_RESOURCE_TYPE, &tags)
        .await
        .context("find service cloudformation stacks")?;
    Ok(stacks
        .into_iter()
        .filter_map(|mut stack| stack.tags.remove(SERVICE_TAG_KEY))
        .collect())
}
