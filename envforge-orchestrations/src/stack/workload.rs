//! Workload stack kind: a pre-rendered template deployed into an environment

use anyhow::bail;
use envforge_models::{APP_TAG_KEY, ENV_TAG_KEY, SERVICE_TAG_KEY};
use std::collections::BTreeMap;

use super::{Parameter, StackConfiguration};
use crate::names::stacks;

#[derive(Debug, Clone)]
pub struct WorkloadStack {
    pub app: String,
    pub env: String,
    pub name: String,
    pub template_body: String,
    pub parameters: Vec<Parameter>,
    /// Role the control plane assumes, usually the environment's execution role
    pub role_arn: Option<String>,
}

impl WorkloadStack {
    /// Parse `Key=Value` parameter overrides.
    pub fn parse_parameters<S: AsRef<str>>(raw: &[S]) -> anyhow::Result<Vec<Parameter>> {
        raw.iter()
            .map(|entry| {
                let entry = entry.as_ref();
                match entry.split_once('=') {
                    Some((key, value)) if !key.trim().is_empty() => Ok(Parameter::new(key.trim(), value)),
                    _ => bail!("parameter {} must be in the form Key=Value", entry),
                }
            })
            .collect()
    }
}

impl StackConfiguration for WorkloadStack {
    fn stack_name(&self) -> String {
        stacks::workload(&self.app, &self.env, &self.name)
    }

    fn template(&self) -> anyhow::Result<String> {
        if self.template_body.trim().is_empty() {
            bail!("template for workload {} is empty", self.name);
        }
        Ok(self.template_body.clone())
    }

    fn parameters(&self) -> Vec<Parameter> {
        self.parameters.clone()
    }

    fn tags(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (APP_TAG_KEY.to_string(), self.app.clone()),
            (ENV_TAG_KEY.to_string(), self.env.clone()),
            (SERVICE_TAG_KEY.to_string(), self.name.clone()),
        ])
    }

    fn role_arn(&self) -> Option<String> {
        self.role_arn.clone()
    }
}
