//! Environment stack kind

use envforge_models::{Application, CustomizeEnv, APP_TAG_KEY, ENV_TAG_KEY};
use std::collections::BTreeMap;
use tera::{Context as TeraContext, Tera};

use super::{Parameter, StackConfiguration};
use crate::names::{parameters, stacks};

/// Version stamped into `Metadata.Version` of every rendered template
pub const ENVIRONMENT_TEMPLATE_VERSION: &str = "v1.2.0";

/// Version reported for templates that predate `Metadata.Version`
pub const LEGACY_TEMPLATE_VERSION: &str = "v0.0.0";

const ENVIRONMENT_TEMPLATE: &str = include_str!("../templates/environment.yml");

const DEFAULT_VPC_CIDR: &str = "10.0.0.0/16";
const DEFAULT_PUBLIC_SUBNET_CIDRS: [&str; 2] = ["10.0.0.0/24", "10.0.1.0/24"];
const DEFAULT_PRIVATE_SUBNET_CIDRS: [&str; 2] = ["10.0.2.0/24", "10.0.3.0/24"];

/// The long-lived stack shared by every workload in an environment
#[derive(Debug, Clone)]
pub struct EnvironmentStack {
    pub app: Application,
    pub env: String,
    pub custom_config: Option<CustomizeEnv>,
    /// Root principal of the account that manages the application
    pub tools_account_principal_arn: String,
}

/// CIDRs of a network the stack creates itself
struct Network {
    vpc_cidr: String,
    public_cidrs: Vec<String>,
    private_cidrs: Vec<String>,
}

impl EnvironmentStack {
    pub fn new(
        app: Application,
        env: impl Into<String>,
        custom_config: Option<CustomizeEnv>,
        tools_account_principal_arn: impl Into<String>,
    ) -> Self {
        Self {
            app,
            env: env.into(),
            custom_config,
            tools_account_principal_arn: tools_account_principal_arn.into(),
        }
    }

    pub fn imports_vpc(&self) -> bool {
        self.custom_config.as_ref().is_some_and(|c| c.import_vpc.is_some())
    }

    /// Public and private subnets the stack creates; zero when the VPC is imported.
    pub fn subnet_counts(&self) -> (usize, usize) {
        if self.imports_vpc() {
            return (0, 0);
        }
        let network = self.network();
        (network.public_cidrs.len(), network.private_cidrs.len())
    }

    fn network(&self) -> Network {
        let adjust = self.custom_config.as_ref().and_then(|c| c.adjust_vpc.as_ref());
        let defaults = |cidrs: &[&str]| cidrs.iter().map(|c| c.to_string()).collect::<Vec<_>>();
        Network {
            vpc_cidr: adjust
                .map(|a| a.cidr.clone())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| DEFAULT_VPC_CIDR.to_string()),
            public_cidrs: adjust
                .map(|a| a.public_subnet_cidrs.clone())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| defaults(&DEFAULT_PUBLIC_SUBNET_CIDRS[..])),
            private_cidrs: adjust
                .map(|a| a.private_subnet_cidrs.clone())
                .filter(|c| !c.is_empty())
                .unwrap_or_else(|| defaults(&DEFAULT_PRIVATE_SUBNET_CIDRS[..])),
        }
    }

    fn render(&self) -> tera::Result<String> {
        let mut tera = Tera::default();
        tera.add_raw_template("environment", ENVIRONMENT_TEMPLATE)?;

        let mut ctx = TeraContext::new();
        ctx.insert("app_name", &self.app.name);
        ctx.insert("env_name", &self.env);
        ctx.insert("version", ENVIRONMENT_TEMPLATE_VERSION);

        let import = self.custom_config.as_ref().and_then(|c| c.import_vpc.as_ref());

        match import {
            Some(vpc) => {
                ctx.insert("import_vpc", &true);
                ctx.insert("vpc_id", &vpc.id);
                ctx.insert("public_subnet_refs", &vpc.public_subnet_ids.join(", "));
                ctx.insert("private_subnet_refs", &vpc.private_subnet_ids.join(", "));
            }
            None => {
                let network = self.network();
                ctx.insert("import_vpc", &false);
                ctx.insert("vpc_cidr", &network.vpc_cidr);
                ctx.insert("public_subnet_refs", &subnet_refs("PublicSubnet", network.public_cidrs.len()));
                ctx.insert("private_subnet_refs", &subnet_refs("PrivateSubnet", network.private_cidrs.len()));
                ctx.insert("public_cidrs", &network.public_cidrs);
                ctx.insert("private_cidrs", &network.private_cidrs);
            }
        }

        tera.render("environment", &ctx)
    }
}

fn subnet_refs(prefix: &str, count: usize) -> String {
    (1..=count)
        .map(|i| format!("!Ref {}{}", prefix, i))
        .collect::<Vec<_>>()
        .join(", ")
}

impl StackConfiguration for EnvironmentStack {
    fn stack_name(&self) -> String {
        stacks::environment(&self.app.name, &self.env)
    }

    fn template(&self) -> anyhow::Result<String> {
        Ok(self.render()?)
    }

    fn parameters(&self) -> Vec<Parameter> {
        let mut params = vec![
            Parameter::new(parameters::APP_NAME, &self.app.name),
            Parameter::new(parameters::ENVIRONMENT_NAME, &self.env),
            Parameter::new(parameters::TOOLS_ACCOUNT_PRINCIPAL_ARN, &self.tools_account_principal_arn),
            Parameter::new(parameters::APP_DNS_NAME, self.app.domain.clone().unwrap_or_default()),
        ];
        params.extend(parameters::MEMBERSHIP.iter().map(|key| Parameter::new(*key, "")));
        params
    }

    fn tags(&self) -> BTreeMap<String, String> {
        let mut tags = self.app.tags.clone();
        tags.insert(APP_TAG_KEY.to_string(), self.app.name.clone());
        tags.insert(ENV_TAG_KEY.to_string(), self.env.clone());
        tags
    }

    fn preserved_on_update(&self) -> &[&'static str] {
        &parameters::MEMBERSHIP
    }
}
