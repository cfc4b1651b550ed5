use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// Envforge - environment and workload stacks on AWS
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Named AWS profile to load credentials from
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// AWS region override
    #[arg(long, global = true)]
    pub region: Option<String>,

    #[command(subcommand)]
    pub mode: Mode,
}

#[derive(Subcommand, Debug)]
pub enum Mode {
    /// Manage environments
    Env {
        #[command(subcommand)]
        command: EnvCommand,
    },

    /// Deploy and remove workload stacks
    Svc {
        #[command(subcommand)]
        command: SvcCommand,
    },

    /// Manage application records
    App {
        #[command(subcommand)]
        command: AppCommand,
    },

    /// Run the environment controller
    Controller {
        #[command(subcommand)]
        command: ControllerCommand,
    },
}

#[derive(Subcommand, Debug)]
pub enum EnvCommand {
    /// Create an environment stack and register it with the application
    Init(InitArgs),

    /// Delete an environment, its stack, and its roles
    Delete {
        /// Application name
        #[arg(short, long)]
        app: String,

        /// Environment name
        #[arg(short, long)]
        name: String,
    },

    /// Show an environment's record, stack tags, template version, and cluster
    Show {
        /// Application name
        #[arg(short, long)]
        app: String,

        /// Environment name
        #[arg(short, long)]
        name: String,

        /// Output format
        #[arg(short, long, default_value = "table")]
        output: String,
    },

    /// List the environments of an application
    Ls {
        /// Application name
        #[arg(short, long)]
        app: String,

        /// Output format
        #[arg(short, long, default_value = "table")]
        output: String,
    },
}

#[derive(ClapArgs, Debug)]
pub struct InitArgs {
    /// Application name
    #[arg(short, long)]
    pub app: String,

    /// Environment name
    #[arg(short, long)]
    pub name: String,

    /// Mark the environment as production
    #[arg(long)]
    pub prod: bool,

    /// Use the default network configuration
    #[arg(long, conflicts_with_all = [
        "import_vpc_id", "import_public_subnets", "import_private_subnets",
        "override_vpc_cidr", "override_public_cidrs", "override_private_cidrs",
    ])]
    pub default_config: bool,

    /// Existing VPC to deploy into
    #[arg(long, conflicts_with_all = ["override_vpc_cidr", "override_public_cidrs", "override_private_cidrs"])]
    pub import_vpc_id: Option<String>,

    /// Existing public subnet IDs, comma separated
    #[arg(long, value_delimiter = ',', conflicts_with_all = ["override_vpc_cidr", "override_public_cidrs", "override_private_cidrs"])]
    pub import_public_subnets: Vec<String>,

    /// Existing private subnet IDs, comma separated
    #[arg(long, value_delimiter = ',', conflicts_with_all = ["override_vpc_cidr", "override_public_cidrs", "override_private_cidrs"])]
    pub import_private_subnets: Vec<String>,

    /// CIDR for the VPC the environment creates
    #[arg(long)]
    pub override_vpc_cidr: Option<String>,

    /// Public subnet CIDRs, comma separated
    #[arg(long, value_delimiter = ',')]
    pub override_public_cidrs: Vec<String>,

    /// Private subnet CIDRs, comma separated
    #[arg(long, value_delimiter = ',')]
    pub override_private_cidrs: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum SvcCommand {
    /// Deploy a rendered workload template into an environment
    Deploy {
        /// Application name
        #[arg(short, long)]
        app: String,

        /// Environment name
        #[arg(short, long)]
        env: String,

        /// Workload name
        #[arg(short, long)]
        name: String,

        /// Path to the rendered template
        #[arg(short, long)]
        template: PathBuf,

        /// Parameter override in the form Key=Value, repeatable
        #[arg(short, long = "param")]
        params: Vec<String>,
    },

    /// Delete a workload stack
    Delete {
        /// Application name
        #[arg(short, long)]
        app: String,

        /// Environment name
        #[arg(short, long)]
        env: String,

        /// Workload name
        #[arg(short, long)]
        name: String,
    },
}

#[derive(Subcommand, Debug)]
pub enum AppCommand {
    /// Write an application record
    Register {
        /// Application name
        #[arg(short, long)]
        name: String,

        /// Account hosting the application-level stacks
        #[arg(long)]
        account: String,

        /// Hosted zone owned by the application
        #[arg(long)]
        domain: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum ControllerCommand {
    /// Serve custom resource requests over HTTP
    Serve {
        /// Listen port (default: ENVFORGE_CONTROLLER_PORT or 8080)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Handle a single custom resource request read from a file
    Invoke {
        /// Path to the request JSON
        #[arg(long)]
        event: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_import_and_override_flags_are_exclusive() {
        let result = Args::try_parse_from([
            "envforge", "env", "init", "--app", "phonetool", "--name", "test",
            "--import-vpc-id", "vpc-1", "--override-vpc-cidr", "10.1.0.0/16",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_default_config_conflicts_with_overrides() {
        let result = Args::try_parse_from([
            "envforge", "env", "init", "--app", "phonetool", "--name", "test",
            "--default-config", "--override-public-cidrs", "10.0.0.0/24",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_subnet_lists_split_on_commas() {
        let args = Args::try_parse_from([
            "envforge", "--region", "us-west-2", "env", "init", "--app", "phonetool", "--name", "test",
            "--import-vpc-id", "vpc-1", "--import-public-subnets", "subnet-1,subnet-2",
        ])
        .unwrap();
        assert_eq!(args.region.as_deref(), Some("us-west-2"));
        let Mode::Env { command: EnvCommand::Init(init) } = args.mode else {
            panic!("expected env init");
        };
        assert_eq!(init.import_public_subnets, vec!["subnet-1", "subnet-2"]);
        assert!(init.import_private_subnets.is_empty());
    }
}
