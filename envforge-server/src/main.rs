use anyhow::Result;
use clap::Parser;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod cli;
mod commands;
mod config;
mod db;

use cli::{Args, Mode};
use config::Config;

/// Initialize tracing with two outputs:
/// 1. Console output (stderr) so stdout stays free for command output
/// 2. File output (<home>/envforge.log) in flat text for persistence
fn initialize_tracing(home: &Path) -> Result<WorkerGuard> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "info,\
         envforge_server=debug,\
         envforge_orchestrations=debug,\
         sqlx::query=warn"
            .into()
    });

    std::fs::create_dir_all(home)?;
    let file_appender = tracing_appender::rolling::never(home, "envforge.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer().with_writer(file_writer).with_ansi(false);
    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load()?;
    let args = Args::parse();

    // Dropping the guard stops file logging
    let _guard = initialize_tracing(&config.home)?;

    let aws = commands::AwsOptions {
        profile: args.profile,
        region: args.region,
    };

    match args.mode {
        Mode::Env { command } => commands::environment::handle_command(command, &aws, &config).await,
        Mode::Svc { command } => commands::workload::handle_command(command, &aws, &config).await,
        Mode::App { command } => commands::app::handle_command(command, &config).await,
        Mode::Controller { command } => commands::controller::handle_command(command, &aws, &config).await,
    }
}
