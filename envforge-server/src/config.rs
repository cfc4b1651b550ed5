use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;

use envforge_orchestrations::stack::WaitConfig;

#[derive(Debug, Clone)]
pub struct Config {
    database_url: Option<String>,
    pub home: PathBuf,
    pub controller_port: u16,
    pub controller_deadline: Duration,
    pub stack_poll_interval: Duration,
    pub stack_wait_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let home = match std::env::var("ENVFORGE_HOME") {
            Ok(home) => PathBuf::from(home),
            Err(_) => default_home(),
        };

        Ok(Self {
            database_url: std::env::var("DATABASE_URL").ok(),
            home,
            controller_port: parse_var("ENVFORGE_CONTROLLER_PORT", 8080)
                .context("ENVFORGE_CONTROLLER_PORT must be a valid port number")?,
            controller_deadline: Duration::from_secs(
                parse_var("ENVFORGE_CONTROLLER_DEADLINE_SECS", 840)
                    .context("ENVFORGE_CONTROLLER_DEADLINE_SECS must be a number of seconds")?,
            ),
            stack_poll_interval: Duration::from_secs(
                parse_var("ENVFORGE_STACK_POLL_SECS", 3)
                    .context("ENVFORGE_STACK_POLL_SECS must be a number of seconds")?,
            ),
            stack_wait_timeout: Duration::from_secs(
                parse_var("ENVFORGE_STACK_WAIT_TIMEOUT_SECS", 3600)
                    .context("ENVFORGE_STACK_WAIT_TIMEOUT_SECS must be a number of seconds")?,
            ),
        })
    }

    /// Only commands that touch the record store need the database.
    pub fn database_url(&self) -> Result<&str> {
        self.database_url.as_deref().context("DATABASE_URL must be set")
    }

    pub fn wait_config(&self) -> WaitConfig {
        WaitConfig {
            poll_interval: self.stack_poll_interval,
            timeout: self.stack_wait_timeout,
        }
    }
}

/// `~/.envforge`, falling back to the working directory without a home.
pub fn default_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home).join(".envforge")
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => Ok(value.trim().parse()?),
        Err(_) => Ok(default),
    }
}
