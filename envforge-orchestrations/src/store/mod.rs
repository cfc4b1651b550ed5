//! Application and environment record persistence

pub mod postgres;

use async_trait::async_trait;
use envforge_models::{Application, EnvironmentRecord};

pub use postgres::PgConfigStore;

#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get_application(&self, name: &str) -> anyhow::Result<Option<Application>>;

    async fn create_application(&self, app: &Application) -> anyhow::Result<()>;

    /// Upsert keyed by (app, name).
    async fn create_environment(&self, record: &EnvironmentRecord) -> anyhow::Result<()>;

    async fn get_environment(&self, app: &str, name: &str) -> anyhow::Result<Option<EnvironmentRecord>>;

    /// Deleting a missing record succeeds.
    async fn delete_environment(&self, app: &str, name: &str) -> anyhow::Result<()>;

    async fn list_environments(&self, app: &str) -> anyhow::Result<Vec<EnvironmentRecord>>;
}
