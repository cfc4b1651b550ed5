use anyhow::{Context, Result};
use envforge_orchestrations::store::PgConfigStore;

/// Connect to the record store and make sure its tables exist
pub async fn connect_store(db_url: &str) -> Result<PgConfigStore> {
    let store = PgConfigStore::connect(db_url)
        .await
        .context("Failed to connect to the record store")?;

    store
        .ensure_schema()
        .await
        .context("Failed to create the envforge schema")?;

    tracing::debug!("Record store schema ready");

    Ok(store)
}
