use anyhow::Result;
use std::collections::BTreeMap;

use envforge_models::Application;
use envforge_orchestrations::store::ConfigStore;

use crate::cli::AppCommand;
use crate::config::Config;
use crate::db;

pub async fn handle_command(command: AppCommand, config: &Config) -> Result<()> {
    match command {
        AppCommand::Register { name, account, domain } => {
            let store = db::connect_store(config.database_url()?).await?;
            let app = Application {
                name,
                account_id: account,
                domain,
                tags: BTreeMap::new(),
            };
            store.create_application(&app).await?;
            println!("✓ Registered application {} in account {}", app.name, app.account_id);
        }
    }
    Ok(())
}
