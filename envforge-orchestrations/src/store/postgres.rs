//! Postgres-backed [`ConfigStore`]

use anyhow::Context;
use async_trait::async_trait;
use envforge_models::{Application, CustomizeEnv, EnvironmentRecord};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::collections::BTreeMap;
use tracing::info;

use super::ConfigStore;

const SCHEMA: &[&str] = &[
    "CREATE SCHEMA IF NOT EXISTS envforge",
    r#"
    CREATE TABLE IF NOT EXISTS envforge.applications (
        name TEXT PRIMARY KEY,
        account_id TEXT NOT NULL,
        domain TEXT,
        tags JSONB NOT NULL DEFAULT '{}'::jsonb,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS envforge.environments (
        app TEXT NOT NULL REFERENCES envforge.applications(name),
        name TEXT NOT NULL,
        account_id TEXT NOT NULL,
        region TEXT NOT NULL,
        manager_role_arn TEXT NOT NULL,
        execution_role_arn TEXT NOT NULL,
        prod BOOLEAN NOT NULL DEFAULT FALSE,
        custom_config JSONB,
        created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
        PRIMARY KEY (app, name)
    )
    "#,
];

const ENVIRONMENT_COLUMNS: &str = "app, name, account_id, region, manager_role_arn, execution_role_arn, prod, custom_config::text AS custom_config";

#[derive(Clone)]
pub struct PgConfigStore {
    pool: PgPool,
}

impl PgConfigStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Create the envforge schema and tables when missing.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to create envforge schema")?;
        }
        info!("✓ envforge schema ready");
        Ok(())
    }
}

fn environment_from_row(row: &PgRow) -> anyhow::Result<EnvironmentRecord> {
    let custom_config: Option<String> = row.try_get("custom_config")?;
    let custom_config = custom_config
        .map(|json| serde_json::from_str::<CustomizeEnv>(&json))
        .transpose()
        .context("Failed to decode environment custom config")?;
    Ok(EnvironmentRecord {
        app: row.try_get("app")?,
        name: row.try_get("name")?,
        account_id: row.try_get("account_id")?,
        region: row.try_get("region")?,
        manager_role_arn: row.try_get("manager_role_arn")?,
        execution_role_arn: row.try_get("execution_role_arn")?,
        prod: row.try_get("prod")?,
        custom_config,
    })
}

#[async_trait]
impl ConfigStore for PgConfigStore {
    async fn get_application(&self, name: &str) -> anyhow::Result<Option<Application>> {
        let row = sqlx::query(
            "SELECT name, account_id, domain, tags::text AS tags FROM envforge.applications WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("get application {}", name))?;

        let Some(row) = row else {
            return Ok(None);
        };
        let tags: String = row.try_get("tags")?;
        Ok(Some(Application {
            name: row.try_get("name")?,
            account_id: row.try_get("account_id")?,
            domain: row.try_get("domain")?,
            tags: serde_json::from_str::<BTreeMap<String, String>>(&tags)
                .context("Failed to decode application tags")?,
        }))
    }

    async fn create_application(&self, app: &Application) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO envforge.applications (name, account_id, domain, tags)
            VALUES ($1, $2, $3, $4::jsonb)
            ON CONFLICT (name) DO UPDATE
            SET account_id = EXCLUDED.account_id,
                domain = EXCLUDED.domain,
                tags = EXCLUDED.tags,
                updated_at = NOW()
            "#,
        )
        .bind(&app.name)
        .bind(&app.account_id)
        .bind(&app.domain)
        .bind(serde_json::to_string(&app.tags)?)
        .execute(&self.pool)
        .await
        .with_context(|| format!("store application {}", app.name))?;
        Ok(())
    }

    async fn create_environment(&self, record: &EnvironmentRecord) -> anyhow::Result<()> {
        let custom_config = record.custom_config.as_ref().map(serde_json::to_string).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO envforge.environments
            (app, name, account_id, region, manager_role_arn, execution_role_arn, prod, custom_config)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8::jsonb)
            ON CONFLICT (app, name) DO UPDATE
            SET account_id = EXCLUDED.account_id,
                region = EXCLUDED.region,
                manager_role_arn = EXCLUDED.manager_role_arn,
                execution_role_arn = EXCLUDED.execution_role_arn,
                prod = EXCLUDED.prod,
                custom_config = EXCLUDED.custom_config,
                updated_at = NOW()
            "#,
        )
        .bind(&record.app)
        .bind(&record.name)
        .bind(&record.account_id)
        .bind(&record.region)
        .bind(&record.manager_role_arn)
        .bind(&record.execution_role_arn)
        .bind(record.prod)
        .bind(custom_config)
        .execute(&self.pool)
        .await
        .with_context(|| format!("store environment {}", record.name))?;
        Ok(())
    }

    async fn get_environment(&self, app: &str, name: &str) -> anyhow::Result<Option<EnvironmentRecord>> {
        let query = format!(
            "SELECT {} FROM envforge.environments WHERE app = $1 AND name = $2",
            ENVIRONMENT_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(app)
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("get environment {}", name))?;
        row.as_ref().map(environment_from_row).transpose()
    }

    async fn delete_environment(&self, app: &str, name: &str) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM envforge.environments WHERE app = $1 AND name = $2")
            .bind(app)
            .bind(name)
            .execute(&self.pool)
            .await
            .with_context(|| format!("delete environment {}", name))?;
        Ok(())
    }

    async fn list_environments(&self, app: &str) -> anyhow::Result<Vec<EnvironmentRecord>> {
        let query = format!(
            "SELECT {} FROM envforge.environments WHERE app = $1 ORDER BY name",
            ENVIRONMENT_COLUMNS
        );
        let rows = sqlx::query(&query)
            .bind(app)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("list environments of {}", app))?;
        rows.iter().map(environment_from_row).collect()
    }
}
