//! Connections, database bootstrap and embedded migrations.

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use tracing::info;

use crate::config::DbConfig;

/// Migrations embedded at compile time from `crates/storymap-db/migrations/`.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();

/// Tables of the planning graph and its audit log, parents first.
pub const PLANNING_TABLES: &[&str] = &[
    "projects",
    "workflows",
    "workflow_activities",
    "steps",
    "cards",
    "context_artifacts",
    "card_context_artifacts",
    "card_knowledge_items",
    "card_planned_files",
    "planning_actions",
];

pub async fn create_pool(config: &DbConfig) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect(&config.database_url)
        .await
        .with_context(|| format!("failed to connect to {}", config.redacted_url()))?;
    info!(
        url = %config.redacted_url(),
        max_connections = config.max_connections,
        "connected"
    );
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    MIGRATOR
        .run(pool)
        .await
        .context("failed to run database migrations")?;
    info!(migrations = MIGRATOR.iter().count(), "schema up to date");
    Ok(())
}

/// Create the configured database through the server's `postgres`
/// database unless it already exists.
pub async fn ensure_database_exists(config: &DbConfig) -> Result<()> {
    let db_name = config.database_name()?;
    let maintenance = DbConfig {
        database_url: config.maintenance_url(),
        max_connections: 1,
        acquire_timeout: config.acquire_timeout,
    };
    let maint_pool = PgPoolOptions::new()
        .max_connections(maintenance.max_connections)
        .acquire_timeout(maintenance.acquire_timeout)
        .connect(&maintenance.database_url)
        .await
        .with_context(|| format!("failed to connect to {}", maintenance.redacted_url()))?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(db_name)
            .fetch_one(&maint_pool)
            .await
            .context("failed to query pg_database")?;

    if exists {
        info!(db = db_name, "database already exists");
    } else {
        // database_name() only admits [A-Za-z0-9_].
        maint_pool
            .execute(format!("CREATE DATABASE {db_name}").as_str())
            .await
            .with_context(|| format!("failed to create database {db_name}"))?;
        info!(db = db_name, "database created");
    }

    maint_pool.close().await;
    Ok(())
}

/// Row count of every [`PLANNING_TABLES`] entry, in that order. Fails if a
/// table is missing, i.e. migrations have not run.
pub async fn table_counts(pool: &PgPool) -> Result<Vec<(&'static str, i64)>> {
    let mut counts = Vec::with_capacity(PLANNING_TABLES.len());
    for &table in PLANNING_TABLES {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .with_context(|| format!("failed to count rows in {table}"))?;
        counts.push((table, count));
    }
    Ok(counts)
}
