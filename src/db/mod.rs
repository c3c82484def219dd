mod models;
mod seeders;

pub use models::*;
pub use seeders::seed_categories;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

use crate::config::Config;

pub type DbPool = SqlitePool;

/// Split a migration file into statements, dropping `--` comment lines
fn split_statements(sql: &str) -> Vec<String> {
    sql.split(';')
        .map(|statement| {
            statement
                .lines()
                .filter(|line| !line.trim().starts_with("--"))
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string()
        })
        .filter(|statement| !statement.is_empty())
        .collect()
}

/// Execute a SQL migration file, properly handling comments
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<()> {
    for statement in split_statements(sql) {
        sqlx::query(&statement).execute(pool).await?;
    }
    Ok(())
}

pub async fn init(config: &Config) -> Result<DbPool> {
    let url = config.database.connection_url(&config.server.data_dir);
    info!("Initializing database at {}", url);

    let pool = connect(&url, config.database.max_connections).await?;
    run_migrations(&pool).await?;
    seeders::seed_categories(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

/// Open a pool with WAL, NORMAL sync and foreign keys applied on every connection
pub async fn connect(url: &str, max_connections: u32) -> Result<DbPool> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);

    let mut pool_options = SqlitePoolOptions::new().max_connections(max_connections);
    if url.contains(":memory:") {
        // Each in-memory connection is its own database; keep exactly one alive
        pool_options = pool_options
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None);
    }

    Ok(pool_options.connect_with(options).await?)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    // Migration 001: Users, sessions, password reset tokens
    execute_sql(pool, include_str!("../../migrations/001_initial.sql")).await?;

    // Migration 002: Categories, books, videos
    let has_books_table: Option<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type='table' AND name='books'"
    )
    .fetch_optional(pool)
    .await?;
    if has_books_table.is_none() {
        execute_sql(pool, include_str!("../../migrations/002_catalog.sql")).await?;
    }

    // Migration 003: Orders and order items
    let has_orders_table: Option<(String,)> = sqlx::query_as(
        "SELECT name FROM sqlite_master WHERE type='table' AND name='orders'"
    )
    .fetch_optional(pool)
    .await?;
    if has_orders_table.is_none() {
        execute_sql(pool, include_str!("../../migrations/003_orders.sql")).await?;
    }

    // Migration 004: Uploaded thumbnail path on videos
    let has_thumbnail_file: Option<(String,)> = sqlx::query_as(
        "SELECT name FROM pragma_table_info('videos') WHERE name = 'thumbnail_file'"
    )
    .fetch_optional(pool)
    .await?;
    if has_thumbnail_file.is_none() {
        execute_sql(pool, include_str!("../../migrations/004_video_thumbnail_file.sql")).await?;
    }

    info!("Migrations completed");
    Ok(())
}

/// Fresh in-memory database with the full schema, for tests
#[cfg(test)]
pub async fn test_pool() -> DbPool {
    let pool = connect("sqlite::memory:", 1).await.unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}
