use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;

pub type DbPool = Pool<Sqlite>;

pub async fn create_db(path: &Path) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    open(options).await
}

/// Opens a database from a `sqlite:` URL, as written in the config file.
pub async fn connect(url: &str) -> Result<DbPool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
    open(options).await
}

async fn open(options: SqliteConnectOptions) -> Result<DbPool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA busy_timeout = 5000")
        .execute(&pool)
        .await?;

    run_migrations(&pool).await?;

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settlements (
            settlement_id TEXT PRIMARY KEY,
            marketplace TEXT NOT NULL,
            period_start TEXT NOT NULL,
            period_end TEXT NOT NULL,
            total_cents INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS audit_rows (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            invoice_id TEXT NOT NULL,
            marketplace TEXT NOT NULL,
            date TEXT NOT NULL,
            order_id TEXT,
            sku TEXT,
            quantity INTEGER NOT NULL DEFAULT 0,
            description TEXT NOT NULL DEFAULT '',
            net_cents INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_audit_rows_invoice ON audit_rows(invoice_id)")
        .execute(pool)
        .await?;

    // One row per consumed invoice; the UNIQUE columns make claims at-most-once.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settlement_processing (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            settlement_id TEXT NOT NULL UNIQUE,
            invoice_id TEXT NOT NULL UNIQUE,
            processed_at TEXT NOT NULL DEFAULT (datetime('now')),
            FOREIGN KEY (settlement_id) REFERENCES settlements(settlement_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settlement_skips (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            settlement_id TEXT NOT NULL,
            reason TEXT NOT NULL,
            recorded_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settlement_errors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            settlement_id TEXT NOT NULL,
            message TEXT NOT NULL,
            recorded_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
