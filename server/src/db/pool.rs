//! PostgreSQL pool for the documents table.
//!
//! Every request is a single-row read or upsert, so a handful of
//! connections is enough; requests wait briefly for one rather than
//! opening more.

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::str::FromStr;
use std::time::Duration;

/// Type alias for the database pool.
pub type Pool = PgPool;

/// How long a request waits for a free connection before failing with 500.
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(3);

/// Idle connections are closed after this long.
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Connect to `database_url` with at most `max_connections` connections.
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<Pool, sqlx::Error> {
    let options = PgConnectOptions::from_str(database_url)?.application_name("tally-server");

    PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(1)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .idle_timeout(IDLE_TIMEOUT)
        .connect_with(options)
        .await
}

/// Create or upgrade the documents table from `server/migrations`.
pub async fn run_migrations(pool: &Pool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
