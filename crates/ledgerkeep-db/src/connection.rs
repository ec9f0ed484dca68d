//! `SQLite` connection pool shared by the migrator and the entity stores.
//!
//! Uses `r2d2` with the `r2d2_sqlite` backend. Every new connection gets the
//! pragmas below and has the target schema attached, so pooled connections
//! can all address `"<schema>".<table>`.

use std::path::PathBuf;
use std::time::Duration;

use ledgerkeep_common::{Error, Result};
use ledgerkeep_config::DatabaseConfig;
use ledgerkeep_security::InputValidator;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use tracing::info;
use url::Url;

use crate::schema::{self, Schema, SchemaLocation};

pub type ConnectionPool = Pool<SqliteConnectionManager>;

pub type PooledConnection = r2d2::PooledConnection<SqliteConnectionManager>;

/// Connection settings extracted from a connection URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    pub owner: String,
    pub name: String,
    pub schema: String,
}

impl ConnectOptions {
    /// Parse `sqlite://<owner>[:<password>]@<host>/<name>?schema=<schema>`.
    /// Only local SQLite URLs are accepted.
    pub fn from_url(raw: &str) -> Result<Self> {
        let url = Url::parse(raw).map_err(|e| {
            Error::Connection(format!(
                "malformed connection URL {}: {e}",
                InputValidator::redact_url(raw)
            ))
        })?;

        if url.scheme() != "sqlite" {
            return Err(Error::Connection(format!(
                "unsupported database driver {:?}, only sqlite is available",
                url.scheme()
            )));
        }
        match url.host_str() {
            None | Some("") | Some("localhost") => {}
            Some(host) => {
                return Err(Error::Connection(format!(
                    "sqlite databases are local, host {host:?} is not reachable"
                )));
            }
        }

        let owner = url.username().to_string();
        if owner.is_empty() {
            return Err(Error::Connection("connection URL has no user".into()));
        }
        let name = url.path().trim_start_matches('/').to_string();
        if name.is_empty() || name.contains('/') {
            return Err(Error::Connection(format!(
                "connection URL has an invalid database name {name:?}"
            )));
        }
        let schema = url
            .query_pairs()
            .find(|(key, _)| key == "schema")
            .map(|(_, value)| value.into_owned())
            .ok_or_else(|| Error::Connection("connection URL has no schema parameter".into()))?;

        Ok(Self {
            owner,
            name,
            schema,
        })
    }
}

/// Runs on each new pooled connection.
#[derive(Debug)]
struct ConnectionCustomizer {
    schema: Schema,
    busy_timeout_ms: u32,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for ConnectionCustomizer {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(&format!(
            "PRAGMA busy_timeout = {};\
             PRAGMA foreign_keys = ON;",
            self.busy_timeout_ms
        ))?;
        schema::attach(conn, &self.schema)?;
        Ok(())
    }
}

/// Handle to the store: a connection pool plus the validated target schema.
pub struct Database {
    pool: ConnectionPool,
    schema: Schema,
}

impl Database {
    /// Connect using the URL assembled from `config`. Any configuration
    /// problem is reported as [`Error::Connection`] and should abort startup.
    pub fn connect(config: &DatabaseConfig) -> Result<Self> {
        if config.pool_size == 0 {
            return Err(Error::Connection("database.pool_size must be at least 1".into()));
        }
        let raw = config
            .url()
            .map_err(|e| Error::Connection(format!("cannot build connection URL: {e}")))?;
        let options = ConnectOptions::from_url(&raw)?;
        info!("connecting to {}", InputValidator::redact_url(&raw));

        if config.is_in_memory() {
            return Self::in_memory(&options.schema, &options.owner);
        }

        std::fs::create_dir_all(&config.data_dir).map_err(|e| {
            Error::Connection(format!(
                "failed to create data directory {}: {e}",
                config.data_dir.display()
            ))
        })?;
        let db_path: PathBuf = config.data_dir.join(format!("{}.db", options.name));
        let schema_path = config
            .data_dir
            .join(format!("{}.{}.db", options.name, options.schema));
        let schema = Schema::new(
            options.schema,
            options.owner,
            SchemaLocation::File(schema_path),
        )
        .map_err(|e| Error::Connection(e.to_string()))?;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(config.pool_size)
            .connection_timeout(Duration::from_secs(5))
            .max_lifetime(non_zero_secs(config.conn_max_lifetime_secs))
            .idle_timeout(non_zero_secs(config.conn_max_idle_secs))
            .connection_customizer(Box::new(ConnectionCustomizer {
                schema: schema.clone(),
                busy_timeout_ms: config.busy_timeout_ms,
            }))
            .build(manager)
            .map_err(|e| {
                Error::Connection(format!("failed to open {}: {e}", db_path.display()))
            })?;

        info!("opened database at {}", db_path.display());
        Ok(Self { pool, schema })
    }

    /// Single in-memory connection, never recycled, so its data lives as long
    /// as the `Database`.
    pub fn in_memory(schema_name: &str, owner: &str) -> Result<Self> {
        let schema =
            Schema::in_memory(schema_name, owner).map_err(|e| Error::Connection(e.to_string()))?;
        let pool = Pool::builder()
            .max_size(1)
            .connection_timeout(Duration::from_secs(5))
            .max_lifetime(None)
            .idle_timeout(None)
            .connection_customizer(Box::new(ConnectionCustomizer {
                schema: schema.clone(),
                busy_timeout_ms: 5_000,
            }))
            .build(SqliteConnectionManager::memory())
            .map_err(|e| Error::Connection(format!("failed to open in-memory database: {e}")))?;
        Ok(Self { pool, schema })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn connection(&self) -> Result<PooledConnection> {
        self.pool
            .get()
            .map_err(|e| Error::Connection(format!("failed to acquire connection: {e}")))
    }
}

/// r2d2 rejects zero durations; zero means "no limit" in the config.
fn non_zero_secs(secs: u64) -> Option<Duration> {
    (secs > 0).then(|| Duration::from_secs(secs))
}
