pub mod connection;
pub mod crud;
pub mod history;
pub mod ledger_stats;
pub mod migrations;
pub mod migrator;
pub mod schema;

pub use connection::{ConnectOptions, Database, PooledConnection};
pub use crud::{BindParams, FromRow, LimitAndOffset};
pub use history::{HistoryStore, MigrationRecord};
pub use ledger_stats::{LedgerStats, LedgerStatsStore};
pub use migrations::{MigrationDefinition, MigrationRegistry};
pub use migrator::{MigrationReport, Migrator};
pub use schema::{Schema, SchemaLocation};
