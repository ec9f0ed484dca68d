use chrono::{DateTime, Utc};
use ledgerkeep_common::{Error, Result};
use rusqlite::types::ToSql;
use rusqlite::{Connection, Row, Transaction, params};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::crud::{self, BindParams, FromRow, LimitAndOffset};
use crate::migrations::MigrationDefinition;
use crate::schema::{NOW, Schema};

pub const ENTITY: &str = "ledger_stats";

/// Aggregated counters for one ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerStats {
    /// `None` until the row has been persisted.
    pub id: Option<i64>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub ledger_id: i64,
    pub last_insertion_at: Option<DateTime<Utc>>,
    pub active_sources: i64,
    pub number_of_entries: i64,
    pub total_size_in_bytes: i64,
    pub tampered: Option<DateTime<Utc>>,
}

impl BindParams for LedgerStats {
    fn named_params(&self) -> Vec<(&'static str, &dyn ToSql)> {
        vec![
            (":id", &self.id as &dyn ToSql),
            (":ledger_id", &self.ledger_id as &dyn ToSql),
            (":last_insertion_at", &self.last_insertion_at as &dyn ToSql),
            (":active_sources", &self.active_sources as &dyn ToSql),
            (":number_of_entries", &self.number_of_entries as &dyn ToSql),
            (":total_size_in_bytes", &self.total_size_in_bytes as &dyn ToSql),
            (":tampered", &self.tampered as &dyn ToSql),
        ]
    }
}

impl FromRow for LedgerStats {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            created_at: row.get(1)?,
            updated_at: row.get(2)?,
            deleted_at: row.get(3)?,
            ledger_id: row.get(4)?,
            last_insertion_at: row.get(5)?,
            active_sources: row.get(6)?,
            number_of_entries: row.get(7)?,
            total_size_in_bytes: row.get(8)?,
            tampered: row.get(9)?,
        })
    }
}

/// Schema changes for the `ledger_stats` table, in application order.
///
/// Every statement must be safe to run again: a migration whose history row
/// failed to write is executed once more on the next run.
pub fn migrations(schema: &Schema) -> Vec<MigrationDefinition> {
    let table = schema.qualify("ledger_stats");
    vec![
        MigrationDefinition::new(
            ENTITY,
            1,
            format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    created_at TEXT NOT NULL DEFAULT ({NOW}),
                    updated_at TEXT NOT NULL DEFAULT ({NOW}),
                    deleted_at TEXT,
                    ledger_id INTEGER NOT NULL,
                    last_insertion_at TEXT,
                    active_sources INTEGER NOT NULL DEFAULT 0,
                    number_of_entries INTEGER NOT NULL DEFAULT 0,
                    total_size_in_bytes INTEGER NOT NULL DEFAULT 0,
                    tampered TEXT
                );"
            ),
        ),
        MigrationDefinition::new(
            ENTITY,
            2,
            format!(
                "CREATE INDEX IF NOT EXISTS {} ON ledger_stats (tampered);",
                schema.qualify("idx_ledger_stats_tampered")
            ),
        ),
        MigrationDefinition::new(
            ENTITY,
            3,
            format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {} ON ledger_stats (ledger_id);",
                schema.qualify("idx_ledger_stats_ledger_id")
            ),
        ),
    ]
}

const COLUMNS: &str = "id, created_at, updated_at, deleted_at, ledger_id, last_insertion_at, \
     active_sources, number_of_entries, total_size_in_bytes, tampered";

/// Statements for `ledger_stats` in one schema.
///
/// Create and update share one upsert keyed on `id`: a new value binds a
/// NULL id and SQLite assigns one.
pub struct LedgerStatsStore {
    sql_upsert: String,
    sql_select_by_id: String,
    sql_select_by_ledger_id: String,
    sql_list: String,
    sql_mark_tampered: String,
    sql_soft_delete: String,
    sql_purge_deleted: String,
}

impl LedgerStatsStore {
    pub fn new(schema: &Schema) -> Self {
        let table = schema.qualify("ledger_stats");
        Self {
            sql_upsert: format!(
                "INSERT INTO {table} (id, ledger_id, last_insertion_at, active_sources, \
                     number_of_entries, total_size_in_bytes, tampered)
                 VALUES (:id, :ledger_id, :last_insertion_at, :active_sources, \
                     :number_of_entries, :total_size_in_bytes, :tampered)
                 ON CONFLICT (id) DO UPDATE SET
                     ledger_id = excluded.ledger_id,
                     last_insertion_at = excluded.last_insertion_at,
                     active_sources = excluded.active_sources,
                     number_of_entries = excluded.number_of_entries,
                     total_size_in_bytes = excluded.total_size_in_bytes,
                     tampered = excluded.tampered,
                     updated_at = {NOW}
                 RETURNING id"
            ),
            sql_select_by_id: format!(
                "SELECT {COLUMNS} FROM {table} WHERE id = ?1 AND deleted_at IS NULL"
            ),
            sql_select_by_ledger_id: format!(
                "SELECT {COLUMNS} FROM {table} WHERE ledger_id = ?1 AND deleted_at IS NULL"
            ),
            sql_list: format!(
                "SELECT {COLUMNS} FROM {table} WHERE deleted_at IS NULL
                 ORDER BY id LIMIT ?1 OFFSET ?2"
            ),
            sql_mark_tampered: format!(
                "UPDATE {table} SET tampered = {NOW}, updated_at = {NOW}
                 WHERE id = ?1 AND deleted_at IS NULL"
            ),
            sql_soft_delete: format!(
                "UPDATE {table} SET deleted_at = {NOW}, updated_at = {NOW}
                 WHERE id = ?1 AND deleted_at IS NULL"
            ),
            sql_purge_deleted: format!("DELETE FROM {table} WHERE deleted_at IS NOT NULL"),
        }
    }

    /// Insert a new row. Any `id` on `stats` is ignored.
    pub fn create(&self, conn: &Connection, stats: &LedgerStats) -> Result<LedgerStats> {
        let fresh = LedgerStats {
            id: None,
            ..stats.clone()
        };
        let created: LedgerStats =
            crud::upsert(conn, &self.sql_upsert, &self.sql_select_by_id, &fresh)?;
        info!(id = ?created.id, ledger_id = created.ledger_id, "created ledger stats");
        Ok(created)
    }

    /// Same as [`create`](Self::create), inside the caller's transaction.
    pub fn create_tx(&self, tx: &Transaction<'_>, stats: &LedgerStats) -> Result<LedgerStats> {
        let fresh = LedgerStats {
            id: None,
            ..stats.clone()
        };
        crud::upsert_tx(tx, &self.sql_upsert, &self.sql_select_by_id, &fresh)
    }

    /// Insert several rows one by one; returns their ids in input order.
    pub fn create_many(&self, conn: &Connection, batch: &[LedgerStats]) -> Result<Vec<i64>> {
        let fresh: Vec<LedgerStats> = batch
            .iter()
            .map(|stats| LedgerStats {
                id: None,
                ..stats.clone()
            })
            .collect();
        crud::upsert_batch(conn, &self.sql_upsert, &fresh)
    }

    /// Write the mutable fields of an existing row.
    pub fn update(&self, conn: &Connection, stats: &LedgerStats) -> Result<LedgerStats> {
        let id = stats
            .id
            .ok_or_else(|| Error::Persistence("cannot update ledger stats without an id".into()))?;
        // Reject unknown or soft-deleted ids instead of letting the upsert
        // insert them.
        self.get(conn, id)?;
        let updated: LedgerStats =
            crud::upsert(conn, &self.sql_upsert, &self.sql_select_by_id, stats)?;
        info!(id, ledger_id = updated.ledger_id, "updated ledger stats");
        Ok(updated)
    }

    pub fn get(&self, conn: &Connection, id: i64) -> Result<LedgerStats> {
        crud::select_one(conn, &self.sql_select_by_id, params![id]).map_err(|e| match e {
            Error::NotFound(_) => Error::NotFound(format!("ledger stats {id}")),
            other => other,
        })
    }

    pub fn get_by_ledger_id(&self, conn: &Connection, ledger_id: i64) -> Result<LedgerStats> {
        crud::select_one(conn, &self.sql_select_by_ledger_id, params![ledger_id]).map_err(
            |e| match e {
                Error::NotFound(_) => {
                    Error::NotFound(format!("ledger stats for ledger {ledger_id}"))
                }
                other => other,
            },
        )
    }

    pub fn list(&self, conn: &Connection, page: LimitAndOffset) -> Result<Vec<LedgerStats>> {
        crud::select_many(conn, &self.sql_list, params![page.limit, page.offset])
    }

    pub fn mark_tampered(&self, conn: &Connection, id: i64) -> Result<()> {
        crud::update_one(conn, &self.sql_mark_tampered, "mark ledger stats tampered", id)
    }

    pub fn soft_delete(&self, conn: &Connection, id: i64) -> Result<()> {
        crud::update_one(conn, &self.sql_soft_delete, "soft delete ledger stats", id)
    }

    /// Physically remove soft-deleted rows; returns how many were removed.
    pub fn purge_deleted(&self, conn: &Connection) -> Result<usize> {
        crud::delete_many(conn, &self.sql_purge_deleted, [])
    }
}
