//! Generic persistence helpers shared by the migration history and the
//! application entities.
//!
//! Entities describe how they bind to a statement ([`BindParams`]) and how
//! they are read back from a row ([`FromRow`]); the helpers here only run the
//! statements. Every failure is reported as [`Error::Persistence`] except the
//! row-count guards, which use [`Error::NotFound`] and
//! [`Error::RowCountMismatch`].

use ledgerkeep_common::{Error, Result};
use rusqlite::types::ToSql;
use rusqlite::{Connection, Params, Row, Transaction};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Named parameters (`:name`) an entity binds into its upsert statement.
pub trait BindParams {
    fn named_params(&self) -> Vec<(&'static str, &dyn ToSql)>;
}

/// Materialize a value from a full row returned by a select.
pub trait FromRow: Sized {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

/// Paging window for list queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitAndOffset {
    pub limit: i64,
    pub offset: i64,
}

impl Default for LimitAndOffset {
    fn default() -> Self {
        Self {
            limit: 100,
            offset: 0,
        }
    }
}

/// Run an insert-or-update statement that returns the row id, then re-select
/// that row so the caller sees what was persisted (defaults, timestamps).
pub fn upsert<A, T>(
    conn: &Connection,
    sql_upsert: &str,
    sql_select_by_id: &str,
    arg: &A,
) -> Result<T>
where
    A: BindParams,
    T: FromRow,
{
    let id = upsert_returning_id(conn, sql_upsert, arg)?;
    select_by_id(conn, sql_select_by_id, id)
}

/// Same as [`upsert`], but inside the caller's transaction so the write
/// commits or rolls back with the rest of it.
pub fn upsert_tx<A, T>(
    tx: &Transaction<'_>,
    sql_upsert: &str,
    sql_select_by_id: &str,
    arg: &A,
) -> Result<T>
where
    A: BindParams,
    T: FromRow,
{
    let id = upsert_returning_id(tx, sql_upsert, arg)?;
    select_by_id(tx, sql_select_by_id, id)
}

/// Run one upsert per element, in order, and return the ids.
///
/// Not atomic: each statement auto-commits, so a failure part-way leaves the
/// earlier elements written and skips the rest.
pub fn upsert_batch<A: BindParams>(
    conn: &Connection,
    sql_upsert: &str,
    args: &[A],
) -> Result<Vec<i64>> {
    if args.is_empty() {
        return Err(Error::Persistence("invalid arguments to upsert: empty batch".into()));
    }

    let mut stmt = conn
        .prepare(sql_upsert)
        .map_err(|e| Error::Persistence(format!("error preparing db upsert: {e}")))?;

    let mut ids = Vec::with_capacity(args.len());
    for (i, arg) in args.iter().enumerate() {
        let params = arg.named_params();
        let id: i64 = stmt
            .query_row(params.as_slice(), |row| row.get(0))
            .map_err(|e| {
                Error::Persistence(format!("error executing db upsert for batch element {i}: {e}"))
            })?;
        ids.push(id);
    }
    debug!("batch upsert wrote {} rows", ids.len());
    Ok(ids)
}

/// Select exactly one row. No match is [`Error::NotFound`].
pub fn select_one<T: FromRow, P: Params>(conn: &Connection, sql: &str, params: P) -> Result<T> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| Error::Persistence(format!("error preparing db select one: {e}")))?;
    stmt.query_row(params, T::from_row).map_err(|e| match e {
        rusqlite::Error::QueryReturnedNoRows => Error::NotFound("no rows returned".into()),
        other => Error::Persistence(format!("error executing db select one: {other}")),
    })
}

pub fn select_many<T: FromRow, P: Params>(
    conn: &Connection,
    sql: &str,
    params: P,
) -> Result<Vec<T>> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| Error::Persistence(format!("error preparing db select: {e}")))?;
    let rows = stmt
        .query_map(params, T::from_row)
        .map_err(|e| Error::Persistence(format!("error executing db select: {e}")))?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Persistence(format!("error reading db row: {e}")))
}

/// Execute a multi-row statement (e.g. a multi-values insert) and return the
/// number of rows it affected.
pub fn execute_many(conn: &Connection, sql: &str) -> Result<usize> {
    conn.execute(sql, [])
        .map_err(|e| Error::Persistence(format!("error executing db multi insert: {e}")))
}

pub fn delete_many<P: Params>(conn: &Connection, sql: &str, params: P) -> Result<usize> {
    conn.execute(sql, params)
        .map_err(|e| Error::Persistence(format!("error deleting many: {e}")))
}

/// Run a single-row update keyed by `id` (bound as `?1`) and check that it
/// touched exactly one row. `operation` names the update in errors.
pub fn update_one(conn: &Connection, sql: &str, operation: &str, id: i64) -> Result<()> {
    let mut stmt = conn.prepare(sql).map_err(|e| {
        Error::Persistence(format!("error preparing db stmt for {operation} ID {id}: {e}"))
    })?;
    let affected = stmt.execute([id]).map_err(|e| {
        Error::Persistence(format!("error executing db stmt for {operation} ID {id}: {e}"))
    })?;

    match affected {
        0 => Err(Error::NotFound(format!("{operation}: ID {id}"))),
        1 => Ok(()),
        n => Err(Error::RowCountMismatch {
            operation: operation.to_string(),
            id,
            affected: n,
        }),
    }
}

fn upsert_returning_id<A: BindParams>(conn: &Connection, sql_upsert: &str, arg: &A) -> Result<i64> {
    let mut stmt = conn
        .prepare(sql_upsert)
        .map_err(|e| Error::Persistence(format!("error preparing named db upsert: {e}")))?;
    let params = arg.named_params();
    stmt.query_row(params.as_slice(), |row| row.get(0))
        .map_err(|e| Error::Persistence(format!("error executing db upsert: {e}")))
}

fn select_by_id<T: FromRow>(conn: &Connection, sql_select_by_id: &str, id: i64) -> Result<T> {
    let mut stmt = conn
        .prepare(sql_select_by_id)
        .map_err(|e| Error::Persistence(format!("error preparing db select by ID: {e}")))?;
    stmt.query_row([id], T::from_row)
        .map_err(|e| Error::Persistence(format!("error executing db select by ID {id}: {e}")))
}
