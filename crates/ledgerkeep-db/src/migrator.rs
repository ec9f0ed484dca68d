//! Applies registered migrations that the history table does not know about.
//!
//! A run goes: ensure the schema, ensure the history table, load the history
//! once, then walk the registry in registration order executing and recording
//! every definition not yet applied. The first failure stops the run.
//!
//! Each statement and its history row are written separately. If the row
//! cannot be written the run fails with
//! [`Error::MigrationPartiallyApplied`] and the next run executes the
//! statement again, so migration statements must tolerate re-execution.

use ledgerkeep_common::{Error, Result};
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::history::{HistoryStore, MigrationRecord, applied_versions};
use crate::migrations::{MigrationDefinition, MigrationRegistry};
use crate::schema::{Schema, ensure_schema};

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MigrationReport {
    /// Records written by this run, in execution order.
    pub applied: Vec<MigrationRecord>,
    /// Definitions that were already applied.
    pub skipped: usize,
}

pub struct Migrator<'a> {
    schema: &'a Schema,
    history: HistoryStore,
}

impl<'a> Migrator<'a> {
    pub fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            history: HistoryStore::new(schema),
        }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    /// Apply every pending migration in `registry` over `conn`.
    ///
    /// Assumes exclusive use of the schema for the duration of the run.
    pub fn run(&self, conn: &Connection, registry: &MigrationRegistry) -> Result<MigrationReport> {
        info!(
            "migrating schema {} ({} registered migrations)",
            self.schema.name(),
            registry.len()
        );

        let pending = self.pending(conn, registry)?;
        let mut report = MigrationReport {
            applied: Vec::with_capacity(pending.len()),
            skipped: registry.len() - pending.len(),
        };

        for definition in pending {
            let record = self.apply(conn, definition)?;
            report.applied.push(record);
        }

        info!(
            applied = report.applied.len(),
            skipped = report.skipped,
            "migrations complete"
        );
        Ok(report)
    }

    /// Set up the schema and history table, then return the definitions a
    /// run would execute, in execution order. Executes no migration.
    pub fn pending<'r>(
        &self,
        conn: &Connection,
        registry: &'r MigrationRegistry,
    ) -> Result<Vec<&'r MigrationDefinition>> {
        ensure_schema(conn, self.schema)?;
        self.history.ensure_table(conn)?;

        let applied = applied_versions(&self.history.list_all(conn)?);

        let pending = registry
            .definitions()
            .iter()
            .filter(|definition| {
                let done = applied
                    .get(&definition.entity)
                    .is_some_and(|versions| versions.contains(&definition.version));
                if done {
                    debug!(
                        entity = %definition.entity,
                        version = definition.version,
                        "migration already applied, skipping"
                    );
                }
                !done
            })
            .collect();
        Ok(pending)
    }

    fn apply(
        &self,
        conn: &Connection,
        definition: &MigrationDefinition,
    ) -> Result<MigrationRecord> {
        info!(
            entity = %definition.entity,
            version = definition.version,
            "executing migration"
        );

        if let Err(e) = conn.execute_batch(&definition.statement) {
            error!(
                entity = %definition.entity,
                version = definition.version,
                "migration failed: {e}"
            );
            return Err(Error::MigrationExecution {
                entity: definition.entity.clone(),
                version: definition.version,
                statement: definition.statement.clone(),
                reason: e.to_string(),
            });
        }

        self.history
            .record(conn, &definition.entity, definition.version)
            .map_err(|e| {
                error!(
                    entity = %definition.entity,
                    version = definition.version,
                    "migration executed but not recorded: {e}"
                );
                Error::MigrationPartiallyApplied {
                    entity: definition.entity.clone(),
                    version: definition.version,
                    statement: definition.statement.clone(),
                    reason: e.to_string(),
                }
            })
    }
}
