use std::collections::BTreeSet;

use ledgerkeep_common::Error;
use ledgerkeep_config::DatabaseConfig;
use ledgerkeep_db::{
    Database, LedgerStats, LedgerStatsStore, MigrationRegistry, Migrator, ledger_stats,
};
use rusqlite::Connection;

/// Recorded `(entity, version)` pairs.
fn history(conn: &Connection, migrator: &Migrator<'_>) -> BTreeSet<(String, u32)> {
    migrator
        .history()
        .list_all(conn)
        .unwrap()
        .into_iter()
        .map(|r| (r.entity, r.version))
        .collect()
}

fn key(entity: &str, version: u32) -> (String, u32) {
    (entity.to_string(), version)
}

fn column_names(conn: &Connection, table: &str) -> Vec<String> {
    conn.prepare(&format!("PRAGMA \"app\".table_info({table})"))
        .unwrap()
        .query_map([], |row| row.get(1))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap()
}

fn index_exists(conn: &Connection, name: &str) -> bool {
    conn.query_row(
        "SELECT count(*) > 0 FROM \"app\".sqlite_master WHERE type = 'index' AND name = ?1",
        [name],
        |row| row.get(0),
    )
    .unwrap()
}

#[test]
fn end_to_end_create_then_extend() {
    let db = Database::in_memory("app", "app_owner").unwrap();
    let conn = db.connection().unwrap();
    let migrator = Migrator::new(db.schema());

    let mut registry = MigrationRegistry::new();
    registry
        .register("e", 1, "CREATE TABLE \"app\".e (id INTEGER PRIMARY KEY)")
        .unwrap();
    registry
        .register("e", 2, "ALTER TABLE \"app\".e ADD COLUMN label TEXT")
        .unwrap();

    let first = migrator.run(&conn, &registry).unwrap();
    assert_eq!(first.applied.len(), 2);
    assert_eq!(history(&conn, &migrator), BTreeSet::from([key("e", 1), key("e", 2)]));

    let second = migrator.run(&conn, &registry).unwrap();
    assert!(second.applied.is_empty());
    assert_eq!(history(&conn, &migrator), BTreeSet::from([key("e", 1), key("e", 2)]));

    registry
        .register("e", 3, "CREATE INDEX \"app\".idx_e_label ON e (label)")
        .unwrap();
    let third = migrator.run(&conn, &registry).unwrap();
    assert_eq!(third.applied.len(), 1);
    assert_eq!(third.applied[0].version, 3);
    assert_eq!(third.skipped, 2);
    assert_eq!(
        history(&conn, &migrator),
        BTreeSet::from([key("e", 1), key("e", 2), key("e", 3)])
    );
    assert_eq!(column_names(&conn, "e"), vec!["id", "label"]);
    assert!(index_exists(&conn, "idx_e_label"));
}

#[test]
fn only_unrecorded_versions_execute() {
    let db = Database::in_memory("app", "app_owner").unwrap();
    let conn = db.connection().unwrap();
    let migrator = Migrator::new(db.schema());

    // History already knows versions 1 and 2, whose statements would fail if
    // they ran again.
    migrator.run(&conn, &MigrationRegistry::new()).unwrap();
    conn.execute_batch("CREATE TABLE \"app\".e (id INTEGER PRIMARY KEY);")
        .unwrap();
    migrator.history().record(&conn, "e", 1).unwrap();
    migrator.history().record(&conn, "e", 2).unwrap();

    let mut registry = MigrationRegistry::new();
    registry
        .register("e", 1, "CREATE TABLE \"app\".e (id INTEGER PRIMARY KEY)")
        .unwrap();
    registry.register("e", 2, "THIS IS NOT SQL").unwrap();
    registry
        .register("e", 3, "ALTER TABLE \"app\".e ADD COLUMN label TEXT")
        .unwrap();

    let report = migrator.run(&conn, &registry).unwrap();
    assert_eq!(report.applied.len(), 1);
    assert_eq!(report.applied[0].version, 3);
    assert_eq!(history(&conn, &migrator).len(), 3);
    assert_eq!(column_names(&conn, "e"), vec!["id", "label"]);
}

#[test]
fn failure_stops_before_later_versions() {
    let db = Database::in_memory("app", "app_owner").unwrap();
    let conn = db.connection().unwrap();
    let migrator = Migrator::new(db.schema());

    let mut registry = MigrationRegistry::new();
    registry
        .register("e", 1, "CREATE TABLE \"app\".e (id INTEGER PRIMARY KEY)")
        .unwrap();
    registry
        .register("e", 2, "ALTER TABLE \"app\".e ADD COLUMN label TEXT")
        .unwrap();
    registry
        .register("e", 3, "ALTER TABLE \"app\".missing ADD COLUMN x TEXT")
        .unwrap();
    registry
        .register("e", 4, "CREATE TABLE \"app\".after_failure (x)")
        .unwrap();

    let err = migrator.run(&conn, &registry).unwrap_err();
    assert!(matches!(err, Error::MigrationExecution { version: 3, .. }));
    assert_eq!(history(&conn, &migrator), BTreeSet::from([key("e", 1), key("e", 2)]));
    assert!(column_names(&conn, "after_failure").is_empty());

    // Fixing the statement lets a retry pick up where the run stopped.
    let mut fixed = MigrationRegistry::new();
    fixed
        .register("e", 1, "CREATE TABLE \"app\".e (id INTEGER PRIMARY KEY)")
        .unwrap();
    fixed
        .register("e", 2, "ALTER TABLE \"app\".e ADD COLUMN label TEXT")
        .unwrap();
    fixed
        .register("e", 3, "ALTER TABLE \"app\".e ADD COLUMN x TEXT")
        .unwrap();
    fixed
        .register("e", 4, "CREATE TABLE \"app\".after_failure (x)")
        .unwrap();
    let report = migrator.run(&conn, &fixed).unwrap();
    assert_eq!(report.applied.len(), 2);
    assert_eq!(column_names(&conn, "after_failure"), vec!["x"]);
}

#[test]
fn ledger_stats_schema_and_round_trip() {
    let db = Database::in_memory("app", "app_owner").unwrap();
    let conn = db.connection().unwrap();
    let registry =
        MigrationRegistry::from_entities([ledger_stats::migrations(db.schema())]).unwrap();
    Migrator::new(db.schema()).run(&conn, &registry).unwrap();

    assert!(column_names(&conn, "ledger_stats").contains(&"tampered".to_string()));
    assert!(index_exists(&conn, "idx_ledger_stats_ledger_id"));

    let store = LedgerStatsStore::new(db.schema());
    let created = store
        .create(
            &conn,
            &LedgerStats {
                ledger_id: 11,
                active_sources: 111,
                number_of_entries: 1111,
                total_size_in_bytes: 1024,
                ..Default::default()
            },
        )
        .unwrap();
    let mut changed = created.clone();
    changed.active_sources = 112;
    store.update(&conn, &changed).unwrap();

    let fetched = store.get_by_ledger_id(&conn, 11).unwrap();
    assert_eq!(fetched.id, created.id);
    assert_eq!(fetched.active_sources, 112);
    assert_eq!(fetched.number_of_entries, 1111);
}

#[test]
fn file_backed_history_survives_reconnect() {
    let dir = tempfile::tempdir().unwrap();
    let config = DatabaseConfig {
        data_dir: dir.path().to_path_buf(),
        schema: "app".into(),
        ..Default::default()
    };

    {
        let db = Database::connect(&config).unwrap();
        let conn = db.connection().unwrap();
        let registry =
            MigrationRegistry::from_entities([ledger_stats::migrations(db.schema())]).unwrap();
        let report = Migrator::new(db.schema()).run(&conn, &registry).unwrap();
        assert_eq!(report.applied.len(), 3);
    }

    let db = Database::connect(&config).unwrap();
    let conn = db.connection().unwrap();
    let registry =
        MigrationRegistry::from_entities([ledger_stats::migrations(db.schema())]).unwrap();
    let report = Migrator::new(db.schema()).run(&conn, &registry).unwrap();
    assert!(report.applied.is_empty());
    assert_eq!(report.skipped, 3);
}
