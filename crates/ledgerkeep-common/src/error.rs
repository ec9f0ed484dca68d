use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("connection error: {0}")]
    Connection(String),

    /// Creating the schema or the migration history table failed. Nothing else
    /// can run against a half-initialised schema.
    #[error("schema setup error: {0}")]
    SchemaSetup(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    /// A registered migration statement failed. It was not recorded, so the
    /// whole run can be retried.
    #[error("migration {entity} v{version} failed: {reason}")]
    MigrationExecution {
        entity: String,
        version: u32,
        statement: String,
        reason: String,
    },

    /// The statement took effect but its history row could not be written.
    /// A retry re-executes the statement.
    #[error(
        "migration {entity} v{version} executed successfully, but recording it in the history table failed: {reason}"
    )]
    MigrationPartiallyApplied {
        entity: String,
        version: u32,
        statement: String,
        reason: String,
    },

    #[error("duplicate migration: {entity} v{version} is already registered")]
    DuplicateMigration { entity: String, version: u32 },

    #[error("{operation}: id {id} - {affected} rows affected instead of exactly 1")]
    RowCountMismatch {
        operation: String,
        id: i64,
        affected: usize,
    },

    #[error("security error: {0}")]
    Security(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
