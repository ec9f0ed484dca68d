use std::path::PathBuf;

use ledgerkeep_common::{Error, Result};
use serde::{Deserialize, Serialize};
use url::Url;

/// Top-level configuration, read from `ledgerkeep.yml` / `ledgerkeep.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
}

/// Where the store lives and who owns its schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub driver: String,
    pub host: String,
    /// Role recorded as the owner of the schema.
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Database name. Becomes `<data_dir>/<name>.db`; `:memory:` keeps it in RAM.
    pub name: String,
    pub schema: String,
    pub data_dir: PathBuf,
    pub pool_size: u32,
    pub busy_timeout_ms: u32,
    pub conn_max_lifetime_secs: u64,
    pub conn_max_idle_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: "sqlite".to_string(),
            host: "localhost".to_string(),
            user: "ledgerkeep".to_string(),
            password: None,
            name: "ledgerkeep".to_string(),
            schema: "ledger".to_string(),
            data_dir: PathBuf::from("./data"),
            pool_size: 4,
            busy_timeout_ms: 5_000,
            conn_max_lifetime_secs: 60,
            conn_max_idle_secs: 15,
        }
    }
}

impl DatabaseConfig {
    /// Assemble the single connection URL the db layer connects with:
    /// `<driver>://<user>[:<password>]@<host>/<name>?schema=<schema>`.
    pub fn url(&self) -> Result<String> {
        let mut url = Url::parse(&format!("{}://{}/", self.driver, self.host))
            .map_err(|e| Error::Config(format!("invalid database driver or host: {e}")))?;
        url.set_username(&self.user)
            .map_err(|_| Error::Config("database user cannot be set on this URL".into()))?;
        if let Some(password) = &self.password {
            url.set_password(Some(password))
                .map_err(|_| Error::Config("database password cannot be set on this URL".into()))?;
        }
        url.set_path(&self.name);
        url.query_pairs_mut().append_pair("schema", &self.schema);
        Ok(url.to_string())
    }

    pub fn is_in_memory(&self) -> bool {
        self.name == ":memory:"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
