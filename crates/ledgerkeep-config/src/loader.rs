use std::path::{Path, PathBuf};

use ledgerkeep_common::{Error, Result};
use tracing::{debug, info};

use crate::model::AppConfig;

/// Environment variables that override the `database` section.
const ENV_OVERRIDES: [&str; 7] = [
    "DB_DRIVER",
    "DB_HOST_NAME",
    "DB_USER",
    "DB_PASSWORD",
    "DB_NAME",
    "DB_SCHEMA",
    "DB_DATA_DIR",
];

/// Loads `AppConfig` from an optional file, a `.env` file and the process
/// environment, in that order of increasing precedence.
pub struct ConfigLoader {
    path: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn load(&self) -> Result<AppConfig> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("loaded environment from {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(Error::Config(format!("failed to read .env: {e}"))),
        }

        let mut config = match &self.path {
            Some(path) => {
                info!("loading config from {}", path.display());
                read_config_file(path)?
            }
            None => AppConfig::default(),
        };

        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        validate(&config)?;
        Ok(config)
    }
}

fn read_config_file(path: &Path) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path)?;

    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
    match ext {
        "yml" | "yaml" => serde_yaml::from_str(&contents)
            .map_err(|e| Error::Config(format!("YAML parse error in {}: {e}", path.display()))),
        "toml" => toml::from_str(&contents)
            .map_err(|e| Error::Config(format!("TOML parse error in {}: {e}", path.display()))),
        other => Err(Error::Config(format!(
            "unsupported config extension: {other:?}"
        ))),
    }
}

/// Apply `DB_*` overrides using `lookup` to read variables.
pub fn apply_env_overrides(config: &mut AppConfig, lookup: impl Fn(&str) -> Option<String>) {
    let db = &mut config.database;
    for key in ENV_OVERRIDES {
        let Some(value) = lookup(key) else {
            continue;
        };
        debug!("config override from {key}");
        match key {
            "DB_DRIVER" => db.driver = value,
            "DB_HOST_NAME" => db.host = value,
            "DB_USER" => db.user = value,
            "DB_PASSWORD" => db.password = Some(value).filter(|p| !p.is_empty()),
            "DB_NAME" => db.name = value,
            "DB_SCHEMA" => db.schema = value,
            "DB_DATA_DIR" => db.data_dir = PathBuf::from(value),
            _ => {}
        }
    }
}

fn validate(config: &AppConfig) -> Result<()> {
    let db = &config.database;
    let required = [
        ("database.driver", &db.driver),
        ("database.host", &db.host),
        ("database.user", &db.user),
        ("database.name", &db.name),
        ("database.schema", &db.schema),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            return Err(Error::Config(format!("{field} must not be empty")));
        }
    }
    if db.pool_size == 0 {
        return Err(Error::Config("database.pool_size must be at least 1".into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn write_config(ext: &str, contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(&format!(".{ext}"))
            .tempfile()
            .unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn reads_yaml_config() {
        let file = write_config(
            "yml",
            "database:\n  name: stats\n  schema: audit\nlogging:\n  json: true\n",
        );
        let config = read_config_file(file.path()).unwrap();
        assert_eq!(config.database.name, "stats");
        assert_eq!(config.database.schema, "audit");
        assert!(config.logging.json);
    }

    #[test]
    fn reads_toml_config() {
        let file = write_config(
            "toml",
            "[database]\nuser = \"owner\"\npool_size = 2\n\n[logging]\nlevel = \"debug\"\n",
        );
        let config = read_config_file(file.path()).unwrap();
        assert_eq!(config.database.user, "owner");
        assert_eq!(config.database.pool_size, 2);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn rejects_unknown_extension() {
        let file = write_config("ini", "[database]\n");
        let err = read_config_file(file.path()).unwrap_err();
        assert!(err.to_string().contains("unsupported config extension"));
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let file = write_config("yaml", "database: [unterminated\n");
        assert!(matches!(read_config_file(file.path()), Err(Error::Config(_))));
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let env: HashMap<&str, &str> = [
            ("DB_USER", "migrator"),
            ("DB_PASSWORD", "pw"),
            ("DB_SCHEMA", "ops"),
            ("DB_DATA_DIR", "/var/lib/ledgerkeep"),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        apply_env_overrides(&mut config, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.database.user, "migrator");
        assert_eq!(config.database.password.as_deref(), Some("pw"));
        assert_eq!(config.database.schema, "ops");
        assert_eq!(
            config.database.data_dir,
            PathBuf::from("/var/lib/ledgerkeep")
        );
        assert_eq!(config.database.driver, "sqlite");
    }

    #[test]
    fn empty_password_override_clears_password() {
        let mut config = AppConfig::default();
        config.database.password = Some("old".into());
        apply_env_overrides(&mut config, |key| {
            (key == "DB_PASSWORD").then(String::new)
        });
        assert!(config.database.password.is_none());
    }

    #[test]
    fn validation_rejects_empty_schema_and_zero_pool() {
        let mut config = AppConfig::default();
        config.database.schema = " ".into();
        assert!(validate(&config).is_err());

        let mut config = AppConfig::default();
        config.database.pool_size = 0;
        assert!(validate(&config).is_err());

        assert!(validate(&AppConfig::default()).is_ok());
    }
}
