use std::sync::LazyLock;

use ledgerkeep_common::{Error, Result};
use regex::Regex;
use tracing::warn;
use url::Url;

/// Identifiers that end up interpolated into SQL (schema names, owners) cannot
/// be bound as parameters, so they must match this pattern first.
static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("valid regex"));

/// Names SQLite reserves for its own databases.
const RESERVED_SCHEMAS: [&str; 2] = ["main", "temp"];

/// Input validation and sanitization for values that reach SQL text or logs.
pub struct InputValidator;

impl InputValidator {
    /// Validate an SQL identifier against the allow-list pattern.
    /// `kind` names the identifier in the error message.
    pub fn validate_identifier(kind: &str, value: &str) -> Result<()> {
        if value.is_empty() {
            return Err(Error::Security(format!("{kind} cannot be empty")));
        }
        if !IDENTIFIER.is_match(value) {
            warn!("rejected {kind} identifier {value:?}");
            return Err(Error::Security(format!(
                "{kind} {value:?} is not a valid identifier (expected [A-Za-z_][A-Za-z0-9_]*, at most 63 characters)"
            )));
        }
        Ok(())
    }

    /// Validate a schema name: a plain identifier that is not one of SQLite's
    /// built-in database names.
    pub fn validate_schema_name(value: &str) -> Result<()> {
        Self::validate_identifier("schema name", value)?;
        if RESERVED_SCHEMAS
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(value))
        {
            return Err(Error::Security(format!(
                "schema name {value:?} is reserved"
            )));
        }
        Ok(())
    }

    /// Replace the password component of a connection URL so it can be logged.
    pub fn redact_url(raw: &str) -> String {
        match Url::parse(raw) {
            Ok(mut url) => {
                if url.password().is_some() {
                    let _ = url.set_password(Some("***"));
                }
                url.to_string()
            }
            Err(_) => "<unparseable url>".to_string(),
        }
    }
}
