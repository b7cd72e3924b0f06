//! Identifier hygiene and the SQL rendering of the field normalizers.
//!
//! Every normalizer has two renderings with the same semantics: a scalar one
//! in [`crate::normalize`] and a SQL one here, built from MySQL string
//! functions so the whole transformation runs inside the backing engine.
//! Accent handling is the one deliberate split: the scalar side folds
//! combining marks, the SQL side leans on the accent-insensitive
//! utf8mb4_0900_ai_ci collation for comparisons instead.

use crate::error::ConfigError;

/// Reject identifiers that cannot be embedded safely in generated SQL.
/// Same allowlist as the schema probes: ASCII alphanumerics and underscore.
pub fn validate_ident(field: &'static str, name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::MissingField { field });
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ConfigError::InvalidValue {
            field,
            reason: format!("invalid identifier: {}", name),
        });
    }
    Ok(())
}

/// Backtick-quote an already validated identifier.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name)
}

/// Name normalization in SQL: lowercase, drop dots, dashes to spaces,
/// collapse whitespace, trim. Empty results collapse to NULL so unknowns
/// carry one representation through the rest of the statement.
pub fn norm_name_expr(col: &str) -> String {
    format!(
        "NULLIF(TRIM(REGEXP_REPLACE(REPLACE(REPLACE(LOWER({col}), '.', ''), '-', ' '), '[[:space:]]+', ' ')), '')"
    )
}

/// Postcode normalization in SQL: uppercase, strip everything outside A-Z0-9.
pub fn norm_postcode_expr(col: &str) -> String {
    format!("NULLIF(REGEXP_REPLACE(UPPER({col}), '[^A-Z0-9]', ''), '')")
}

/// Date-of-birth normalization in SQL. DATE() yields NULL for values it
/// cannot read as a calendar date, which is exactly the unknown sentinel.
pub fn norm_dob_expr(col: &str) -> String {
    format!("DATE({col})")
}

/// Quote a single-quoted SQL string literal, doubling embedded quotes.
pub fn quote_str(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
