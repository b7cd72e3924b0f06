use anyhow::{Context, Result, bail};
use sqlx::{MySqlPool, Row};

use crate::models::{Field, RecordSource};
use crate::sql::quote_ident;

fn check_ident(name: &str) -> Result<()> {
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        bail!("Invalid identifier: {}", name);
    }
    Ok(())
}

/// Column names of a table, in ordinal order.
pub async fn discover_table_columns(
    pool: &MySqlPool,
    database: &str,
    table: &str,
) -> Result<Vec<String>> {
    check_ident(database)?;
    check_ident(table)?;

    let rows = sqlx::query(
        r#"SELECT COLUMN_NAME FROM INFORMATION_SCHEMA.COLUMNS
            WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?
            ORDER BY ORDINAL_POSITION"#,
    )
    .bind(database)
    .bind(table)
    .fetch_all(pool)
    .await
    .with_context(|| format!("Failed to query columns for {}.{}", database, table))?;

    // Some hosts return zero INFORMATION_SCHEMA rows even when the table
    // exists; DESCRIBE keeps execution unblocked.
    if rows.is_empty() {
        let rows = sqlx::query(&format!(
            "DESCRIBE {}.{}",
            quote_ident(database),
            quote_ident(table)
        ))
        .fetch_all(pool)
        .await
        .with_context(|| format!("DESCRIBE fallback failed for {}.{}", database, table))?;
        let mut columns = Vec::new();
        for r in rows {
            let name: String = r.try_get("Field")?;
            columns.push(name);
        }
        return Ok(columns);
    }

    let mut columns = Vec::new();
    for r in rows {
        let name: String = r.try_get("COLUMN_NAME")?;
        columns.push(name);
    }
    Ok(columns)
}

/// Database selected by the pooled connection.
pub async fn current_database(pool: &MySqlPool) -> Result<String> {
    let row = sqlx::query("SELECT DATABASE() as db")
        .fetch_one(pool)
        .await
        .context("Failed to query current database name")?;
    let db: String = row
        .try_get("db")
        .context("Failed to read database name from query result")?;
    Ok(db)
}

/// Check that every mapped column exists on the source table. Run before
/// composing so a typo fails with a named column instead of a server error
/// out of the middle of the statement.
pub async fn verify_mapping(pool: &MySqlPool, source: &RecordSource) -> Result<()> {
    let database = current_database(pool).await?;
    let columns = discover_table_columns(pool, &database, &source.table).await?;
    if columns.is_empty() {
        bail!("table {} not found in {}", source.table, database);
    }
    let mut missing = Vec::new();
    for field in Field::ALL {
        let col = source.mapping.column(field);
        if !columns.iter().any(|c| c.eq_ignore_ascii_case(col)) {
            missing.push(format!("{} ({})", col, field.name()));
        }
    }
    if !missing.is_empty() {
        bail!(
            "table {} is missing mapped columns: {}",
            source.table,
            missing.join(", ")
        );
    }
    Ok(())
}

pub async fn count_rows(pool: &MySqlPool, table: &str) -> Result<i64> {
    check_ident(table)?;
    let sql = format!("SELECT COUNT(*) as cnt FROM {}", quote_ident(table));
    let row = sqlx::query(&sql).fetch_one(pool).await?;
    let cnt: i64 = row.try_get("cnt")?;
    Ok(cnt)
}
