//! MySQL backing engine.
//!
//! Sends the rendered statement to the server and decodes the result set.
//! Table destinations run as CREATE TABLE ... AS so the rows never leave the
//! server; file destinations fetch and hand off to the export writers.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::mysql::MySqlRow;
use sqlx::{MySqlPool, Row};

use crate::backend::{Destination, QueryBackend};
use crate::db::verify_mapping;
use crate::export::{csv_export, xlsx_export};
use crate::matching::{MatchPlan, OutputShape};
use crate::models::{MatchDecision, MatchOutputRow, RecordFields, RecordSource};
use crate::sql::{quote_ident, validate_ident};

pub struct MySqlBackend {
    pool: MySqlPool,
}

impl MySqlBackend {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

fn decode_fields(row: &MySqlRow, prefix: &str) -> Result<RecordFields> {
    let col = |name: &str| format!("{prefix}{name}");
    Ok(RecordFields {
        forename: row.try_get::<Option<String>, _>(col("forename").as_str())?,
        surname: row.try_get::<Option<String>, _>(col("surname").as_str())?,
        dob: row.try_get::<Option<NaiveDate>, _>(col("dob").as_str())?,
        postcode: row.try_get::<Option<String>, _>(col("postcode").as_str())?,
    })
}

fn decode_row(row: &MySqlRow, shape: OutputShape) -> Result<MatchOutputRow> {
    let id_a: i64 = row.try_get("id_a")?;
    let id_b: Option<i64> = row.try_get("id_b")?;
    let label: String = row.try_get("decision")?;
    let decision = MatchDecision::from_label(&label)
        .ok_or_else(|| anyhow!("unrecognized decision label: {}", label))?;
    let (a, b) = match shape {
        OutputShape::Key => (None, None),
        OutputShape::Full => {
            let a = Some(decode_fields(row, "a_")?);
            // augmented rows carry NULLs on the B side
            let b = match id_b {
                Some(_) => Some(decode_fields(row, "b_")?),
                None => None,
            };
            (a, b)
        }
    };
    Ok(MatchOutputRow {
        id_a,
        id_b,
        decision,
        a,
        b,
    })
}

#[async_trait]
impl QueryBackend for MySqlBackend {
    async fn verify_source(&self, source: &RecordSource) -> Result<()> {
        verify_mapping(&self.pool, source).await
    }

    async fn fetch(&self, plan: &MatchPlan) -> Result<Vec<MatchOutputRow>> {
        let sql = plan.sql();
        let rows = sqlx::query(&sql)
            .fetch_all(&self.pool)
            .await
            .context("executing linkage statement")?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(decode_row(row, plan.shape())?);
        }
        Ok(out)
    }

    async fn materialize(&self, plan: &MatchPlan, dest: &Destination) -> Result<u64> {
        match dest {
            Destination::Table(name) => {
                validate_ident("destination.table", name)?;
                let stmt = format!("CREATE TABLE {} AS\n{}", quote_ident(name), plan.sql());
                let result = sqlx::query(&stmt)
                    .execute(&self.pool)
                    .await
                    .with_context(|| format!("creating destination table {}", name))?;
                Ok(result.rows_affected())
            }
            Destination::CsvFile(path) => {
                let rows = self.fetch(plan).await?;
                csv_export::write_csv(path, plan.shape(), &rows)?;
                Ok(rows.len() as u64)
            }
            Destination::XlsxFile(path) => {
                let rows = self.fetch(plan).await?;
                xlsx_export::write_xlsx(path, plan.shape(), &rows)?;
                Ok(rows.len() as u64)
            }
        }
    }
}
