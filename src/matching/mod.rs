//! Plan composition and the query lifecycle.
//!
//! [`compose`] validates the run configuration and produces a
//! [`MatchQuery<Composed>`] holding a [`MatchPlan`]. The plan renders as one
//! SQL statement: normalization CTEs over both sources, an equi-join per
//! blocking rule unioned into a candidate pair set, point columns per field,
//! a tier CASE for the decision, and a final projection in the requested
//! shape. The backing engine executes that statement; no candidate pairs are
//! ever built application-side.
//!
//! The handle is state-typed: only a composed query can be fetched or
//! materialized, and materializing consumes it, yielding a
//! [`MatchQuery<Materialized>`] that knows how many rows were written.

pub mod blocking;
pub(crate) mod helpers;
pub mod output;
pub mod score;

use std::marker::PhantomData;

use crate::backend::{Destination, QueryBackend};
use crate::config::MatchConfig;
use crate::error::ConfigError;
use crate::models::{Field, MatchOutputRow, RecordSource};
use crate::sql::{
    norm_dob_expr, norm_name_expr, norm_postcode_expr, quote_ident, validate_ident,
};

pub use blocking::BlockingRule;
pub use output::OutputShape;
pub use score::{Agreement, NameComparator, TierRule};

/// Everything needed to render and interpret one linkage statement. Backends
/// read it through the accessors; only [`compose`] builds one.
#[derive(Debug, Clone)]
pub struct MatchPlan {
    source_a: RecordSource,
    source_b: RecordSource,
    config: MatchConfig,
    shape: OutputShape,
    include_no_match: bool,
}

impl MatchPlan {
    pub fn source_a(&self) -> &RecordSource {
        &self.source_a
    }

    pub fn source_b(&self) -> &RecordSource {
        &self.source_b
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    pub fn shape(&self) -> OutputShape {
        self.shape
    }

    pub fn include_no_match(&self) -> bool {
        self.include_no_match
    }

    /// Render the full statement. Deterministic for a given plan.
    pub fn sql(&self) -> String {
        let mut sql = String::with_capacity(4096);
        sql.push_str("WITH ");
        sql.push_str(&norm_cte("norm_a", &self.source_a));
        sql.push_str(",\n");
        sql.push_str(&norm_cte("norm_b", &self.source_b));
        sql.push_str(",\n");
        sql.push_str(&self.pairs_cte());
        sql.push_str(",\n");
        sql.push_str(&self.scored_cte());
        sql.push_str(",\n");
        sql.push_str(&self.decided_cte());
        sql.push_str(",\n");
        sql.push_str(
            "kept AS (\n    SELECT id_a, id_b, decision\n    FROM decided\n    WHERE decision <> 'NO_MATCH'\n)\n",
        );
        sql.push_str(&self.final_select());
        sql
    }

    fn pairs_cte(&self) -> String {
        let joins: Vec<String> = self
            .config
            .blocking
            .iter()
            .map(|rule| {
                format!(
                    "    SELECT a.id AS id_a, b.id AS id_b\n    FROM norm_a a\n    INNER JOIN norm_b b ON {} = {}",
                    rule.sql_key_expr("a"),
                    rule.sql_key_expr("b")
                )
            })
            .collect();
        // UNION (not UNION ALL) so a pair blocked by several rules scores once
        format!("pairs AS (\n{}\n)", joins.join("\n    UNION\n"))
    }

    fn scored_cte(&self) -> String {
        let cmp = &self.config.name_comparator;
        format!(
            "scored AS (\n    SELECT\n        p.id_a,\n        p.id_b,\n        {} AS forename_pts,\n        {} AS surname_pts,\n        {} AS dob_pts,\n        {} AS postcode_pts\n    FROM pairs p\n    INNER JOIN norm_a a ON a.id = p.id_a\n    INNER JOIN norm_b b ON b.id = p.id_b\n)",
            cmp.sql_agreement("a.forename", "b.forename"),
            cmp.sql_agreement("a.surname", "b.surname"),
            score::sql_exact_agreement("a.dob", "b.dob"),
            score::sql_exact_agreement("a.postcode", "b.postcode"),
        )
    }

    fn decided_cte(&self) -> String {
        format!(
            "decided AS (\n    SELECT\n        s.id_a,\n        s.id_b,\n        {} AS decision\n    FROM scored s\n)",
            score::sql_decision_case(&self.config.tiers)
        )
    }

    fn final_select(&self) -> String {
        let mut sql = String::new();
        match self.shape {
            OutputShape::Key => {
                sql.push_str("SELECT k.id_a, k.id_b, k.decision\nFROM kept k");
                if self.include_no_match {
                    sql.push_str(
                        "\nUNION ALL\nSELECT a.id AS id_a, NULL AS id_b, 'NO_MATCH' AS decision\nFROM norm_a a\nWHERE a.id NOT IN (SELECT id_a FROM kept)",
                    );
                }
            }
            OutputShape::Full => {
                sql.push_str(
                    "SELECT\n    k.id_a,\n    a.forename_raw AS a_forename,\n    a.surname_raw AS a_surname,\n    a.dob_raw AS a_dob,\n    a.postcode_raw AS a_postcode,\n    k.id_b,\n    b.forename_raw AS b_forename,\n    b.surname_raw AS b_surname,\n    b.dob_raw AS b_dob,\n    b.postcode_raw AS b_postcode,\n    k.decision\nFROM kept k\nINNER JOIN norm_a a ON a.id = k.id_a\nINNER JOIN norm_b b ON b.id = k.id_b",
                );
                if self.include_no_match {
                    sql.push_str(
                        "\nUNION ALL\nSELECT\n    a.id AS id_a,\n    a.forename_raw,\n    a.surname_raw,\n    a.dob_raw,\n    a.postcode_raw,\n    NULL AS id_b,\n    NULL AS b_forename,\n    NULL AS b_surname,\n    NULL AS b_dob,\n    NULL AS b_postcode,\n    'NO_MATCH' AS decision\nFROM norm_a a\nWHERE a.id NOT IN (SELECT id_a FROM kept)",
                    );
                }
            }
        }
        sql.push_str("\nORDER BY id_a, id_b");
        sql
    }
}

/// One normalization CTE: id, the raw mapped columns, and the normalized
/// columns the rest of the statement joins and scores on.
fn norm_cte(name: &str, source: &RecordSource) -> String {
    let m = &source.mapping;
    format!(
        "{name} AS (\n    SELECT\n        {id} AS id,\n        {forename} AS forename_raw,\n        {surname} AS surname_raw,\n        {dob} AS dob_raw,\n        {postcode} AS postcode_raw,\n        {forename_norm} AS forename,\n        {surname_norm} AS surname,\n        {dob_norm} AS dob,\n        {postcode_norm} AS postcode\n    FROM {table}\n)",
        id = quote_ident(&m.id),
        forename = quote_ident(&m.forename),
        surname = quote_ident(&m.surname),
        dob = quote_ident(&m.dob),
        postcode = quote_ident(&m.postcode),
        forename_norm = norm_name_expr(&quote_ident(&m.forename)),
        surname_norm = norm_name_expr(&quote_ident(&m.surname)),
        dob_norm = norm_dob_expr(&quote_ident(&m.dob)),
        postcode_norm = norm_postcode_expr(&quote_ident(&m.postcode)),
        table = quote_ident(&source.table),
    )
}

fn validate_source(side: &'static str, source: &RecordSource) -> Result<(), ConfigError> {
    let table_field = match side {
        "source_a" => "source_a.table",
        _ => "source_b.table",
    };
    validate_ident(table_field, &source.table)?;
    for field in Field::ALL {
        let path: &'static str = match (side, field) {
            ("source_a", Field::Id) => "source_a.id",
            ("source_a", Field::Forename) => "source_a.forename",
            ("source_a", Field::Surname) => "source_a.surname",
            ("source_a", Field::Dob) => "source_a.dob",
            ("source_a", Field::Postcode) => "source_a.postcode",
            (_, Field::Id) => "source_b.id",
            (_, Field::Forename) => "source_b.forename",
            (_, Field::Surname) => "source_b.surname",
            (_, Field::Dob) => "source_b.dob",
            (_, Field::Postcode) => "source_b.postcode",
        };
        validate_ident(path, source.mapping.column(field))?;
    }
    Ok(())
}

/// Validate the whole run configuration and build the plan. Everything that
/// can be rejected is rejected here, before any backend is touched.
pub fn compose(
    source_a: &RecordSource,
    source_b: &RecordSource,
    config: &MatchConfig,
    shape: OutputShape,
    include_no_match: bool,
) -> Result<MatchQuery<Composed>, ConfigError> {
    config.validate()?;
    validate_source("source_a", source_a)?;
    validate_source("source_b", source_b)?;
    Ok(MatchQuery {
        plan: MatchPlan {
            source_a: source_a.clone(),
            source_b: source_b.clone(),
            config: config.clone(),
            shape,
            include_no_match,
        },
        rows_written: 0,
        _state: PhantomData,
    })
}

/// Composed, not yet executed.
pub struct Composed;
/// Executed against a destination.
pub struct Materialized;

/// State-typed handle around a [`MatchPlan`].
pub struct MatchQuery<S> {
    plan: MatchPlan,
    rows_written: u64,
    _state: PhantomData<S>,
}

impl<S> MatchQuery<S> {
    pub fn plan(&self) -> &MatchPlan {
        &self.plan
    }

    pub fn sql(&self) -> String {
        self.plan.sql()
    }
}

impl MatchQuery<Composed> {
    /// Execute the plan and return the assembled rows.
    pub async fn fetch(&self, backend: &dyn QueryBackend) -> anyhow::Result<Vec<MatchOutputRow>> {
        backend.fetch(&self.plan).await
    }

    /// Execute the plan into a destination, consuming the handle.
    pub async fn materialize(
        self,
        backend: &dyn QueryBackend,
        dest: &Destination,
    ) -> anyhow::Result<MatchQuery<Materialized>> {
        let rows_written = backend.materialize(&self.plan, dest).await?;
        Ok(MatchQuery {
            plan: self.plan,
            rows_written,
            _state: PhantomData,
        })
    }
}

impl MatchQuery<Materialized> {
    pub fn rows_written(&self) -> u64 {
        self.rows_written
    }
}
