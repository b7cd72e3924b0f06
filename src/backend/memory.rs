//! In-memory backing engine.
//!
//! Interprets composed plans over rows held in process, using the scalar
//! renderings of the normalizers, blocking keys and comparators. This is how
//! linkage semantics get exercised end to end without a server; production
//! runs go through the MySQL backend and the rendered statement.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::backend::{Destination, QueryBackend};
use crate::export::{csv_export, xlsx_export};
use crate::matching::score::{decide, exact_agreement};
use crate::matching::{MatchPlan, OutputShape};
use crate::models::{Field, MatchDecision, MatchOutputRow, RecordFields, RecordSource};
use crate::normalize::{normalize_dob, normalize_name, normalize_postcode};
use crate::sql::validate_ident;

/// One stored cell. Sources usually hold Int ids, Text names and either
/// Date or Text dates.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Int(i64),
    Text(String),
    Date(NaiveDate),
}

impl CellValue {
    fn as_text(&self) -> Option<String> {
        match self {
            CellValue::Null => None,
            CellValue::Int(v) => Some(v.to_string()),
            CellValue::Text(s) => Some(s.clone()),
            CellValue::Date(d) => Some(d.to_string()),
        }
    }

    /// Date reading with DATE() semantics: typed dates pass through, text
    /// is parsed, anything else is NULL.
    fn as_date(&self) -> Option<NaiveDate> {
        match self {
            CellValue::Date(d) => Some(*d),
            CellValue::Text(s) => normalize_dob(Some(s)),
            _ => None,
        }
    }
}

impl From<i64> for CellValue {
    fn from(v: i64) -> Self {
        CellValue::Int(v)
    }
}

impl From<&str> for CellValue {
    fn from(v: &str) -> Self {
        CellValue::Text(v.to_string())
    }
}

impl From<String> for CellValue {
    fn from(v: String) -> Self {
        CellValue::Text(v)
    }
}

impl From<NaiveDate> for CellValue {
    fn from(v: NaiveDate) -> Self {
        CellValue::Date(v)
    }
}

impl<T: Into<CellValue>> From<Option<T>> for CellValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(CellValue::Null)
    }
}

pub type Row = HashMap<String, CellValue>;

struct SourceRecord {
    id: i64,
    raw: RecordFields,
    norm: RecordFields,
}

#[derive(Default)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<String, Vec<Row>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append rows to a table, creating it if absent.
    pub fn insert_rows(&self, table: &str, rows: Vec<Row>) {
        let mut tables = self.tables.write().expect("table store lock poisoned");
        tables.entry(table.to_string()).or_default().extend(rows);
    }

    pub fn table(&self, name: &str) -> Option<Vec<Row>> {
        let tables = self.tables.read().expect("table store lock poisoned");
        tables.get(name).cloned()
    }

    fn load_source(&self, source: &RecordSource) -> Result<Vec<SourceRecord>> {
        let tables = self.tables.read().expect("table store lock poisoned");
        let rows = tables
            .get(&source.table)
            .ok_or_else(|| anyhow!("unknown table: {}", source.table))?;
        let m = &source.mapping;
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let id = match row.get(m.id.as_str()) {
                Some(CellValue::Int(v)) => *v,
                other => bail!(
                    "id column `{}` in `{}` must hold an integer, got {:?}",
                    m.id,
                    source.table,
                    other
                ),
            };
            let raw = RecordFields {
                forename: row.get(m.forename.as_str()).and_then(CellValue::as_text),
                surname: row.get(m.surname.as_str()).and_then(CellValue::as_text),
                dob: row.get(m.dob.as_str()).and_then(CellValue::as_date),
                postcode: row.get(m.postcode.as_str()).and_then(CellValue::as_text),
            };
            let norm = RecordFields {
                forename: normalize_name(raw.forename.as_deref()),
                surname: normalize_name(raw.surname.as_deref()),
                dob: raw.dob,
                postcode: normalize_postcode(raw.postcode.as_deref()),
            };
            out.push(SourceRecord { id, raw, norm });
        }
        Ok(out)
    }

    fn run_plan(&self, plan: &MatchPlan) -> Result<Vec<MatchOutputRow>> {
        let recs_a = self.load_source(plan.source_a())?;
        let recs_b = self.load_source(plan.source_b())?;

        // same pair set as the unioned equi-joins: index B per rule, probe A
        let mut pairs: HashSet<(usize, usize)> = HashSet::new();
        for rule in &plan.config().blocking {
            let mut index: HashMap<String, Vec<usize>> = HashMap::new();
            for (j, b) in recs_b.iter().enumerate() {
                index.entry(rule.key(&b.norm)).or_default().push(j);
            }
            for (i, a) in recs_a.iter().enumerate() {
                if let Some(js) = index.get(&rule.key(&a.norm)) {
                    for &j in js {
                        pairs.insert((i, j));
                    }
                }
            }
        }

        let cmp = plan.config().name_comparator;
        let mut rows: Vec<MatchOutputRow> = Vec::new();
        let mut matched_a: HashSet<i64> = HashSet::new();
        for &(i, j) in &pairs {
            let a = &recs_a[i];
            let b = &recs_b[j];
            let fields = [
                cmp.compare(a.norm.forename.as_deref(), b.norm.forename.as_deref()),
                cmp.compare(a.norm.surname.as_deref(), b.norm.surname.as_deref()),
                exact_agreement(a.norm.dob.as_ref(), b.norm.dob.as_ref()),
                exact_agreement(a.norm.postcode.as_deref(), b.norm.postcode.as_deref()),
            ];
            let decision = decide(&plan.config().tiers, &fields);
            if !decision.is_match() {
                continue;
            }
            matched_a.insert(a.id);
            rows.push(shape_row(plan.shape(), a, Some(b), decision));
        }
        if plan.include_no_match() {
            for a in &recs_a {
                if !matched_a.contains(&a.id) {
                    rows.push(shape_row(plan.shape(), a, None, MatchDecision::NoMatch));
                }
            }
        }
        rows.sort_by(|x, y| (x.id_a, x.id_b).cmp(&(y.id_a, y.id_b)));
        Ok(rows)
    }
}

fn shape_row(
    shape: OutputShape,
    a: &SourceRecord,
    b: Option<&SourceRecord>,
    decision: MatchDecision,
) -> MatchOutputRow {
    match shape {
        OutputShape::Key => MatchOutputRow {
            id_a: a.id,
            id_b: b.map(|b| b.id),
            decision,
            a: None,
            b: None,
        },
        OutputShape::Full => MatchOutputRow {
            id_a: a.id,
            id_b: b.map(|b| b.id),
            decision,
            a: Some(a.raw.clone()),
            b: b.map(|b| b.raw.clone()),
        },
    }
}

fn stored_row(shape: OutputShape, row: &MatchOutputRow) -> Row {
    let mut cells = Row::new();
    cells.insert("id_a".into(), CellValue::Int(row.id_a));
    cells.insert("id_b".into(), row.id_b.into());
    cells.insert("decision".into(), CellValue::Text(row.decision.label()));
    if shape == OutputShape::Full {
        store_fields(&mut cells, "a_", row.a.as_ref());
        store_fields(&mut cells, "b_", row.b.as_ref());
    }
    cells
}

fn store_fields(cells: &mut Row, prefix: &str, fields: Option<&RecordFields>) {
    let f = fields.cloned().unwrap_or_default();
    cells.insert(format!("{prefix}forename"), f.forename.into());
    cells.insert(format!("{prefix}surname"), f.surname.into());
    cells.insert(format!("{prefix}dob"), f.dob.into());
    cells.insert(format!("{prefix}postcode"), f.postcode.into());
}

#[async_trait]
impl QueryBackend for MemoryBackend {
    async fn verify_source(&self, source: &RecordSource) -> Result<()> {
        let tables = self.tables.read().expect("table store lock poisoned");
        let rows = tables
            .get(&source.table)
            .ok_or_else(|| anyhow!("unknown table: {}", source.table))?;
        // Rows define the columns here; an empty table has nothing to check.
        if let Some(first) = rows.first() {
            let missing: Vec<&str> = Field::ALL
                .iter()
                .map(|f| source.mapping.column(*f))
                .filter(|col| !first.contains_key(*col))
                .collect();
            if !missing.is_empty() {
                bail!(
                    "table {} is missing mapped columns: {}",
                    source.table,
                    missing.join(", ")
                );
            }
        }
        Ok(())
    }

    async fn fetch(&self, plan: &MatchPlan) -> Result<Vec<MatchOutputRow>> {
        self.run_plan(plan)
    }

    async fn materialize(&self, plan: &MatchPlan, dest: &Destination) -> Result<u64> {
        let rows = self.run_plan(plan)?;
        let count = rows.len() as u64;
        match dest {
            Destination::Table(name) => {
                validate_ident("destination.table", name)?;
                let stored: Vec<Row> = rows.iter().map(|r| stored_row(plan.shape(), r)).collect();
                let mut tables = self.tables.write().expect("table store lock poisoned");
                if tables.contains_key(name) {
                    bail!("table already exists: {}", name);
                }
                tables.insert(name.clone(), stored);
            }
            Destination::CsvFile(path) => csv_export::write_csv(path, plan.shape(), &rows)?,
            Destination::XlsxFile(path) => xlsx_export::write_xlsx(path, plan.shape(), &rows)?,
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MatchConfig;
    use crate::matching::compose;
    use crate::models::FieldMapping;

    fn person(id: i64, forename: &str, surname: &str, dob: Option<&str>, postcode: &str) -> Row {
        let mut row = Row::new();
        row.insert("id".into(), id.into());
        row.insert("forename".into(), forename.into());
        row.insert("surname".into(), surname.into());
        row.insert(
            "dob".into(),
            dob.map(CellValue::from).unwrap_or(CellValue::Null),
        );
        row.insert("postcode".into(), postcode.into());
        row
    }

    fn sources() -> (RecordSource, RecordSource) {
        (
            RecordSource::new("side_a", FieldMapping::default()),
            RecordSource::new("side_b", FieldMapping::default()),
        )
    }

    fn backend_with(rows_a: Vec<Row>, rows_b: Vec<Row>) -> MemoryBackend {
        let backend = MemoryBackend::new();
        backend.insert_rows("side_a", rows_a);
        backend.insert_rows("side_b", rows_b);
        backend
    }

    #[tokio::test]
    async fn test_exact_pair_matches() {
        let backend = backend_with(
            vec![person(1, "Ann", "Smith", Some("1980-02-03"), "AB1 2CD")],
            vec![person(10, "ann", "SMITH", Some("1980-02-03"), "ab12cd")],
        );
        let (a, b) = sources();
        let q = compose(&a, &b, &MatchConfig::default(), OutputShape::Key, false).unwrap();
        let rows = q.fetch(&backend).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id_a, 1);
        assert_eq!(rows[0].id_b, Some(10));
        assert_eq!(rows[0].decision, MatchDecision::Match);
    }

    #[tokio::test]
    async fn test_fuzzy_forename_drops_a_tier() {
        let backend = backend_with(
            vec![person(1, "Anne", "Smith", Some("1980-02-03"), "AB12CD")],
            vec![person(10, "Ann", "Smith", Some("1980-02-03"), "AB12CD")],
        );
        let (a, b) = sources();
        let q = compose(&a, &b, &MatchConfig::default(), OutputShape::Key, false).unwrap();
        let rows = q.fetch(&backend).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].decision, MatchDecision::Tier(2));
    }

    #[tokio::test]
    async fn test_three_agreements_land_in_third_tier() {
        let backend = backend_with(
            vec![person(1, "Zebedee", "Smith", Some("1980-02-03"), "AB12CD")],
            vec![person(10, "Ann", "Smith", Some("1980-02-03"), "AB12CD")],
        );
        let (a, b) = sources();
        let q = compose(&a, &b, &MatchConfig::default(), OutputShape::Key, false).unwrap();
        let rows = q.fetch(&backend).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].decision, MatchDecision::Tier(3));
    }

    #[tokio::test]
    async fn test_disjoint_records_never_pair() {
        let backend = backend_with(
            vec![person(1, "Ann", "Smith", Some("1980-02-03"), "AB12CD")],
            vec![person(10, "Bob", "Jones", Some("1971-11-30"), "ZZ99ZZ")],
        );
        let (a, b) = sources();
        let q = compose(&a, &b, &MatchConfig::default(), OutputShape::Key, false).unwrap();
        assert!(q.fetch(&backend).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_dob_pair_blocks_on_sentinel() {
        // both sides missing dob: the surname-dob key still collides on the
        // surname half, and the missing field scores as disagreement
        let backend = backend_with(
            vec![person(1, "Anne", "Smith", None, "AB12CD")],
            vec![person(10, "Ann", "Smith", None, "AB12CD")],
        );
        let (a, b) = sources();
        let q = compose(&a, &b, &MatchConfig::default(), OutputShape::Key, false).unwrap();
        let rows = q.fetch(&backend).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].decision, MatchDecision::Tier(3));
    }

    #[tokio::test]
    async fn test_augmentation_never_masks_a_matched_id() {
        let backend = backend_with(
            vec![
                person(1, "Ann", "Smith", Some("1980-02-03"), "AB12CD"),
                person(2, "Carol", "Unseen", Some("1999-09-09"), "XX00XX"),
            ],
            vec![
                person(10, "Ann", "Smith", Some("1980-02-03"), "AB12CD"),
                person(11, "Ann", "Smith", Some("1980-02-03"), "EF34GH"),
            ],
        );
        let (a, b) = sources();
        let q = compose(&a, &b, &MatchConfig::default(), OutputShape::Key, true).unwrap();
        let rows = q.fetch(&backend).await.unwrap();

        // id 1 matched twice, id 2 not at all
        let for_one: Vec<_> = rows.iter().filter(|r| r.id_a == 1).collect();
        assert_eq!(for_one.len(), 2);
        assert!(for_one.iter().all(|r| r.id_b.is_some()));

        let for_two: Vec<_> = rows.iter().filter(|r| r.id_a == 2).collect();
        assert_eq!(for_two.len(), 1);
        assert_eq!(for_two[0].id_b, None);
        assert_eq!(for_two[0].decision, MatchDecision::NoMatch);
    }

    #[tokio::test]
    async fn test_shapes_agree_on_pairs() {
        let backend = backend_with(
            vec![person(1, "Ann", "Smith", Some("1980-02-03"), "AB1 2CD")],
            vec![person(10, "Ann", "Smith", Some("1980-02-03"), "AB12CD")],
        );
        let (a, b) = sources();
        let cfg = MatchConfig::default();
        let key_rows = compose(&a, &b, &cfg, OutputShape::Key, false)
            .unwrap()
            .fetch(&backend)
            .await
            .unwrap();
        let full_rows = compose(&a, &b, &cfg, OutputShape::Full, false)
            .unwrap()
            .fetch(&backend)
            .await
            .unwrap();

        let keys: Vec<_> = key_rows.iter().map(|r| (r.id_a, r.id_b, r.decision)).collect();
        let fulls: Vec<_> = full_rows.iter().map(|r| (r.id_a, r.id_b, r.decision)).collect();
        assert_eq!(keys, fulls);

        assert!(key_rows[0].a.is_none());
        let a_fields = full_rows[0].a.as_ref().unwrap();
        // raw values, not normalized ones
        assert_eq!(a_fields.forename.as_deref(), Some("Ann"));
        assert_eq!(a_fields.postcode.as_deref(), Some("AB1 2CD"));
        assert!(full_rows[0].b.is_some());
    }

    #[tokio::test]
    async fn test_rows_come_back_ordered() {
        let backend = backend_with(
            vec![
                person(3, "Ann", "Smith", Some("1980-02-03"), "AB12CD"),
                person(1, "Ann", "Smith", Some("1980-02-03"), "AB12CD"),
                person(2, "Nobody", "Here", Some("1944-04-04"), "QQ11QQ"),
            ],
            vec![
                person(20, "Ann", "Smith", Some("1980-02-03"), "AB12CD"),
                person(10, "Ann", "Smith", Some("1980-02-03"), "AB12CD"),
            ],
        );
        let (a, b) = sources();
        let q = compose(&a, &b, &MatchConfig::default(), OutputShape::Key, true).unwrap();
        let rows = q.fetch(&backend).await.unwrap();
        let order: Vec<_> = rows.iter().map(|r| (r.id_a, r.id_b)).collect();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);

        let again = q.fetch(&backend).await.unwrap();
        assert_eq!(rows, again);
    }

    #[tokio::test]
    async fn test_materialize_into_table() {
        let backend = backend_with(
            vec![person(1, "Ann", "Smith", Some("1980-02-03"), "AB12CD")],
            vec![person(10, "Ann", "Smith", Some("1980-02-03"), "AB12CD")],
        );
        let (a, b) = sources();
        let q = compose(&a, &b, &MatchConfig::default(), OutputShape::Key, false).unwrap();
        let done = q
            .materialize(&backend, &Destination::Table("linked".into()))
            .await
            .unwrap();
        assert_eq!(done.rows_written(), 1);

        let stored = backend.table("linked").unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(
            stored[0].get("decision"),
            Some(&CellValue::Text("MATCH".into()))
        );

        // destination already exists now
        let q = compose(&a, &b, &MatchConfig::default(), OutputShape::Key, false).unwrap();
        let err = q
            .materialize(&backend, &Destination::Table("linked".into()))
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_unknown_table_is_reported() {
        let backend = MemoryBackend::new();
        let (a, b) = sources();
        let q = compose(&a, &b, &MatchConfig::default(), OutputShape::Key, false).unwrap();
        let err = q.fetch(&backend).await.unwrap_err();
        assert!(err.to_string().contains("unknown table"));
    }

    #[tokio::test]
    async fn test_non_integer_id_is_reported() {
        let mut bad = person(1, "Ann", "Smith", None, "AB12CD");
        bad.insert("id".into(), "one".into());
        let backend = backend_with(vec![bad], vec![]);
        let (a, b) = sources();
        let q = compose(&a, &b, &MatchConfig::default(), OutputShape::Key, false).unwrap();
        let err = q.fetch(&backend).await.unwrap_err();
        assert!(err.to_string().contains("must hold an integer"));
    }

    #[tokio::test]
    async fn test_verify_source_checks_tables_and_columns() {
        let backend = MemoryBackend::new();
        let (a, b) = sources();

        let err = backend.verify_source(&a).await.unwrap_err();
        assert!(err.to_string().contains("unknown table"));

        let mut partial = Row::new();
        partial.insert("id".into(), 1i64.into());
        partial.insert("forename".into(), "Ann".into());
        partial.insert("surname".into(), "Smith".into());
        partial.insert("dob".into(), CellValue::Null);
        backend.insert_rows("side_a", vec![partial]);
        let err = backend.verify_source(&a).await.unwrap_err();
        assert!(err.to_string().contains("missing mapped columns"));
        assert!(err.to_string().contains("postcode"));

        backend.insert_rows("side_b", vec![person(10, "Bea", "Jones", None, "ZZ1 1ZZ")]);
        backend.verify_source(&b).await.unwrap();
    }

    // Five rows a side: one A row pairs with exactly one B row under different
    // ids and raw spellings, the rest of A matches nothing anywhere.
    #[tokio::test]
    async fn test_end_to_end_linkage_fixture() {
        let backend = backend_with(
            vec![
                person(1, "José", "Garcia-Lopez", Some("1985-06-15"), "SW1A 1AA"),
                person(2, "Brian", "Cole", Some("1960-01-01"), "BC1 1AA"),
                person(3, "Diana", "Fox", Some("1973-09-09"), "DF2 2BB"),
                person(4, "Edward", "Gray", Some("1988-12-25"), "EG3 3CC"),
                person(5, "Frank", "Hill", Some("1955-03-03"), "FH4 4DD"),
            ],
            vec![
                person(101, "Mary", "O'Neill", Some("1970-02-02"), "MO5 5EE"),
                person(102, "Kevin", "Park", Some("1991-07-07"), "KP6 6FF"),
                person(103, "jose", "garcia lopez", Some("1985-06-15"), "sw1a1aa"),
                person(104, "Lucy", "Chen", Some("1994-04-04"), "LC7 7GG"),
                person(105, "Tom", "Ward", Some("1983-08-08"), "TW8 8HH"),
            ],
        );
        let (a, b) = sources();
        let q = compose(&a, &b, &MatchConfig::default(), OutputShape::Key, true).unwrap();
        let rows = q.fetch(&backend).await.unwrap();

        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].id_a, 1);
        assert_eq!(rows[0].id_b, Some(103));
        assert_eq!(rows[0].decision, MatchDecision::Match);
        for row in &rows[1..] {
            assert_eq!(row.id_b, None);
            assert_eq!(row.decision, MatchDecision::NoMatch);
        }
        let matched: Vec<i64> = rows
            .iter()
            .filter(|r| r.decision.is_match())
            .map(|r| r.id_a)
            .collect();
        assert_eq!(matched, vec![1]);
    }
}
