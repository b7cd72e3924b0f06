//! Backing engines that execute composed plans.

pub mod memory;
pub mod mysql;

use std::path::PathBuf;

use async_trait::async_trait;

use crate::matching::MatchPlan;
use crate::models::{MatchOutputRow, RecordSource};

pub use memory::{CellValue, MemoryBackend};
pub use mysql::MySqlBackend;

/// Where a materialized result set lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    /// A table created on the backing engine, next to the sources.
    Table(String),
    CsvFile(PathBuf),
    XlsxFile(PathBuf),
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::Table(name) => write!(f, "table {}", name),
            Destination::CsvFile(path) => write!(f, "csv {}", path.display()),
            Destination::XlsxFile(path) => write!(f, "xlsx {}", path.display()),
        }
    }
}

/// Executes composed plans. Errors from the engine itself are passed through
/// unchanged apart from context about which step failed.
#[async_trait]
pub trait QueryBackend: Send + Sync {
    /// Confirm the source table exists and carries every mapped column.
    async fn verify_source(&self, source: &RecordSource) -> anyhow::Result<()>;

    /// Run the plan and return the assembled rows.
    async fn fetch(&self, plan: &MatchPlan) -> anyhow::Result<Vec<MatchOutputRow>>;

    /// Run the plan into `dest` and return the number of rows written.
    async fn materialize(&self, plan: &MatchPlan, dest: &Destination) -> anyhow::Result<u64>;
}
