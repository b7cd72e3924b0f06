pub mod backend;
pub mod cli;
pub mod config;
pub mod db;
pub mod export;
pub mod logging;
pub mod matching;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod sql;
pub mod util;

pub mod error;

pub use backend::{Destination, MemoryBackend, MySqlBackend, QueryBackend};
pub use config::{DatabaseConfig, MatchConfig};
pub use error::ConfigError;
pub use matching::{
    BlockingRule, Composed, MatchPlan, MatchQuery, Materialized, NameComparator, OutputShape,
    TierRule, compose,
};
pub use models::{FieldMapping, MatchDecision, MatchOutputRow, RecordFields, RecordSource};
