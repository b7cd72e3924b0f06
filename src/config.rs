use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::matching::blocking::BlockingRule;
use crate::matching::score::{NameComparator, TierRule};
use crate::models::MatchDecision;

#[derive(Clone, Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    pub username: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: String,
}

impl DatabaseConfig {
    /// Host, username and database are required to form a usable URL; the
    /// password may legitimately be empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::MissingField { field: "db.host" });
        }
        if self.username.is_empty() {
            return Err(ConfigError::MissingField { field: "db.username" });
        }
        if self.database.is_empty() {
            return Err(ConfigError::MissingField { field: "db.database" });
        }
        Ok(())
    }

    pub fn to_url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            self.username, self.password, self.host, self.port, self.database
        )
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .finish()
    }
}

/// Comparator, tier table and blocking rules for one linkage run. All of it
/// is explicit configuration; none of it is inferred from the data.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct MatchConfig {
    pub name_comparator: NameComparator,
    #[serde(default)]
    pub tiers: Vec<TierRule>,
    #[serde(default)]
    pub blocking: Vec<BlockingRule>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            name_comparator: NameComparator::Levenshtein { max_edits: 2 },
            tiers: vec![
                TierRule {
                    min_agree: 4,
                    max_fuzzy: 0,
                    decision: MatchDecision::Match,
                },
                TierRule {
                    min_agree: 4,
                    max_fuzzy: 1,
                    decision: MatchDecision::Tier(2),
                },
                TierRule {
                    min_agree: 3,
                    max_fuzzy: 1,
                    decision: MatchDecision::Tier(3),
                },
            ],
            blocking: BlockingRule::ALL.to_vec(),
        }
    }
}

impl MatchConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let NameComparator::Levenshtein { max_edits } = self.name_comparator {
            if max_edits == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "matching.name_comparator.max_edits",
                    reason: "must be at least 1".into(),
                });
            }
            if max_edits > 8 {
                return Err(ConfigError::InvalidValue {
                    field: "matching.name_comparator.max_edits",
                    reason: format!("{} exceeds the supported maximum of 8", max_edits),
                });
            }
        }
        if self.tiers.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "matching.tiers",
                reason: "at least one tier rule is required".into(),
            });
        }
        for (i, tier) in self.tiers.iter().enumerate() {
            if tier.min_agree == 0 || tier.min_agree > 4 {
                return Err(ConfigError::InvalidValue {
                    field: "matching.tiers",
                    reason: format!("tier {}: min_agree {} not in 1..=4", i + 1, tier.min_agree),
                });
            }
            if tier.max_fuzzy > 4 {
                return Err(ConfigError::InvalidValue {
                    field: "matching.tiers",
                    reason: format!("tier {}: max_fuzzy {} not in 0..=4", i + 1, tier.max_fuzzy),
                });
            }
            if tier.decision == MatchDecision::NoMatch {
                return Err(ConfigError::InvalidValue {
                    field: "matching.tiers",
                    reason: format!("tier {}: NO_MATCH is the implicit fallthrough", i + 1),
                });
            }
        }
        if self.blocking.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "matching.blocking",
                reason: "at least one blocking rule is required".into(),
            });
        }
        Ok(())
    }
}
