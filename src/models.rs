use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Canonical person fields every record source must map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    Id,
    Forename,
    Surname,
    Dob,
    Postcode,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Id,
        Field::Forename,
        Field::Surname,
        Field::Dob,
        Field::Postcode,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Forename => "forename",
            Field::Surname => "surname",
            Field::Dob => "dob",
            Field::Postcode => "postcode",
        }
    }
}

// Column mapping for flexible schemas; map canonical field names to the
// caller's actual column names. All five fields are required.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    pub id: String,
    pub forename: String,
    pub surname: String,
    pub dob: String,
    pub postcode: String,
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self {
            id: "id".into(),
            forename: "forename".into(),
            surname: "surname".into(),
            dob: "dob".into(),
            postcode: "postcode".into(),
        }
    }
}

impl FieldMapping {
    pub fn column(&self, field: Field) -> &str {
        match field {
            Field::Id => &self.id,
            Field::Forename => &self.forename,
            Field::Surname => &self.surname,
            Field::Dob => &self.dob,
            Field::Postcode => &self.postcode,
        }
    }

    /// Build a mapping from `field=column` pairs, e.g.
    /// `forename=first_name,surname=last_name`. Fields not named keep their
    /// default column.
    pub fn with_overrides(spec: &str) -> Result<Self, ConfigError> {
        let mut m = Self::default();
        for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((field, column)) = part.split_once('=') else {
                return Err(ConfigError::InvalidValue {
                    field: "mapping",
                    reason: format!("expected field=column, got {:?}", part),
                });
            };
            let column = column.trim().to_string();
            match field.trim() {
                "id" => m.id = column,
                "forename" => m.forename = column,
                "surname" => m.surname = column,
                "dob" => m.dob = column,
                "postcode" => m.postcode = column,
                other => {
                    return Err(ConfigError::InvalidValue {
                        field: "mapping",
                        reason: format!("unknown field {:?}", other),
                    });
                }
            }
        }
        Ok(m)
    }
}

/// A table plus the mapping that locates the canonical fields inside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSource {
    pub table: String,
    pub mapping: FieldMapping,
}

impl RecordSource {
    pub fn new(table: impl Into<String>, mapping: FieldMapping) -> Self {
        Self {
            table: table.into(),
            mapping,
        }
    }
}

/// Final label a candidate pair reduces to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchDecision {
    Match,
    Tier(u8),
    NoMatch,
}

impl MatchDecision {
    pub fn label(self) -> String {
        match self {
            MatchDecision::Match => "MATCH".into(),
            MatchDecision::Tier(n) => format!("TIER{}", n),
            MatchDecision::NoMatch => "NO_MATCH".into(),
        }
    }

    pub fn from_label(s: &str) -> Option<Self> {
        match s {
            "MATCH" => Some(MatchDecision::Match),
            "NO_MATCH" => Some(MatchDecision::NoMatch),
            _ => s.strip_prefix("TIER")?.parse().ok().map(MatchDecision::Tier),
        }
    }

    pub fn is_match(self) -> bool {
        !matches!(self, MatchDecision::NoMatch)
    }
}

impl std::fmt::Display for MatchDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Raw (pre-normalization) values carried into full-shape output rows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecordFields {
    pub forename: Option<String>,
    pub surname: Option<String>,
    pub dob: Option<NaiveDate>,
    pub postcode: Option<String>,
}

/// One shaped output row. Side-B values are None on NO_MATCH augmentation
/// rows; the detail blocks are None in key-only shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchOutputRow {
    pub id_a: i64,
    pub id_b: Option<i64>,
    pub decision: MatchDecision,
    pub a: Option<RecordFields>,
    pub b: Option<RecordFields>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decision_labels_round_trip() {
        for d in [
            MatchDecision::Match,
            MatchDecision::Tier(2),
            MatchDecision::Tier(3),
            MatchDecision::NoMatch,
        ] {
            assert_eq!(MatchDecision::from_label(&d.label()), Some(d));
        }
        assert_eq!(MatchDecision::from_label("TIERX"), None);
        assert_eq!(MatchDecision::from_label("maybe"), None);
    }

    #[test]
    fn test_every_tier_counts_as_a_match() {
        assert!(MatchDecision::Match.is_match());
        assert!(MatchDecision::Tier(2).is_match());
        assert!(MatchDecision::Tier(9).is_match());
        assert!(!MatchDecision::NoMatch.is_match());
    }

    #[test]
    fn test_mapping_overrides() {
        let m = FieldMapping::with_overrides("forename=first_name, surname=last_name").unwrap();
        assert_eq!(m.forename, "first_name");
        assert_eq!(m.surname, "last_name");
        assert_eq!(m.id, "id");
        assert_eq!(m.dob, "dob");

        assert!(FieldMapping::with_overrides("middlename=x").is_err());
        assert!(FieldMapping::with_overrides("justacolumn").is_err());
    }
}
