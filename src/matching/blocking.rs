//! Blocking key construction.
//!
//! A blocking rule turns a normalized record into a deterministic string key;
//! candidate pairs are the records whose keys collide. Keys are built from
//! normalized fields only, components separated by the unit separator, and
//! unknown components render as the empty string so two records that are both
//! missing a field can still land in the same block.

use serde::{Deserialize, Serialize};

use crate::matching::helpers::soundex4;
use crate::models::RecordFields;

/// Separator between key components, CHAR(31 USING utf8mb4) on the SQL side.
pub const KEY_SEP: char = '\u{1F}';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BlockingRule {
    /// Exact normalized surname plus date of birth.
    SurnameDob,
    /// Soundex of the surname plus date of birth; tolerates spelling drift.
    SoundexSurnameDob,
    /// Normalized postcode plus exact surname.
    PostcodeSurname,
    /// First three characters of the forename plus date of birth.
    ForenamePrefixDob,
}

impl BlockingRule {
    pub const ALL: [BlockingRule; 4] = [
        BlockingRule::SurnameDob,
        BlockingRule::SoundexSurnameDob,
        BlockingRule::PostcodeSurname,
        BlockingRule::ForenamePrefixDob,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            BlockingRule::SurnameDob => "surname-dob",
            BlockingRule::SoundexSurnameDob => "soundex-surname-dob",
            BlockingRule::PostcodeSurname => "postcode-surname",
            BlockingRule::ForenamePrefixDob => "forename-prefix-dob",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|r| r.name() == name)
    }

    /// SQL rendering of the key over a normalized-record alias.
    pub fn sql_key_expr(&self, alias: &str) -> String {
        let parts: Vec<String> = match self {
            BlockingRule::SurnameDob => vec![
                format!("COALESCE({alias}.surname, '')"),
                format!("COALESCE(CAST({alias}.dob AS CHAR), '')"),
            ],
            BlockingRule::SoundexSurnameDob => vec![
                format!("COALESCE(LEFT(SOUNDEX({alias}.surname), 4), '')"),
                format!("COALESCE(CAST({alias}.dob AS CHAR), '')"),
            ],
            BlockingRule::PostcodeSurname => vec![
                format!("COALESCE({alias}.postcode, '')"),
                format!("COALESCE({alias}.surname, '')"),
            ],
            BlockingRule::ForenamePrefixDob => vec![
                format!("COALESCE(LEFT({alias}.forename, 3), '')"),
                format!("COALESCE(CAST({alias}.dob AS CHAR), '')"),
            ],
        };
        // bare CHAR(31) is a binary string and one binary operand makes the
        // whole CONCAT compare byte-wise, bypassing the column collation
        format!("CONCAT({})", parts.join(", CHAR(31 USING utf8mb4), "))
    }

    /// Scalar rendering of the same key over an already normalized record.
    pub fn key(&self, rec: &RecordFields) -> String {
        let parts: Vec<String> = match self {
            BlockingRule::SurnameDob => vec![
                rec.surname.clone().unwrap_or_default(),
                rec.dob.map(|d| d.to_string()).unwrap_or_default(),
            ],
            BlockingRule::SoundexSurnameDob => vec![
                rec.surname
                    .as_deref()
                    .and_then(soundex4)
                    .unwrap_or_default(),
                rec.dob.map(|d| d.to_string()).unwrap_or_default(),
            ],
            BlockingRule::PostcodeSurname => vec![
                rec.postcode.clone().unwrap_or_default(),
                rec.surname.clone().unwrap_or_default(),
            ],
            BlockingRule::ForenamePrefixDob => vec![
                rec.forename
                    .as_deref()
                    .map(|f| f.chars().take(3).collect())
                    .unwrap_or_default(),
                rec.dob.map(|d| d.to_string()).unwrap_or_default(),
            ],
        };
        let mut key = String::new();
        for (i, part) in parts.iter().enumerate() {
            if i > 0 {
                key.push(KEY_SEP);
            }
            key.push_str(part);
        }
        key
    }
}

impl std::fmt::Display for BlockingRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
