use serde::{Deserialize, Serialize};

/// Column layout of the assembled result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputShape {
    /// Identifier pair plus decision.
    Key,
    /// All mapped fields from both sides plus decision.
    Full,
}

impl OutputShape {
    pub fn name(&self) -> &'static str {
        match self {
            OutputShape::Key => "key",
            OutputShape::Full => "full",
        }
    }

    /// Output column names, in statement order.
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            OutputShape::Key => &["id_a", "id_b", "decision"],
            OutputShape::Full => &[
                "id_a",
                "a_forename",
                "a_surname",
                "a_dob",
                "a_postcode",
                "id_b",
                "b_forename",
                "b_surname",
                "b_dob",
                "b_postcode",
                "decision",
            ],
        }
    }
}

impl std::fmt::Display for OutputShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
