//! Pairwise scoring and tier classification.
//!
//! Each field comparison yields an [`Agreement`] worth 2 (exact), 1 (fuzzy)
//! or 0 (disagree) points. A missing value on either side scores as
//! disagreement. Tier rules are checked in order against the agreeing-field
//! and fuzzy-field counts; the first satisfied rule decides the pair and the
//! fallthrough is NO_MATCH.
//!
//! Every comparator renders twice: a scalar evaluation here and a SQL CASE
//! expression over the normalized columns, with the same outcome. The SQL
//! fuzzy branch for Levenshtein assumes a LEVENSHTEIN(a, b) function is
//! installed on the server; stock MySQL does not ship one.

use serde::{Deserialize, Serialize};

use crate::matching::helpers::soundex4;
use crate::models::MatchDecision;
use crate::sql::quote_str;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Agreement {
    Exact,
    Fuzzy,
    Disagree,
}

impl Agreement {
    pub fn points(&self) -> u8 {
        match self {
            Agreement::Exact => 2,
            Agreement::Fuzzy => 1,
            Agreement::Disagree => 0,
        }
    }
}

/// Comparator applied to the two name fields. Dates and postcodes always
/// compare exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NameComparator {
    Exact,
    Levenshtein { max_edits: u32 },
    Soundex,
}

impl NameComparator {
    pub fn compare(&self, a: Option<&str>, b: Option<&str>) -> Agreement {
        let (a, b) = match (a, b) {
            (Some(a), Some(b)) => (a, b),
            _ => return Agreement::Disagree,
        };
        if a == b {
            return Agreement::Exact;
        }
        match self {
            NameComparator::Exact => Agreement::Disagree,
            NameComparator::Levenshtein { max_edits } => {
                if strsim::levenshtein(a, b) <= *max_edits as usize {
                    Agreement::Fuzzy
                } else {
                    Agreement::Disagree
                }
            }
            NameComparator::Soundex => match (soundex4(a), soundex4(b)) {
                (Some(ca), Some(cb)) if ca == cb => Agreement::Fuzzy,
                _ => Agreement::Disagree,
            },
        }
    }

    /// SQL rendering: a CASE yielding the point value. NULL on either side
    /// falls through every WHEN to the ELSE 0 branch.
    pub fn sql_agreement(&self, a: &str, b: &str) -> String {
        match self {
            NameComparator::Exact => {
                format!("CASE WHEN {a} = {b} THEN 2 ELSE 0 END")
            }
            NameComparator::Levenshtein { max_edits } => format!(
                "CASE WHEN {a} = {b} THEN 2 \
                 WHEN {a} IS NOT NULL AND {b} IS NOT NULL AND LEVENSHTEIN({a}, {b}) <= {max_edits} THEN 1 \
                 ELSE 0 END"
            ),
            NameComparator::Soundex => format!(
                "CASE WHEN {a} = {b} THEN 2 \
                 WHEN SOUNDEX({a}) <> '' AND LEFT(SOUNDEX({a}), 4) = LEFT(SOUNDEX({b}), 4) THEN 1 \
                 ELSE 0 END"
            ),
        }
    }
}

/// Scalar exact comparison for the fields without a fuzzy form.
pub fn exact_agreement<T: PartialEq + ?Sized>(a: Option<&T>, b: Option<&T>) -> Agreement {
    match (a, b) {
        (Some(a), Some(b)) if a == b => Agreement::Exact,
        _ => Agreement::Disagree,
    }
}

/// SQL rendering of [`exact_agreement`].
pub fn sql_exact_agreement(a: &str, b: &str) -> String {
    format!("CASE WHEN {a} = {b} THEN 2 ELSE 0 END")
}

/// One classification tier: satisfied when at least `min_agree` fields agree
/// (exactly or fuzzily) and at most `max_fuzzy` of them agree only fuzzily.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierRule {
    pub min_agree: u8,
    pub max_fuzzy: u8,
    pub decision: MatchDecision,
}

/// First satisfied tier wins; no tier satisfied means NO_MATCH.
pub fn decide(tiers: &[TierRule], fields: &[Agreement; 4]) -> MatchDecision {
    let agree = fields.iter().filter(|a| **a != Agreement::Disagree).count() as u8;
    let fuzzy = fields.iter().filter(|a| **a == Agreement::Fuzzy).count() as u8;
    for tier in tiers {
        if agree >= tier.min_agree && fuzzy <= tier.max_fuzzy {
            return tier.decision;
        }
    }
    MatchDecision::NoMatch
}

/// SQL rendering of [`decide`] over the four point columns. MySQL boolean
/// arithmetic turns each comparison into 0 or 1, so the sums are the
/// agreeing-field and fuzzy-field counts.
pub fn sql_decision_case(tiers: &[TierRule]) -> String {
    let agree = "(forename_pts > 0) + (surname_pts > 0) + (dob_pts > 0) + (postcode_pts > 0)";
    let fuzzy = "(forename_pts = 1) + (surname_pts = 1) + (dob_pts = 1) + (postcode_pts = 1)";
    let mut out = String::from("CASE");
    for tier in tiers {
        out.push_str(&format!(
            " WHEN ({agree}) >= {} AND ({fuzzy}) <= {} THEN {}",
            tier.min_agree,
            tier.max_fuzzy,
            quote_str(&tier.decision.label())
        ));
    }
    out.push_str(" ELSE 'NO_MATCH' END");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEV2: NameComparator = NameComparator::Levenshtein { max_edits: 2 };

    #[test]
    fn test_exact_comparator() {
        assert_eq!(
            NameComparator::Exact.compare(Some("ann"), Some("ann")),
            Agreement::Exact
        );
        assert_eq!(
            NameComparator::Exact.compare(Some("ann"), Some("anne")),
            Agreement::Disagree
        );
    }

    #[test]
    fn test_levenshtein_comparator() {
        assert_eq!(LEV2.compare(Some("ann"), Some("ann")), Agreement::Exact);
        assert_eq!(LEV2.compare(Some("ann"), Some("anne")), Agreement::Fuzzy);
        assert_eq!(LEV2.compare(Some("cathy"), Some("kathie")), Agreement::Disagree);
    }

    #[test]
    fn test_soundex_comparator() {
        let cmp = NameComparator::Soundex;
        assert_eq!(cmp.compare(Some("smith"), Some("smyth")), Agreement::Fuzzy);
        assert_eq!(cmp.compare(Some("smith"), Some("jones")), Agreement::Disagree);
        assert_eq!(cmp.compare(Some("123"), Some("456")), Agreement::Disagree);
    }

    #[test]
    fn test_missing_scores_as_disagreement() {
        assert_eq!(LEV2.compare(None, Some("ann")), Agreement::Disagree);
        assert_eq!(LEV2.compare(Some("ann"), None), Agreement::Disagree);
        assert_eq!(LEV2.compare(None, None), Agreement::Disagree);
        assert_eq!(exact_agreement::<str>(None, None), Agreement::Disagree);
        assert_eq!(
            exact_agreement(Some("AB12CD"), Some("AB12CD")),
            Agreement::Exact
        );
    }

    fn default_tiers() -> Vec<TierRule> {
        vec![
            TierRule { min_agree: 4, max_fuzzy: 0, decision: MatchDecision::Match },
            TierRule { min_agree: 4, max_fuzzy: 1, decision: MatchDecision::Tier(2) },
            TierRule { min_agree: 3, max_fuzzy: 1, decision: MatchDecision::Tier(3) },
        ]
    }

    #[test]
    fn test_first_satisfied_tier_wins() {
        use Agreement::*;
        let tiers = default_tiers();
        // all-exact satisfies every tier but takes the first
        assert_eq!(
            decide(&tiers, &[Exact, Exact, Exact, Exact]),
            MatchDecision::Match
        );
        assert_eq!(
            decide(&tiers, &[Fuzzy, Exact, Exact, Exact]),
            MatchDecision::Tier(2)
        );
        assert_eq!(
            decide(&tiers, &[Fuzzy, Exact, Exact, Disagree]),
            MatchDecision::Tier(3)
        );
        assert_eq!(
            decide(&tiers, &[Fuzzy, Fuzzy, Exact, Disagree]),
            MatchDecision::NoMatch
        );
        assert_eq!(
            decide(&tiers, &[Disagree, Disagree, Disagree, Disagree]),
            MatchDecision::NoMatch
        );
    }

    #[test]
    fn test_decide_is_pure() {
        use Agreement::*;
        let tiers = default_tiers();
        let fields = [Fuzzy, Exact, Exact, Exact];
        let first = decide(&tiers, &fields);
        for _ in 0..3 {
            assert_eq!(decide(&tiers, &fields), first);
        }
    }

    /// Replays the SQL CASE arithmetic over point values and checks it agrees
    /// with the scalar decision for every possible agreement vector.
    #[test]
    fn test_sql_case_arithmetic_matches_scalar_decide() {
        use Agreement::*;
        let tiers = default_tiers();
        let all = [Exact, Fuzzy, Disagree];
        for a in all {
            for b in all {
                for c in all {
                    for d in all {
                        let fields = [a, b, c, d];
                        let pts: Vec<u8> = fields.iter().map(|f| f.points()).collect();
                        let agree: u8 = pts.iter().map(|p| u8::from(*p > 0)).sum();
                        let fuzzy: u8 = pts.iter().map(|p| u8::from(*p == 1)).sum();
                        let sql_decision = tiers
                            .iter()
                            .find(|t| agree >= t.min_agree && fuzzy <= t.max_fuzzy)
                            .map(|t| t.decision)
                            .unwrap_or(MatchDecision::NoMatch);
                        assert_eq!(sql_decision, decide(&tiers, &fields));
                    }
                }
            }
        }
    }

    #[test]
    fn test_sql_renderings_guard_null() {
        let lev = LEV2.sql_agreement("a.forename", "b.forename");
        assert!(lev.contains("a.forename IS NOT NULL AND b.forename IS NOT NULL"));
        assert!(lev.contains("LEVENSHTEIN(a.forename, b.forename) <= 2"));
        assert!(lev.ends_with("ELSE 0 END"));

        let sx = NameComparator::Soundex.sql_agreement("a.surname", "b.surname");
        assert!(sx.contains("SOUNDEX(a.surname) <> ''"));
        assert!(sx.contains("LEFT(SOUNDEX(a.surname), 4) = LEFT(SOUNDEX(b.surname), 4)"));
    }

    #[test]
    fn test_sql_decision_case_orders_tiers() {
        let case = sql_decision_case(&default_tiers());
        let m = case.find("'MATCH'").unwrap();
        let t2 = case.find("'TIER2'").unwrap();
        let t3 = case.find("'TIER3'").unwrap();
        let nm = case.find("'NO_MATCH'").unwrap();
        assert!(m < t2 && t2 < t3 && t3 < nm);
        assert!(case.ends_with("ELSE 'NO_MATCH' END"));
    }
}
