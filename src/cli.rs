use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::backend::Destination;
use crate::config::{DatabaseConfig, MatchConfig};
use crate::error::ConfigError;
use crate::matching::{BlockingRule, NameComparator, OutputShape, TierRule};
use crate::models::{FieldMapping, MatchDecision, RecordSource};

#[derive(Copy, Clone, Eq, PartialEq, ValueEnum, Debug)]
pub enum ShapeOpt {
    Key,
    Full,
}

impl ShapeOpt {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Key => "key",
            Self::Full => "full",
        }
    }

    fn to_shape(self) -> OutputShape {
        match self {
            Self::Key => OutputShape::Key,
            Self::Full => OutputShape::Full,
        }
    }
}

impl std::fmt::Display for ShapeOpt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Copy, Clone, Eq, PartialEq, ValueEnum, Debug)]
pub enum ComparatorOpt {
    Exact,
    Levenshtein,
    Soundex,
}

impl ComparatorOpt {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Levenshtein => "levenshtein",
            Self::Soundex => "soundex",
        }
    }
}

impl std::fmt::Display for ComparatorOpt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Copy, Clone, Eq, PartialEq, ValueEnum, Debug)]
pub enum FormatOpt {
    Csv,
    Xlsx,
    Table,
}

impl FormatOpt {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
            Self::Table => "table",
        }
    }
}

impl std::fmt::Display for FormatOpt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "record_linker",
    version,
    about = "Query-pushdown record linkage between two MySQL person tables",
    disable_help_subcommand = true
)]
pub struct Cli {
    /// DB host (env: DB_HOST)
    #[arg(value_name = "HOST", env = "DB_HOST")]
    pub host: String,
    /// DB port (env: DB_PORT, default 3306)
    #[arg(value_name = "PORT", env = "DB_PORT", default_value_t = 3306)]
    pub port: u16,
    /// DB user (env: DB_USER)
    #[arg(value_name = "USER", env = "DB_USER")]
    pub user: String,
    /// DB password (env: DB_PASSWORD)
    #[arg(value_name = "PASSWORD", env = "DB_PASSWORD")]
    pub password: String,
    /// Database name (env: DB_NAME)
    #[arg(value_name = "DATABASE", env = "DB_NAME")]
    pub database: String,
    /// Side-A table (env: TABLE_A)
    #[arg(value_name = "TABLE_A", env = "TABLE_A")]
    pub table_a: String,
    /// Side-B table (env: TABLE_B)
    #[arg(value_name = "TABLE_B", env = "TABLE_B")]
    pub table_b: String,
    /// Column mapping for side A, e.g. forename=first_name,surname=last_name
    #[arg(long = "mapping-a", value_name = "SPEC")]
    pub mapping_a: Option<String>,
    /// Column mapping for side B
    #[arg(long = "mapping-b", value_name = "SPEC")]
    pub mapping_b: Option<String>,
    /// Output shape
    #[arg(long, value_enum, default_value_t = ShapeOpt::Key)]
    pub shape: ShapeOpt,
    /// Emit one NO_MATCH row for each side-A record that matched nothing
    #[arg(long = "include-no-match", env = "RECORD_LINKER_INCLUDE_NO_MATCH")]
    pub include_no_match: bool,
    /// Forename/surname comparator
    #[arg(long, value_enum, default_value_t = ComparatorOpt::Levenshtein)]
    pub comparator: ComparatorOpt,
    /// Edit-distance ceiling for the levenshtein comparator
    #[arg(long = "max-edits", value_name = "N", default_value_t = 2)]
    pub max_edits: u32,
    /// Blocking rules, comma-separated (default: all built-in rules)
    #[arg(long, value_name = "RULES")]
    pub blocking: Option<String>,
    /// Tier ladder as agree:fuzzy=LABEL pairs, e.g. 4:0=MATCH,4:1=TIER2,3:1=TIER3
    #[arg(long, value_name = "SPEC")]
    pub tiers: Option<String>,
    /// Write results to this file or table instead of printing a summary
    #[arg(long, value_name = "PATH_OR_TABLE")]
    pub out: Option<String>,
    /// Destination kind for --out
    #[arg(long, value_enum, default_value_t = FormatOpt::Csv)]
    pub format: FormatOpt,
    /// Compose and print the SQL statement, then exit without executing (env: CHECK_ONLY)
    #[arg(long = "check-only", env = "CHECK_ONLY")]
    pub check_only: bool,
}

/// Everything `run` needs, validated.
#[derive(Debug)]
pub struct RunArgs {
    pub db: DatabaseConfig,
    pub source_a: RecordSource,
    pub source_b: RecordSource,
    pub config: MatchConfig,
    pub shape: OutputShape,
    pub include_no_match: bool,
    pub dest: Option<Destination>,
    pub check_only: bool,
}

fn parse_blocking(spec: &str) -> Result<Vec<BlockingRule>, ConfigError> {
    let mut rules = Vec::new();
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let rule = BlockingRule::from_name(part).ok_or_else(|| ConfigError::InvalidValue {
            field: "blocking",
            reason: format!("unknown blocking rule {:?}", part),
        })?;
        if !rules.contains(&rule) {
            rules.push(rule);
        }
    }
    Ok(rules)
}

fn parse_tiers(spec: &str) -> Result<Vec<TierRule>, ConfigError> {
    let bad = |reason: String| ConfigError::InvalidValue {
        field: "tiers",
        reason,
    };
    let mut tiers = Vec::new();
    for part in spec.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (counts, label) = part
            .split_once('=')
            .ok_or_else(|| bad(format!("expected agree:fuzzy=LABEL, got {:?}", part)))?;
        let (agree, fuzzy) = counts
            .split_once(':')
            .ok_or_else(|| bad(format!("expected agree:fuzzy=LABEL, got {:?}", part)))?;
        let min_agree: u8 = agree
            .trim()
            .parse()
            .map_err(|_| bad(format!("bad agreement count in {:?}", part)))?;
        let max_fuzzy: u8 = fuzzy
            .trim()
            .parse()
            .map_err(|_| bad(format!("bad fuzzy count in {:?}", part)))?;
        let decision = MatchDecision::from_label(label.trim())
            .ok_or_else(|| bad(format!("unknown decision label {:?}", label.trim())))?;
        tiers.push(TierRule {
            min_agree,
            max_fuzzy,
            decision,
        });
    }
    Ok(tiers)
}

impl Cli {
    pub fn to_run_args(&self) -> Result<RunArgs, ConfigError> {
        let mapping_a = match &self.mapping_a {
            Some(spec) => FieldMapping::with_overrides(spec)?,
            None => FieldMapping::default(),
        };
        let mapping_b = match &self.mapping_b {
            Some(spec) => FieldMapping::with_overrides(spec)?,
            None => FieldMapping::default(),
        };

        let mut config = MatchConfig::default();
        config.name_comparator = match self.comparator {
            ComparatorOpt::Exact => NameComparator::Exact,
            ComparatorOpt::Levenshtein => NameComparator::Levenshtein {
                max_edits: self.max_edits,
            },
            ComparatorOpt::Soundex => NameComparator::Soundex,
        };
        if let Some(spec) = &self.blocking {
            config.blocking = parse_blocking(spec)?;
        }
        if let Some(spec) = &self.tiers {
            config.tiers = parse_tiers(spec)?;
        }
        config.validate()?;

        let db = DatabaseConfig {
            username: self.user.clone(),
            password: self.password.clone(),
            host: self.host.clone(),
            port: self.port,
            database: self.database.clone(),
        };
        db.validate()?;

        let dest = match &self.out {
            None => None,
            Some(out) => Some(match self.format {
                FormatOpt::Csv => Destination::CsvFile(PathBuf::from(out)),
                FormatOpt::Xlsx => Destination::XlsxFile(PathBuf::from(out)),
                FormatOpt::Table => Destination::Table(out.clone()),
            }),
        };

        Ok(RunArgs {
            db,
            source_a: RecordSource::new(self.table_a.clone(), mapping_a),
            source_b: RecordSource::new(self.table_b.clone(), mapping_b),
            config,
            shape: self.shape.to_shape(),
            include_no_match: self.include_no_match,
            dest,
            check_only: self.check_only,
        })
    }
}

pub fn parse_cli_to_run_args() -> Result<RunArgs, ConfigError> {
    let cli = Cli::parse();
    cli.to_run_args()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> Vec<&'static str> {
        vec![
            "record_linker",
            "127.0.0.1",
            "3306",
            "root",
            "secret",
            "db",
            "persons_a",
            "persons_b",
        ]
    }

    #[test]
    fn test_parse_minimal_invocation() {
        let cli = Cli::try_parse_from(base_args()).unwrap();
        let run = cli.to_run_args().unwrap();
        assert_eq!(run.source_a.table, "persons_a");
        assert_eq!(run.shape, OutputShape::Key);
        assert!(run.dest.is_none());
        assert!(!run.include_no_match);
        assert_eq!(
            run.config.name_comparator,
            NameComparator::Levenshtein { max_edits: 2 }
        );
    }

    #[test]
    fn test_parse_full_invocation() {
        let mut args = base_args();
        args.extend([
            "--mapping-a",
            "forename=first_name,surname=last_name",
            "--shape",
            "full",
            "--include-no-match",
            "--comparator",
            "soundex",
            "--blocking",
            "surname-dob,postcode-surname",
            "--tiers",
            "4:0=MATCH,3:1=TIER3",
            "--out",
            "linked",
            "--format",
            "table",
        ]);
        let run = Cli::try_parse_from(args).unwrap().to_run_args().unwrap();
        assert_eq!(run.source_a.mapping.forename, "first_name");
        assert_eq!(run.shape, OutputShape::Full);
        assert!(run.include_no_match);
        assert_eq!(run.config.name_comparator, NameComparator::Soundex);
        assert_eq!(
            run.config.blocking,
            vec![BlockingRule::SurnameDob, BlockingRule::PostcodeSurname]
        );
        assert_eq!(run.config.tiers.len(), 2);
        assert_eq!(run.config.tiers[1].decision, MatchDecision::Tier(3));
        assert_eq!(run.dest, Some(Destination::Table("linked".into())));
    }

    #[test]
    fn test_parse_tiers_rejects_garbage() {
        assert!(parse_tiers("4:0=MATCH").is_ok());
        assert!(parse_tiers("nonsense").is_err());
        assert!(parse_tiers("4=MATCH").is_err());
        assert!(parse_tiers("4:0=WHATEVER").is_err());
        assert!(parse_tiers("x:0=MATCH").is_err());
    }

    #[test]
    fn test_parse_blocking_rejects_unknown_rule() {
        assert!(parse_blocking("surname-dob").is_ok());
        assert!(parse_blocking("zodiac-sign").is_err());
        // duplicates collapse
        assert_eq!(parse_blocking("surname-dob,surname-dob").unwrap().len(), 1);
    }

    #[test]
    fn test_invalid_ladder_fails_validation() {
        let mut args = base_args();
        args.extend(["--tiers", "9:0=MATCH"]);
        let cli = Cli::try_parse_from(args).unwrap();
        assert!(cli.to_run_args().is_err());
    }

    #[test]
    fn test_empty_db_coordinates_are_rejected() {
        // host, user, database; an empty positional parses fine, so the
        // rejection has to come from to_run_args
        for pos in [1usize, 3, 5] {
            let mut args = base_args();
            args[pos] = "";
            let cli = Cli::try_parse_from(args).unwrap();
            assert!(matches!(
                cli.to_run_args(),
                Err(ConfigError::MissingField { .. })
            ));
        }
    }
}
