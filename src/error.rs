use thiserror::Error;

/// Validation failures raised while composing a match plan, before any
/// execution reaches the backing engine.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required configuration: {field}")]
    MissingField { field: &'static str },
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
