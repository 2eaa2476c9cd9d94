use thiserror::Error;

pub type CoreResult<T> = Result<T, CoreError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Invalid stream '{name}': {reason}")]
    InvalidStream { name: String, reason: &'static str },

    #[error("Duplicate stream name: {name}")]
    DuplicateStream { name: String },

    #[error("Unknown superstructure kind: {name} (expected SBS or SWS)")]
    UnknownSuperstructure { name: String },
}
