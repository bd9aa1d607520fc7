use model::core::table::IdentifierError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while reading or validating loader settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// A setting with no default was not provided.
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid {field}: {source}")]
    InvalidIdentifier {
        field: &'static str,
        #[source]
        source: IdentifierError,
    },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    /// Neither explicit credentials nor `AWS_ACCESS_KEY_ID` /
    /// `AWS_SECRET_ACCESS_KEY` were available.
    #[error("No copy credentials configured and none found in the environment")]
    MissingCredentials,

    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid env file: {reason} at line {line}")]
    EnvFile { line: usize, reason: &'static str },
}
