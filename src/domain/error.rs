// Domain-level validation errors
use thiserror::Error;

/// Required fields that were left empty.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("missing required fields: {}", .missing.join(", "))]
pub struct ValidationError {
    pub missing: Vec<&'static str>,
}

impl ValidationError {
    pub fn check(missing: Vec<&'static str>) -> Result<(), ValidationError> {
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { missing })
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionUrlError {
    #[error("connection URL has no scheme")]
    MissingScheme,
    #[error("unsupported connection scheme '{0}'")]
    UnknownDialect(String),
    #[error("invalid port '{0}'")]
    InvalidPort(String),
    #[error("invalid storage URI '{uri}' for {provider}")]
    InvalidStorageUri { uri: String, provider: &'static str },
}
