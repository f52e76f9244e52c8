//! Error types for fleetmedic.
//!
//! Only caller mistakes surface as `MedicError`. Remote failures and unparseable
//! probe output are captured inside the returned reports instead.

use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MedicError {
    #[error("host pattern is required")]
    MissingHostPattern,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unknown project '{0}'")]
    UnknownProject(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl MedicError {
    /// Stable short code for scripting against CLI output
    pub fn code(&self) -> &'static str {
        match self {
            MedicError::MissingHostPattern => "missing_host_pattern",
            MedicError::InvalidArgument(_) => "invalid_argument",
            MedicError::UnknownProject(_) => "unknown_project",
            MedicError::Config(_) => "config",
            MedicError::Io(_) => "io",
            MedicError::Json(_) => "json",
            MedicError::Toml(_) => "toml",
        }
    }
}

pub type Result<T> = std::result::Result<T, MedicError>;

/// Serializable `{ok: false, error}` form of an input failure
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub ok: bool,
    pub error: String,
    pub code: &'static str,
}

impl From<&MedicError> for ErrorReport {
    fn from(err: &MedicError) -> Self {
        Self {
            ok: false,
            error: err.to_string(),
            code: err.code(),
        }
    }
}

/// Reject empty or whitespace-only host patterns
pub fn require_host_pattern(host_pattern: &str) -> Result<()> {
    if host_pattern.trim().is_empty() {
        return Err(MedicError::MissingHostPattern);
    }
    Ok(())
}
