use thiserror::Error;

/// Failures surfaced outside the per-step passes: configuration, runtime
/// parameter mutation and persistence. The growth passes themselves are
/// infallible.
#[derive(Debug, Error)]
pub enum Error {
    /// A configuration value is out of its admissible range.
    #[error("invalid config `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    /// A scheduled mutation names a parameter the configuration does not have.
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A saved network is structurally inconsistent (e.g. dangling parent index).
    #[error("persisted state error: {0}")]
    Persist(String),
}

impl Error {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Error::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
