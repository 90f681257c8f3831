use crate::pkg::LockError;
use thiserror::Error;

/// Core error type for relock operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse JSON in {label}: {source}")]
    Json {
        label: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse YAML in {label}: {source}")]
    Yaml {
        label: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error("{0}")]
    Other(String),
}

impl Error {
    #[must_use]
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    pub(crate) fn json(label: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Json {
            label: label.into(),
            source,
        }
    }

    pub(crate) fn yaml(label: impl Into<String>, source: serde_yaml::Error) -> Self {
        Self::Yaml {
            label: label.into(),
            source,
        }
    }

    /// Stable code for machine-readable output.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Io(_) => "IO_ERROR",
            Self::Json { .. } => "JSON_PARSE_ERROR",
            Self::Yaml { .. } => "YAML_PARSE_ERROR",
            Self::Lock(e) => e.code(),
            Self::Other(_) => "ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
