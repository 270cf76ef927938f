//! Error types for bsdash-core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid catalog: {0}")]
    InvalidCatalog(String),

    #[error("Malformed status string: {0}")]
    MalformedStatus(String),

    #[error("Subject index {index} out of range ({len} subjects)")]
    SubjectOutOfRange { index: usize, len: usize },

    #[error("Output artifact index {index} out of range ({len} artifacts)")]
    ArtifactOutOfRange { index: usize, len: usize },

    #[error("Display group {index} out of range ({len} groups)")]
    GroupOutOfRange { index: usize, len: usize },

    #[error("Unknown color scheme: {0}")]
    UnknownScheme(String),

    #[error("Dashboard engine channel closed")]
    ChannelClosed,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, DashError>;
