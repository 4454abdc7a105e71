//! Error types for the fixture engine

use std::path::PathBuf;

use thiserror::Error;

use crate::index::Role;

/// Result type for fixture operations
pub type Result<T> = std::result::Result<T, FixtureError>;

/// Fixture engine errors
///
/// Only conditions that stop a run live here. Recoverable findings
/// (collisions, dangling references, renamed duplicates) are reported
/// through [`crate::diagnostics::Diagnostics`].
#[derive(Error, Debug)]
pub enum FixtureError {
    #[error("Failed to parse {}: {message} at line {line}, column {column}", .path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        column: usize,
        message: String,
    },

    #[error("{role} not found: {id}")]
    NotFound { role: Role, id: String },

    #[error("Persistence failed: {0}")]
    Persist(#[from] PersistFailure),

    #[error("Invalid pipeline: {0}")]
    Pipeline(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FixtureError {
    /// Build a parse error from a serde_json failure on a named source
    pub fn parse(path: impl Into<PathBuf>, err: &serde_json::Error) -> Self {
        FixtureError::Parse {
            path: path.into(),
            line: err.line(),
            column: err.column(),
            message: err.to_string(),
        }
    }
}

/// Step of the write-back protocol that failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistStage {
    Backup,
    WriteTemp,
    Rename,
    Validate,
}

impl std::fmt::Display for PersistStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PersistStage::Backup => "backup",
            PersistStage::WriteTemp => "write-temp",
            PersistStage::Rename => "rename",
            PersistStage::Validate => "validate",
        };
        f.write_str(name)
    }
}

/// A failed write-back. `restored` records whether the destination was
/// rolled back to its backup.
#[derive(Error, Debug)]
#[error("{stage} step failed for {}: {message}{}", .path.display(), restored_suffix(.restored))]
pub struct PersistFailure {
    pub stage: PersistStage,
    pub path: PathBuf,
    pub message: String,
    pub restored: bool,
}

fn restored_suffix(restored: &bool) -> &'static str {
    if *restored {
        " (restored from backup)"
    } else {
        ""
    }
}
