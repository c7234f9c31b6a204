#![deny(unsafe_code)]

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
    #[error("failed to read file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse metadata snapshot {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid metadata snapshot: {} issue(s), first: {}", .issues.len(), first_issue(.issues))]
    Invalid { issues: Vec<SnapshotIssue> },
}

impl SnapshotError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn first_issue(issues: &[SnapshotIssue]) -> String {
    issues
        .first()
        .map_or_else(|| "none".to_string(), ToString::to_string)
}

/// A violated invariant of a metadata snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotIssue {
    /// Kind of the offending object (`rule`, `executable script`, ...).
    pub kind: &'static str,
    pub id: Uuid,
    pub message: String,
}

impl SnapshotIssue {
    pub(crate) fn new(kind: &'static str, id: Uuid, message: impl Into<String>) -> Self {
        Self {
            kind,
            id,
            message: message.into(),
        }
    }
}

impl fmt::Display for SnapshotIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.kind, self.id, self.message)
    }
}
