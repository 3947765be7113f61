//! Per-file progress of a multi-file load.

use std::path::PathBuf;

use serde::Serialize;

use crate::summary::BatchSummary;

/// Where a file is in the two-pass load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileLoadState {
    Pending,
    NodesLoading,
    NodesDone,
    EdgesLoading,
    EdgesDone,
    Failed,
}

/// Outcome of one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub state: FileLoadState,
    pub nodes: BatchSummary,
    pub relationships: BatchSummary,
    /// Cause of the failure when `state` is [`FileLoadState::Failed`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileReport {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            state: FileLoadState::Pending,
            nodes: BatchSummary::default(),
            relationships: BatchSummary::default(),
            error: None,
        }
    }

    pub(crate) fn fail(&mut self, error: impl ToString) {
        self.state = FileLoadState::Failed;
        self.error = Some(error.to_string());
    }
}

/// Outcome of a whole run, one entry per input file in input order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LoadReport {
    pub files: Vec<FileReport>,
}

impl LoadReport {
    /// Sum of every file's node and relationship summaries.
    pub fn totals(&self) -> BatchSummary {
        self.files
            .iter()
            .map(|f| f.nodes + f.relationships)
            .sum()
    }

    pub fn failed(&self) -> impl Iterator<Item = &FileReport> {
        self.files
            .iter()
            .filter(|f| f.state == FileLoadState::Failed)
    }

    pub fn is_success(&self) -> bool {
        self.files
            .iter()
            .all(|f| f.state == FileLoadState::EdgesDone)
    }
}
