//! The on-disk project tree.

use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use synthforge_sdk::TaskStatus;
use tokio_util::sync::CancellationToken;

use crate::error::{PreconditionError, TaskError};
use crate::planner::{TaskGraph, MANIFEST_FILE};

#[derive(Debug, Clone)]
pub struct OutputTree {
    root: PathBuf,
}

#[derive(Serialize)]
struct Manifest<'a> {
    project: &'a str,
    build_id: String,
    tasks: Vec<ManifestTask<'a>>,
}

#[derive(Serialize)]
struct ManifestTask<'a> {
    id: &'a str,
    stage: &'a str,
    path: String,
    status: TaskStatus,
    retries: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    predecessors: Vec<&'a str>,
}

impl OutputTree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root if needed. Idempotent.
    pub fn prepare(&self) -> Result<(), PreconditionError> {
        std::fs::create_dir_all(&self.root).map_err(|source| PreconditionError::OutputNotWritable {
            path: self.root.clone(),
            source,
        })?;

        // Probe writability before any task runs
        tempfile::NamedTempFile::new_in(&self.root)
            .map(drop)
            .map_err(|source| PreconditionError::OutputNotWritable {
                path: self.root.clone(),
                source,
            })
    }

    /// Write `content` at `relative` unless `cancel` has fired.
    ///
    /// The file is staged next to its destination and persisted without
    /// clobbering, so a reader never sees a partial artifact and an existing
    /// file is never replaced.
    pub fn commit(
        &self,
        relative: &Path,
        content: &str,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, TaskError> {
        let destination = self.root.join(relative);
        let parent = destination
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.root.clone());

        std::fs::create_dir_all(&parent)
            .map_err(|e| TaskError::Commit(format!("{}: {}", parent.display(), e)))?;

        let mut staged = tempfile::NamedTempFile::new_in(&parent)
            .map_err(|e| TaskError::Commit(format!("{}: {}", parent.display(), e)))?;
        staged
            .write_all(content.as_bytes())
            .and_then(|_| staged.flush())
            .map_err(|e| TaskError::Commit(format!("{}: {}", destination.display(), e)))?;

        if cancel.is_cancelled() {
            return Err(TaskError::Cancelled);
        }

        staged
            .persist_noclobber(&destination)
            .map_err(|e| TaskError::Commit(format!("{}: {}", destination.display(), e.error)))?;

        Ok(destination)
    }

    /// Write the dependency manifest for `graph`, replacing any earlier one.
    pub fn write_manifest(
        &self,
        project: &str,
        build_id: uuid::Uuid,
        graph: &TaskGraph,
    ) -> anyhow::Result<PathBuf> {
        let manifest = Manifest {
            project,
            build_id: build_id.to_string(),
            tasks: graph
                .nodes()
                .iter()
                .map(|node| ManifestTask {
                    id: node.id.as_str(),
                    stage: node.stage.as_str(),
                    path: node.output_path.to_string_lossy().into_owned(),
                    status: node.status,
                    retries: node.retry_count,
                    predecessors: node.predecessors.iter().map(|p| p.as_str()).collect(),
                })
                .collect(),
        };

        let path = self.root.join(MANIFEST_FILE);
        std::fs::write(&path, serde_yaml::to_string(&manifest)?)?;
        Ok(path)
    }
}
