//! Working directory management
//!
//! The [`ArtifactStore`] owns the results tree of one pipeline run:
//!
//! ```text
//! results/
//! ├── interim/                  # per-stage intermediate artifacts
//! │   ├── mzML_original/<run>.mzML
//! │   ├── FFM/<run>.featureXML
//! │   └── FeatureMatrix.consensusXML
//! ├── FeatureMatrix.tsv         # final tables
//! ├── SIRIUS/ GNPS/             # exports
//! └── pipeline.checkpoint.json
//! ```
//!
//! All paths are derived from the artifact kind and the run identity, so two
//! stages or two runs can never write to the same location.
//!
//! ## Safety
//!
//! `reset` deletes a directory tree. It refuses empty paths, the filesystem
//! root and paths containing `..` components.

mod artifact;

pub use artifact::{Area, ArtifactKind, ArtifactRef, Layout, RunId};

use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::stages::StageId;

/// Error type for working directory operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Refusing to reset unsafe path: {0}")]
    Unsafe(PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Failed to delete {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to create directory {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to copy {from} to {to}: {source}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            StorageError::Unsafe(path) => format!(
                "Refusing to delete {}\n\nHint: Choose a dedicated results folder, it is wiped on every run.",
                path.display()
            ),
            StorageError::PermissionDenied(path) => format!(
                "Permission denied: {}\n\nHint: Check that no other program holds files in the results folder.",
                path.display()
            ),
            StorageError::FileNotFound(path) => format!(
                "File not found: {}\n\nHint: Check that the file exists and the path is correct.",
                path.display()
            ),
            _ => self.to_string(),
        }
    }

    fn from_io(path: &Path, source: io::Error, create: bool) -> Self {
        match source.kind() {
            io::ErrorKind::PermissionDenied => StorageError::PermissionDenied(path.to_path_buf()),
            _ if create => StorageError::Create {
                path: path.to_path_buf(),
                source,
            },
            _ => StorageError::Delete {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}

/// Owner of the working tree of one pipeline run
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    /// Create a store rooted at the results directory
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn interim(&self) -> PathBuf {
        self.root.join("interim")
    }

    /// Checkpoint location
    pub fn checkpoint_path(&self) -> PathBuf {
        Self::checkpoint_path_for(&self.root)
    }

    /// Checkpoint location for a results directory
    pub fn checkpoint_path_for(root: &Path) -> PathBuf {
        root.join("pipeline.checkpoint.json")
    }

    /// Wipe and recreate the whole results tree
    pub fn reset(&self) -> Result<(), StorageError> {
        reset_directory(&self.root)?;
        create_dir(&self.interim())
    }

    /// Location of an artifact kind: a directory for per-run kinds
    pub fn location(&self, kind: ArtifactKind) -> PathBuf {
        let base = match kind.area() {
            Area::Interim => self.interim(),
            Area::Results => self.root.clone(),
        };
        match kind.layout() {
            Layout::PerRun { dir, .. } => base.join(dir),
            Layout::File(name) => base.join(name),
            Layout::Directory(name) => base.join(name),
        }
    }

    /// Reference to the artifact of `kind` produced by `producer`
    pub fn artifact(&self, kind: ArtifactKind, producer: StageId) -> ArtifactRef {
        ArtifactRef {
            kind,
            path: self.location(kind),
            producer,
        }
    }

    /// Path of one run's file of a per-run kind
    pub fn derive(&self, kind: ArtifactKind, run: &RunId) -> PathBuf {
        match kind.layout() {
            Layout::PerRun { extension, .. } => self
                .location(kind)
                .join(format!("{}.{}", run.as_str(), extension)),
            _ => self.location(kind),
        }
    }

    /// Create whatever directory an artifact needs before it is written
    pub fn prepare(&self, artifact: &ArtifactRef) -> Result<(), StorageError> {
        match artifact.kind.layout() {
            Layout::PerRun { .. } | Layout::Directory(_) => create_dir(&artifact.path),
            Layout::File(_) => match artifact.path.parent() {
                Some(parent) => create_dir(parent),
                None => Ok(()),
            },
        }
    }

    /// Stage a raw run into the working tree; the original is never touched
    pub fn copy_in(&self, source: &Path, run: &RunId) -> Result<PathBuf, StorageError> {
        let target = self.derive(ArtifactKind::RawRuns, run);
        copy_file(source, &target)?;
        Ok(target)
    }

    /// Stage a single-file input such as a target library
    pub fn copy_file_in(&self, source: &Path, kind: ArtifactKind) -> Result<PathBuf, StorageError> {
        let target = self.location(kind);
        copy_file(source, &target)?;
        Ok(target)
    }
}

/// Delete and recreate a directory
pub fn reset_directory(path: &Path) -> Result<(), StorageError> {
    check_resettable(path)?;

    if path.exists() {
        debug!(path = %path.display(), "Removing directory");
        std::fs::remove_dir_all(path).map_err(|e| StorageError::from_io(path, e, false))?;
    }
    create_dir(path)
}

fn create_dir(path: &Path) -> Result<(), StorageError> {
    std::fs::create_dir_all(path).map_err(|e| StorageError::from_io(path, e, true))
}

fn copy_file(source: &Path, target: &Path) -> Result<(), StorageError> {
    if !source.is_file() {
        return Err(StorageError::FileNotFound(source.to_path_buf()));
    }
    if let Some(parent) = target.parent() {
        create_dir(parent)?;
    }
    std::fs::copy(source, target).map_err(|e| StorageError::Copy {
        from: source.to_path_buf(),
        to: target.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

fn check_resettable(path: &Path) -> Result<(), StorageError> {
    let unsafe_path = || Err(StorageError::Unsafe(path.to_path_buf()));
    if path.parent().is_none()
        || path
            .components()
            .all(|component| matches!(component, Component::CurDir))
    {
        return unsafe_path();
    }
    if path
        .components()
        .any(|component| matches!(component, Component::ParentDir))
    {
        return unsafe_path();
    }
    // The working directory and its ancestors are never wiped
    if let (Ok(target), Ok(cwd)) = (
        path.canonicalize(),
        std::env::current_dir().and_then(|dir| dir.canonicalize()),
    ) {
        if cwd.starts_with(&target) {
            return unsafe_path();
        }
    }
    Ok(())
}
