//! Build-configuration readers.
//!
//! A [`BuildConfigReader`] turns a workspace root into the raw list of dependency locations the
//! classpath manager resolves. Readers never check that paths exist; unresolvable entries are the
//! classpath manager's concern.

mod libs;
mod manifest;

use std::path::{Path, PathBuf};

pub use libs::LibsDirReader;
pub use manifest::{ManifestReader, MANIFEST_FILE};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawDependency {
    pub path: PathBuf,
    /// Source directories are indexed for navigation but never compiled against.
    pub is_source_root: bool,
}

impl RawDependency {
    pub fn binary(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_source_root: false,
        }
    }

    pub fn source(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_source_root: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProjectError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Only the parser message is kept; build files may contain credentials.
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

pub trait BuildConfigReader: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    fn read(&self, root: &Path) -> Result<Vec<RawDependency>, ProjectError>;

    /// Whether a change to `path` may change what [`BuildConfigReader::read`] returns.
    fn is_build_file(&self, path: &Path) -> bool;
}

/// Runs several readers and concatenates their output.
///
/// Every reader sees the root even if an earlier one failed; the first error is returned after
/// the others were logged.
pub struct CompositeReader {
    readers: Vec<Box<dyn BuildConfigReader>>,
}

impl CompositeReader {
    pub fn new(readers: Vec<Box<dyn BuildConfigReader>>) -> Self {
        Self { readers }
    }
}

impl Default for CompositeReader {
    /// The manifest reader followed by the `libs/` directory reader.
    fn default() -> Self {
        Self::new(vec![Box::new(ManifestReader), Box::new(LibsDirReader)])
    }
}

impl BuildConfigReader for CompositeReader {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn read(&self, root: &Path) -> Result<Vec<RawDependency>, ProjectError> {
        let mut deps = Vec::new();
        let mut first_error = None;
        for reader in &self.readers {
            match reader.read(root) {
                Ok(found) => deps.extend(found),
                Err(err) => {
                    tracing::warn!(
                        target: "kite.project",
                        reader = reader.name(),
                        root = %root.display(),
                        error = %err,
                        "build configuration reader failed"
                    );
                    first_error.get_or_insert(err);
                }
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(deps),
        }
    }

    fn is_build_file(&self, path: &Path) -> bool {
        self.readers.iter().any(|reader| reader.is_build_file(path))
    }
}

pub type DefaultBuildConfigReader = CompositeReader;
