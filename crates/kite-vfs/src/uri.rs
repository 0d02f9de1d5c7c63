use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use kite_archive::Archive;
use url::Url;

/// Separator between the archive location and the entry name in archive URIs.
const ENTRY_SEPARATOR: &str = "!/";

/// An entry inside a dependency archive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArchivePath {
    pub archive: PathBuf,
    /// Entry name with `/` separators and no leading slash.
    pub entry: String,
}

impl ArchivePath {
    pub fn new(archive: impl Into<PathBuf>, entry: &str) -> Self {
        Self {
            archive: archive.into(),
            entry: Archive::normalize_entry(entry),
        }
    }
}

/// Identifier of a document the server knows about.
///
/// Accepted textual forms are `file:///abs/path.kt`, `jar:file:///lib.jar!/pkg/Foo.class` and
/// `kls:file:///lib.jar!/pkg/Foo.class`. Archive URIs are always rendered back with `jar:`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DocumentUri {
    File(PathBuf),
    Archive(ArchivePath),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UriError {
    #[error("unsupported URI scheme: {0}")]
    UnsupportedScheme(String),
    #[error("invalid document URI: {0}")]
    Invalid(String),
}

impl DocumentUri {
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        DocumentUri::File(path.into())
    }

    pub fn parse(uri: &str) -> Result<Self, UriError> {
        if let Some(rest) = uri
            .strip_prefix("jar:")
            .or_else(|| uri.strip_prefix("kls:"))
        {
            let (archive, entry) = rest
                .split_once(ENTRY_SEPARATOR)
                .ok_or_else(|| UriError::Invalid(uri.to_string()))?;
            if entry.is_empty() {
                return Err(UriError::Invalid(uri.to_string()));
            }
            let archive = file_url_to_path(archive, uri)?;
            return Ok(DocumentUri::Archive(ArchivePath::new(archive, entry)));
        }

        if uri.starts_with("file:") {
            return Ok(DocumentUri::File(file_url_to_path(uri, uri)?));
        }

        match uri.split_once(':') {
            Some((scheme, _)) => Err(UriError::UnsupportedScheme(scheme.to_string())),
            None => Err(UriError::Invalid(uri.to_string())),
        }
    }

    /// The plain filesystem path for file URIs.
    pub fn as_file_path(&self) -> Option<&Path> {
        match self {
            DocumentUri::File(path) => Some(path),
            DocumentUri::Archive(_) => None,
        }
    }

    pub fn as_archive_path(&self) -> Option<&ArchivePath> {
        match self {
            DocumentUri::File(_) => None,
            DocumentUri::Archive(archive) => Some(archive),
        }
    }

    pub fn is_archive(&self) -> bool {
        matches!(self, DocumentUri::Archive(_))
    }
}

fn file_url_to_path(raw: &str, whole: &str) -> Result<PathBuf, UriError> {
    let url = Url::parse(raw).map_err(|_| UriError::Invalid(whole.to_string()))?;
    if url.scheme() != "file" {
        return Err(UriError::UnsupportedScheme(url.scheme().to_string()));
    }
    url.to_file_path()
        .map_err(|()| UriError::Invalid(whole.to_string()))
}

fn path_to_file_url(path: &Path) -> String {
    match Url::from_file_path(path) {
        Ok(url) => url.to_string(),
        // Relative paths have no URL form; keep them readable in logs.
        Err(()) => format!("file://{}", path.display()),
    }
}

impl fmt::Display for DocumentUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentUri::File(path) => f.write_str(&path_to_file_url(path)),
            DocumentUri::Archive(ArchivePath { archive, entry }) => {
                write!(f, "jar:{}{ENTRY_SEPARATOR}{entry}", path_to_file_url(archive))
            }
        }
    }
}

impl FromStr for DocumentUri {
    type Err = UriError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DocumentUri::parse(s)
    }
}
