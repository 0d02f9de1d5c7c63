use std::collections::hash_map::DefaultHasher;
use std::ffi::OsStr;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use kite_archive::Archive;
use serde::{Deserialize, Serialize};

/// A resolved dependency unit of one workspace root.
///
/// Ordering is by variant, then path, which gives refreshes a canonical order to compare.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClasspathEntry {
    Archive(PathBuf),
    ClassDir(PathBuf),
    SourceDir(PathBuf),
}

impl ClasspathEntry {
    pub fn path(&self) -> &Path {
        match self {
            ClasspathEntry::Archive(p)
            | ClasspathEntry::ClassDir(p)
            | ClasspathEntry::SourceDir(p) => p,
        }
    }

    pub fn is_source(&self) -> bool {
        matches!(self, ClasspathEntry::SourceDir(_))
    }

    pub(crate) fn fingerprint(&self) -> std::io::Result<u64> {
        let meta = std::fs::metadata(self.path())?;
        let mut hasher = DefaultHasher::new();
        self.hash(&mut hasher);
        meta.len().hash(&mut hasher);
        hash_mtime(&mut hasher, &meta.modified()?);
        Ok(hasher.finish())
    }

    /// Fully qualified names of the declarations this entry provides.
    ///
    /// Archives and class directories contribute their `.class` files (nested classes use `.`,
    /// anonymous and synthetic classes are skipped); source directories contribute one name per
    /// `.kt` file.
    pub(crate) fn list_names(&self) -> Result<Vec<String>, String> {
        let mut names = match self {
            ClasspathEntry::Archive(path) => Archive::new(path)
                .entry_names()
                .map_err(|err| format!("{err:#}"))?
                .iter()
                .filter_map(|entry| class_name_from_entry(entry, "class"))
                .collect(),
            ClasspathEntry::ClassDir(dir) => walk_names(dir, "class"),
            ClasspathEntry::SourceDir(dir) => walk_names(dir, "kt"),
        };
        names.sort();
        names.dedup();
        Ok(names)
    }
}

fn walk_names(dir: &Path, extension: &str) -> Vec<String> {
    walkdir::WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension() == Some(OsStr::new(extension)))
        .filter_map(|entry| {
            let rel = entry.path().strip_prefix(dir).ok()?;
            class_name_from_entry(&rel.to_string_lossy().replace('\\', "/"), extension)
        })
        .collect()
}

fn class_name_from_entry(entry: &str, extension: &str) -> Option<String> {
    let stem = entry.strip_suffix(extension)?.strip_suffix('.')?;
    if stem.starts_with("META-INF/")
        || stem.ends_with("module-info")
        || stem.ends_with("package-info")
    {
        return None;
    }
    let segments: Vec<&str> = stem.split(['/', '$']).collect();
    let synthetic = segments
        .iter()
        .any(|segment| segment.is_empty() || segment.starts_with(|c: char| c.is_ascii_digit()));
    (!synthetic).then(|| segments.join("."))
}

fn hash_mtime(hasher: &mut DefaultHasher, time: &SystemTime) {
    let duration = time.duration_since(UNIX_EPOCH).unwrap_or_default();
    duration.as_secs().hash(hasher);
    duration.subsec_nanos().hash(hasher);
}
