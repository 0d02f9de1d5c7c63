use std::path::Path;

use kite_archive::is_archive_path;

use crate::{BuildConfigReader, ProjectError, RawDependency};

const LIB_DIRS: [&str; 2] = ["libs", "lib"];

/// Picks up archives dropped into `libs/` or `lib/` directly under the root.
#[derive(Debug, Clone, Copy, Default)]
pub struct LibsDirReader;

impl BuildConfigReader for LibsDirReader {
    fn name(&self) -> &'static str {
        "libs-dir"
    }

    fn read(&self, root: &Path) -> Result<Vec<RawDependency>, ProjectError> {
        let mut deps = Vec::new();
        for dir in LIB_DIRS {
            let dir = root.join(dir);
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => return Err(ProjectError::Io { path: dir, source }),
            };
            let mut archives = Vec::new();
            for entry in entries {
                let path = entry
                    .map_err(|source| ProjectError::Io {
                        path: dir.clone(),
                        source,
                    })?
                    .path();
                if path.is_file() && is_archive_path(&path) {
                    archives.push(path);
                }
            }
            archives.sort();
            deps.extend(archives.into_iter().map(RawDependency::binary));
        }
        Ok(deps)
    }

    fn is_build_file(&self, path: &Path) -> bool {
        let in_lib_dir = path
            .parent()
            .and_then(Path::file_name)
            .and_then(|name| name.to_str())
            .is_some_and(|name| LIB_DIRS.contains(&name));
        in_lib_dir && is_archive_path(path)
    }
}
