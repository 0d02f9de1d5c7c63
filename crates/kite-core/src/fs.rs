use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Returns whether a directory named `name` should be skipped during source discovery.
pub fn is_excluded_dir(name: &str, exclude_dirs: &[String]) -> bool {
    exclude_dirs.iter().any(|excluded| excluded == name)
}

/// Recursively collect files under `root` whose extension is one of `extensions`.
///
/// Directories whose file name appears in `exclude_dirs` are not descended into. Missing
/// directories are treated as empty. The result is sorted so discovery order is deterministic.
pub fn collect_files_with_extensions(
    root: &Path,
    extensions: &[String],
    exclude_dirs: &[String],
) -> io::Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => return Err(err),
        };

        for entry in entries {
            let entry = entry?;
            let file_type = entry.file_type()?;
            let path = entry.path();

            if file_type.is_dir() {
                let excluded = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| is_excluded_dir(name, exclude_dirs));
                if !excluded {
                    pending.push(path);
                }
                continue;
            }

            let matches = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.iter().any(|wanted| wanted == ext));
            if file_type.is_file() && matches {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}
