use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{BuildConfigReader, ProjectError, RawDependency};

pub const MANIFEST_FILE: &str = "kite-build.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct BuildManifest {
    classpath: Vec<PathBuf>,
    source_roots: Vec<PathBuf>,
}

/// Reads `kite-build.toml` at the workspace root:
///
/// ```toml
/// classpath = ["libs/kotlin-stdlib.jar", "/opt/shared/classes"]
/// source_roots = ["third_party/src"]
/// ```
///
/// Relative paths are resolved against the root. A missing manifest means no dependencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManifestReader;

impl BuildConfigReader for ManifestReader {
    fn name(&self) -> &'static str {
        "manifest"
    }

    fn read(&self, root: &Path) -> Result<Vec<RawDependency>, ProjectError> {
        let path = root.join(MANIFEST_FILE);
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(ProjectError::Io { path, source }),
        };

        let manifest: BuildManifest =
            toml::from_str(&text).map_err(|err| ProjectError::Parse {
                path: path.clone(),
                message: err.message().to_string(),
            })?;

        let resolve = |p: PathBuf| if p.is_absolute() { p } else { root.join(p) };
        let mut deps: Vec<_> = manifest
            .classpath
            .into_iter()
            .map(|p| RawDependency::binary(resolve(p)))
            .collect();
        deps.extend(
            manifest
                .source_roots
                .into_iter()
                .map(|p| RawDependency::source(resolve(p))),
        );
        Ok(deps)
    }

    fn is_build_file(&self, path: &Path) -> bool {
        path.file_name().is_some_and(|name| name == MANIFEST_FILE)
    }
}
