use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use kite_archive::is_archive_path;
use kite_core::ClasspathGeneration;
use kite_project::{BuildConfigReader, RawDependency};

use crate::{ClasspathEntry, ClasspathError};

/// Immutable view of one root's classpath at a given generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClasspathSnapshot {
    /// `None` for documents outside every workspace root.
    pub root: Option<PathBuf>,
    pub generation: ClasspathGeneration,
    pub entries: Arc<[ClasspathEntry]>,
    /// Sorted fully qualified names provided by `entries`.
    pub classes: Arc<[String]>,
}

impl ClasspathSnapshot {
    /// Classpath of loose documents: generation 0, nothing on it.
    pub fn loose() -> Self {
        Self {
            root: None,
            generation: 0,
            entries: Arc::from(Vec::new()),
            classes: Arc::from(Vec::new()),
        }
    }

    pub fn has_class(&self, name: &str) -> bool {
        self.classes
            .binary_search_by(|candidate| candidate.as_str().cmp(name))
            .is_ok()
    }

    /// Whether any class lives in `package` (used for star imports).
    pub fn has_package(&self, package: &str) -> bool {
        let prefix = format!("{package}.");
        self.classes.iter().any(|class| class.starts_with(&prefix))
    }
}

#[derive(Debug)]
struct RootClasspath {
    generation: ClasspathGeneration,
    entries: Arc<[ClasspathEntry]>,
    classes: Arc<[String]>,
}

struct Listing {
    fingerprint: u64,
    names: Arc<[String]>,
}

pub struct ClasspathManager {
    reader: Arc<dyn BuildConfigReader>,
    roots: BTreeMap<PathBuf, RootClasspath>,
    /// Per-entry class listings, reused across refreshes while the entry is unchanged on disk.
    listings: HashMap<ClasspathEntry, Listing>,
    closed: bool,
}

impl ClasspathManager {
    pub fn new(reader: Arc<dyn BuildConfigReader>) -> Self {
        Self {
            reader,
            roots: BTreeMap::new(),
            listings: HashMap::new(),
            closed: false,
        }
    }

    pub fn is_build_file(&self, path: &Path) -> bool {
        self.reader.is_build_file(path)
    }

    pub fn roots(&self) -> impl Iterator<Item = &Path> {
        self.roots.keys().map(PathBuf::as_path)
    }

    pub fn generation(&self, root: &Path) -> Option<ClasspathGeneration> {
        self.roots.get(root).map(|state| state.generation)
    }

    /// Deepest registered root containing `path`.
    pub fn root_for(&self, path: &Path) -> Option<&Path> {
        self.roots
            .keys()
            .filter(|root| path.starts_with(root))
            .max_by_key(|root| root.components().count())
            .map(PathBuf::as_path)
    }

    pub fn snapshot(&self, root: &Path) -> Option<ClasspathSnapshot> {
        self.roots.get(root).map(|state| ClasspathSnapshot {
            root: Some(root.to_path_buf()),
            generation: state.generation,
            entries: Arc::clone(&state.entries),
            classes: Arc::clone(&state.classes),
        })
    }

    /// Snapshot for the root owning `path`, or the loose classpath.
    pub fn snapshot_for(&self, path: &Path) -> ClasspathSnapshot {
        self.root_for(path)
            .and_then(|root| self.snapshot(root))
            .unwrap_or_else(ClasspathSnapshot::loose)
    }

    pub fn class_names(&self, root: &Path) -> Arc<[String]> {
        self.roots
            .get(root)
            .map(|state| Arc::clone(&state.classes))
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// Registers `root` and resolves its classpath. The first registration always reports a
    /// change; registering a known root again is a refresh.
    ///
    /// A root whose build configuration cannot be read is still registered, with an empty
    /// classpath at generation 1, so a later [`refresh`](Self::refresh) can pick up the fix.
    pub fn add_root(&mut self, root: &Path) -> Result<bool, ClasspathError> {
        if self.closed {
            return Err(ClasspathError::Closed);
        }
        if self.roots.contains_key(root) {
            return self.refresh(root);
        }

        let (entries, dropped) = match self.resolve(root) {
            Ok(resolved) => resolved,
            Err(err) => {
                tracing::warn!(
                    target: "kite.classpath",
                    root = %root.display(),
                    error = %err,
                    "registered workspace root with an empty classpath"
                );
                self.roots.insert(
                    root.to_path_buf(),
                    RootClasspath {
                        generation: 1,
                        entries: Arc::from(Vec::new()),
                        classes: Arc::from(Vec::new()),
                    },
                );
                return Err(err);
            }
        };
        let classes = self.index_classes(&entries);
        tracing::info!(
            target: "kite.classpath",
            root = %root.display(),
            entries = entries.len(),
            dropped,
            "registered workspace root"
        );
        self.roots.insert(
            root.to_path_buf(),
            RootClasspath {
                generation: 1,
                entries: entries.into(),
                classes,
            },
        );
        Ok(true)
    }

    /// Re-reads the root's build configuration. Returns whether the resolved entry set differs
    /// from the previous one; a refresh that had to drop entries always counts as a change.
    pub fn refresh(&mut self, root: &Path) -> Result<bool, ClasspathError> {
        if self.closed {
            return Err(ClasspathError::Closed);
        }
        if !self.roots.contains_key(root) {
            return Err(ClasspathError::NotRegistered(root.to_path_buf()));
        }

        let (entries, dropped) = self.resolve(root)?;
        let unchanged = self
            .roots
            .get(root)
            .is_some_and(|state| *state.entries == *entries);
        if unchanged && dropped == 0 {
            tracing::debug!(target: "kite.classpath", root = %root.display(), "classpath unchanged");
            return Ok(false);
        }

        let classes = self.index_classes(&entries);
        let Some(state) = self.roots.get_mut(root) else {
            return Err(ClasspathError::NotRegistered(root.to_path_buf()));
        };
        state.generation += 1;
        state.entries = entries.into();
        state.classes = classes;
        tracing::info!(
            target: "kite.classpath",
            root = %root.display(),
            generation = state.generation,
            entries = state.entries.len(),
            dropped,
            "classpath changed"
        );
        Ok(true)
    }

    /// Refreshes every root; a failing root does not stop the others.
    pub fn refresh_all(&mut self) -> Vec<(PathBuf, Result<bool, ClasspathError>)> {
        let roots: Vec<PathBuf> = self.roots.keys().cloned().collect();
        roots
            .into_iter()
            .map(|root| {
                let result = self.refresh(&root);
                if let Err(err) = &result {
                    tracing::warn!(
                        target: "kite.classpath",
                        root = %root.display(),
                        error = %err,
                        "classpath refresh failed"
                    );
                }
                (root, result)
            })
            .collect()
    }

    /// Drops cached listings; later refreshes fail with [`ClasspathError::Closed`].
    pub fn close(&mut self) {
        self.closed = true;
        self.listings.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Sorted, de-duplicated entries plus the number of dependencies that had to be dropped.
    fn resolve(&self, root: &Path) -> Result<(Vec<ClasspathEntry>, usize), ClasspathError> {
        let raw = self.reader.read(root)?;
        let mut dropped = 0;
        let mut entries = Vec::with_capacity(raw.len());
        for dep in raw {
            match resolve_dependency(&dep) {
                Ok(entry) => entries.push(entry),
                Err(reason) => {
                    dropped += 1;
                    tracing::warn!(
                        target: "kite.classpath",
                        root = %root.display(),
                        path = %dep.path.display(),
                        reason,
                        "dropping unresolvable classpath entry"
                    );
                }
            }
        }
        entries.sort();
        entries.dedup();
        Ok((entries, dropped))
    }

    fn index_classes(&mut self, entries: &[ClasspathEntry]) -> Arc<[String]> {
        let mut classes = Vec::new();
        for entry in entries {
            if let Some(names) = self.listing(entry) {
                classes.extend(names.iter().cloned());
            }
        }
        classes.sort();
        classes.dedup();
        classes.into()
    }

    fn listing(&mut self, entry: &ClasspathEntry) -> Option<Arc<[String]>> {
        let fingerprint = match entry.fingerprint() {
            Ok(fingerprint) => fingerprint,
            Err(err) => {
                tracing::warn!(
                    target: "kite.classpath",
                    path = %entry.path().display(),
                    error = %err,
                    "cannot stat classpath entry"
                );
                return None;
            }
        };
        if let Some(listing) = self.listings.get(entry) {
            if listing.fingerprint == fingerprint {
                return Some(Arc::clone(&listing.names));
            }
        }

        match entry.list_names() {
            Ok(names) => {
                let names: Arc<[String]> = names.into();
                self.listings.insert(
                    entry.clone(),
                    Listing {
                        fingerprint,
                        names: Arc::clone(&names),
                    },
                );
                Some(names)
            }
            Err(err) => {
                tracing::warn!(
                    target: "kite.classpath",
                    path = %entry.path().display(),
                    error = %err,
                    "cannot list classpath entry"
                );
                None
            }
        }
    }
}

fn resolve_dependency(dep: &RawDependency) -> Result<ClasspathEntry, &'static str> {
    let path = canonicalize_if_possible(&dep.path);
    if !path.exists() {
        return Err("path does not exist");
    }
    if dep.is_source_root {
        return if path.is_dir() {
            Ok(ClasspathEntry::SourceDir(path))
        } else {
            Err("source root is not a directory")
        };
    }
    if path.is_dir() {
        Ok(ClasspathEntry::ClassDir(path))
    } else if is_archive_path(&path) {
        Ok(ClasspathEntry::Archive(path))
    } else {
        Err("unsupported file type")
    }
}

fn canonicalize_if_possible(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Write;

    use kite_project::{DefaultBuildConfigReader, ProjectError, MANIFEST_FILE};
    use support::StaticReader;

    use super::*;

    mod support {
        use std::sync::Mutex;

        use super::*;

        pub struct StaticReader {
            pub deps: Mutex<Result<Vec<RawDependency>, String>>,
        }

        impl StaticReader {
            pub fn new(deps: Vec<RawDependency>) -> Self {
                Self {
                    deps: Mutex::new(Ok(deps)),
                }
            }

            pub fn set(&self, deps: Result<Vec<RawDependency>, String>) {
                *self.deps.lock().unwrap() = deps;
            }
        }

        impl BuildConfigReader for StaticReader {
            fn name(&self) -> &'static str {
                "static"
            }

            fn read(&self, root: &Path) -> Result<Vec<RawDependency>, ProjectError> {
                self.deps
                    .lock()
                    .unwrap()
                    .clone()
                    .map_err(|message| ProjectError::Parse {
                        path: root.to_path_buf(),
                        message,
                    })
            }

            fn is_build_file(&self, _path: &Path) -> bool {
                false
            }
        }
    }

    fn write_jar(path: &Path, entries: &[&str]) {
        let file = fs::File::create(path).unwrap();
        let mut jar = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::<()>::default();
        for name in entries {
            jar.start_file(*name, options).unwrap();
            jar.write_all(b"\xca\xfe\xba\xbe").unwrap();
        }
        jar.finish().unwrap();
    }

    fn canonical_tempdir() -> (tempfile::TempDir, PathBuf) {
        let tmp = tempfile::tempdir().unwrap();
        let root = fs::canonicalize(tmp.path()).unwrap();
        (tmp, root)
    }

    #[test]
    fn first_registration_is_a_change_and_identical_refresh_is_not() {
        let (_tmp, root) = canonical_tempdir();
        let mut manager = ClasspathManager::new(Arc::new(DefaultBuildConfigReader::default()));

        assert!(manager.add_root(&root).unwrap());
        assert_eq!(manager.generation(&root), Some(1));

        assert!(!manager.refresh(&root).unwrap());
        assert_eq!(manager.generation(&root), Some(1));
        let snapshot = manager.snapshot(&root).unwrap();
        assert!(snapshot.entries.is_empty());
        assert_eq!(snapshot.generation, 1);
    }

    #[test]
    fn changed_dependencies_bump_the_generation() {
        let (_tmp, root) = canonical_tempdir();
        fs::create_dir_all(root.join("libs")).unwrap();
        write_jar(&root.join("libs/dep.jar"), &["com/acme/Widget.class"]);

        let mut manager = ClasspathManager::new(Arc::new(DefaultBuildConfigReader::default()));
        manager.add_root(&root).unwrap();
        assert_eq!(
            &*manager.snapshot(&root).unwrap().entries,
            &[ClasspathEntry::Archive(root.join("libs/dep.jar"))]
        );
        assert!(manager.snapshot(&root).unwrap().has_class("com.acme.Widget"));

        write_jar(&root.join("libs/other.jar"), &["org/demo/Gadget.class"]);
        assert!(manager.refresh(&root).unwrap());
        assert_eq!(manager.generation(&root), Some(2));
        let snapshot = manager.snapshot(&root).unwrap();
        assert_eq!(snapshot.entries.len(), 2);
        assert!(snapshot.has_package("org.demo"));

        assert!(!manager.refresh(&root).unwrap());
        assert_eq!(manager.generation(&root), Some(2));
    }

    #[test]
    fn duplicates_collapse_and_order_does_not_matter() {
        let (_tmp, root) = canonical_tempdir();
        let classes = root.join("classes");
        fs::create_dir_all(classes.join("pkg")).unwrap();
        fs::write(classes.join("pkg/A.class"), b"").unwrap();
        write_jar(&root.join("a.jar"), &["pkg/B.class"]);

        let reader = Arc::new(StaticReader::new(vec![
            RawDependency::binary(root.join("a.jar")),
            RawDependency::binary(&classes),
            RawDependency::binary(root.join("./a.jar")),
        ]));
        let mut manager = ClasspathManager::new(reader.clone());
        manager.add_root(&root).unwrap();
        assert_eq!(manager.snapshot(&root).unwrap().entries.len(), 2);
        assert_eq!(
            &*manager.class_names(&root),
            &["pkg.A".to_string(), "pkg.B".to_string()]
        );

        reader.set(Ok(vec![
            RawDependency::binary(&classes),
            RawDependency::binary(root.join("a.jar")),
        ]));
        assert!(!manager.refresh(&root).unwrap());
    }

    #[test]
    fn unresolvable_entries_are_dropped_and_count_as_a_change() {
        let (_tmp, root) = canonical_tempdir();
        fs::write(root.join("notes.txt"), "not a jar").unwrap();
        let reader = Arc::new(StaticReader::new(vec![
            RawDependency::binary(root.join("missing.jar")),
            RawDependency::binary(root.join("notes.txt")),
            RawDependency::source(root.join("notes.txt")),
        ]));
        let mut manager = ClasspathManager::new(reader);

        assert!(manager.add_root(&root).unwrap());
        assert!(manager.snapshot(&root).unwrap().entries.is_empty());

        // Partial failures always report a change so dependents re-check.
        assert!(manager.refresh(&root).unwrap());
        assert_eq!(manager.generation(&root), Some(2));
    }

    #[test]
    fn reader_failure_leaves_state_untouched() {
        let (_tmp, root) = canonical_tempdir();
        let reader = Arc::new(StaticReader::new(Vec::new()));
        let mut manager = ClasspathManager::new(reader.clone());
        manager.add_root(&root).unwrap();

        reader.set(Err("broken".to_string()));
        assert!(matches!(
            manager.refresh(&root),
            Err(ClasspathError::Project(_))
        ));
        assert_eq!(manager.generation(&root), Some(1));

        let results = manager.refresh_all();
        assert_eq!(results.len(), 1);
        assert!(results[0].1.is_err());
    }

    #[test]
    fn root_with_unreadable_config_stays_registered_and_recovers() {
        let (_tmp, root) = canonical_tempdir();
        write_jar(&root.join("dep.jar"), &["com/acme/Widget.class"]);
        let reader = Arc::new(StaticReader::new(Vec::new()));
        reader.set(Err("broken".to_string()));
        let mut manager = ClasspathManager::new(reader.clone());

        assert!(matches!(
            manager.add_root(&root),
            Err(ClasspathError::Project(_))
        ));
        assert_eq!(manager.generation(&root), Some(1));
        assert_eq!(manager.root_for(&root.join("A.kt")), Some(root.as_path()));
        assert!(manager.snapshot(&root).unwrap().entries.is_empty());

        reader.set(Ok(vec![RawDependency::binary(root.join("dep.jar"))]));
        assert!(manager.refresh(&root).unwrap());
        assert_eq!(manager.generation(&root), Some(2));
        assert!(manager.snapshot(&root).unwrap().has_class("com.acme.Widget"));
    }

    #[test]
    fn nested_roots_resolve_to_the_deepest_and_loose_paths_get_generation_zero() {
        let (_tmp, root) = canonical_tempdir();
        let nested = root.join("module");
        fs::create_dir_all(&nested).unwrap();
        let mut manager = ClasspathManager::new(Arc::new(DefaultBuildConfigReader::default()));
        manager.add_root(&root).unwrap();
        manager.add_root(&nested).unwrap();

        assert_eq!(manager.root_for(&nested.join("src/A.kt")), Some(nested.as_path()));
        assert_eq!(manager.root_for(&root.join("B.kt")), Some(root.as_path()));
        let loose = manager.snapshot_for(Path::new("/definitely/elsewhere/C.kt"));
        assert_eq!(loose, ClasspathSnapshot::loose());
    }

    #[test]
    fn manifest_changes_are_build_files_and_close_rejects_refresh() {
        let (_tmp, root) = canonical_tempdir();
        let mut manager = ClasspathManager::new(Arc::new(DefaultBuildConfigReader::default()));
        manager.add_root(&root).unwrap();
        assert!(manager.is_build_file(&root.join(MANIFEST_FILE)));

        manager.close();
        assert!(matches!(manager.refresh(&root), Err(ClasspathError::Closed)));
        assert!(matches!(
            manager.add_root(&root.join("other")),
            Err(ClasspathError::Closed)
        ));
        assert!(matches!(
            ClasspathManager::new(Arc::new(DefaultBuildConfigReader::default()))
                .refresh(&root),
            Err(ClasspathError::NotRegistered(_))
        ));
    }
}
