use std::fs;

use kite_workspace::{AnalysisTag, CancellationToken};
use lsp_types::{DidChangeWatchedFilesParams, FileChangeType, FileEvent};

use super::support::{canonical_tempdir, doc, lsp_uri, workspace, write, write_jar};

fn watched(events: Vec<(std::path::PathBuf, FileChangeType)>) -> DidChangeWatchedFilesParams {
    DidChangeWatchedFilesParams {
        changes: events
            .into_iter()
            .map(|(path, typ)| FileEvent::new(lsp_uri(&path), typ))
            .collect(),
    }
}

#[tokio::test]
async fn identical_refresh_leaves_analyses_untouched() {
    let (_dir, base) = canonical_tempdir();
    let root = base.join("A");
    let file = root.join("f.kt");
    write(&file, "fun f() {}\n");
    write_jar(&root.join("libs/dep.jar"), &[("dep/Thing.class", b"\xca\xfe")]);

    let workspace = workspace();
    workspace.add_roots(vec![root.clone()]).await.unwrap();
    let uri = doc(&file);
    let before = workspace.analysis(&uri, CancellationToken::new()).await.unwrap();

    assert!(!workspace.refresh_classpath(&root).await.unwrap());
    assert_eq!(workspace.classpath_generation(&root), Some(1));

    let after = workspace.analysis(&uri, CancellationToken::new()).await.unwrap();
    assert_eq!(after.tag, before.tag);
    assert_eq!(workspace.recompute_count(), 1);
}

#[tokio::test]
async fn manifest_change_refreshes_the_classpath_and_recomputes_lazily() {
    let (_dir, base) = canonical_tempdir();
    let root = base.join("A");
    let file = root.join("src/f.kt");
    write(&file, "import dep.Thing\n\nfun f() {}\n");
    fs::create_dir_all(root.join("vendor")).unwrap();
    write_jar(&root.join("vendor/dep.jar"), &[("dep/Thing.class", b"\xca\xfe")]);

    let workspace = workspace();
    workspace.add_roots(vec![root.clone()]).await.unwrap();
    let uri = doc(&file);
    let before = workspace.analysis(&uri, CancellationToken::new()).await.unwrap();
    assert_eq!(before.tag, AnalysisTag::new(0, 1));
    assert!(!before.imports[0].on_classpath);

    let manifest = root.join("kite-build.toml");
    write(&manifest, "classpath = [\"vendor/dep.jar\"]\n");
    let report = workspace
        .did_change_watched_files(watched(vec![(manifest, FileChangeType::CREATED)]))
        .await
        .unwrap();
    assert_eq!(report.classpath_changed, vec![root.clone()]);
    assert_eq!(workspace.classpath_generation(&root), Some(2));
    // Invalidation is lazy: nothing was recomputed yet.
    assert_eq!(workspace.recompute_count(), 1);

    let after = workspace.analysis(&uri, CancellationToken::new()).await.unwrap();
    assert_eq!(after.tag, AnalysisTag::new(0, 2));
    assert!(after.imports[0].on_classpath);
    assert_eq!(workspace.recompute_count(), 2);
}

#[tokio::test]
async fn repeated_invalidation_recomputes_once() {
    let (_dir, base) = canonical_tempdir();
    let root = base.join("A");
    let file = root.join("f.kt");
    write(&file, "fun f() {}\n");
    fs::create_dir_all(root.join("classes/one")).unwrap();
    fs::create_dir_all(root.join("classes/two")).unwrap();

    let workspace = workspace();
    workspace.add_roots(vec![root.clone()]).await.unwrap();
    let uri = doc(&file);
    workspace.analysis(&uri, CancellationToken::new()).await.unwrap();

    write(&root.join("kite-build.toml"), "classpath = [\"classes/one\"]\n");
    assert!(workspace.refresh_classpath(&root).await.unwrap());
    write(&root.join("kite-build.toml"), "classpath = [\"classes/two\"]\n");
    assert!(workspace.refresh_classpath(&root).await.unwrap());
    assert_eq!(workspace.recompute_count(), 1);

    let entry = workspace.analysis(&uri, CancellationToken::new()).await.unwrap();
    assert_eq!(entry.tag, AnalysisTag::new(0, 3));
    workspace.analysis(&uri, CancellationToken::new()).await.unwrap();
    assert_eq!(workspace.recompute_count(), 2);
}

#[tokio::test]
async fn watched_source_events_keep_the_registry_current() {
    let (_dir, base) = canonical_tempdir();
    let root = base.join("A");
    let kept = root.join("kept.kt");
    let doomed = root.join("doomed.kt");
    write(&kept, "fun kept() {}\n");
    write(&doomed, "fun doomed() {}\n");

    let workspace = workspace();
    workspace.add_roots(vec![root.clone()]).await.unwrap();

    let created = root.join("created.kt");
    write(&created, "fun created() {}\n");
    write(&kept, "fun kept() = 1\n");
    fs::remove_file(&doomed).unwrap();
    let report = workspace
        .did_change_watched_files(watched(vec![
            (created.clone(), FileChangeType::CREATED),
            (kept.clone(), FileChangeType::CHANGED),
            (doomed.clone(), FileChangeType::DELETED),
            (root.join("notes.txt"), FileChangeType::CREATED),
        ]))
        .await
        .unwrap();

    assert_eq!(report.sources_updated, vec![doc(&created), doc(&kept)]);
    assert_eq!(report.sources_removed, vec![doc(&doomed)]);
    assert!(report.classpath_changed.is_empty());
    assert_eq!(workspace.documents(), vec![doc(&created), doc(&kept)]);

    let entry = workspace
        .analysis(&doc(&kept), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(&*entry.text, "fun kept() = 1\n");
}

#[tokio::test]
async fn fixing_a_broken_manifest_recovers_the_root() {
    let (_dir, base) = canonical_tempdir();
    let root = base.join("A");
    let file = root.join("src/f.kt");
    let manifest = root.join("kite-build.toml");
    write(&file, "import dep.Thing\n\nfun f() {}\n");
    write(&manifest, "classpath = [\n");
    fs::create_dir_all(root.join("vendor")).unwrap();
    write_jar(&root.join("vendor/dep.jar"), &[("dep/Thing.class", b"\xca\xfe")]);

    let workspace = workspace();
    let report = workspace.add_roots(vec![root.clone()]).await.unwrap();
    assert!(!report.is_success());
    assert_eq!(workspace.classpath_generation(&root), Some(1));

    let uri = doc(&file);
    let before = workspace.analysis(&uri, CancellationToken::new()).await.unwrap();
    assert_eq!(before.tag, AnalysisTag::new(0, 1));
    assert!(!before.imports[0].on_classpath);

    write(&manifest, "classpath = [\"vendor/dep.jar\"]\n");
    let report = workspace
        .did_change_watched_files(watched(vec![(manifest, FileChangeType::CHANGED)]))
        .await
        .unwrap();
    assert_eq!(report.classpath_changed, vec![root.clone()]);
    assert_eq!(workspace.classpath_generation(&root), Some(2));

    let after = workspace.analysis(&uri, CancellationToken::new()).await.unwrap();
    assert_eq!(after.tag, AnalysisTag::new(0, 2));
    assert!(after.imports[0].on_classpath);
}
