use kite_vfs::{ArchivePath, DocumentUri};
use kite_workspace::WorkspaceError;
use lsp_types::{GotoDefinitionParams, GotoDefinitionResponse};

use super::support::{canonical_tempdir, position, sample_project, workspace, write};

fn entry_uri(archive: &std::path::Path, entry: &str) -> String {
    DocumentUri::Archive(ArchivePath::new(archive, entry)).to_string()
}

#[tokio::test]
async fn an_archive_entry_is_extracted_once() {
    let (_dir, base) = canonical_tempdir();
    let root = sample_project(&base);
    let uri = entry_uri(&root.join("libs/greet.jar"), "lib/Greeter.class");

    let workspace = workspace();
    let first = workspace.archive_contents(&uri).await.unwrap();
    let second = workspace.archive_contents(&uri).await.unwrap();

    assert!(first.contains("Greeter bytes"));
    assert_eq!(first, second);
    assert_eq!(workspace.extraction_count(), 1);
    assert!(workspace.temp_dir().is_dir());
}

#[tokio::test]
async fn kls_uris_resolve_like_jar_uris() {
    let (_dir, base) = canonical_tempdir();
    let root = sample_project(&base);
    let jar = entry_uri(&root.join("libs/greet.jar"), "lib/Greeter.class");
    let kls = jar.replacen("jar:", "kls:", 1);

    let workspace = workspace();
    workspace.archive_contents(&jar).await.unwrap();
    workspace.archive_contents(&kls).await.unwrap();
    assert_eq!(workspace.extraction_count(), 1);
}

#[tokio::test]
async fn missing_entries_and_archives_are_not_found() {
    let (_dir, base) = canonical_tempdir();
    let root = sample_project(&base);
    let workspace = workspace();

    let missing_entry = entry_uri(&root.join("libs/greet.jar"), "lib/Missing.class");
    let err = workspace.archive_contents(&missing_entry).await.unwrap_err();
    assert!(matches!(err, WorkspaceError::NotFound(_)), "{err:?}");

    let missing_archive = entry_uri(&root.join("libs/absent.jar"), "lib/Greeter.class");
    let err = workspace.archive_contents(&missing_archive).await.unwrap_err();
    assert!(matches!(err, WorkspaceError::NotFound(_)), "{err:?}");
    assert_eq!(workspace.extraction_count(), 0);
}

#[tokio::test]
async fn corrupt_archives_are_unreadable() {
    let (_dir, base) = canonical_tempdir();
    let corrupt = base.join("libs/corrupt.jar");
    write(&corrupt, "this is not a zip file");

    let workspace = workspace();
    let err = workspace
        .archive_contents(&entry_uri(&corrupt, "pkg/Foo.class"))
        .await
        .unwrap_err();
    match err {
        WorkspaceError::UnreadableArchive { path, .. } => assert_eq!(path, corrupt),
        other => panic!("expected an unreadable archive, got {other:?}"),
    }
}

#[tokio::test]
async fn unsupported_schemes_are_rejected() {
    let workspace = workspace();
    let err = workspace
        .archive_contents("https://example.com/Foo.class")
        .await
        .unwrap_err();
    assert!(matches!(err, WorkspaceError::InvalidUri(_)), "{err:?}");
}

#[tokio::test]
async fn definition_of_an_import_jumps_into_the_archive() {
    let (_dir, base) = canonical_tempdir();
    let root = sample_project(&base);
    let main = root.join("src/app/Main.kt");

    let workspace = workspace();
    workspace.add_roots(vec![root.clone()]).await.unwrap();

    let response = workspace
        .definition(GotoDefinitionParams {
            text_document_position_params: position(&main, 2, 12),
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        })
        .await
        .unwrap();
    let Some(GotoDefinitionResponse::Scalar(location)) = response else {
        panic!("expected a single location, got {response:?}");
    };
    let expected = entry_uri(&root.join("libs/greet.jar"), "lib/Greeter.class");
    assert_eq!(location.uri.as_str(), expected);

    let text = workspace.archive_contents(location.uri.as_str()).await.unwrap();
    assert!(text.contains("Greeter bytes"));
}
