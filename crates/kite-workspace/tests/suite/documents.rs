use kite_workspace::{AnalysisTag, CancellationToken, CloseOutcome, WorkspaceError};
use lsp_types::{
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, TextDocumentContentChangeEvent,
    TextDocumentIdentifier, VersionedTextDocumentIdentifier,
};

use super::support::{canonical_tempdir, doc, lsp_uri, open_params, workspace, write};

fn close_params(path: &std::path::Path) -> DidCloseTextDocumentParams {
    DidCloseTextDocumentParams {
        text_document: TextDocumentIdentifier { uri: lsp_uri(path) },
    }
}

fn change_params(
    path: &std::path::Path,
    range: Option<lsp_types::Range>,
    text: &str,
) -> DidChangeTextDocumentParams {
    DidChangeTextDocumentParams {
        text_document: VersionedTextDocumentIdentifier {
            uri: lsp_uri(path),
            // Client versions are not trusted; the registry numbers edits itself.
            version: 99,
        },
        content_changes: vec![TextDocumentContentChangeEvent {
            range,
            range_length: None,
            text: text.to_string(),
        }],
    }
}

#[tokio::test]
async fn an_edit_recomputes_once_and_then_hits_the_cache() {
    let (_dir, base) = canonical_tempdir();
    let root = base.join("A");
    let file = root.join("f.kt");
    write(&file, "fun f() = 1\n");

    let workspace = workspace();
    workspace.add_roots(vec![root]).await.unwrap();
    let uri = doc(&file);

    let first = workspace.analysis(&uri, CancellationToken::new()).await.unwrap();
    assert_eq!(first.tag, AnalysisTag::new(0, 1));
    assert_eq!(workspace.recompute_count(), 1);

    let version = workspace
        .did_open(open_params(&file, "fun f() = 2\nfun g() = 3\n"))
        .await
        .unwrap();
    assert_eq!(version, 1);

    let edited = workspace.analysis(&uri, CancellationToken::new()).await.unwrap();
    assert_eq!(edited.tag, AnalysisTag::new(1, 1));
    assert_eq!(workspace.recompute_count(), 2);
    let names: Vec<_> = edited.symbols.iter().map(|symbol| symbol.name.as_str()).collect();
    assert_eq!(names, vec!["f", "g"]);

    let again = workspace.analysis(&uri, CancellationToken::new()).await.unwrap();
    assert_eq!(again.tag, AnalysisTag::new(1, 1));
    assert_eq!(workspace.recompute_count(), 2);
}

#[tokio::test]
async fn closing_reverts_to_disk_content_with_a_newer_version() {
    let (_dir, base) = canonical_tempdir();
    let root = base.join("A");
    let file = root.join("f.kt");
    write(&file, "fun disk() {}\n");

    let workspace = workspace();
    workspace.add_roots(vec![root]).await.unwrap();
    let uri = doc(&file);

    workspace
        .did_open(open_params(&file, "fun buffer() {}\n"))
        .await
        .unwrap();
    let outcome = workspace.did_close(close_params(&file)).await.unwrap();
    assert_eq!(outcome, CloseOutcome::Reverted(2));

    let entry = workspace.analysis(&uri, CancellationToken::new()).await.unwrap();
    assert_eq!(&*entry.text, "fun disk() {}\n");
    assert_eq!(entry.tag.source_version, 2);
}

#[tokio::test]
async fn closing_a_document_that_was_never_opened_is_a_no_op() {
    let (_dir, base) = canonical_tempdir();
    let root = base.join("A");
    let file = root.join("f.kt");
    write(&file, "fun f() {}\n");

    let workspace = workspace();
    workspace.add_roots(vec![root]).await.unwrap();

    let outcome = workspace.did_close(close_params(&file)).await.unwrap();
    assert_eq!(outcome, CloseOutcome::Ignored);
    assert_eq!(workspace.document_version(&doc(&file)), Some(0));

    let unknown = base.join("nowhere.kt");
    let outcome = workspace.did_close(close_params(&unknown)).await.unwrap();
    assert_eq!(outcome, CloseOutcome::Ignored);
}

#[tokio::test]
async fn incremental_changes_apply_to_the_open_buffer() {
    let (_dir, base) = canonical_tempdir();
    let file = base.join("loose.kt");

    let workspace = workspace();
    workspace
        .did_open(open_params(&file, "fun a() {}\n"))
        .await
        .unwrap();
    let range = lsp_types::Range::new(lsp_types::Position::new(0, 4), lsp_types::Position::new(0, 5));
    let version = workspace
        .did_change(change_params(&file, Some(range), "renamed"))
        .await
        .unwrap();

    let entry = workspace
        .analysis(&doc(&file), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(&*entry.text, "fun renamed() {}\n");
    assert_eq!(entry.tag, AnalysisTag::new(version, 0));
    assert!(entry.root.is_none());
}

#[tokio::test]
async fn versions_strictly_increase_across_edits_and_reopen() {
    let (_dir, base) = canonical_tempdir();
    let root = base.join("A");
    let file = root.join("f.kt");
    write(&file, "fun f() {}\n");

    let workspace = workspace();
    workspace.add_roots(vec![root]).await.unwrap();

    let mut versions = vec![workspace.document_version(&doc(&file)).unwrap()];
    versions.push(workspace.did_open(open_params(&file, "fun a() {}\n")).await.unwrap());
    versions.push(workspace.did_change(change_params(&file, None, "fun b() {}\n")).await.unwrap());
    match workspace.did_close(close_params(&file)).await.unwrap() {
        CloseOutcome::Reverted(version) => versions.push(version),
        other => panic!("expected a revert, got {other:?}"),
    }
    versions.push(workspace.did_open(open_params(&file, "fun c() {}\n")).await.unwrap());

    assert!(versions.windows(2).all(|pair| pair[0] < pair[1]), "{versions:?}");
}

#[tokio::test]
async fn editing_an_unknown_document_is_not_found() {
    let (_dir, base) = canonical_tempdir();
    let workspace = workspace();

    let err = workspace
        .did_change(change_params(&base.join("missing.kt"), None, "x"))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkspaceError::NotFound(_)), "{err:?}");

    let err = workspace
        .analysis(&doc(&base.join("missing.kt")), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkspaceError::NotFound(_)), "{err:?}");
}
