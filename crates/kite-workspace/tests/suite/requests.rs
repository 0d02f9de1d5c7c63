use kite_workspace::{Workspace, WorkspaceError};
use lsp_types::{
    CompletionParams, CompletionResponse, DiagnosticSeverity, DocumentSymbolParams,
    DocumentSymbolResponse, ExecuteCommandParams, GotoDefinitionParams, GotoDefinitionResponse,
    HoverContents, HoverParams, NumberOrString, TextDocumentIdentifier, WorkspaceSymbolParams,
    WorkspaceSymbolResponse,
};
use serde_json::json;

use super::support::{
    canonical_tempdir, lsp_uri, open_params, position, sample_project, workspace, write,
};

async fn onboarded() -> (tempfile::TempDir, std::path::PathBuf, Workspace) {
    let (dir, base) = canonical_tempdir();
    let root = sample_project(&base);
    let workspace = workspace();
    workspace.add_roots(vec![root.clone()]).await.unwrap();
    (dir, root, workspace)
}

async fn hover_text(
    workspace: &Workspace,
    path: &std::path::Path,
    line: u32,
    character: u32,
) -> Option<String> {
    let hover = workspace
        .hover(HoverParams {
            text_document_position_params: position(path, line, character),
            work_done_progress_params: Default::default(),
        })
        .await
        .unwrap()?;
    match hover.contents {
        HoverContents::Markup(markup) => Some(markup.value),
        other => panic!("expected markdown, got {other:?}"),
    }
}

async fn completion_items(
    workspace: &Workspace,
    path: &std::path::Path,
    line: u32,
    character: u32,
) -> Vec<lsp_types::CompletionItem> {
    let response = workspace
        .completion(CompletionParams {
            text_document_position: position(path, line, character),
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
            context: None,
        })
        .await
        .unwrap();
    match response {
        Some(CompletionResponse::Array(items)) => items,
        other => panic!("expected a completion list, got {other:?}"),
    }
}

#[tokio::test]
async fn hover_describes_declarations_and_imports() {
    let (_dir, root, workspace) = onboarded().await;
    let main = root.join("src/app/Main.kt");

    let declaration = hover_text(&workspace, &main, 4, 5).await.unwrap();
    assert!(declaration.contains("fun main()"), "{declaration}");
    assert!(declaration.contains("app.main"), "{declaration}");

    let usage = hover_text(&workspace, &main, 5, 20).await.unwrap();
    assert!(usage.contains("import lib.Greeter"), "{usage}");
    assert!(usage.ends_with("\nfound on the classpath"), "{usage}");

    assert_eq!(hover_text(&workspace, &main, 1, 0).await, None);
}

#[tokio::test]
async fn definition_finds_declarations_in_other_files() {
    let (_dir, root, workspace) = onboarded().await;
    let main = root.join("src/app/Main.kt");

    let response = workspace
        .definition(GotoDefinitionParams {
            text_document_position_params: position(&main, 6, 6),
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        })
        .await
        .unwrap();
    let Some(GotoDefinitionResponse::Scalar(location)) = response else {
        panic!("expected a single location, got {response:?}");
    };
    assert_eq!(location.uri, lsp_uri(&root.join("src/app/Util.kt")));
    assert_eq!(location.range.start, lsp_types::Position::new(2, 4));
}

#[tokio::test]
async fn completion_offers_workspace_and_classpath_names() {
    let (_dir, root, workspace) = onboarded().await;
    let main = root.join("src/app/Main.kt");

    let items = completion_items(&workspace, &main, 6, 7).await;
    let helper = items.iter().find(|item| item.label == "helper").unwrap();
    assert_eq!(helper.insert_text_format, None);

    let items = completion_items(&workspace, &main, 5, 21).await;
    assert!(items.iter().any(|item| item.label == "Greeter"));
}

#[tokio::test]
async fn document_and_workspace_symbols() {
    let (_dir, root, workspace) = onboarded().await;
    let util = root.join("src/app/Util.kt");

    let response = workspace
        .document_symbols(DocumentSymbolParams {
            text_document: TextDocumentIdentifier { uri: lsp_uri(&util) },
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        })
        .await
        .unwrap();
    let Some(DocumentSymbolResponse::Flat(symbols)) = response else {
        panic!("expected flat symbols, got {response:?}");
    };
    let names: Vec<_> = symbols
        .iter()
        .map(|symbol| (symbol.name.as_str(), symbol.container_name.as_deref()))
        .collect();
    assert_eq!(
        names,
        vec![("helper", None), ("Box", None), ("open", Some("Box"))]
    );

    let response = workspace
        .workspace_symbols(WorkspaceSymbolParams {
            query: "box".to_string(),
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        })
        .await
        .unwrap();
    let Some(WorkspaceSymbolResponse::Flat(found)) = response else {
        panic!("expected flat symbols, got {response:?}");
    };
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Box");
    assert_eq!(found[0].location.uri, lsp_uri(&util));
}

#[tokio::test]
async fn diagnostics_report_syntax_errors_and_todos() {
    let (_dir, root, workspace) = onboarded().await;
    let broken = root.join("src/app/Broken.kt");
    write(&broken, "");
    workspace
        .did_open(open_params(&broken, "// TODO: finish\nfun broken() {\n"))
        .await
        .unwrap();

    let diagnostics = workspace.diagnostics(&lsp_uri(&broken)).await.unwrap();
    assert!(diagnostics.iter().all(|d| d.source.as_deref() == Some("kite")));
    assert!(diagnostics.iter().any(|d| d.severity == Some(DiagnosticSeverity::ERROR)
        && d.code == Some(NumberOrString::String("syntax".to_string()))));
    assert!(diagnostics.iter().any(|d| d.severity == Some(DiagnosticSeverity::WARNING)
        && d.code == Some(NumberOrString::String("todo".to_string()))));

    let clean = workspace
        .diagnostics(&lsp_uri(&root.join("src/app/Util.kt")))
        .await
        .unwrap();
    assert!(clean.is_empty(), "{clean:?}");
}

#[tokio::test]
async fn execute_command_dispatches_known_commands() {
    let (_dir, root, workspace) = onboarded().await;

    let refreshed = workspace
        .execute_command(ExecuteCommandParams {
            command: "kite.refreshClasspath".to_string(),
            arguments: vec![json!(lsp_uri(&root).as_str())],
            work_done_progress_params: Default::default(),
        })
        .await
        .unwrap();
    assert_eq!(refreshed, Some(json!({ "changed": [], "failed": [] })));

    let unknown = workspace
        .execute_command(ExecuteCommandParams {
            command: "kite.doesNotExist".to_string(),
            arguments: Vec::new(),
            work_done_progress_params: Default::default(),
        })
        .await
        .unwrap_err();
    assert!(matches!(unknown, WorkspaceError::UnknownCommand(_)), "{unknown:?}");

    let missing_argument = workspace
        .execute_command(ExecuteCommandParams {
            command: "kite.archiveContents".to_string(),
            arguments: Vec::new(),
            work_done_progress_params: Default::default(),
        })
        .await
        .unwrap_err();
    assert!(
        matches!(missing_argument, WorkspaceError::InvalidArguments(_)),
        "{missing_argument:?}"
    );
}

#[tokio::test]
async fn refresh_command_keeps_going_past_a_broken_root() {
    let (_dir, base) = canonical_tempdir();
    let a = base.join("a");
    let b = base.join("b");
    write(&a.join("a.kt"), "fun a() {}\n");
    write(&b.join("b.kt"), "fun b() {}\n");
    std::fs::create_dir_all(b.join("classes")).unwrap();

    let workspace = workspace();
    assert!(workspace.add_roots(vec![a.clone(), b.clone()]).await.unwrap().is_success());
    assert_eq!(workspace.classpath_generation(&b), Some(1));

    write(&a.join("kite-build.toml"), "classpath = [\n");
    write(&b.join("kite-build.toml"), "classpath = [\"classes\"]\n");
    let refreshed = workspace
        .execute_command(ExecuteCommandParams {
            command: "kite.refreshClasspath".to_string(),
            arguments: Vec::new(),
            work_done_progress_params: Default::default(),
        })
        .await
        .unwrap();

    assert_eq!(
        refreshed,
        Some(json!({
            "changed": [b.display().to_string()],
            "failed": [a.display().to_string()],
        }))
    );
    assert_eq!(workspace.classpath_generation(&a), Some(1));
    assert_eq!(workspace.classpath_generation(&b), Some(2));
}
