use kite_workspace::{AnalysisTag, CancellationToken, InitPhase, ProgressEvent};
use lsp_types::{InitializeParams, WorkspaceFolder};
use serde_json::json;

use super::support::{
    canonical_tempdir, doc, drain, lsp_uri, reports, sample_project, workspace, write,
};

#[tokio::test]
async fn single_root_reports_every_phase_and_tags_analyses() {
    let (_dir, base) = canonical_tempdir();
    let root = base.join("A");
    let file = root.join("f.kt");
    write(&file, "fun f() = 1\n");

    let workspace = workspace();
    let mut rx = workspace.subscribe_progress();
    let report = workspace.add_roots(vec![root.clone()]).await.unwrap();

    assert!(report.is_success());
    assert_eq!(report.roots.len(), 1);
    assert_eq!(
        report.roots[0].phases,
        vec![
            InitPhase::Pending,
            InitPhase::RegisteringSources,
            InitPhase::RefreshingClasspath,
            InitPhase::RefreshingIndex,
            InitPhase::Done,
        ]
    );
    assert_eq!(report.roots[0].sources_added, 1);

    let events = drain(&mut rx);
    assert!(matches!(
        events.first(),
        Some(ProgressEvent::Begin { percentage: Some(0), message: Some(ref message), .. })
            if message == "0/1 folders"
    ));
    assert_eq!(
        reports(&events),
        vec![
            ("[1/1] A: Updating source path".to_string(), Some(0)),
            ("[1/1] A: Updating class path".to_string(), Some(0)),
            ("[1/1] A: Refreshing source path".to_string(), Some(0)),
        ]
    );
    assert!(matches!(events.last(), Some(ProgressEvent::End { .. })));

    let entry = workspace
        .analysis(&doc(&file), CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(entry.tag, AnalysisTag::new(0, 1));
}

#[tokio::test]
async fn percentages_follow_completed_roots() {
    let (_dir, base) = canonical_tempdir();
    let first = base.join("first");
    let second = base.join("second");
    write(&first.join("a.kt"), "fun a() {}\n");
    write(&second.join("b.kt"), "fun b() {}\n");

    let workspace = workspace();
    let mut rx = workspace.subscribe_progress();
    workspace
        .add_roots(vec![first.clone(), second.clone()])
        .await
        .unwrap();

    let events = drain(&mut rx);
    assert_eq!(events.first().and_then(ProgressEvent::message), Some("0/2 folders"));
    let reports = reports(&events);
    assert!(reports.contains(&("[1/2] first: Updating source path".to_string(), Some(0))));
    assert!(reports.contains(&("[2/2] second: Updating class path".to_string(), Some(50))));
    assert_eq!(workspace.roots(), vec![first, second]);
}

#[tokio::test]
async fn a_failing_root_does_not_stop_the_others() {
    let (_dir, base) = canonical_tempdir();
    let broken = base.join("broken");
    let healthy = base.join("healthy");
    write(&broken.join("kite-build.toml"), "classpath = [not toml\n");
    write(&broken.join("x.kt"), "fun x() {}\n");
    write(&healthy.join("y.kt"), "fun y() {}\n");

    let workspace = workspace();
    let mut rx = workspace.subscribe_progress();
    let report = workspace
        .add_roots(vec![broken.clone(), healthy.clone()])
        .await
        .unwrap();

    assert!(!report.is_success());
    let failed: Vec<_> = report.failed().map(|root| root.root.clone()).collect();
    assert_eq!(failed, vec![broken.clone()]);
    assert_eq!(report.roots[0].phase(), InitPhase::Failed);
    assert!(report.roots[0].error.is_some());
    assert_eq!(report.roots[1].phase(), InitPhase::Done);
    assert_eq!(workspace.classpath_generation(&healthy), Some(1));
    // Still registered, with an empty classpath, so a fixed build file can be picked up later.
    assert_eq!(workspace.classpath_generation(&broken), Some(1));

    let end = drain(&mut rx).into_iter().last();
    assert!(matches!(
        end,
        Some(ProgressEvent::End { message: Some(ref message), .. }) if message == "1 of 2 folders ready"
    ));
}

#[tokio::test]
async fn initialize_onboards_folders_and_advertises_capabilities() {
    let (_dir, base) = canonical_tempdir();
    let root = sample_project(&base);

    let workspace = workspace();
    let params = InitializeParams {
        workspace_folders: Some(vec![WorkspaceFolder {
            uri: lsp_uri(&root),
            name: "app".to_string(),
        }]),
        capabilities: serde_json::from_value(json!({
            "textDocument": { "completion": { "completionItem": { "snippetSupport": true } } }
        }))
        .unwrap(),
        ..InitializeParams::default()
    };
    let result = workspace.initialize(params).await.unwrap();

    assert_eq!(result.server_info.map(|info| info.name).as_deref(), Some("kite"));
    assert!(result.capabilities.hover_provider.is_some());
    assert_eq!(workspace.roots(), vec![root.clone()]);
    assert_eq!(workspace.documents().len(), 2);
    assert_eq!(workspace.classpath_generation(&root), Some(1));
}
