use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kite_workspace::{
    CancellationToken, CompilationEngine, CompileInput, CompileOutput, DefaultBuildConfigReader,
    EngineError, KiteConfig, Workspace, WorkspaceError,
};

use super::support::{canonical_tempdir, doc, open_params, workspace, write};

/// Spins on sources containing `slow` until cancelled; everything else compiles instantly.
struct SlowEngine {
    started: Arc<AtomicBool>,
}

impl CompilationEngine for SlowEngine {
    fn compile(
        &mut self,
        input: &CompileInput<'_>,
        token: &CancellationToken,
    ) -> Result<CompileOutput, EngineError> {
        if !input.text.contains("slow") {
            return Ok(CompileOutput::default());
        }
        self.started.store(true, Ordering::SeqCst);
        loop {
            if token.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

#[tokio::test]
async fn shutdown_deletes_the_extraction_directory_and_rejects_requests() {
    let (_dir, base) = canonical_tempdir();
    let file = base.join("A/f.kt");
    write(&file, "fun f() {}\n");

    let workspace = workspace();
    workspace.add_roots(vec![base.join("A")]).await.unwrap();
    let temp = workspace.temp_dir();
    assert!(temp.is_dir());

    workspace.shutdown().await.unwrap();
    assert!(workspace.is_closed());
    assert!(!temp.exists());

    let err = workspace
        .did_open(open_params(&file, "fun g() {}\n"))
        .await
        .unwrap_err();
    assert!(matches!(err, WorkspaceError::ServerClosed), "{err:?}");
    let err = workspace
        .analysis(&doc(&file), CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, WorkspaceError::ServerClosed), "{err:?}");

    workspace.shutdown().await.unwrap();
}

#[test]
fn dropping_the_workspace_cleans_up() {
    let workspace = Workspace::new(KiteConfig::default()).unwrap();
    let temp = workspace.temp_dir();
    assert!(temp.is_dir());

    drop(workspace);
    assert!(!temp.exists());
}

#[tokio::test]
async fn a_request_cancelled_before_it_runs_never_reaches_the_engine() {
    let (_dir, base) = canonical_tempdir();
    let file = base.join("A/f.kt");
    write(&file, "fun f() {}\n");

    let workspace = workspace();
    workspace.add_roots(vec![base.join("A")]).await.unwrap();

    let token = CancellationToken::new();
    token.cancel();
    let err = workspace.analysis(&doc(&file), token).await.unwrap_err();
    assert!(matches!(err, WorkspaceError::Cancelled), "{err:?}");
    assert_eq!(workspace.recompute_count(), 0);
}

#[tokio::test]
async fn cancelling_a_running_compilation_leaves_the_workspace_usable() {
    let started = Arc::new(AtomicBool::new(false));
    let workspace = Workspace::with_engine(
        KiteConfig::default(),
        Box::new(SlowEngine {
            started: Arc::clone(&started),
        }),
        Arc::new(DefaultBuildConfigReader::default()),
    )
    .unwrap();

    let (_dir, base) = canonical_tempdir();
    let file = base.join("slow.kt");
    workspace
        .did_open(open_params(&file, "fun slow() {}\n"))
        .await
        .unwrap();

    let token = CancellationToken::new();
    let canceller = {
        let token = token.clone();
        let started = Arc::clone(&started);
        async move {
            while !started.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            token.cancel();
        }
    };
    let uri = doc(&file);
    let (result, ()) = tokio::join!(workspace.analysis(&uri, token), canceller);
    let err = result.unwrap_err();
    assert!(matches!(err, WorkspaceError::Cancelled), "{err:?}");

    workspace
        .did_open(open_params(&file, "fun fast() {}\n"))
        .await
        .unwrap();
    let entry = workspace
        .analysis(&uri, CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(entry.tag.source_version, 1);
}
