use std::path::{Path, PathBuf};

use kite_scheduler::{CancellationToken, ProgressSender};
use serde::Serialize;

use crate::state::Shared;
use crate::WorkspaceError;

/// Onboarding steps of one workspace root, in the order they are entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InitPhase {
    Pending,
    RegisteringSources,
    RefreshingClasspath,
    /// The classpath changed; analyses under the root were invalidated.
    RefreshingIndex,
    /// The classpath did not change; analyses were left alone.
    Skipped,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RootReport {
    pub root: PathBuf,
    pub phases: Vec<InitPhase>,
    pub sources_added: usize,
    pub classpath_changed: bool,
    pub error: Option<String>,
}

impl RootReport {
    fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            phases: vec![InitPhase::Pending],
            sources_added: 0,
            classpath_changed: false,
            error: None,
        }
    }

    pub fn phase(&self) -> InitPhase {
        self.phases.last().copied().unwrap_or(InitPhase::Pending)
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    fn enter(&mut self, phase: InitPhase) {
        self.phases.push(phase);
    }

    fn fail(&mut self, err: impl std::fmt::Display) {
        tracing::warn!(
            target: "kite.workspace",
            root = %self.root.display(),
            phase = ?self.phase(),
            error = %err,
            "failed to add workspace root"
        );
        self.error = Some(err.to_string());
        self.enter(InitPhase::Failed);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InitializeReport {
    pub roots: Vec<RootReport>,
}

impl InitializeReport {
    pub fn failed(&self) -> impl Iterator<Item = &RootReport> {
        self.roots.iter().filter(|root| !root.is_ok())
    }

    pub fn is_success(&self) -> bool {
        self.roots.iter().all(RootReport::is_ok)
    }
}

fn root_name(root: &Path) -> String {
    root.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| root.display().to_string())
}

/// Onboards `roots` one after another: sources, then classpath, then (only if the classpath
/// changed) lazy invalidation of the root's analyses.
///
/// A failing root is recorded and the remaining roots are still processed. Runs inside a
/// mutating serializer task.
pub(crate) fn onboard_roots(
    shared: &Shared,
    roots: &[PathBuf],
    progress: &ProgressSender,
    token: &CancellationToken,
) -> Result<InitializeReport, WorkspaceError> {
    let total = roots.len();
    let progress = progress.start_with(
        "Adding workspace folders",
        Some(format!("0/{total} folders")),
        Some(0),
    );
    let mut report = InitializeReport::default();

    for (i, root) in roots.iter().enumerate() {
        if token.is_cancelled() {
            progress.finish(Some("Cancelled".to_string()));
            return Err(WorkspaceError::Cancelled);
        }

        let percent = u32::try_from(i * 100 / total).unwrap_or(100);
        let prefix = format!("[{}/{}] {}", i + 1, total, root_name(root));
        let mut root_report = RootReport::new(root);

        root_report.enter(InitPhase::RegisteringSources);
        progress.report(format!("{prefix}: Updating source path"), Some(percent));
        match shared.registry.write().add_root(root) {
            Ok(added) => root_report.sources_added = added.len(),
            Err(err) => {
                root_report.fail(err);
                report.roots.push(root_report);
                continue;
            }
        }

        root_report.enter(InitPhase::RefreshingClasspath);
        progress.report(format!("{prefix}: Updating class path"), Some(percent));
        let changed = match shared.classpath.write().add_root(root) {
            Ok(changed) => changed,
            Err(err) => {
                root_report.fail(err);
                report.roots.push(root_report);
                continue;
            }
        };

        root_report.classpath_changed = changed;
        if changed {
            root_report.enter(InitPhase::RefreshingIndex);
            progress.report(format!("{prefix}: Refreshing source path"), Some(percent));
            shared.index.invalidate_root(root);
        } else {
            root_report.enter(InitPhase::Skipped);
        }
        root_report.enter(InitPhase::Done);

        tracing::info!(
            target: "kite.workspace",
            root = %root.display(),
            sources = root_report.sources_added,
            classpath_changed = changed,
            "workspace root ready"
        );
        report.roots.push(root_report);
    }

    let ready = report.roots.iter().filter(|root| root.is_ok()).count();
    progress.finish(Some(format!("{ready} of {total} folders ready")));
    Ok(report)
}
