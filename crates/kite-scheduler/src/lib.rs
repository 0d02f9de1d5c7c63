//! Single-writer task serialization for Kite.
//!
//! Every operation that mutates workspace state or touches the compilation engine goes through a
//! [`TaskSerializer`]. Mutating tasks run one at a time, in submission order, on a dedicated
//! worker thread. Read-only tasks are dispatched to a small pool whenever no mutating task is
//! queued or running, and otherwise queue up behind the mutations.
//!
//! Cancellation is cooperative via [`CancellationToken`]: a task whose token fires before it
//! starts is skipped, and a running task is expected to poll its token.

mod progress;
mod serializer;
mod task;

pub use progress::{Progress, ProgressEvent, ProgressId, ProgressReceiver, ProgressSender};
pub use serializer::{SerializerConfig, TaskKind, TaskSerializer};
pub use task::SerializedTask;
pub use tokio_util::sync::CancellationToken;

/// Returned by task bodies that observed their cancellation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("task cancelled")]
pub struct Cancelled;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("task cancelled")]
    Cancelled,
    #[error("server closed; no new tasks are accepted")]
    ServerClosed,
    #[error("task panicked")]
    Panicked,
}

impl From<Cancelled> for TaskError {
    fn from(_: Cancelled) -> Self {
        TaskError::Cancelled
    }
}

/// Convenience for task bodies: `check_cancelled(&token)?` at safe points.
pub fn check_cancelled(token: &CancellationToken) -> Result<(), Cancelled> {
    if token.is_cancelled() {
        Err(Cancelled)
    } else {
        Ok(())
    }
}
