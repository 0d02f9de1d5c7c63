use std::{future::Future, pin::Pin, task::Poll};

use tokio::sync::oneshot;

use crate::{CancellationToken, TaskError};

/// Handle to a task submitted to a [`crate::TaskSerializer`].
///
/// Unlike a plain blocking task, joining waits for the task's own outcome even after the token
/// fires: a mutating task that already started either finishes its mutation or reports
/// `Cancelled` itself, so callers never observe a mutation that "did not happen" but did.
pub struct SerializedTask<T> {
    token: CancellationToken,
    rx: oneshot::Receiver<Result<T, TaskError>>,
}

impl<T> SerializedTask<T> {
    pub(crate) fn new(
        token: CancellationToken,
        rx: oneshot::Receiver<Result<T, TaskError>>,
    ) -> Self {
        Self { token, rx }
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub async fn join(self) -> Result<T, TaskError> {
        self.await
    }

    /// Blocks the current thread until the task finishes. Must not be called from within an
    /// async runtime.
    pub fn blocking_join(self) -> Result<T, TaskError> {
        self.rx
            .blocking_recv()
            .unwrap_or(Err(TaskError::ServerClosed))
    }
}

impl<T> Future for SerializedTask<T> {
    type Output = Result<T, TaskError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut std::task::Context<'_>) -> Poll<Self::Output> {
        // A dropped sender means the job was discarded without running (queue torn down).
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(TaskError::ServerClosed)))
    }
}
