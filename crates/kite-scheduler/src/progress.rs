use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgressId(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Begin {
        id: ProgressId,
        title: String,
        message: Option<String>,
        percentage: Option<u32>,
    },
    Report {
        id: ProgressId,
        message: Option<String>,
        percentage: Option<u32>,
    },
    End {
        id: ProgressId,
        message: Option<String>,
    },
}

impl ProgressEvent {
    pub fn id(&self) -> ProgressId {
        match self {
            ProgressEvent::Begin { id, .. }
            | ProgressEvent::Report { id, .. }
            | ProgressEvent::End { id, .. } => *id,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            ProgressEvent::Begin { message, .. }
            | ProgressEvent::Report { message, .. }
            | ProgressEvent::End { message, .. } => message.as_deref(),
        }
    }
}

pub type ProgressReceiver = broadcast::Receiver<ProgressEvent>;

/// Fan-out point for progress events. Events sent while nobody is subscribed are dropped.
#[derive(Clone)]
pub struct ProgressSender {
    tx: broadcast::Sender<ProgressEvent>,
    next_id: Arc<AtomicU64>,
}

impl ProgressSender {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self {
            tx,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn subscribe(&self) -> ProgressReceiver {
        self.tx.subscribe()
    }

    pub fn start(&self, title: impl Into<String>) -> Progress {
        self.start_with(title, None::<String>, None)
    }

    pub fn start_with(
        &self,
        title: impl Into<String>,
        message: impl Into<Option<String>>,
        percentage: Option<u32>,
    ) -> Progress {
        let id = ProgressId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let _ = self.tx.send(ProgressEvent::Begin {
            id,
            title: title.into(),
            message: message.into(),
            percentage,
        });
        Progress {
            id,
            tx: self.tx.clone(),
            finished: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl std::fmt::Debug for ProgressSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressSender")
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}

/// Handle for one running progress sequence. `End` is emitted at most once, at the latest on drop.
#[derive(Clone)]
pub struct Progress {
    id: ProgressId,
    tx: broadcast::Sender<ProgressEvent>,
    finished: Arc<AtomicBool>,
}

impl Progress {
    pub fn id(&self) -> ProgressId {
        self.id
    }

    pub fn report(&self, message: impl Into<Option<String>>, percentage: Option<u32>) {
        let _ = self.tx.send(ProgressEvent::Report {
            id: self.id,
            message: message.into(),
            percentage,
        });
    }

    pub fn finish(&self, message: impl Into<Option<String>>) {
        let message = message.into();
        if self
            .finished
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let _ = self.tx.send(ProgressEvent::End {
                id: self.id,
                message,
            });
        }
    }
}

impl Drop for Progress {
    fn drop(&mut self) {
        // Clones share `finished`; only the last handle going away should close the sequence.
        if Arc::strong_count(&self.finished) == 1 {
            self.finish(None::<String>);
        }
    }
}
