use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use crossbeam_channel::Sender;
use parking_lot::{Condvar, Mutex, RwLock};
use rayon::ThreadPool;
use tokio::sync::oneshot;

use kite_core::panic_payload_to_str;

use crate::{
    task::SerializedTask, CancellationToken, Cancelled, ProgressReceiver, ProgressSender,
    TaskError,
};

type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// Touches the source registry, classpath manager, workspace index or compilation engine.
    Mutating,
    /// Pure lookups over immutable snapshots.
    ReadOnly,
}

#[derive(Debug, Clone)]
pub struct SerializerConfig {
    pub read_threads: usize,
    pub progress_channel_capacity: usize,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        let available = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            read_threads: available.clamp(1, 4),
            progress_channel_capacity: 1024,
        }
    }
}

enum ReadPool {
    Rayon(ThreadPool),
    Inline,
}

impl ReadPool {
    fn build(threads: usize) -> Self {
        // Thread creation can fail under tight process limits; shrink the pool, then run inline.
        let mut threads = threads.max(1);
        loop {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .thread_name(|idx| format!("kite-read-{idx}"))
                .build()
            {
                Ok(pool) => return ReadPool::Rayon(pool),
                Err(_) if threads > 1 => threads = (threads / 2).max(1),
                Err(err) => {
                    tracing::warn!(
                        target: "kite.scheduler",
                        error = %err,
                        "failed to build read pool; running read-only tasks inline"
                    );
                    return ReadPool::Inline;
                }
            }
        }
    }

    fn spawn(&self, job: Job) {
        match self {
            ReadPool::Rayon(pool) => pool.spawn(job),
            ReadPool::Inline => job(),
        }
    }
}

enum Queue {
    Worker(Sender<Job>),
    /// No worker thread could be spawned: jobs run on the submitting thread while the queue lock
    /// is held, which still serializes them.
    Inline,
}

/// Number of tasks of one kind between submission and completion (or discard).
#[derive(Default)]
struct TaskCounter {
    count: Mutex<usize>,
    idle: Condvar,
}

impl TaskCounter {
    fn enter(self: &Arc<Self>) -> TaskGuard {
        *self.count.lock() += 1;
        TaskGuard {
            counter: Arc::clone(self),
        }
    }

    fn get(&self) -> usize {
        *self.count.lock()
    }

    fn wait_idle(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.idle.wait(&mut count);
        }
    }
}

struct TaskGuard {
    counter: Arc<TaskCounter>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        let mut count = self.counter.count.lock();
        *count -= 1;
        if *count == 0 {
            self.counter.idle.notify_all();
        }
    }
}

/// Single-writer work queue.
///
/// Task bodies must not block on other tasks of the same serializer: a mutating task waiting for
/// another mutating task would deadlock the worker.
#[derive(Clone)]
pub struct TaskSerializer {
    inner: Arc<Inner>,
}

struct Inner {
    queue: Mutex<Option<Queue>>,
    worker: Mutex<Option<thread::JoinHandle<()>>>,
    read_pool: RwLock<Option<ReadPool>>,
    pending_mutations: Arc<TaskCounter>,
    inflight_reads: Arc<TaskCounter>,
    closed: AtomicBool,
    progress: ProgressSender,
}

impl TaskSerializer {
    pub fn new(config: SerializerConfig) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded::<Job>();
        let spawned = thread::Builder::new()
            .name("kite-serializer".to_string())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    job();
                }
                tracing::debug!(target: "kite.scheduler", "serializer worker drained");
            });

        let (queue, worker) = match spawned {
            Ok(handle) => (Queue::Worker(tx), Some(handle)),
            Err(err) => {
                tracing::warn!(
                    target: "kite.scheduler",
                    error = %err,
                    "failed to spawn serializer worker; running mutating tasks inline"
                );
                (Queue::Inline, None)
            }
        };

        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(Some(queue)),
                worker: Mutex::new(worker),
                read_pool: RwLock::new(Some(ReadPool::build(config.read_threads))),
                pending_mutations: Arc::default(),
                inflight_reads: Arc::default(),
                closed: AtomicBool::new(false),
                progress: ProgressSender::new(config.progress_channel_capacity),
            }),
        }
    }

    pub fn progress(&self) -> ProgressSender {
        self.inner.progress.clone()
    }

    pub fn subscribe_progress(&self) -> ProgressReceiver {
        self.inner.progress.subscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Number of mutating tasks submitted but not yet finished.
    pub fn pending_mutations(&self) -> usize {
        self.inner.pending_mutations.get()
    }

    /// Number of read-only tasks submitted but not yet finished.
    pub fn inflight_reads(&self) -> usize {
        self.inner.inflight_reads.get()
    }

    pub fn submit<T, F>(&self, kind: TaskKind, token: CancellationToken, f: F) -> SerializedTask<T>
    where
        T: Send + 'static,
        F: FnOnce(CancellationToken) -> Result<T, Cancelled> + Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        if self.is_closed() {
            let _ = tx.send(Err(TaskError::ServerClosed));
            return SerializedTask::new(token, rx);
        }

        let guard = match kind {
            TaskKind::Mutating => self.inner.pending_mutations.enter(),
            TaskKind::ReadOnly => self.inner.inflight_reads.enter(),
        };
        // `shutdown` may have started between the check above and the count.
        if self.is_closed() {
            drop(guard);
            let _ = tx.send(Err(TaskError::ServerClosed));
            return SerializedTask::new(token, rx);
        }
        let task_token = token.clone();
        let job: Job = Box::new(move || {
            let result = run_task(kind, task_token, f);
            // Release before publishing so a caller reacting to the result sees an idle queue.
            drop(guard);
            let _ = tx.send(result);
        });

        match kind {
            TaskKind::ReadOnly if self.pending_mutations() == 0 => self.dispatch_read(job),
            _ => self.enqueue(job),
        }
        SerializedTask::new(token, rx)
    }

    fn dispatch_read(&self, job: Job) {
        let pool = self.inner.read_pool.read();
        match pool.as_ref() {
            Some(pool) => pool.spawn(job),
            // Workers released: dropping the job resolves the task as `ServerClosed`.
            None => drop(job),
        }
    }

    fn enqueue(&self, job: Job) {
        let queue = self.inner.queue.lock();
        match queue.as_ref() {
            Some(Queue::Worker(tx)) => {
                let _ = tx.send(job);
            }
            Some(Queue::Inline) => job(),
            None => drop(job),
        }
    }

    /// Stops accepting tasks and waits for every queued mutating task and every in-flight
    /// read-only task to finish.
    ///
    /// Idempotent. Must not be called from inside a task body.
    pub fn shutdown(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        // Dropping the sender lets the worker drain the remaining jobs and exit.
        drop(self.inner.queue.lock().take());

        if let Some(handle) = self.inner.worker.lock().take() {
            if handle.thread().id() == thread::current().id() {
                tracing::warn!(
                    target: "kite.scheduler",
                    "shutdown requested from the serializer worker; not draining"
                );
                return;
            }
            if handle.join().is_err() {
                tracing::error!(target: "kite.scheduler", "serializer worker panicked");
            }
        }

        if self.on_read_pool() {
            tracing::warn!(
                target: "kite.scheduler",
                "shutdown requested from a read-only task; not waiting for reads"
            );
            return;
        }
        let reads = self.inflight_reads();
        if reads > 0 {
            tracing::debug!(target: "kite.scheduler", reads, "waiting for read-only tasks");
        }
        self.inner.inflight_reads.wait_idle();
    }

    fn on_read_pool(&self) -> bool {
        match self.inner.read_pool.read().as_ref() {
            Some(ReadPool::Rayon(pool)) => pool.current_thread_index().is_some(),
            _ => false,
        }
    }

    /// Drops the read-only pool. Later read-only submissions resolve to `ServerClosed`.
    pub fn release_workers(&self) {
        drop(self.inner.read_pool.write().take());
    }
}

impl std::fmt::Debug for TaskSerializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskSerializer")
            .field("closed", &self.is_closed())
            .field("pending_mutations", &self.pending_mutations())
            .finish()
    }
}

fn run_task<T, F>(kind: TaskKind, token: CancellationToken, f: F) -> Result<T, TaskError>
where
    F: FnOnce(CancellationToken) -> Result<T, Cancelled>,
{
    if token.is_cancelled() {
        tracing::debug!(target: "kite.scheduler", ?kind, "skipping task cancelled before start");
        return Err(TaskError::Cancelled);
    }

    match catch_unwind(AssertUnwindSafe(|| f(token))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(Cancelled)) => Err(TaskError::Cancelled),
        Err(panic) => {
            let message = panic_payload_to_str(&*panic);
            tracing::error!(target: "kite.scheduler", ?kind, panic = %message, "task panicked");
            Err(TaskError::Panicked)
        }
    }
}
