use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError, bounded, unbounded};

use crate::foundation::error::{PlayoutError, PlayoutResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

static NEXT_EXECUTOR_ID: AtomicU64 = AtomicU64::new(1);

/// Scheduling class for work submitted to an [`Executor`].
///
/// `High` jobs run before any queued `Normal` job but never preempt a job
/// that is already running. Stages use this so control traffic (transform and
/// layer ops) slots in ahead of the next tick without starving it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Priority {
    /// Default class; ticks run here.
    Normal,
    /// Runs ahead of queued `Normal` work.
    High,
}

/// A serial FIFO worker owning one component's mutable state.
///
/// Every stage, channel, consumer, and the GPU device run their mutations
/// through one of these; cross-component communication is futures only.
/// Within one priority class, jobs submitted by one caller execute in
/// submission order.
pub struct Executor {
    id: u64,
    name: String,
    tx_normal: Option<Sender<Job>>,
    tx_high: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
}

impl Executor {
    /// Spawn a named serial worker.
    pub fn new(name: &str) -> Self {
        let id = NEXT_EXECUTOR_ID.fetch_add(1, Ordering::Relaxed);
        let (tx_normal, rx_normal) = unbounded::<Job>();
        let (tx_high, rx_high) = unbounded::<Job>();
        let thread_name = format!("executor-{name}");
        let worker = std::thread::Builder::new()
            .name(thread_name)
            .spawn(move || run_worker(rx_high, rx_normal))
            .expect("spawning an executor worker thread failed");
        Self {
            id,
            name: name.to_owned(),
            tx_normal: Some(tx_normal),
            tx_high: Some(tx_high),
            worker: Some(worker),
        }
    }

    /// Stable unique id, used to order executor pairs deterministically.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The name given at construction.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue a job without waiting for its result.
    ///
    /// Jobs enqueued after shutdown started are silently dropped.
    pub fn begin_invoke(&self, priority: Priority, f: impl FnOnce() + Send + 'static) {
        let tx = match priority {
            Priority::Normal => &self.tx_normal,
            Priority::High => &self.tx_high,
        };
        if let Some(tx) = tx {
            let _ = tx.send(Box::new(f));
        }
    }

    /// Enqueue a job and return a future for its result.
    pub fn invoke<T, F>(&self, priority: Priority, f: F) -> TaskFuture<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        let (tx, rx) = bounded::<T>(1);
        self.begin_invoke(priority, move || {
            // The receiver may already be gone; that just means nobody cares.
            let _ = tx.send(f());
        });
        TaskFuture { rx }
    }
}

impl Drop for Executor {
    fn drop(&mut self) {
        self.tx_normal.take();
        self.tx_high.take();
        if let Some(worker) = self.worker.take() {
            if worker.thread().id() == std::thread::current().id() {
                // A queued job held the last handle; the loop exits on its
                // own once it sees the disconnected senders.
                return;
            }
            let _ = worker.join();
        }
    }
}

fn run_worker(rx_high: Receiver<Job>, rx_normal: Receiver<Job>) {
    loop {
        // Drain high-priority work before looking at the normal queue.
        match rx_high.try_recv() {
            Ok(job) => {
                job();
                continue;
            }
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => break,
        }

        crossbeam_channel::select! {
            recv(rx_high) -> msg => match msg {
                Ok(job) => job(),
                Err(_) => break,
            },
            recv(rx_normal) -> msg => match msg {
                Ok(job) => job(),
                Err(_) => break,
            },
        }
    }

    // Both senders drop together; run whatever was still queued so pending
    // futures resolve instead of reporting an abort.
    while let Ok(job) = rx_high.try_recv() {
        job();
    }
    while let Ok(job) = rx_normal.try_recv() {
        job();
    }
}

/// One-shot result of a job submitted to an [`Executor`].
#[derive(Debug)]
pub struct TaskFuture<T> {
    rx: Receiver<T>,
}

impl<T: Send + 'static> TaskFuture<T> {
    /// A future that is already resolved; used by producers whose `call`
    /// can answer without touching their worker thread.
    pub fn ready(value: T) -> Self {
        let (tx, rx) = bounded(1);
        let _ = tx.send(value);
        Self { rx }
    }

    /// A promise/future pair for completing a task from another thread.
    pub fn pair() -> (TaskPromise<T>, TaskFuture<T>) {
        let (tx, rx) = bounded(1);
        (TaskPromise { tx }, TaskFuture { rx })
    }

    /// Block until the job completes.
    pub fn wait(self) -> PlayoutResult<T> {
        self.rx
            .recv()
            .map_err(|_| PlayoutError::aborted("executor dropped a pending task"))
    }

    /// Block with an upper bound; times out as a validation error.
    pub fn wait_timeout(self, timeout: Duration) -> PlayoutResult<T> {
        match self.rx.recv_timeout(timeout) {
            Ok(v) => Ok(v),
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => Err(PlayoutError::validation(
                format!("task did not complete within {timeout:?}"),
            )),
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => {
                Err(PlayoutError::aborted("executor dropped a pending task"))
            }
        }
    }

    /// Non-blocking poll; `None` while the job is still running.
    pub fn try_wait(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }
}

/// Completing half of a [`TaskFuture::pair`].
#[derive(Debug)]
pub struct TaskPromise<T> {
    tx: Sender<T>,
}

impl<T: Send + 'static> TaskPromise<T> {
    /// Resolve the paired future; a dropped future is ignored.
    pub fn set(self, value: T) {
        let _ = self.tx.send(value);
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/executor.rs"]
mod tests;
