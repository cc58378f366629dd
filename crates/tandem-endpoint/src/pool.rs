//! Bounded worker pool for deferred handler work

use std::any::Any;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// A unit of deferred handler work
pub type Job = Box<dyn FnOnce() -> anyhow::Result<Value> + Send + 'static>;

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const SETTLED: u8 = 2;
const CANCELLED: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Settled,
    Cancelled,
}

/// How a submitted job ended
#[derive(Debug)]
pub enum JobOutcome {
    Finished(anyhow::Result<Value>),
    Cancelled,
}

/// Shared handle to one submitted job.
///
/// The state only moves `pending -> running -> settled` or
/// `pending -> cancelled`; a job that has started can no longer be cancelled.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    inner: Arc<TaskInner>,
}

#[derive(Debug)]
struct TaskInner {
    state: AtomicU8,
    token: CancellationToken,
}

impl TaskHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(TaskInner {
                state: AtomicU8::new(PENDING),
                token: CancellationToken::new(),
            }),
        }
    }

    /// Cancel the job if it has not started yet. Returns whether it worked.
    pub fn cancel(&self) -> bool {
        let cancelled = self
            .inner
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if cancelled {
            self.inner.token.cancel();
        }
        cancelled
    }

    pub fn state(&self) -> TaskState {
        match self.inner.state.load(Ordering::Acquire) {
            PENDING => TaskState::Pending,
            RUNNING => TaskState::Running,
            SETTLED => TaskState::Settled,
            _ => TaskState::Cancelled,
        }
    }

    /// Whether both handles refer to the same job
    pub fn same_task(&self, other: &TaskHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn try_start(&self) -> bool {
        self.inner
            .state
            .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn finish(&self) {
        self.inner.state.store(SETTLED, Ordering::Release);
    }
}

impl Default for TaskHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Runs jobs on blocking threads of a tokio runtime, at most `max_workers`
/// at a time
pub struct WorkerPool {
    runtime: Handle,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    max_workers: usize,
}

impl WorkerPool {
    pub fn new(runtime: Handle, max_workers: usize) -> Self {
        Self {
            runtime,
            permits: Arc::new(Semaphore::new(max_workers)),
            tracker: TaskTracker::new(),
            max_workers,
        }
    }

    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Number of submitted jobs whose completion code has not finished yet
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Queue `job` and return immediately. `on_settle` runs on the pool once
    /// the job finished or was cancelled.
    pub fn submit<F>(&self, task: TaskHandle, job: Job, on_settle: F)
    where
        F: FnOnce(JobOutcome) + Send + 'static,
    {
        let runtime = self.runtime.clone();
        let permits = self.permits.clone();

        self.tracker.spawn_on(
            async move {
                let outcome = run_job(&runtime, permits, &task, job).await;
                on_settle(outcome);
            },
            &self.runtime,
        );
    }

    /// Wait for every submitted job and its completion code to finish.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

async fn run_job(
    runtime: &Handle,
    permits: Arc<Semaphore>,
    task: &TaskHandle,
    job: Job,
) -> JobOutcome {
    let permit = tokio::select! {
        biased;
        _ = task.inner.token.cancelled() => return JobOutcome::Cancelled,
        permit = permits.acquire_owned() => permit,
    };

    let _permit = match permit {
        Ok(permit) => permit,
        Err(_) => return JobOutcome::Finished(Err(anyhow::anyhow!("Worker pool is closed"))),
    };

    // Lost the race against a cancel that arrived while waiting for a permit
    if !task.try_start() {
        return JobOutcome::Cancelled;
    }

    let result = match runtime.spawn_blocking(job).await {
        Ok(result) => result,
        Err(e) if e.is_panic() => Err(anyhow::anyhow!(
            "Handler panicked: {}",
            panic_message(e.into_panic().as_ref())
        )),
        Err(e) => Err(anyhow::anyhow!("Handler task failed: {}", e)),
    };

    task.finish();
    JobOutcome::Finished(result)
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
