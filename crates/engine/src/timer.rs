//! Shared scheduler thread
//!
//! One worker thread runs every background task of the agent: the stuck scan,
//! coarse profiling and each fine-profiling trace. Tasks are kept in a
//! deadline heap; a task returns the delay until its next run, or `None` to
//! retire.
//!
//! Tasks run on the worker thread one at a time and must stay short.

use parking_lot::{Condvar, Mutex};
use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tierscope_core::Result;
use tracing::{debug, error};

type Job = Box<dyn FnMut() -> Option<Duration> + Send>;

struct TaskState {
    cancelled: AtomicBool,
    done: AtomicBool,
    job: Mutex<Job>,
}

/// Handle to a scheduled task
#[derive(Clone)]
pub struct TaskHandle {
    task: Arc<TaskState>,
}

impl TaskHandle {
    /// Stop the task; a run already in progress finishes
    pub fn cancel(&self) {
        self.task.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether [`cancel`](Self::cancel) was called
    pub fn is_cancelled(&self) -> bool {
        self.task.cancelled.load(Ordering::SeqCst)
    }

    /// Whether the task will not run again
    pub fn is_done(&self) -> bool {
        self.is_cancelled() || self.task.done.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("cancelled", &self.is_cancelled())
            .field("done", &self.is_done())
            .finish()
    }
}

struct Scheduled {
    due: Instant,
    seq: u64,
    task: Arc<TaskState>,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // reversed: BinaryHeap is a max-heap, the earliest deadline must pop first
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

#[derive(Default)]
struct Queue {
    heap: BinaryHeap<Scheduled>,
    next_seq: u64,
    shutdown: bool,
}

impl Queue {
    fn push(&mut self, due: Instant, task: Arc<TaskState>) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Scheduled { due, seq, task });
    }
}

#[derive(Default)]
struct Shared {
    queue: Mutex<Queue>,
    wakeup: Condvar,
}

/// Deadline scheduler backed by one worker thread
pub struct Timer {
    shared: Arc<Shared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Timer {
    /// Spawn the worker thread
    ///
    /// # Errors
    ///
    /// I/O error if the thread cannot be spawned.
    pub fn start(name: &str) -> Result<Self> {
        let shared = Arc::new(Shared::default());
        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || run(worker_shared))?;
        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Run `job` after `delay`, then again after each delay it returns
    ///
    /// Scheduling after [`shutdown`](Self::shutdown) returns an already
    /// cancelled handle.
    pub fn schedule<F>(&self, delay: Duration, job: F) -> TaskHandle
    where
        F: FnMut() -> Option<Duration> + Send + 'static,
    {
        let task = Arc::new(TaskState {
            cancelled: AtomicBool::new(false),
            done: AtomicBool::new(false),
            job: Mutex::new(Box::new(job)),
        });
        let handle = TaskHandle {
            task: Arc::clone(&task),
        };
        let mut queue = self.shared.queue.lock();
        if queue.shutdown {
            handle.cancel();
            return handle;
        }
        queue.push(Instant::now() + delay, task);
        drop(queue);
        self.shared.wakeup.notify_one();
        handle
    }

    /// Number of queued task runs
    pub fn pending_tasks(&self) -> usize {
        self.shared.queue.lock().heap.len()
    }

    /// Stop the worker and drop every queued task
    ///
    /// Waits for a task run in progress. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut queue = self.shared.queue.lock();
            queue.shutdown = true;
            queue.heap.clear();
        }
        self.shared.wakeup.notify_all();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                error!("timer thread panicked");
            }
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for Timer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Timer")
            .field("pending_tasks", &self.pending_tasks())
            .finish()
    }
}

fn run(shared: Arc<Shared>) {
    loop {
        let next = {
            let mut queue = shared.queue.lock();
            loop {
                if queue.shutdown {
                    debug!("timer stopped");
                    return;
                }
                match queue.heap.peek().map(|s| s.due) {
                    None => shared.wakeup.wait(&mut queue),
                    Some(due) if due <= Instant::now() => {
                        if let Some(next) = queue.heap.pop() {
                            break next;
                        }
                    }
                    Some(due) => {
                        shared.wakeup.wait_until(&mut queue, due);
                    }
                }
            }
        };

        let task = next.task;
        if task.cancelled.load(Ordering::SeqCst) {
            continue;
        }
        let outcome = catch_unwind(AssertUnwindSafe(|| (task.job.lock())()));
        let delay = match outcome {
            Ok(delay) => delay,
            Err(_) => {
                error!("scheduled task panicked; retiring it");
                None
            }
        };
        match delay {
            Some(delay) if !task.cancelled.load(Ordering::SeqCst) => {
                let mut queue = shared.queue.lock();
                if !queue.shutdown {
                    queue.push(Instant::now() + delay, task);
                }
            }
            _ => task.done.store(true, Ordering::SeqCst),
        }
    }
}
