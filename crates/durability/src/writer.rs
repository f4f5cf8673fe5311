//! Background durability writer
//!
//! Write requests are queued on an unbounded channel and applied by one
//! worker thread, so trace completion never waits on store I/O.
//!
//! ```text
//! complete_trace():              writer thread:
//!   pending.add(trace)             recv(request)
//!   writer.submit(stored) ───────▶ store.write(stored)
//!                                  if completed: pending.remove(id)
//! ```
//!
//! A completed trace leaves the pending tier only after its write succeeded,
//! so for a moment it is both pending and stored. Queries deduplicate by id.
//!
//! When a completed write fails the trace stays pending and its snapshot is
//! kept for retry. Retries run on an exponential backoff (100ms doubling up
//! to 5s), before every flush acknowledgement, and once more at shutdown.
//! A failed partial snapshot is not retried; the trace's final write
//! supersedes it.

use crate::store::{DurableTraceStore, StoredTrace};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tierscope_core::{Result, TraceId};
use tierscope_storage::PendingTraceSink;
use tracing::{debug, warn};

const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(100);
const MAX_RETRY_DELAY: Duration = Duration::from_secs(5);

enum WriteRequest {
    Store(Box<StoredTrace>),
    Flush(Sender<()>),
}

/// Handle to the writer thread
pub struct TraceWriter {
    sender: Mutex<Option<Sender<WriteRequest>>>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl TraceWriter {
    /// Spawn the writer thread
    ///
    /// # Errors
    ///
    /// I/O error if the thread cannot be spawned.
    pub fn start(
        store: Arc<dyn DurableTraceStore>,
        pending: Arc<PendingTraceSink>,
    ) -> Result<Self> {
        let (sender, receiver) = unbounded();
        let handle = thread::Builder::new()
            .name("tierscope-writer".into())
            .spawn(move || run(receiver, store, pending))?;
        Ok(Self {
            sender: Mutex::new(Some(sender)),
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Queue a trace for persistence
    ///
    /// Returns false if the writer has been shut down.
    pub fn submit(&self, trace: StoredTrace) -> bool {
        match self.sender.lock().as_ref() {
            Some(sender) => sender.send(WriteRequest::Store(Box::new(trace))).is_ok(),
            None => {
                debug!(trace_id = %trace.id, "write submitted after shutdown");
                false
            }
        }
    }

    /// Block until every request queued before this call is processed
    ///
    /// Failed writes awaiting retry are attempted once more first.
    pub fn flush(&self) {
        let (ack, done) = bounded(1);
        let sent = match self.sender.lock().as_ref() {
            Some(sender) => sender.send(WriteRequest::Flush(ack)).is_ok(),
            None => false,
        };
        if sent {
            let _ = done.recv();
        }
    }

    /// Drain queued writes and stop the thread
    ///
    /// Idempotent.
    pub fn shutdown(&self) {
        // dropping the sender ends the worker's receive loop after draining
        drop(self.sender.lock().take());
        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                warn!("trace writer thread panicked");
            }
        }
    }
}

impl Drop for TraceWriter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for TraceWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceWriter")
            .field("running", &self.sender.lock().is_some())
            .finish()
    }
}

fn run(
    receiver: Receiver<WriteRequest>,
    store: Arc<dyn DurableTraceStore>,
    pending: Arc<PendingTraceSink>,
) {
    let mut worker = Worker {
        store,
        pending,
        retry: FxHashMap::default(),
        retry_delay: INITIAL_RETRY_DELAY,
        next_retry: None,
    };
    loop {
        if worker.next_retry.is_some_and(|at| at <= Instant::now()) {
            worker.retry_failed();
        }
        let received = match worker.next_retry {
            Some(at) => receiver.recv_deadline(at),
            None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        match received {
            Ok(WriteRequest::Store(trace)) => worker.write(*trace),
            Ok(WriteRequest::Flush(ack)) => {
                worker.retry_failed();
                let _ = ack.send(());
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    worker.retry_failed();
    if !worker.retry.is_empty() {
        warn!(
            traces = worker.retry.len(),
            "trace writer stopped with failed writes; traces left pending"
        );
    }
}

struct Worker {
    store: Arc<dyn DurableTraceStore>,
    pending: Arc<PendingTraceSink>,
    // completed snapshots whose write failed, by id
    retry: FxHashMap<TraceId, StoredTrace>,
    retry_delay: Duration,
    next_retry: Option<Instant>,
}

impl Worker {
    fn write(&mut self, trace: StoredTrace) {
        if !trace.completed {
            if self.retry.contains_key(&trace.id) {
                debug!(trace_id = %trace.id, "partial snapshot superseded by queued final write");
                return;
            }
            let id = trace.id.clone();
            match self.store.write(trace) {
                Ok(()) => debug!(trace_id = %id, completed = false, "trace stored"),
                Err(e) => warn!(trace_id = %id, error = %e, "partial trace write failed"),
            }
            return;
        }

        let id = trace.id.clone();
        match self.store.write(trace.clone()) {
            Ok(()) => {
                self.retry.remove(&id);
                self.pending.remove(&id);
                debug!(trace_id = %id, completed = true, "trace stored");
            }
            Err(e) => {
                warn!(trace_id = %id, error = %e, "trace write failed; will retry");
                self.retry.insert(id, trace);
                if self.next_retry.is_none() {
                    self.next_retry = Some(Instant::now() + self.retry_delay);
                }
            }
        }
    }

    fn retry_failed(&mut self) {
        if self.retry.is_empty() {
            return;
        }
        let mut failed = 0;
        for (id, trace) in std::mem::take(&mut self.retry) {
            match self.store.write(trace.clone()) {
                Ok(()) => {
                    self.pending.remove(&id);
                    debug!(trace_id = %id, "trace stored on retry");
                }
                Err(e) => {
                    debug!(trace_id = %id, error = %e, "trace retry failed");
                    failed += 1;
                    self.retry.insert(id, trace);
                }
            }
        }
        if self.retry.is_empty() {
            self.retry_delay = INITIAL_RETRY_DELAY;
            self.next_retry = None;
        } else {
            warn!(
                traces = failed,
                delay_ms = self.retry_delay.as_millis() as u64,
                "trace writes still failing"
            );
            self.next_retry = Some(Instant::now() + self.retry_delay);
            self.retry_delay = (self.retry_delay * 2).min(MAX_RETRY_DELAY);
        }
    }
}
