//! Bounded worker thread pool for statement fan-out.
//!
//! Classic thread-per-task with a fixed thread count and a bounded queue:
//! submission blocks while the queue is at capacity, keeping backpressure
//! on the submitting statement rather than growing without bound.

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use shrike_common::error::{ExecError, ShrikeResult};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct PoolShared {
    queue_rx: Mutex<Receiver<Job>>,
    pending: Mutex<usize>,
    slot_freed: Condvar,
}

pub struct WorkerPool {
    shared: Arc<PoolShared>,
    queue_tx: Mutex<Option<Sender<Job>>>,
    queue_cap: usize,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(threads: usize, queue_cap: usize) -> Self {
        let threads = threads.max(1);
        let queue_cap = queue_cap.max(threads);
        let (tx, rx) = mpsc::channel::<Job>();
        let shared = Arc::new(PoolShared {
            queue_rx: Mutex::new(rx),
            pending: Mutex::new(0),
            slot_freed: Condvar::new(),
        });

        let handles = (0..threads)
            .map(|i| {
                let shared = shared.clone();
                std::thread::Builder::new()
                    .name(format!("shrike-worker-{i}"))
                    .spawn(move || loop {
                        let job = {
                            let rx = shared.queue_rx.lock();
                            rx.recv()
                        };
                        match job {
                            Ok(job) => {
                                {
                                    let mut pending = shared.pending.lock();
                                    *pending -= 1;
                                    shared.slot_freed.notify_one();
                                }
                                job();
                            }
                            // Sender dropped: pool shut down.
                            Err(_) => break,
                        }
                    })
                    .expect("spawn worker thread")
            })
            .collect();

        Self {
            shared,
            queue_tx: Mutex::new(Some(tx)),
            queue_cap,
            threads: Mutex::new(handles),
        }
    }

    /// Enqueue one task. Blocks while the queue is at capacity; fails only
    /// when the pool has been shut down.
    pub fn submit(&self, job: Job) -> ShrikeResult<()> {
        {
            let mut pending = self.shared.pending.lock();
            while *pending >= self.queue_cap {
                self.shared.slot_freed.wait(&mut pending);
            }
            *pending += 1;
        }
        let tx = self.queue_tx.lock();
        match tx.as_ref() {
            Some(tx) => tx.send(job).map_err(|_| ExecError::PoolShutdown.into()),
            None => {
                let mut pending = self.shared.pending.lock();
                *pending -= 1;
                Err(ExecError::PoolShutdown.into())
            }
        }
    }

    /// Drop the queue sender and join every worker thread. Queued jobs
    /// still drain before the threads exit.
    pub fn shutdown(&self) {
        self.queue_tx.lock().take();
        let mut threads = self.threads.lock();
        for handle in threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}
