//! Local CPU work pool.
//!
//! A fixed set of worker threads grinds random nonces for the request at the
//! front of the queue. Cancellation bumps a generation ticket so in-flight
//! grinding abandons the stale root at the next check.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use rand::Rng;

use raze_types::BlockHash;

use crate::difficulty::work_value;

/// Nonces ground between ticket checks.
const STRIDE: u64 = 0x1000;

type WorkCallback = Box<dyn FnOnce(Option<u64>) + Send>;

struct WorkItem {
    root: BlockHash,
    threshold: u64,
    callback: WorkCallback,
}

struct PoolState {
    pending: VecDeque<WorkItem>,
    done: bool,
}

/// Multi-threaded proof-of-work generator.
pub struct WorkPool {
    state: Mutex<PoolState>,
    condition: Condvar,
    ticket: AtomicUsize,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkPool {
    /// Start `thread_count` grinder threads.
    pub fn new(thread_count: usize) -> std::sync::Arc<Self> {
        let pool = std::sync::Arc::new(Self {
            state: Mutex::new(PoolState {
                pending: VecDeque::new(),
                done: false,
            }),
            condition: Condvar::new(),
            ticket: AtomicUsize::new(0),
            threads: Mutex::new(Vec::new()),
        });
        let mut threads = pool.threads.lock().expect("work pool poisoned");
        for _ in 0..thread_count.max(1) {
            let pool_l = std::sync::Arc::clone(&pool);
            threads.push(std::thread::spawn(move || pool_l.run()));
        }
        drop(threads);
        pool
    }

    fn run(&self) {
        let mut rng = rand::thread_rng();
        let mut state = self.state.lock().expect("work pool poisoned");
        loop {
            if state.done {
                break;
            }
            let Some(front) = state.pending.front() else {
                state = self.condition.wait(state).expect("work pool poisoned");
                continue;
            };
            let root = front.root;
            let threshold = front.threshold;
            let ticket = self.ticket.load(Ordering::Acquire);
            drop(state);

            let started = Instant::now();
            let mut found = None;
            while found.is_none() && self.ticket.load(Ordering::Acquire) == ticket {
                let mut nonce: u64 = rng.gen();
                for _ in 0..STRIDE {
                    if work_value(&root, nonce) >= threshold {
                        found = Some(nonce);
                        break;
                    }
                    nonce = nonce.wrapping_add(1);
                }
            }

            state = self.state.lock().expect("work pool poisoned");
            if let Some(work) = found {
                // Another thread may have completed or cancelled the item
                // while we were grinding; only the thread that still finds it
                // at the front delivers the result.
                let still_front = state
                    .pending
                    .front()
                    .map(|item| item.root == root)
                    .unwrap_or(false);
                if still_front && self.ticket.load(Ordering::Acquire) == ticket {
                    let item = state.pending.pop_front().expect("front checked");
                    self.ticket.fetch_add(1, Ordering::AcqRel);
                    drop(state);
                    tracing::debug!(
                        root = %root,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "work generation complete"
                    );
                    (item.callback)(Some(work));
                    state = self.state.lock().expect("work pool poisoned");
                }
            }
        }
    }

    /// Enqueue a generation request; `callback` fires with `Some(work)` on
    /// success or `None` if the request is cancelled.
    pub fn generate(
        &self,
        root: BlockHash,
        threshold: u64,
        callback: impl FnOnce(Option<u64>) + Send + 'static,
    ) {
        let mut state = self.state.lock().expect("work pool poisoned");
        state.pending.push_back(WorkItem {
            root,
            threshold,
            callback: Box::new(callback),
        });
        self.condition.notify_all();
    }

    /// Block the calling thread until work for `root` is ready.
    pub fn generate_blocking(&self, root: BlockHash, threshold: u64) -> Option<u64> {
        let (tx, rx) = std::sync::mpsc::channel();
        self.generate(root, threshold, move |work| {
            let _ = tx.send(work);
        });
        rx.recv().ok().flatten()
    }

    /// Drop every queued request for `root` and abandon in-flight grinding.
    pub fn cancel(&self, root: &BlockHash) {
        let cancelled: Vec<WorkItem> = {
            let mut state = self.state.lock().expect("work pool poisoned");
            self.ticket.fetch_add(1, Ordering::AcqRel);
            let mut kept = VecDeque::new();
            let mut cancelled = Vec::new();
            while let Some(item) = state.pending.pop_front() {
                if item.root == *root {
                    cancelled.push(item);
                } else {
                    kept.push_back(item);
                }
            }
            state.pending = kept;
            self.condition.notify_all();
            cancelled
        };
        for item in cancelled {
            (item.callback)(None);
        }
    }

    /// Stop the grinder threads and fail any queued requests.
    pub fn stop(&self) {
        let abandoned: Vec<WorkItem> = {
            let mut state = self.state.lock().expect("work pool poisoned");
            state.done = true;
            self.ticket.fetch_add(1, Ordering::AcqRel);
            let abandoned = state.pending.drain(..).collect();
            self.condition.notify_all();
            abandoned
        };
        for item in abandoned {
            (item.callback)(None);
        }
        let threads: Vec<JoinHandle<()>> =
            self.threads.lock().expect("work pool poisoned").drain(..).collect();
        for thread in threads {
            let _ = thread.join();
        }
    }
}
