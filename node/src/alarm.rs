//! Timer scheduler.
//!
//! One dedicated thread sleeps until the earliest deadline in a priority
//! queue and posts the due operation to the shared executor, keeping the
//! alarm thread itself responsive. A queued operation with no function is
//! the shutdown sentinel.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::{Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Instant;

use tokio::runtime::Handle;

type AlarmFn = Box<dyn FnOnce() + Send>;

struct Operation {
    wakeup: Instant,
    sequence: u64,
    function: Option<AlarmFn>,
}

// BinaryHeap is a max-heap; reverse so the earliest wakeup surfaces first.
impl Ord for Operation {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (other.wakeup, other.sequence).cmp(&(self.wakeup, self.sequence))
    }
}

impl PartialOrd for Operation {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Operation {
    fn eq(&self, other: &Self) -> bool {
        self.wakeup == other.wakeup && self.sequence == other.sequence
    }
}

impl Eq for Operation {}

struct AlarmState {
    operations: BinaryHeap<Operation>,
    next_sequence: u64,
}

/// Deadline-ordered scheduler with one worker thread.
pub struct Alarm {
    state: Mutex<AlarmState>,
    condition: Condvar,
    handle: Handle,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Alarm {
    pub fn new(handle: Handle) -> std::sync::Arc<Self> {
        let alarm = std::sync::Arc::new(Self {
            state: Mutex::new(AlarmState {
                operations: BinaryHeap::new(),
                next_sequence: 0,
            }),
            condition: Condvar::new(),
            handle,
            thread: Mutex::new(None),
        });
        let alarm_l = std::sync::Arc::clone(&alarm);
        *alarm.thread.lock().expect("alarm poisoned") =
            Some(std::thread::spawn(move || alarm_l.run()));
        alarm
    }

    /// Schedule `function` to be posted to the executor at `wakeup`.
    pub fn add(&self, wakeup: Instant, function: impl FnOnce() + Send + 'static) {
        self.push(wakeup, Some(Box::new(function)));
    }

    fn push(&self, wakeup: Instant, function: Option<AlarmFn>) {
        let mut state = self.state.lock().expect("alarm poisoned");
        let sequence = state.next_sequence;
        state.next_sequence += 1;
        state.operations.push(Operation {
            wakeup,
            sequence,
            function,
        });
        self.condition.notify_all();
    }

    fn run(&self) {
        let mut state = self.state.lock().expect("alarm poisoned");
        loop {
            let Some(operation) = state.operations.peek() else {
                state = self.condition.wait(state).expect("alarm poisoned");
                continue;
            };
            if operation.function.is_none() {
                break;
            }
            let wakeup = operation.wakeup;
            let now = Instant::now();
            if wakeup <= now {
                let operation = state.operations.pop().expect("peeked");
                let function = operation.function.expect("sentinel handled above");
                self.handle.spawn(async move { function() });
            } else {
                let (returned, _) = self
                    .condition
                    .wait_timeout(state, wakeup - now)
                    .expect("alarm poisoned");
                state = returned;
            }
        }
    }

    /// Post the shutdown sentinel and join the worker thread. Operations
    /// scheduled beyond this instant never run.
    pub fn stop(&self) {
        self.push(Instant::now(), None);
        let thread = self.thread.lock().expect("alarm poisoned").take();
        if let Some(thread) = thread {
            let _ = thread.join();
        }
    }
}
