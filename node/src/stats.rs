//! Message and drop counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Per-direction counts of the four gossip message types.
#[derive(Debug, Default)]
pub struct MessageStatistics {
    pub keepalive: AtomicU64,
    pub publish: AtomicU64,
    pub confirm_req: AtomicU64,
    pub confirm_ack: AtomicU64,
}

impl MessageStatistics {
    pub fn snapshot(&self) -> (u64, u64, u64, u64) {
        (
            self.keepalive.load(Ordering::Relaxed),
            self.publish.load(Ordering::Relaxed),
            self.confirm_req.load(Ordering::Relaxed),
            self.confirm_ack.load(Ordering::Relaxed),
        )
    }
}

/// Dropped-datagram counters for the receive loop.
#[derive(Debug, Default)]
pub struct DropCounters {
    pub bad_sender: AtomicU64,
    pub insufficient_work: AtomicU64,
    pub error: AtomicU64,
}

/// Relaxed increment; counters are monotonic and only read for reporting.
pub fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bump_increments() {
        let stats = MessageStatistics::default();
        bump(&stats.publish);
        bump(&stats.publish);
        bump(&stats.keepalive);
        assert_eq!(stats.snapshot(), (1, 2, 0, 0));
    }
}
