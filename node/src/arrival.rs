//! Recently arrived block hashes.
//!
//! Distinguishes blocks that came in over UDP from those replayed by
//! bootstrap: only recent UDP arrivals start elections, and forks found for
//! non-recent blocks are handed to bootstrap instead.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use raze_types::BlockHash;

/// Entries age out after this long.
const ARRIVAL_WINDOW: Duration = Duration::from_secs(60);

#[derive(Default)]
struct ArrivalState {
    order: VecDeque<(Instant, BlockHash)>,
    counts: HashMap<BlockHash, u32>,
}

/// Sliding 60-second window of gossip-arrived block hashes.
#[derive(Default)]
pub struct BlockArrival {
    state: Mutex<ArrivalState>,
}

impl BlockArrival {
    pub fn add(&self, hash: BlockHash) {
        let mut state = self.state.lock().expect("arrival poisoned");
        state.order.push_back((Instant::now(), hash));
        *state.counts.entry(hash).or_insert(0) += 1;
    }

    /// Whether `hash` arrived within the window. Prunes expired entries.
    pub fn recent(&self, hash: &BlockHash) -> bool {
        let mut state = self.state.lock().expect("arrival poisoned");
        let now = Instant::now();
        while let Some((arrived, old)) = state.order.front().copied() {
            if now.duration_since(arrived) <= ARRIVAL_WINDOW {
                break;
            }
            state.order.pop_front();
            if let Some(count) = state.counts.get_mut(&old) {
                *count -= 1;
                if *count == 0 {
                    state.counts.remove(&old);
                }
            }
        }
        state.counts.contains_key(hash)
    }
}
