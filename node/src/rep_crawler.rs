//! Outstanding representative probes.
//!
//! Hashes land here when a confirm_req probe is sent; a confirm_ack for a
//! tracked hash marks its sender as a representative. A 5-second timer
//! removes each hash again.

use std::collections::HashSet;
use std::sync::Mutex;

use raze_types::BlockHash;

#[derive(Default)]
pub struct RepCrawler {
    active: Mutex<HashSet<BlockHash>>,
}

impl RepCrawler {
    pub fn add(&self, hash: BlockHash) {
        self.active.lock().expect("rep crawler poisoned").insert(hash);
    }

    pub fn remove(&self, hash: &BlockHash) {
        self.active.lock().expect("rep crawler poisoned").remove(hash);
    }

    pub fn exists(&self, hash: &BlockHash) -> bool {
        self.active.lock().expect("rep crawler poisoned").contains(hash)
    }
}
