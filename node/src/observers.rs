//! In-process publish/subscribe fan-out.
//!
//! Handler lists per event, invoked sequentially in registration order.
//! Handlers may post work back to the executor but must not synchronously
//! re-enter the block processor.

use std::sync::Arc;
use std::sync::Mutex;

use raze_ledger::{Block, Vote};
use raze_types::{Account, Amount, Endpoint};

use crate::ledger::VoteCode;

type BlockHandler = Box<dyn Fn(&Arc<Block>, &Account, &Amount) + Send + Sync>;
type BalanceHandler = Box<dyn Fn(&Account, bool) + Send + Sync>;
type EndpointHandler = Box<dyn Fn(&Endpoint) + Send + Sync>;
type VoteHandler = Box<dyn Fn(&Arc<Vote>, VoteCode, &Endpoint) + Send + Sync>;
type PlainHandler = Box<dyn Fn() + Send + Sync>;

/// Event hub wired at node construction.
#[derive(Default)]
pub struct Observers {
    blocks: Mutex<Vec<BlockHandler>>,
    account_balance: Mutex<Vec<BalanceHandler>>,
    endpoint: Mutex<Vec<EndpointHandler>>,
    disconnect: Mutex<Vec<PlainHandler>>,
    vote: Mutex<Vec<VoteHandler>>,
    started: Mutex<Vec<PlainHandler>>,
}

impl Observers {
    pub fn add_blocks(&self, handler: impl Fn(&Arc<Block>, &Account, &Amount) + Send + Sync + 'static) {
        self.blocks.lock().expect("observers poisoned").push(Box::new(handler));
    }

    pub fn add_account_balance(&self, handler: impl Fn(&Account, bool) + Send + Sync + 'static) {
        self.account_balance.lock().expect("observers poisoned").push(Box::new(handler));
    }

    pub fn add_endpoint(&self, handler: impl Fn(&Endpoint) + Send + Sync + 'static) {
        self.endpoint.lock().expect("observers poisoned").push(Box::new(handler));
    }

    pub fn add_disconnect(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.disconnect.lock().expect("observers poisoned").push(Box::new(handler));
    }

    pub fn add_vote(
        &self,
        handler: impl Fn(&Arc<Vote>, VoteCode, &Endpoint) + Send + Sync + 'static,
    ) {
        self.vote.lock().expect("observers poisoned").push(Box::new(handler));
    }

    pub fn add_started(&self, handler: impl Fn() + Send + Sync + 'static) {
        self.started.lock().expect("observers poisoned").push(Box::new(handler));
    }

    pub fn blocks(&self, block: &Arc<Block>, account: &Account, amount: &Amount) {
        for handler in self.blocks.lock().expect("observers poisoned").iter() {
            handler(block, account, amount);
        }
    }

    pub fn account_balance(&self, account: &Account, pending: bool) {
        for handler in self.account_balance.lock().expect("observers poisoned").iter() {
            handler(account, pending);
        }
    }

    pub fn endpoint(&self, endpoint: &Endpoint) {
        for handler in self.endpoint.lock().expect("observers poisoned").iter() {
            handler(endpoint);
        }
    }

    pub fn disconnect(&self) {
        for handler in self.disconnect.lock().expect("observers poisoned").iter() {
            handler();
        }
    }

    pub fn vote(&self, vote: &Arc<Vote>, code: VoteCode, endpoint: &Endpoint) {
        for handler in self.vote.lock().expect("observers poisoned").iter() {
            handler(vote, code, endpoint);
        }
    }

    pub fn started(&self) {
        for handler in self.started.lock().expect("observers poisoned").iter() {
            handler();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn handlers_run_in_registration_order() {
        let observers = Observers::default();
        let order = Arc::new(Mutex::new(Vec::new()));
        for tag in [1, 2, 3] {
            let order = Arc::clone(&order);
            observers.add_started(move || order.lock().unwrap().push(tag));
        }
        observers.started();
        assert_eq!(*order.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn endpoint_handlers_receive_argument() {
        let observers = Observers::default();
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_l = Arc::clone(&hits);
        observers.add_endpoint(move |endpoint| {
            assert_eq!(endpoint.port(), 7075);
            hits_l.fetch_add(1, Ordering::SeqCst);
        });
        let endpoint: Endpoint = "[::1]:7075".parse().unwrap();
        observers.endpoint(&endpoint);
        observers.endpoint(&endpoint);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }
}
