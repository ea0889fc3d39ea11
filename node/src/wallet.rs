//! Slim in-process keystore.
//!
//! Holds adhoc keys and the account used as the default representative for
//! received funds. Key encryption, deterministic seed derivation and backup
//! files belong to the full wallet subsystem and are out of scope here; the
//! node only needs signing access for voting and auto-receives.

use std::collections::HashMap;
use std::sync::Mutex;

use heed::RoTxn;

use raze_types::{Account, KeyPair, PrivateKey};

use crate::ledger::Ledger;

struct WalletState {
    keys: HashMap<Account, [u8; 32]>,
    representative: Account,
}

pub struct Wallets {
    state: Mutex<WalletState>,
}

impl Wallets {
    /// An empty keystore delegating received funds to `representative`.
    pub fn new(representative: Account) -> Self {
        Self {
            state: Mutex::new(WalletState {
                keys: HashMap::new(),
                representative,
            }),
        }
    }

    pub fn insert_adhoc(&self, keypair: KeyPair) {
        let mut state = self.state.lock().expect("wallet poisoned");
        state.keys.insert(keypair.public, *keypair.private.as_bytes());
    }

    pub fn exists(&self, account: &Account) -> bool {
        self.state.lock().expect("wallet poisoned").keys.contains_key(account)
    }

    pub fn key_for(&self, account: &Account) -> Option<PrivateKey> {
        self.state
            .lock()
            .expect("wallet poisoned")
            .keys
            .get(account)
            .map(|bytes| PrivateKey(*bytes))
    }

    pub fn representative(&self) -> Account {
        self.state.lock().expect("wallet poisoned").representative
    }

    pub fn set_representative(&self, representative: Account) {
        self.state.lock().expect("wallet poisoned").representative = representative;
    }

    /// Wallet keys that currently carry voting weight. These are the
    /// accounts this node may emit signed confirm_acks for.
    pub fn representatives(&self, txn: &RoTxn, ledger: &Ledger) -> Vec<KeyPair> {
        let state = self.state.lock().expect("wallet poisoned");
        state
            .keys
            .iter()
            .filter(|(account, _)| {
                ledger
                    .weight(txn, account)
                    .map(|weight| !weight.is_zero())
                    .unwrap_or(false)
            })
            .map(|(account, key)| KeyPair {
                public: *account,
                private: PrivateKey(*key),
            })
            .collect()
    }
}
