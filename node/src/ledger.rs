//! Ledger application logic over the LMDB store.
//!
//! `process` is the single entry point for mutating account chains; every
//! other subsystem treats its result codes as the complete truth about a
//! block. All mutation happens inside the caller's write transaction, which
//! only the block processor (and the wallet, on a disjoint keyspace) hold.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use heed::{RoTxn, RwTxn};

use raze_crypto::validate_message;
use raze_ledger::{Block, OpenBlock, ReceiveBlock, SendBlock, Vote};
use raze_store::{AccountInfo, PendingInfo, PendingKey, Store, StoreError};
use raze_types::amount::GENESIS_AMOUNT;
use raze_types::{Account, Amount, BlockHash, KeyPair};

/// Outcome of applying one block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProcessResult {
    Progress,
    Old,
    GapPrevious,
    GapSource,
    Fork,
    BadSignature,
    NegativeSpend,
    Unreceivable,
    NotReceiveFromSend,
    AccountMismatch,
    OpenedBurnAccount,
}

/// Result code plus the facts observers need.
#[derive(Clone, Copy, Debug)]
pub struct ProcessReturn {
    pub code: ProcessResult,
    pub account: Account,
    pub amount: Amount,
    /// For sends, the destination whose pending balance grew.
    pub pending_account: Account,
}

impl ProcessReturn {
    fn code(code: ProcessResult) -> Self {
        Self {
            code,
            account: Account::ZERO,
            amount: Amount::ZERO,
            pending_account: Account::ZERO,
        }
    }
}

/// Classification of an observed vote.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoteCode {
    /// Signature failure.
    Invalid,
    /// Sequence not newer than the best known vote for the account.
    Replay,
    /// First vote seen from this account.
    Vote,
    /// Supersedes an earlier vote from the same account.
    Vote2,
}

/// Validation outcome; on replay `vote` is the superseding stored vote.
#[derive(Clone, Debug)]
pub struct VoteResult {
    pub code: VoteCode,
    pub vote: Arc<Vote>,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn corrupt(context: &str, hash: &BlockHash) -> StoreError {
    StoreError::Corrupt(format!("{context}: {hash}"))
}

/// Account-chain state machine.
pub struct Ledger {
    store: Arc<Store>,
    inactive_supply: Amount,
    genesis_account: Account,
    /// Freshest vote per representative. Overlays the on-disk `vote` table,
    /// which is only written under the voting paths' write transactions.
    last_votes: Mutex<HashMap<Account, Arc<Vote>>>,
}

impl Ledger {
    pub fn new(store: Arc<Store>, inactive_supply: Amount, genesis_account: Account) -> Self {
        Self {
            store,
            inactive_supply,
            genesis_account,
            last_votes: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    pub fn genesis_account(&self) -> Account {
        self.genesis_account
    }

    /// Seed an empty store with the genesis open block.
    pub fn initialize(&self, txn: &mut RwTxn, genesis: &Arc<Block>) -> Result<(), StoreError> {
        let hash = genesis.hash();
        let account = self.genesis_account;
        self.store.block_put(txn, &hash, genesis, BlockHash::ZERO, account)?;
        self.store.account_put(
            txn,
            &account,
            &AccountInfo {
                head: hash,
                representative: account,
                open_block: hash,
                balance: Amount::new(GENESIS_AMOUNT),
                modified: now_secs(),
                block_count: 1,
            },
        )?;
        self.store
            .representation_put(txn, &account, Amount::new(GENESIS_AMOUNT))?;
        self.store.checksum_xor(txn, &hash)
    }

    // ── Processing ─────────────────────────────────────────────────────

    pub fn process(&self, txn: &mut RwTxn, block: &Arc<Block>) -> Result<ProcessReturn, StoreError> {
        let hash = block.hash();
        if self.store.block_exists(txn, &hash)? {
            return Ok(ProcessReturn::code(ProcessResult::Old));
        }
        match &**block {
            Block::Send(send) => self.process_send(txn, block, send, hash),
            Block::Receive(receive) => self.process_receive(txn, block, receive, hash),
            Block::Open(open) => self.process_open(txn, block, open, hash),
            Block::Change(change) => self.process_change(txn, block, change, hash),
        }
    }

    fn process_send(
        &self,
        txn: &mut RwTxn,
        block: &Arc<Block>,
        send: &SendBlock,
        hash: BlockHash,
    ) -> Result<ProcessReturn, StoreError> {
        if !self.store.block_exists(txn, &send.previous)? {
            return Ok(ProcessReturn::code(ProcessResult::GapPrevious));
        }
        let account = self
            .store
            .block_account(txn, &send.previous)?
            .ok_or_else(|| corrupt("missing account sideband", &send.previous))?;
        let info = self
            .store
            .account_get(txn, &account)?
            .ok_or_else(|| corrupt("chain without account row", &send.previous))?;
        if info.head != send.previous {
            return Ok(ProcessReturn::code(ProcessResult::Fork));
        }
        if !validate_message(&account, hash.as_bytes(), block.signature()) {
            return Ok(ProcessReturn::code(ProcessResult::BadSignature));
        }
        let Some(amount) = info.balance.checked_sub(send.balance) else {
            return Ok(ProcessReturn::code(ProcessResult::NegativeSpend));
        };

        self.store.block_put(txn, &hash, block, BlockHash::ZERO, account)?;
        self.store.block_successor_set(txn, &send.previous, hash)?;
        self.advance_head(txn, &account, &info, hash, send.balance)?;
        self.representation_sub(txn, &info.representative, amount)?;
        self.store.pending_put(
            txn,
            &PendingKey::new(send.destination, hash),
            &PendingInfo {
                source: account,
                amount,
            },
        )?;

        Ok(ProcessReturn {
            code: ProcessResult::Progress,
            account,
            amount,
            pending_account: send.destination,
        })
    }

    fn process_receive(
        &self,
        txn: &mut RwTxn,
        block: &Arc<Block>,
        receive: &ReceiveBlock,
        hash: BlockHash,
    ) -> Result<ProcessReturn, StoreError> {
        if !self.store.block_exists(txn, &receive.previous)? {
            return Ok(ProcessReturn::code(ProcessResult::GapPrevious));
        }
        let account = self
            .store
            .block_account(txn, &receive.previous)?
            .ok_or_else(|| corrupt("missing account sideband", &receive.previous))?;
        let info = self
            .store
            .account_get(txn, &account)?
            .ok_or_else(|| corrupt("chain without account row", &receive.previous))?;
        if info.head != receive.previous {
            return Ok(ProcessReturn::code(ProcessResult::Fork));
        }
        if !validate_message(&account, hash.as_bytes(), block.signature()) {
            return Ok(ProcessReturn::code(ProcessResult::BadSignature));
        }
        let pending = match self.screen_source(txn, &account, &receive.source)? {
            Ok(pending) => pending,
            Err(code) => return Ok(ProcessReturn::code(code)),
        };

        let amount = pending.amount;
        self.store
            .pending_del(txn, &PendingKey::new(account, receive.source))?;
        self.store.block_put(txn, &hash, block, BlockHash::ZERO, account)?;
        self.store.block_successor_set(txn, &receive.previous, hash)?;
        self.advance_head(txn, &account, &info, hash, info.balance.saturating_add(amount))?;
        self.representation_add(txn, &info.representative, amount)?;

        Ok(ProcessReturn {
            code: ProcessResult::Progress,
            account,
            amount,
            pending_account: Account::ZERO,
        })
    }

    fn process_open(
        &self,
        txn: &mut RwTxn,
        block: &Arc<Block>,
        open: &OpenBlock,
        hash: BlockHash,
    ) -> Result<ProcessReturn, StoreError> {
        if open.account.is_zero() {
            return Ok(ProcessReturn::code(ProcessResult::OpenedBurnAccount));
        }
        if self.store.account_get(txn, &open.account)?.is_some() {
            // A second open competes for the same root (the account itself).
            return Ok(ProcessReturn::code(ProcessResult::Fork));
        }
        if !validate_message(&open.account, hash.as_bytes(), block.signature()) {
            return Ok(ProcessReturn::code(ProcessResult::BadSignature));
        }
        let pending = match self.screen_source(txn, &open.account, &open.source)? {
            Ok(pending) => pending,
            Err(code) => return Ok(ProcessReturn::code(code)),
        };

        let amount = pending.amount;
        self.store
            .pending_del(txn, &PendingKey::new(open.account, open.source))?;
        self.store
            .block_put(txn, &hash, block, BlockHash::ZERO, open.account)?;
        self.store.account_put(
            txn,
            &open.account,
            &AccountInfo {
                head: hash,
                representative: open.representative,
                open_block: hash,
                balance: amount,
                modified: now_secs(),
                block_count: 1,
            },
        )?;
        self.store.checksum_xor(txn, &hash)?;
        self.representation_add(txn, &open.representative, amount)?;

        Ok(ProcessReturn {
            code: ProcessResult::Progress,
            account: open.account,
            amount,
            pending_account: Account::ZERO,
        })
    }

    fn process_change(
        &self,
        txn: &mut RwTxn,
        block: &Arc<Block>,
        change: &raze_ledger::ChangeBlock,
        hash: BlockHash,
    ) -> Result<ProcessReturn, StoreError> {
        if !self.store.block_exists(txn, &change.previous)? {
            return Ok(ProcessReturn::code(ProcessResult::GapPrevious));
        }
        let account = self
            .store
            .block_account(txn, &change.previous)?
            .ok_or_else(|| corrupt("missing account sideband", &change.previous))?;
        let info = self
            .store
            .account_get(txn, &account)?
            .ok_or_else(|| corrupt("chain without account row", &change.previous))?;
        if info.head != change.previous {
            return Ok(ProcessReturn::code(ProcessResult::Fork));
        }
        if !validate_message(&account, hash.as_bytes(), block.signature()) {
            return Ok(ProcessReturn::code(ProcessResult::BadSignature));
        }

        self.store.block_put(txn, &hash, block, BlockHash::ZERO, account)?;
        self.store.block_successor_set(txn, &change.previous, hash)?;
        self.representation_sub(txn, &info.representative, info.balance)?;
        self.representation_add(txn, &change.representative, info.balance)?;
        let balance = info.balance;
        let mut updated = info;
        updated.representative = change.representative;
        self.store.account_put(txn, &account, &updated)?;
        self.advance_head(txn, &account, &updated, hash, balance)?;

        Ok(ProcessReturn {
            code: ProcessResult::Progress,
            account,
            amount: Amount::ZERO,
            pending_account: Account::ZERO,
        })
    }

    /// Common source screening for receive and open: distinguishes missing,
    /// non-send, misdirected and already-consumed sources.
    fn screen_source(
        &self,
        txn: &RoTxn,
        account: &Account,
        source: &BlockHash,
    ) -> Result<Result<PendingInfo, ProcessResult>, StoreError> {
        let Some(source_block) = self.store.block_get(txn, source)? else {
            return Ok(Err(ProcessResult::GapSource));
        };
        let Block::Send(source_send) = source_block else {
            return Ok(Err(ProcessResult::NotReceiveFromSend));
        };
        if source_send.destination != *account {
            return Ok(Err(ProcessResult::AccountMismatch));
        }
        match self.store.pending_get(txn, &PendingKey::new(*account, *source))? {
            Some(pending) => Ok(Ok(pending)),
            None => Ok(Err(ProcessResult::Unreceivable)),
        }
    }

    /// Move an account's head to `hash`, maintaining the frontier checksum.
    fn advance_head(
        &self,
        txn: &mut RwTxn,
        account: &Account,
        info: &AccountInfo,
        hash: BlockHash,
        balance: Amount,
    ) -> Result<(), StoreError> {
        self.store.checksum_xor(txn, &info.head)?;
        self.store.checksum_xor(txn, &hash)?;
        let mut updated = info.clone();
        updated.head = hash;
        updated.balance = balance;
        updated.modified = now_secs();
        updated.block_count = info.block_count + 1;
        self.store.account_put(txn, account, &updated)
    }

    fn representation_add(
        &self,
        txn: &mut RwTxn,
        rep: &Account,
        amount: Amount,
    ) -> Result<(), StoreError> {
        let weight = self.store.representation_get(txn, rep)?;
        self.store
            .representation_put(txn, rep, weight.saturating_add(amount))
    }

    fn representation_sub(
        &self,
        txn: &mut RwTxn,
        rep: &Account,
        amount: Amount,
    ) -> Result<(), StoreError> {
        let weight = self.store.representation_get(txn, rep)?;
        self.store
            .representation_put(txn, rep, weight.saturating_sub(amount))
    }

    // ── Rollback ───────────────────────────────────────────────────────

    /// Undo blocks from the owning account's head back to and including
    /// `target`. Sends that were already received cascade into the
    /// receiving chains first.
    pub fn rollback(&self, txn: &mut RwTxn, target: BlockHash) -> Result<(), StoreError> {
        let account = self
            .store
            .block_account(txn, &target)?
            .ok_or_else(|| corrupt("rollback of unknown block", &target))?;
        while self.store.block_exists(txn, &target)? {
            self.rollback_head(txn, &account)?;
        }
        Ok(())
    }

    fn rollback_head(&self, txn: &mut RwTxn, account: &Account) -> Result<(), StoreError> {
        let info = self
            .store
            .account_get(txn, account)?
            .ok_or_else(|| StoreError::Corrupt(format!("rollback without account {account}")))?;
        let head = info.head;
        let block = self
            .store
            .block_get(txn, &head)?
            .ok_or_else(|| corrupt("head without block", &head))?;

        match block {
            Block::Send(send) => {
                let key = PendingKey::new(send.destination, head);
                let pending = loop {
                    match self.store.pending_get(txn, &key)? {
                        Some(pending) => break pending,
                        None => {
                            // Already received: peel the destination chain
                            // until the consuming receive is undone and the
                            // entry reappears.
                            let dest_head = self
                                .store
                                .account_get(txn, &send.destination)?
                                .ok_or_else(|| {
                                    corrupt("receiver vanished during rollback", &head)
                                })?
                                .head;
                            self.rollback(txn, dest_head)?;
                        }
                    }
                };
                self.store.pending_del(txn, &key)?;
                self.representation_add(txn, &info.representative, pending.amount)?;
                self.retreat_head(
                    txn,
                    account,
                    &info,
                    send.previous,
                    send.balance.saturating_add(pending.amount),
                )?;
                self.store.block_del(txn, &head)?;
            }
            Block::Receive(receive) => {
                let amount = self.amount_of(txn, &receive.source)?;
                let source_account = self
                    .store
                    .block_account(txn, &receive.source)?
                    .unwrap_or(Account::ZERO);
                self.store.pending_put(
                    txn,
                    &PendingKey::new(*account, receive.source),
                    &PendingInfo {
                        source: source_account,
                        amount,
                    },
                )?;
                self.representation_sub(txn, &info.representative, amount)?;
                self.retreat_head(
                    txn,
                    account,
                    &info,
                    receive.previous,
                    info.balance.saturating_sub(amount),
                )?;
                self.store.block_del(txn, &head)?;
            }
            Block::Open(open) => {
                let amount = info.balance;
                let source_account = self
                    .store
                    .block_account(txn, &open.source)?
                    .unwrap_or(Account::ZERO);
                self.store.pending_put(
                    txn,
                    &PendingKey::new(*account, open.source),
                    &PendingInfo {
                        source: source_account,
                        amount,
                    },
                )?;
                self.representation_sub(txn, &open.representative, amount)?;
                self.store.checksum_xor(txn, &head)?;
                self.store.account_del(txn, account)?;
                self.store.block_del(txn, &head)?;
            }
            Block::Change(change) => {
                let previous_rep = self.representative_of(txn, &change.previous)?;
                self.representation_sub(txn, &change.representative, info.balance)?;
                self.representation_add(txn, &previous_rep, info.balance)?;
                let mut restored = info.clone();
                restored.representative = previous_rep;
                self.store.account_put(txn, account, &restored)?;
                self.retreat_head(txn, account, &restored, change.previous, restored.balance)?;
                self.store.block_del(txn, &head)?;
            }
        }
        Ok(())
    }

    fn retreat_head(
        &self,
        txn: &mut RwTxn,
        account: &Account,
        info: &AccountInfo,
        previous: BlockHash,
        balance: Amount,
    ) -> Result<(), StoreError> {
        self.store.checksum_xor(txn, &info.head)?;
        self.store.checksum_xor(txn, &previous)?;
        self.store.block_successor_set(txn, &previous, BlockHash::ZERO)?;
        let mut updated = info.clone();
        updated.head = previous;
        updated.balance = balance;
        updated.modified = now_secs();
        updated.block_count = info.block_count.saturating_sub(1);
        self.store.account_put(txn, account, &updated)
    }

    // ── Chain queries ──────────────────────────────────────────────────

    /// The account whose chain contains `hash`.
    pub fn account(&self, txn: &RoTxn, hash: &BlockHash) -> Result<Option<Account>, StoreError> {
        self.store.block_account(txn, hash)
    }

    pub fn latest(&self, txn: &RoTxn, account: &Account) -> Result<BlockHash, StoreError> {
        Ok(self
            .store
            .account_get(txn, account)?
            .map(|info| info.head)
            .unwrap_or(BlockHash::ZERO))
    }

    pub fn account_balance(&self, txn: &RoTxn, account: &Account) -> Result<Amount, StoreError> {
        Ok(self
            .store
            .account_get(txn, account)?
            .map(|info| info.balance)
            .unwrap_or(Amount::ZERO))
    }

    pub fn account_pending(&self, txn: &RoTxn, account: &Account) -> Result<Amount, StoreError> {
        self.store.pending_total(txn, account)
    }

    pub fn weight(&self, txn: &RoTxn, account: &Account) -> Result<Amount, StoreError> {
        self.store.representation_get(txn, account)
    }

    /// Circulating supply: genesis raw minus burnt and configured-inactive.
    pub fn supply(&self, txn: &RoTxn) -> Result<Amount, StoreError> {
        let burnt = self.account_balance(txn, &Account::ZERO)?;
        Ok(Amount::new(GENESIS_AMOUNT)
            .saturating_sub(burnt)
            .saturating_sub(self.inactive_supply))
    }

    /// The block currently occupying the chain slot that `root` keys: the
    /// successor of `root` as a hash, or an account's open block.
    pub fn successor(&self, txn: &RoTxn, root: &BlockHash) -> Result<Option<Arc<Block>>, StoreError> {
        let successor_hash = if self.store.block_exists(txn, root)? {
            self.store.block_successor(txn, root)?.filter(|hash| !hash.is_zero())
        } else {
            self.store
                .account_get(txn, &Account::from(*root))?
                .map(|info| info.open_block)
        };
        match successor_hash {
            Some(hash) => Ok(self.store.block_get(txn, &hash)?.map(Arc::new)),
            None => Ok(None),
        }
    }

    /// Balance of the chain at `hash`.
    pub fn balance_of(&self, txn: &RoTxn, hash: &BlockHash) -> Result<Amount, StoreError> {
        let block = self
            .store
            .block_get(txn, hash)?
            .ok_or_else(|| corrupt("balance of unknown block", hash))?;
        match block {
            Block::Send(send) => Ok(send.balance),
            Block::Receive(receive) => Ok(self
                .balance_of(txn, &receive.previous)?
                .saturating_add(self.amount_of(txn, &receive.source)?)),
            Block::Open(open) => {
                if open.account == self.genesis_account {
                    Ok(Amount::new(GENESIS_AMOUNT))
                } else {
                    self.amount_of(txn, &open.source)
                }
            }
            Block::Change(change) => self.balance_of(txn, &change.previous),
        }
    }

    /// Amount transferred by the block at `hash`.
    pub fn amount_of(&self, txn: &RoTxn, hash: &BlockHash) -> Result<Amount, StoreError> {
        let block = self
            .store
            .block_get(txn, hash)?
            .ok_or_else(|| corrupt("amount of unknown block", hash))?;
        match block {
            Block::Send(send) => Ok(self
                .balance_of(txn, &send.previous)?
                .saturating_sub(send.balance)),
            Block::Receive(receive) => self.amount_of(txn, &receive.source),
            Block::Open(open) => {
                if open.account == self.genesis_account {
                    Ok(Amount::new(GENESIS_AMOUNT))
                } else {
                    self.amount_of(txn, &open.source)
                }
            }
            Block::Change(_) => Ok(Amount::ZERO),
        }
    }

    fn representative_of(&self, txn: &RoTxn, hash: &BlockHash) -> Result<Account, StoreError> {
        let mut current = *hash;
        loop {
            let block = self
                .store
                .block_get(txn, &current)?
                .ok_or_else(|| corrupt("representative of unknown block", &current))?;
            match block {
                Block::Open(open) => return Ok(open.representative),
                Block::Change(change) => return Ok(change.representative),
                other => current = other.previous(),
            }
        }
    }

    // ── Voting ─────────────────────────────────────────────────────────

    /// Weigh every vote's block; heaviest first, ties broken by lower hash.
    pub fn tally(
        &self,
        txn: &RoTxn,
        votes: &HashMap<Account, Arc<Vote>>,
    ) -> Result<Vec<(Amount, Arc<Block>)>, StoreError> {
        let mut totals: HashMap<BlockHash, (Amount, Arc<Block>)> = HashMap::new();
        for (rep, vote) in votes {
            let weight = self.weight(txn, rep)?;
            let entry = totals
                .entry(vote.block.hash())
                .or_insert_with(|| (Amount::ZERO, vote.block.clone()));
            entry.0 = entry.0.saturating_add(weight);
        }
        let mut list: Vec<(Amount, Arc<Block>)> = totals.into_values().collect();
        list.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.hash().cmp(&b.1.hash())));
        Ok(list)
    }

    /// The tally's leading entry.
    pub fn winner(
        &self,
        txn: &RoTxn,
        votes: &HashMap<Account, Arc<Vote>>,
    ) -> Result<Option<(Amount, Arc<Block>)>, StoreError> {
        Ok(self.tally(txn, votes)?.into_iter().next())
    }

    /// Screen an observed vote against the best known sequence per account.
    pub fn vote_validate(&self, txn: &RoTxn, vote: Arc<Vote>) -> VoteResult {
        if !vote.validate() {
            return VoteResult {
                code: VoteCode::Invalid,
                vote,
            };
        }
        let mut last_votes = self.last_votes.lock().expect("vote overlay poisoned");
        let current = last_votes.get(&vote.account).cloned().or_else(|| {
            self.store
                .vote_get(txn, &vote.account)
                .ok()
                .flatten()
                .map(Arc::new)
        });
        match current {
            Some(existing) if existing.sequence >= vote.sequence => VoteResult {
                code: VoteCode::Replay,
                vote: existing,
            },
            Some(_) => {
                last_votes.insert(vote.account, vote.clone());
                VoteResult {
                    code: VoteCode::Vote2,
                    vote,
                }
            }
            None => {
                last_votes.insert(vote.account, vote.clone());
                VoteResult {
                    code: VoteCode::Vote,
                    vote,
                }
            }
        }
    }

    /// Produce, persist and remember this node's next vote for `block`.
    pub fn vote_generate(
        &self,
        txn: &mut RwTxn,
        keypair: &KeyPair,
        block: Arc<Block>,
    ) -> Result<Arc<Vote>, StoreError> {
        let mut last_votes = self.last_votes.lock().expect("vote overlay poisoned");
        let previous_sequence = last_votes
            .get(&keypair.public)
            .map(|vote| vote.sequence)
            .or(self
                .store
                .vote_get(txn, &keypair.public)?
                .map(|vote| vote.sequence))
            .unwrap_or(0);
        let vote = Arc::new(Vote::new(
            keypair.public,
            &keypair.private,
            previous_sequence + 1,
            block,
        ));
        self.store.vote_put(txn, &vote)?;
        last_votes.insert(keypair.public, vote.clone());
        Ok(vote)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use raze_crypto::{generate_keypair, sign_message};
    use raze_ledger::{dev_genesis, Block, ChangeBlock, OpenBlock, ReceiveBlock, SendBlock};
    use raze_types::Signature;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: Arc<Store>,
        ledger: Ledger,
        genesis: KeyPair,
        genesis_block: Arc<Block>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path(), 32).unwrap());
        let (genesis, genesis_block) = dev_genesis();
        let ledger = Ledger::new(Arc::clone(&store), Amount::ZERO, genesis.public);
        let mut txn = store.tx_begin_write().unwrap();
        ledger.initialize(&mut txn, &genesis_block).unwrap();
        txn.commit().unwrap();
        Fixture {
            _dir: dir,
            store,
            ledger,
            genesis,
            genesis_block,
        }
    }

    fn signed_send(
        previous: BlockHash,
        destination: Account,
        balance: Amount,
        key: &KeyPair,
    ) -> Arc<Block> {
        let mut block = Block::Send(SendBlock {
            previous,
            destination,
            balance,
            signature: Signature::ZERO,
            work: 0,
        });
        let hash = block.hash();
        block.set_signature(sign_message(&key.private, hash.as_bytes()));
        Arc::new(block)
    }

    fn signed_open(source: BlockHash, representative: Account, key: &KeyPair) -> Arc<Block> {
        let mut block = Block::Open(OpenBlock {
            source,
            representative,
            account: key.public,
            signature: Signature::ZERO,
            work: 0,
        });
        let hash = block.hash();
        block.set_signature(sign_message(&key.private, hash.as_bytes()));
        Arc::new(block)
    }

    fn signed_receive(previous: BlockHash, source: BlockHash, key: &KeyPair) -> Arc<Block> {
        let mut block = Block::Receive(ReceiveBlock {
            previous,
            source,
            signature: Signature::ZERO,
            work: 0,
        });
        let hash = block.hash();
        block.set_signature(sign_message(&key.private, hash.as_bytes()));
        Arc::new(block)
    }

    #[test]
    fn genesis_initialization() {
        let fx = fixture();
        let txn = fx.store.tx_begin_read().unwrap();
        assert_eq!(
            fx.ledger.latest(&txn, &fx.genesis.public).unwrap(),
            fx.genesis_block.hash()
        );
        assert_eq!(
            fx.ledger.account_balance(&txn, &fx.genesis.public).unwrap(),
            Amount::new(GENESIS_AMOUNT)
        );
        assert_eq!(
            fx.ledger.weight(&txn, &fx.genesis.public).unwrap(),
            Amount::new(GENESIS_AMOUNT)
        );
    }

    #[test]
    fn send_progresses_and_creates_pending() {
        let fx = fixture();
        let destination = generate_keypair();
        let send = signed_send(
            fx.genesis_block.hash(),
            destination.public,
            Amount::new(GENESIS_AMOUNT - 100),
            &fx.genesis,
        );

        let mut txn = fx.store.tx_begin_write().unwrap();
        let result = fx.ledger.process(&mut txn, &send).unwrap();
        assert_eq!(result.code, ProcessResult::Progress);
        assert_eq!(result.account, fx.genesis.public);
        assert_eq!(result.amount, Amount::new(100));
        assert_eq!(result.pending_account, destination.public);

        let pending = fx
            .store
            .pending_get(&txn, &PendingKey::new(destination.public, send.hash()))
            .unwrap()
            .unwrap();
        assert_eq!(pending.amount, Amount::new(100));
        // Sender's representative weight shrank by the sent amount.
        assert_eq!(
            fx.ledger.weight(&txn, &fx.genesis.public).unwrap(),
            Amount::new(GENESIS_AMOUNT - 100)
        );
        txn.commit().unwrap();
    }

    #[test]
    fn duplicate_block_is_old() {
        let fx = fixture();
        let destination = generate_keypair();
        let send = signed_send(
            fx.genesis_block.hash(),
            destination.public,
            Amount::new(GENESIS_AMOUNT - 1),
            &fx.genesis,
        );
        let mut txn = fx.store.tx_begin_write().unwrap();
        assert_eq!(
            fx.ledger.process(&mut txn, &send).unwrap().code,
            ProcessResult::Progress
        );
        assert_eq!(
            fx.ledger.process(&mut txn, &send).unwrap().code,
            ProcessResult::Old
        );
    }

    #[test]
    fn unknown_previous_is_gap() {
        let fx = fixture();
        let destination = generate_keypair();
        let send = signed_send(
            BlockHash::new([0x77; 32]),
            destination.public,
            Amount::new(1),
            &fx.genesis,
        );
        let mut txn = fx.store.tx_begin_write().unwrap();
        assert_eq!(
            fx.ledger.process(&mut txn, &send).unwrap().code,
            ProcessResult::GapPrevious
        );
    }

    #[test]
    fn stale_previous_is_fork() {
        let fx = fixture();
        let a = generate_keypair();
        let b = generate_keypair();
        let send1 = signed_send(
            fx.genesis_block.hash(),
            a.public,
            Amount::new(GENESIS_AMOUNT - 10),
            &fx.genesis,
        );
        let send2 = signed_send(
            fx.genesis_block.hash(),
            b.public,
            Amount::new(GENESIS_AMOUNT - 20),
            &fx.genesis,
        );
        let mut txn = fx.store.tx_begin_write().unwrap();
        assert_eq!(
            fx.ledger.process(&mut txn, &send1).unwrap().code,
            ProcessResult::Progress
        );
        assert_eq!(
            fx.ledger.process(&mut txn, &send2).unwrap().code,
            ProcessResult::Fork
        );
    }

    #[test]
    fn forged_signature_rejected() {
        let fx = fixture();
        let thief = generate_keypair();
        let send = signed_send(
            fx.genesis_block.hash(),
            thief.public,
            Amount::new(GENESIS_AMOUNT - 5),
            &thief,
        );
        let mut txn = fx.store.tx_begin_write().unwrap();
        assert_eq!(
            fx.ledger.process(&mut txn, &send).unwrap().code,
            ProcessResult::BadSignature
        );
    }

    #[test]
    fn open_and_receive_full_cycle() {
        let fx = fixture();
        let recipient = generate_keypair();
        let rep = generate_keypair();

        let send1 = signed_send(
            fx.genesis_block.hash(),
            recipient.public,
            Amount::new(GENESIS_AMOUNT - 40),
            &fx.genesis,
        );
        let send2 = signed_send(
            send1.hash(),
            recipient.public,
            Amount::new(GENESIS_AMOUNT - 100),
            &fx.genesis,
        );
        let open = signed_open(send1.hash(), rep.public, &recipient);
        let receive = signed_receive(open.hash(), send2.hash(), &recipient);

        let mut txn = fx.store.tx_begin_write().unwrap();
        for block in [&send1, &send2, &open, &receive] {
            assert_eq!(
                fx.ledger.process(&mut txn, block).unwrap().code,
                ProcessResult::Progress
            );
        }
        assert_eq!(
            fx.ledger.account_balance(&txn, &recipient.public).unwrap(),
            Amount::new(100)
        );
        // Recipient delegates to `rep`.
        assert_eq!(fx.ledger.weight(&txn, &rep.public).unwrap(), Amount::new(100));
        assert_eq!(
            fx.ledger.weight(&txn, &fx.genesis.public).unwrap(),
            Amount::new(GENESIS_AMOUNT - 100)
        );
        txn.commit().unwrap();
    }

    #[test]
    fn receive_before_send_arrives_is_gap_source() {
        let fx = fixture();
        let recipient = generate_keypair();
        let open = signed_open(BlockHash::new([0x55; 32]), recipient.public, &recipient);
        let mut txn = fx.store.tx_begin_write().unwrap();
        assert_eq!(
            fx.ledger.process(&mut txn, &open).unwrap().code,
            ProcessResult::GapSource
        );
    }

    #[test]
    fn double_receive_is_unreceivable() {
        let fx = fixture();
        let recipient = generate_keypair();
        let send = signed_send(
            fx.genesis_block.hash(),
            recipient.public,
            Amount::new(GENESIS_AMOUNT - 7),
            &fx.genesis,
        );
        let open = signed_open(send.hash(), recipient.public, &recipient);
        let receive_again = signed_receive(open.hash(), send.hash(), &recipient);

        let mut txn = fx.store.tx_begin_write().unwrap();
        assert_eq!(
            fx.ledger.process(&mut txn, &send).unwrap().code,
            ProcessResult::Progress
        );
        assert_eq!(
            fx.ledger.process(&mut txn, &open).unwrap().code,
            ProcessResult::Progress
        );
        assert_eq!(
            fx.ledger.process(&mut txn, &receive_again).unwrap().code,
            ProcessResult::Unreceivable
        );
    }

    #[test]
    fn send_to_third_party_cannot_be_opened_by_another() {
        let fx = fixture();
        let intended = generate_keypair();
        let thief = generate_keypair();
        let send = signed_send(
            fx.genesis_block.hash(),
            intended.public,
            Amount::new(GENESIS_AMOUNT - 7),
            &fx.genesis,
        );
        let steal = signed_open(send.hash(), thief.public, &thief);
        let mut txn = fx.store.tx_begin_write().unwrap();
        assert_eq!(
            fx.ledger.process(&mut txn, &send).unwrap().code,
            ProcessResult::Progress
        );
        assert_eq!(
            fx.ledger.process(&mut txn, &steal).unwrap().code,
            ProcessResult::AccountMismatch
        );
    }

    #[test]
    fn burn_account_cannot_open() {
        let fx = fixture();
        let mut block = Block::Open(OpenBlock {
            source: fx.genesis_block.hash(),
            representative: Account::ZERO,
            account: Account::ZERO,
            signature: Signature([1; 64]),
            work: 0,
        });
        block.set_work(0);
        let mut txn = fx.store.tx_begin_write().unwrap();
        assert_eq!(
            fx.ledger.process(&mut txn, &Arc::new(block)).unwrap().code,
            ProcessResult::OpenedBurnAccount
        );
    }

    #[test]
    fn change_moves_weight() {
        let fx = fixture();
        let rep = generate_keypair();
        let mut change = Block::Change(ChangeBlock {
            previous: fx.genesis_block.hash(),
            representative: rep.public,
            signature: Signature::ZERO,
            work: 0,
        });
        let hash = change.hash();
        change.set_signature(sign_message(&fx.genesis.private, hash.as_bytes()));

        let mut txn = fx.store.tx_begin_write().unwrap();
        assert_eq!(
            fx.ledger.process(&mut txn, &Arc::new(change)).unwrap().code,
            ProcessResult::Progress
        );
        assert_eq!(
            fx.ledger.weight(&txn, &rep.public).unwrap(),
            Amount::new(GENESIS_AMOUNT)
        );
        assert_eq!(fx.ledger.weight(&txn, &fx.genesis.public).unwrap(), Amount::ZERO);
    }

    #[test]
    fn rollback_restores_send() {
        let fx = fixture();
        let destination = generate_keypair();
        let send = signed_send(
            fx.genesis_block.hash(),
            destination.public,
            Amount::new(GENESIS_AMOUNT - 55),
            &fx.genesis,
        );
        let mut txn = fx.store.tx_begin_write().unwrap();
        fx.ledger.process(&mut txn, &send).unwrap();
        fx.ledger.rollback(&mut txn, send.hash()).unwrap();

        assert!(!fx.store.block_exists(&txn, &send.hash()).unwrap());
        assert_eq!(
            fx.ledger.latest(&txn, &fx.genesis.public).unwrap(),
            fx.genesis_block.hash()
        );
        assert_eq!(
            fx.ledger.account_balance(&txn, &fx.genesis.public).unwrap(),
            Amount::new(GENESIS_AMOUNT)
        );
        assert!(fx
            .store
            .pending_get(&txn, &PendingKey::new(destination.public, send.hash()))
            .unwrap()
            .is_none());
        assert_eq!(
            fx.ledger.weight(&txn, &fx.genesis.public).unwrap(),
            Amount::new(GENESIS_AMOUNT)
        );
    }

    #[test]
    fn rollback_cascades_into_receiving_chain() {
        let fx = fixture();
        let recipient = generate_keypair();
        let send = signed_send(
            fx.genesis_block.hash(),
            recipient.public,
            Amount::new(GENESIS_AMOUNT - 90),
            &fx.genesis,
        );
        let open = signed_open(send.hash(), recipient.public, &recipient);

        let mut txn = fx.store.tx_begin_write().unwrap();
        fx.ledger.process(&mut txn, &send).unwrap();
        fx.ledger.process(&mut txn, &open).unwrap();

        fx.ledger.rollback(&mut txn, send.hash()).unwrap();
        // The receiver's open block is gone too.
        assert!(!fx.store.block_exists(&txn, &open.hash()).unwrap());
        assert!(fx.store.account_get(&txn, &recipient.public).unwrap().is_none());
        assert_eq!(
            fx.ledger.account_balance(&txn, &fx.genesis.public).unwrap(),
            Amount::new(GENESIS_AMOUNT)
        );
    }

    #[test]
    fn successor_tracks_root_occupancy() {
        let fx = fixture();
        let destination = generate_keypair();
        let send = signed_send(
            fx.genesis_block.hash(),
            destination.public,
            Amount::new(GENESIS_AMOUNT - 3),
            &fx.genesis,
        );
        let mut txn = fx.store.tx_begin_write().unwrap();
        assert!(fx
            .ledger
            .successor(&txn, &fx.genesis_block.hash())
            .unwrap()
            .is_none());
        fx.ledger.process(&mut txn, &send).unwrap();
        let successor = fx
            .ledger
            .successor(&txn, &fx.genesis_block.hash())
            .unwrap()
            .unwrap();
        assert_eq!(successor.hash(), send.hash());
        // An account root resolves to its open block.
        let genesis_root: BlockHash = fx.genesis.public.into();
        let open = fx.ledger.successor(&txn, &genesis_root).unwrap().unwrap();
        assert_eq!(open.hash(), fx.genesis_block.hash());
    }

    #[test]
    fn tally_orders_by_weight() {
        let fx = fixture();
        let rep_small = generate_keypair();
        // Give rep_small a small delegated weight.
        let send = signed_send(
            fx.genesis_block.hash(),
            rep_small.public,
            Amount::new(GENESIS_AMOUNT - 500),
            &fx.genesis,
        );
        let open = signed_open(send.hash(), rep_small.public, &rep_small);
        let mut txn = fx.store.tx_begin_write().unwrap();
        fx.ledger.process(&mut txn, &send).unwrap();
        fx.ledger.process(&mut txn, &open).unwrap();
        txn.commit().unwrap();

        let block_a = signed_send(
            open.hash(),
            fx.genesis.public,
            Amount::new(400),
            &rep_small,
        );
        let block_b = signed_send(
            open.hash(),
            fx.genesis.public,
            Amount::new(300),
            &rep_small,
        );

        let mut votes: HashMap<Account, Arc<Vote>> = HashMap::new();
        votes.insert(
            fx.genesis.public,
            Arc::new(Vote::new(fx.genesis.public, &fx.genesis.private, 1, block_a.clone())),
        );
        votes.insert(
            rep_small.public,
            Arc::new(Vote::new(rep_small.public, &rep_small.private, 1, block_b)),
        );

        let txn = fx.store.tx_begin_read().unwrap();
        let tally = fx.ledger.tally(&txn, &votes).unwrap();
        assert_eq!(tally.len(), 2);
        assert_eq!(tally[0].1.hash(), block_a.hash());
        assert!(tally[0].0 > tally[1].0);
    }

    #[test]
    fn vote_validate_sequences() {
        let fx = fixture();
        let rep = generate_keypair();
        let block = fx.genesis_block.clone();

        let txn = fx.store.tx_begin_read().unwrap();
        let v5 = Arc::new(Vote::new(rep.public, &rep.private, 5, block.clone()));
        let result = fx.ledger.vote_validate(&txn, v5.clone());
        assert_eq!(result.code, VoteCode::Vote);

        let v7 = Arc::new(Vote::new(rep.public, &rep.private, 7, block.clone()));
        assert_eq!(fx.ledger.vote_validate(&txn, v7).code, VoteCode::Vote2);

        let v6 = Arc::new(Vote::new(rep.public, &rep.private, 6, block.clone()));
        let replay = fx.ledger.vote_validate(&txn, v6);
        assert_eq!(replay.code, VoteCode::Replay);
        assert_eq!(replay.vote.sequence, 7);

        let mut forged = Vote::new(rep.public, &rep.private, 9, block);
        forged.sequence = 10;
        assert_eq!(
            fx.ledger.vote_validate(&txn, Arc::new(forged)).code,
            VoteCode::Invalid
        );
    }

    #[test]
    fn vote_generate_bumps_sequence_and_persists() {
        let fx = fixture();
        let mut txn = fx.store.tx_begin_write().unwrap();
        let v1 = fx
            .ledger
            .vote_generate(&mut txn, &fx.genesis, fx.genesis_block.clone())
            .unwrap();
        let v2 = fx
            .ledger
            .vote_generate(&mut txn, &fx.genesis, fx.genesis_block.clone())
            .unwrap();
        assert_eq!(v1.sequence, 1);
        assert_eq!(v2.sequence, 2);
        assert!(v2.validate());
        let stored = fx.store.vote_get(&txn, &fx.genesis.public).unwrap().unwrap();
        assert_eq!(stored.sequence, 2);
        txn.commit().unwrap();
    }
}
