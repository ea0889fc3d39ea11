//! Node assembly.
//!
//! Owns every core subsystem for the process lifetime and wires the
//! observer fan-out between them. Timer callbacks hold only weak references
//! so shutdown is never blocked by pending timers.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tokio::runtime::Handle;

use raze_crypto::{keypair_from_private, sign_message};
use raze_ledger::{dev_genesis, Block, OpenBlock, ReceiveBlock};
use raze_store::{PendingKey, Store};
use raze_types::{Account, Amount, BlockHash, Endpoint, Signature};
use raze_work::WorkPool;

use crate::active_transactions::ActiveTransactions;
use crate::alarm::Alarm;
use crate::arrival::BlockArrival;
use crate::block_processor::{BlockProcessor, BlockProcessorItem};
use crate::bootstrap::BootstrapInitiator;
use crate::config::NodeConfig;
use crate::distributed_work::{http_post, DistributedWork};
use crate::error::NodeError;
use crate::gap_cache::GapCache;
use crate::ledger::{Ledger, ProcessReturn};
use crate::network::UdpNetwork;
use crate::observers::Observers;
use crate::peers::{PeerContainer, PEER_CUTOFF};
use crate::rep_crawler::RepCrawler;
use crate::vote_processor::VoteProcessor;
use crate::wallet::Wallets;

/// Keepalive period and peer-revival rate limit.
const PERIOD: Duration = Duration::from_secs(60);
/// Representative crawl period.
const REP_CRAWL_INTERVAL: Duration = Duration::from_secs(16);
/// Steady-state bootstrap retry interval.
const BOOTSTRAP_INTERVAL: Duration = Duration::from_secs(300);
/// Aggressive bootstrap interval while warming up.
const BOOTSTRAP_WARMUP_INTERVAL: Duration = Duration::from_secs(5);
/// Store fsync interval.
const STORE_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
/// How long a rep-crawler probe hash stays active.
const REP_QUERY_LIFETIME: Duration = Duration::from_secs(5);

/// Build the shared I/O executor sized by the configured `io_threads`.
pub fn build_runtime(config: &NodeConfig) -> std::io::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.io_threads)
        .enable_all()
        .build()
}

/// The composite node.
pub struct Node {
    pub config: NodeConfig,
    pub store: Arc<Store>,
    pub ledger: Ledger,
    pub alarm: Arc<Alarm>,
    pub work: Arc<WorkPool>,
    pub peers: PeerContainer,
    pub network: UdpNetwork,
    pub gap_cache: GapCache,
    pub block_arrival: BlockArrival,
    pub block_processor: BlockProcessor,
    pub active: ActiveTransactions,
    pub vote_processor: VoteProcessor,
    pub rep_crawler: RepCrawler,
    pub wallets: Wallets,
    pub bootstrap: BootstrapInitiator,
    pub observers: Observers,
    handle: Handle,
    warmed_up: AtomicU32,
    processor_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Node {
    /// Construct a stopped node. Store-open and port-bind failures refuse
    /// construction.
    pub fn new(config: NodeConfig, handle: Handle) -> Result<Arc<Self>, NodeError> {
        let store = Arc::new(Store::open(&config.data_dir, config.lmdb_max_dbs)?);
        let (genesis_keypair, genesis_block) = dev_genesis();
        let ledger = Ledger::new(
            Arc::clone(&store),
            config.inactive_supply,
            genesis_keypair.public,
        );
        {
            let mut txn = store.tx_begin_write()?;
            if store.accounts_empty(&txn)? {
                // Store was empty meaning we just created it; seed genesis.
                ledger.initialize(&mut txn, &genesis_block)?;
            }
            txn.commit()?;
        }

        let (socket, local_port) = UdpNetwork::bind_socket(config.port(), &handle)?;
        let alarm = Alarm::new(handle.clone());
        let work = WorkPool::new(config.work_threads);
        let default_representative = config.random_representative();
        let network_id = config.network;

        let node = Arc::new_cyclic(|weak: &Weak<Node>| {
            let endpoint_weak = Weak::clone(weak);
            let disconnect_weak = Weak::clone(weak);
            let peers = PeerContainer::new(
                Endpoint::new(std::net::Ipv6Addr::LOCALHOST, local_port, 0, 0),
                network_id,
                Box::new(move |endpoint| {
                    if let Some(node) = endpoint_weak.upgrade() {
                        node.observers.endpoint(endpoint);
                    }
                }),
                Box::new(move || {
                    if let Some(node) = disconnect_weak.upgrade() {
                        node.observers.disconnect();
                    }
                }),
            );
            Node {
                network: UdpNetwork::new(
                    Weak::clone(weak),
                    network_id,
                    socket,
                    local_port,
                    handle.clone(),
                ),
                gap_cache: GapCache::new(Weak::clone(weak)),
                block_arrival: BlockArrival::default(),
                block_processor: BlockProcessor::new(Weak::clone(weak)),
                active: ActiveTransactions::new(Weak::clone(weak)),
                vote_processor: VoteProcessor::new(Weak::clone(weak)),
                rep_crawler: RepCrawler::default(),
                wallets: Wallets::new(default_representative),
                bootstrap: BootstrapInitiator::new(Weak::clone(weak)),
                observers: Observers::default(),
                config,
                store,
                ledger,
                alarm,
                work,
                peers,
                handle,
                warmed_up: AtomicU32::new(0),
                processor_thread: Mutex::new(None),
            }
        });
        node.wire_observers();
        tracing::info!(
            network = ?node.config.network,
            port = node.network.local_port(),
            "node constructed"
        );
        Ok(node)
    }

    fn wire_observers(self: &Arc<Self>) {
        // Fresh gossip arrivals enter the active-transactions engine.
        let weak = Arc::downgrade(self);
        self.observers.add_blocks(move |block, _account, _amount| {
            let Some(node) = weak.upgrade() else {
                return;
            };
            if node.block_arrival.recent(&block.hash()) {
                node.active.start(block.clone(), Arc::new(|_, _| {}));
            }
        });

        // HTTP callback for accepted gossip blocks.
        let weak = Arc::downgrade(self);
        self.observers.add_blocks(move |block, account, amount| {
            let Some(node) = weak.upgrade() else {
                return;
            };
            if node.config.callback_address.is_empty() || !node.block_arrival.recent(&block.hash())
            {
                return;
            }
            let event = serde_json::json!({
                "account": account.to_string(),
                "hash": block.hash().to_string(),
                "block": block.to_json(),
                "amount": amount.to_string(),
            })
            .to_string();
            let peer = format!(
                "{}:{}",
                node.config.callback_address, node.config.callback_port
            );
            let target = node.config.callback_target.clone();
            let log_network = node.config.log_detail.network;
            node.background_async(async move {
                if let Err(error) = http_post(&peer, &target, event).await {
                    if log_network {
                        tracing::warn!(%peer, %error, "block callback failed");
                    }
                }
            });
        });

        // Newly discovered endpoints get a keepalive and a rep probe.
        let weak = Arc::downgrade(self);
        self.observers.add_endpoint(move |endpoint| {
            let Some(node) = weak.upgrade() else {
                return;
            };
            node.network.send_keepalive(*endpoint);
            node.rep_query(std::slice::from_ref(endpoint));
        });

        // Observed votes feed the elections...
        let weak = Arc::downgrade(self);
        self.observers.add_vote(move |vote, _code, _endpoint| {
            if let Some(node) = weak.upgrade() {
                node.active.vote(vote.clone());
            }
        });

        // ...the gap cache...
        let weak = Arc::downgrade(self);
        self.observers.add_vote(move |vote, _code, _endpoint| {
            if let Some(node) = weak.upgrade() {
                node.gap_cache.vote(vote);
            }
        });

        // ...and representative discovery.
        let weak = Arc::downgrade(self);
        self.observers.add_vote(move |vote, _code, endpoint| {
            let Some(node) = weak.upgrade() else {
                return;
            };
            if node.rep_crawler.exists(&vote.block.hash()) {
                // A valid non-replay vote for a block we probed with; the
                // sender is voting, so it holds this account's keys.
                let weight = node.weight(&vote.account);
                if node.peers.rep_response(endpoint, weight) {
                    tracing::info!(peer = %endpoint, "found a representative");
                }
            }
        });
    }

    /// Start the consumer thread, the receive loop and every periodic task.
    pub fn start(self: &Arc<Self>) -> Result<(), NodeError> {
        let node_l = Arc::clone(self);
        let thread = std::thread::Builder::new()
            .name("block processor".into())
            .spawn(move || node_l.block_processor.process_blocks())?;
        *self.processor_thread.lock().expect("node poisoned") = Some(thread);

        self.network.start();
        self.ongoing_keepalive();
        self.ongoing_rep_crawl();
        self.ongoing_bootstrap();
        self.ongoing_store_flush();
        self.active.announce_votes();
        self.observers.started();
        Ok(())
    }

    /// Stop every subsystem and join the consumer thread.
    pub fn stop(&self) {
        tracing::info!("node stopping");
        self.block_processor.stop();
        let thread = self.processor_thread.lock().expect("node poisoned").take();
        if let Some(thread) = thread {
            let _ = thread.join();
        }
        self.active.stop();
        self.network.stop();
        self.bootstrap.stop();
        self.work.stop();
        self.alarm.stop();
        if let Err(error) = self.store.flush() {
            tracing::warn!(%error, "final store flush failed");
        }
    }

    /// Post a blocking closure to the executor.
    pub fn background(&self, f: impl FnOnce() + Send + 'static) {
        self.handle.spawn_blocking(f);
    }

    /// Post a future to the executor.
    pub fn background_async<F>(&self, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(future);
    }

    /// A block arrived over gossip: remember the arrival, queue it.
    pub fn process_active(&self, block: Arc<Block>) {
        self.block_arrival.add(block.hash());
        self.block_processor.add(BlockProcessorItem::new(block));
    }

    /// Synchronous ledger application outside the processor queue.
    pub fn process(&self, block: &Arc<Block>) -> Result<ProcessReturn, NodeError> {
        let mut txn = self.store.tx_begin_write()?;
        let result = self.ledger.process(&mut txn, block)?;
        txn.commit().map_err(raze_store::StoreError::from)?;
        Ok(result)
    }

    pub fn balance(&self, account: &Account) -> Amount {
        self.store
            .tx_begin_read()
            .and_then(|txn| self.ledger.account_balance(&txn, account))
            .unwrap_or(Amount::ZERO)
    }

    pub fn weight(&self, account: &Account) -> Amount {
        self.store
            .tx_begin_read()
            .and_then(|txn| self.ledger.weight(&txn, account))
            .unwrap_or(Amount::ZERO)
    }

    pub fn latest(&self, account: &Account) -> BlockHash {
        self.store
            .tx_begin_read()
            .and_then(|txn| self.ledger.latest(&txn, account))
            .unwrap_or(BlockHash::ZERO)
    }

    // ── Work ───────────────────────────────────────────────────────────

    /// Race the configured work peers (local pool as fallback) for `root`.
    pub fn generate_work(self: &Arc<Self>, root: BlockHash, callback: impl FnOnce(u64) + Send + 'static) {
        let request = DistributedWork::new(
            Arc::downgrade(self),
            root,
            raze_work::publish_threshold(self.config.network),
            callback,
        );
        request.start();
    }

    /// Synchronous wrapper around [`Node::generate_work`].
    pub fn generate_work_blocking(self: &Arc<Self>, root: BlockHash) -> Option<u64> {
        let (tx, rx) = std::sync::mpsc::channel();
        self.generate_work(root, move |work| {
            let _ = tx.send(work);
        });
        rx.recv().ok()
    }

    // ── Confirmation handling ──────────────────────────────────────────

    /// A send confirmed to one of our wallet accounts triggers an
    /// auto-receive above the configured minimum.
    pub fn process_confirmed(self: &Arc<Self>, block: &Arc<Block>) {
        let Block::Send(send) = &**block else {
            return;
        };
        if !self.wallets.exists(&send.destination) {
            return;
        }
        let pending = self
            .store
            .tx_begin_read()
            .ok()
            .and_then(|txn| {
                self.store
                    .pending_get(&txn, &PendingKey::new(send.destination, block.hash()))
                    .ok()
            })
            .flatten();
        let Some(pending) = pending else {
            if self.config.log_detail.ledger_duplicate {
                tracing::debug!(block = %block.hash(), "block confirmed before timeout");
            }
            return;
        };
        if pending.amount < self.config.receive_minimum {
            tracing::debug!(
                block = %block.hash(),
                amount = %pending.amount,
                "confirmed send below receive minimum"
            );
            return;
        }
        self.receive_confirmed(block.hash(), send.destination);
    }

    /// Build, work and submit the receive (or open) block for a confirmed
    /// send to a wallet account.
    fn receive_confirmed(self: &Arc<Self>, source: BlockHash, destination: Account) {
        let Some(private) = self.wallets.key_for(&destination) else {
            return;
        };
        let keypair = keypair_from_private(private);
        let previous = self.latest(&destination);
        let mut receive = if previous.is_zero() {
            Block::Open(OpenBlock {
                source,
                representative: self.wallets.representative(),
                account: destination,
                signature: Signature::ZERO,
                work: 0,
            })
        } else {
            Block::Receive(ReceiveBlock {
                previous,
                source,
                signature: Signature::ZERO,
                work: 0,
            })
        };
        let hash = receive.hash();
        receive.set_signature(sign_message(&keypair.private, hash.as_bytes()));

        let node_w = Arc::downgrade(self);
        let started = Instant::now();
        let log_timing = self.config.log_detail.work_generation_time;
        self.generate_work(receive.root(), move |work| {
            let Some(node) = node_w.upgrade() else {
                return;
            };
            if log_timing {
                tracing::debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "work generation for receive complete"
                );
            }
            let mut finished = receive;
            finished.set_work(work);
            let finished = Arc::new(finished);
            node.process_active(Arc::clone(&finished));
            node.network.republish_block(&finished);
        });
    }

    // ── Representative probing ─────────────────────────────────────────

    /// Probe `targets` with a confirm_req for a random stored block; votes
    /// seen for that hash within the window identify representatives.
    pub fn rep_query(self: &Arc<Self>, targets: &[Endpoint]) {
        let block = self
            .store
            .tx_begin_read()
            .ok()
            .and_then(|txn| self.store.block_random(&txn).ok())
            .flatten();
        let Some(block) = block.map(Arc::new) else {
            return;
        };
        let hash = block.hash();
        self.rep_crawler.add(hash);
        for endpoint in targets {
            self.peers.rep_request(endpoint);
            self.network.send_confirm_req(*endpoint, &block);
        }
        let node_w = Arc::downgrade(self);
        self.alarm.add(Instant::now() + REP_QUERY_LIFETIME, move || {
            if let Some(node) = node_w.upgrade() {
                node.rep_crawler.remove(&hash);
            }
        });
    }

    // ── Periodic loops ─────────────────────────────────────────────────

    fn keepalive_preconfigured(self: &Arc<Self>) {
        let default_port = self.config.network.default_port();
        for peer in &self.config.preconfigured_peers {
            let host = peer.clone();
            let node_w = Arc::downgrade(self);
            self.background_async(async move {
                let query = if host.contains(':') {
                    host.clone()
                } else {
                    format!("{host}:{default_port}")
                };
                let resolved = tokio::net::lookup_host(&query).await;
                match resolved {
                    Ok(addresses) => {
                        let Some(node) = node_w.upgrade() else {
                            return;
                        };
                        for address in addresses {
                            node.network
                                .send_keepalive(raze_types::endpoint::canonical(address));
                        }
                    }
                    Err(error) => {
                        tracing::warn!(%host, %error, "error resolving preconfigured peer");
                    }
                }
            });
        }
    }

    fn ongoing_keepalive(self: &Arc<Self>) {
        self.keepalive_preconfigured();
        let purged = self.peers.purge_list(Instant::now() - PEER_CUTOFF);
        for info in purged {
            // One revival attempt per purged peer, rate limited by the last
            // attempt we already made.
            if info.last_attempt.elapsed() > PERIOD {
                self.network.send_keepalive(info.endpoint);
            }
        }
        let node_w = Arc::downgrade(self);
        self.alarm.add(Instant::now() + PERIOD, move || {
            if let Some(node) = node_w.upgrade() {
                node.ongoing_keepalive();
            }
        });
    }

    fn ongoing_rep_crawl(self: &Arc<Self>) {
        let targets = self.peers.rep_crawl();
        if !targets.is_empty() {
            self.rep_query(&targets);
        }
        let node_w = Arc::downgrade(self);
        self.alarm.add(Instant::now() + REP_CRAWL_INTERVAL, move || {
            if let Some(node) = node_w.upgrade() {
                node.ongoing_rep_crawl();
            }
        });
    }

    fn ongoing_bootstrap(self: &Arc<Self>) {
        let mut next_wakeup = BOOTSTRAP_INTERVAL;
        if self.warmed_up.load(Ordering::Relaxed) < 3 {
            // Re-attempt bootstrapping more aggressively on startup.
            next_wakeup = BOOTSTRAP_WARMUP_INTERVAL;
            if !self.bootstrap.in_progress() && !self.peers.empty() {
                self.warmed_up.fetch_add(1, Ordering::Relaxed);
            }
        }
        self.bootstrap.bootstrap();
        let node_w = Arc::downgrade(self);
        self.alarm.add(Instant::now() + next_wakeup, move || {
            if let Some(node) = node_w.upgrade() {
                node.ongoing_bootstrap();
            }
        });
    }

    fn ongoing_store_flush(self: &Arc<Self>) {
        if let Err(error) = self.store.flush() {
            tracing::warn!(%error, "periodic store flush failed");
        }
        let node_w = Arc::downgrade(self);
        self.alarm.add(Instant::now() + STORE_FLUSH_INTERVAL, move || {
            if let Some(node) = node_w.upgrade() {
                node.ongoing_store_flush();
            }
        });
    }
}
