//! UDP gossip.
//!
//! One socket, one in-flight receive. Datagrams are screened for reserved
//! senders, parsed into typed messages and dispatched tag-by-tag to the
//! peer table and the block/vote processors. Outgoing traffic is
//! fire-and-forget; reliability comes from peer redundancy and periodic
//! republish, not retries.

use std::net::{Ipv6Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::runtime::Handle;

use raze_ledger::{Block, Vote};
use raze_messages::{
    ConfirmAck, ConfirmReq, Keepalive, Message, MessageParser, ParseError, Publish,
};
use raze_types::amount::MRAZE_RATIO;
use raze_types::endpoint::{canonical, reserved_address};
use raze_types::{Endpoint, Network};

use crate::error::NodeError;
use crate::ledger::VoteCode;
use crate::node::Node;
use crate::stats::{bump, DropCounters, MessageStatistics};

/// Sequence distance that triggers a replay-assist reply.
const REPLAY_ASSIST_GAP: u64 = 10_000;

/// Minimum rep weight for vote republishing: `256 · Mraze`.
fn republish_weight_minimum() -> u128 {
    256 * MRAZE_RATIO
}

/// The gossip socket and its counters.
pub struct UdpNetwork {
    node: Weak<Node>,
    socket: Arc<UdpSocket>,
    handle: Handle,
    network: Network,
    parser: MessageParser,
    local_port: u16,
    on: AtomicBool,
    pub incoming: MessageStatistics,
    pub outgoing: MessageStatistics,
    pub drops: DropCounters,
}

impl UdpNetwork {
    /// Bind the peering socket. Failure here refuses node startup; binding
    /// happens before the node composite exists so the error can propagate.
    pub fn bind_socket(port: u16, handle: &Handle) -> Result<(Arc<UdpSocket>, u16), NodeError> {
        let std_socket =
            std::net::UdpSocket::bind(SocketAddr::from((Ipv6Addr::UNSPECIFIED, port)))?;
        std_socket.set_nonblocking(true)?;
        let local_port = std_socket.local_addr()?.port();
        let socket = {
            let _guard = handle.enter();
            UdpSocket::from_std(std_socket)?
        };
        Ok((Arc::new(socket), local_port))
    }

    pub fn new(
        node: Weak<Node>,
        network: Network,
        socket: Arc<UdpSocket>,
        local_port: u16,
        handle: Handle,
    ) -> Self {
        Self {
            node,
            socket,
            handle,
            network,
            parser: MessageParser::new(network, raze_work::publish_threshold(network)),
            local_port,
            on: AtomicBool::new(true),
            incoming: MessageStatistics::default(),
            outgoing: MessageStatistics::default(),
            drops: DropCounters::default(),
        }
    }

    /// The endpoint this node treats as itself.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(Ipv6Addr::LOCALHOST, self.local_port, 0, 0)
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Start the receive loop on the executor.
    pub fn start(&self) {
        let socket = Arc::clone(&self.socket);
        let node_w = Weak::clone(&self.node);
        self.handle.spawn(async move {
            let mut buffer = [0u8; 1024];
            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((size, from)) => {
                        let Some(node) = node_w.upgrade() else {
                            break;
                        };
                        if !node.network.on.load(Ordering::Acquire) {
                            break;
                        }
                        node.network.receive_action(&node, &buffer[..size], from);
                    }
                    Err(error) => {
                        let Some(node) = node_w.upgrade() else {
                            break;
                        };
                        if !node.network.on.load(Ordering::Acquire) {
                            break;
                        }
                        if node.config.log_detail.network {
                            tracing::warn!(%error, "udp receive error");
                        }
                        tokio::time::sleep(Duration::from_secs(5)).await;
                    }
                }
            }
        });
    }

    /// Stop accepting datagrams and nudge the receive loop awake.
    pub fn stop(&self) {
        self.on.store(false, Ordering::Release);
        let socket = Arc::clone(&self.socket);
        let target = SocketAddr::from((Ipv6Addr::LOCALHOST, self.local_port));
        self.handle.spawn(async move {
            let _ = socket.send_to(&[], target).await;
        });
    }

    fn receive_action(&self, node: &Arc<Node>, bytes: &[u8], from: SocketAddr) {
        if node.config.log_detail.network_packet {
            tracing::trace!(%from, len = bytes.len(), "received packet");
        }
        let endpoint = canonical(from);
        if reserved_address(&endpoint, self.network) || endpoint == self.endpoint() {
            if self.on.load(Ordering::Acquire) && node.config.log_detail.network {
                tracing::debug!(sender = %endpoint, "dropping datagram from reserved sender");
            }
            bump(&self.drops.bad_sender);
            return;
        }
        match self.parser.parse(bytes) {
            Ok((header, Message::Keepalive(keepalive))) => {
                if node.config.log_detail.network_keepalive {
                    tracing::debug!(sender = %endpoint, "received keepalive");
                }
                bump(&self.incoming.keepalive);
                node.peers.contacted(endpoint, header.version_using);
                self.merge_peers(node, &keepalive.peers);
            }
            Ok((header, Message::Publish(publish))) => {
                if node.config.log_detail.network_message {
                    tracing::debug!(
                        sender = %endpoint,
                        block = %publish.block.hash(),
                        "received publish"
                    );
                }
                bump(&self.incoming.publish);
                node.peers.contacted(endpoint, header.version_using);
                node.process_active(publish.block);
            }
            Ok((header, Message::ConfirmReq(request))) => {
                if node.config.log_detail.network_message {
                    tracing::debug!(
                        sender = %endpoint,
                        block = %request.block.hash(),
                        "received confirm_req"
                    );
                }
                bump(&self.incoming.confirm_req);
                node.peers.contacted(endpoint, header.version_using);
                node.process_active(request.block.clone());
                let known = node
                    .store
                    .tx_begin_read()
                    .and_then(|txn| node.store.block_exists(&txn, &request.block.hash()))
                    .unwrap_or(false);
                if known {
                    self.confirm_block(node, &request.block, std::slice::from_ref(&endpoint));
                }
            }
            Ok((header, Message::ConfirmAck(ack))) => {
                if node.config.log_detail.network_message {
                    tracing::debug!(
                        sender = %endpoint,
                        block = %ack.vote.block.hash(),
                        sequence = ack.vote.sequence,
                        "received confirm_ack"
                    );
                }
                bump(&self.incoming.confirm_ack);
                node.peers.contacted(endpoint, header.version_using);
                node.process_active(ack.vote.block.clone());
                if let Some(result) = node.vote_processor.vote(ack.vote.clone(), &endpoint) {
                    // Replaying our highest known vote helps reps that lost
                    // their sequence counter. Only for a large gap (network
                    // reordering produces small ones), and only one ack per
                    // incoming ack so there is no amplification.
                    if result.code == VoteCode::Replay
                        && result.vote.sequence.saturating_sub(ack.vote.sequence)
                            > REPLAY_ASSIST_GAP
                    {
                        self.confirm_send(&result.vote, &endpoint);
                    }
                }
            }
            Err(ParseError::InsufficientWork) => {
                if node.config.log_detail.insufficient_work {
                    tracing::debug!(sender = %endpoint, "insufficient work in message");
                }
                bump(&self.drops.insufficient_work);
            }
            Err(error) => {
                if node.config.log_detail.network {
                    tracing::debug!(sender = %endpoint, %error, "undeliverable datagram");
                }
                bump(&self.drops.error);
            }
        }
    }

    /// Send keepalives to peers we were just told about but don't know yet.
    fn merge_peers(&self, node: &Arc<Node>, peers: &[Endpoint; 8]) {
        for endpoint in peers {
            if !node.peers.reachout(endpoint) {
                self.send_keepalive(*endpoint);
            }
        }
    }

    fn send_buffer(&self, bytes: Vec<u8>, endpoint: Endpoint) {
        let socket = Arc::clone(&self.socket);
        let node_w = Weak::clone(&self.node);
        self.handle.spawn(async move {
            if let Err(error) = socket.send_to(&bytes, SocketAddr::V6(endpoint)).await {
                if let Some(node) = node_w.upgrade() {
                    if node.config.log_detail.network {
                        tracing::debug!(target = %endpoint, %error, "udp send failed");
                    }
                }
            }
        });
    }

    pub fn send_keepalive(&self, endpoint: Endpoint) {
        let Some(node) = self.node.upgrade() else {
            return;
        };
        let mut message = Keepalive::default();
        node.peers.random_fill(&mut message.peers);
        if node.config.log_detail.network_keepalive {
            tracing::debug!(target = %endpoint, "sending keepalive");
        }
        bump(&self.outgoing.keepalive);
        self.send_buffer(message.serialize(self.network), endpoint);
    }

    pub fn send_confirm_req(&self, endpoint: Endpoint, block: &Arc<Block>) {
        let Some(node) = self.node.upgrade() else {
            return;
        };
        if node.config.log_detail.network_message {
            tracing::debug!(target = %endpoint, block = %block.hash(), "sending confirm_req");
        }
        bump(&self.outgoing.confirm_req);
        self.send_buffer(
            ConfirmReq {
                block: block.clone(),
            }
            .serialize(self.network),
            endpoint,
        );
    }

    /// Ask every known representative for its vote on `block`.
    pub fn broadcast_confirm_req(&self, block: &Arc<Block>) {
        let Some(node) = self.node.upgrade() else {
            return;
        };
        let representatives = node.peers.representatives(usize::MAX);
        for rep in &representatives {
            self.send_confirm_req(rep.endpoint, block);
        }
        if node.config.log_detail.network {
            tracing::debug!(
                count = representatives.len(),
                block = %block.hash(),
                "broadcast confirm_req to representatives"
            );
        }
    }

    /// Send one signed vote to one peer.
    pub fn confirm_send(&self, vote: &Arc<Vote>, endpoint: &Endpoint) {
        let Some(node) = self.node.upgrade() else {
            return;
        };
        if node.config.log_detail.network_publish {
            tracing::debug!(
                target = %endpoint,
                block = %vote.block.hash(),
                sequence = vote.sequence,
                "sending confirm_ack"
            );
        }
        bump(&self.outgoing.confirm_ack);
        self.send_buffer(ConfirmAck { vote: vote.clone() }.serialize(self.network), *endpoint);
    }

    /// Flood a block to `2·ceil(sqrt(peers))` random peers. A voting node
    /// broadcasts signed confirm_acks instead of a bare publish.
    pub fn republish_block(&self, block: &Arc<Block>) {
        let Some(node) = self.node.upgrade() else {
            return;
        };
        let list = node.peers.list_sqrt();
        if self.confirm_block(&node, block, &list) {
            if node.config.log_detail.network {
                tracing::debug!(block = %block.hash(), "block was confirmed to peers");
            }
        } else {
            let bytes = Publish {
                block: block.clone(),
            }
            .serialize(self.network);
            for endpoint in &list {
                if node.config.log_detail.network_publish {
                    tracing::debug!(target = %endpoint, block = %block.hash(), "publishing block");
                }
                bump(&self.outgoing.publish);
                self.send_buffer(bytes.clone(), *endpoint);
            }
            if node.config.log_detail.network {
                tracing::debug!(block = %block.hash(), "block was republished to peers");
            }
        }
    }

    /// Emit freshly signed confirm_acks for `block` from every wallet key
    /// that carries weight. Returns `false` when this node cannot vote.
    pub fn confirm_block(&self, node: &Arc<Node>, block: &Arc<Block>, targets: &[Endpoint]) -> bool {
        if !node.config.enable_voting {
            return false;
        }
        let representatives = {
            let Ok(txn) = node.store.tx_begin_read() else {
                return false;
            };
            node.wallets.representatives(&txn, &node.ledger)
        };
        if representatives.is_empty() {
            return false;
        }
        let Ok(mut txn) = node.store.tx_begin_write() else {
            return false;
        };
        for keypair in &representatives {
            let vote = match node.ledger.vote_generate(&mut txn, keypair, block.clone()) {
                Ok(vote) => vote,
                Err(error) => {
                    tracing::error!(%error, "vote generation failed");
                    continue;
                }
            };
            let bytes = ConfirmAck { vote }.serialize(self.network);
            for target in targets {
                bump(&self.outgoing.confirm_ack);
                self.send_buffer(bytes.clone(), *target);
            }
        }
        if let Err(error) = txn.commit() {
            tracing::error!(%error, "vote sequence commit failed");
        }
        true
    }

    /// Rate-limited fan-out of somebody else's vote. All three gates must
    /// hold: the election republished nothing for a second, the rep carries
    /// real weight, and the vote was not a replay (callers only pass
    /// validated fresh votes).
    pub fn republish_vote(&self, last_republish: Instant, vote: &Arc<Vote>) {
        if last_republish >= Instant::now() - Duration::from_secs(1) {
            return;
        }
        let Some(node) = self.node.upgrade() else {
            return;
        };
        let weight = node
            .store
            .tx_begin_read()
            .and_then(|txn| node.ledger.weight(&txn, &vote.account))
            .unwrap_or_default();
        if weight.raw() > republish_weight_minimum() {
            let bytes = ConfirmAck { vote: vote.clone() }.serialize(self.network);
            for endpoint in node.peers.list_sqrt() {
                bump(&self.outgoing.confirm_ack);
                self.send_buffer(bytes.clone(), endpoint);
            }
        }
    }
}
