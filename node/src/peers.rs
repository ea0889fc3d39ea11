//! Peer table.
//!
//! Tracks every endpoint heard from over gossip, with the contact, attempt
//! and representative-probe timestamps the periodic loops key on. One mutex
//! covers peers and keepalive-attempt tracking; the secondary orderings the
//! original container indexed are computed on demand, the table stays small
//! enough for that.

use std::collections::{HashMap, HashSet};
use std::net::Ipv6Addr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rand::Rng;

use raze_types::endpoint::reserved_address;
use raze_types::{Amount, Endpoint, Network};

/// Peers silent for longer than this are purged.
pub const PEER_CUTOFF: Duration = Duration::from_secs(5 * 60);

/// Oldest protocol version asked for bootstrap service.
const BOOTSTRAP_VERSION_MIN: u8 = 5;

/// Everything known about one peer.
#[derive(Clone, Debug)]
pub struct PeerInfo {
    pub endpoint: Endpoint,
    pub last_contact: Instant,
    pub last_attempt: Instant,
    pub last_bootstrap_attempt: Option<Instant>,
    pub last_rep_request: Option<Instant>,
    pub last_rep_response: Option<Instant>,
    pub rep_weight: Amount,
    pub network_version: u8,
}

impl PeerInfo {
    fn new(endpoint: Endpoint, network_version: u8) -> Self {
        let now = Instant::now();
        Self {
            endpoint,
            last_contact: now,
            last_attempt: now,
            last_bootstrap_attempt: None,
            last_rep_request: None,
            last_rep_response: None,
            rep_weight: Amount::ZERO,
            network_version,
        }
    }
}

struct PeerState {
    peers: HashMap<Endpoint, PeerInfo>,
    /// Keepalive reachout attempts; expire with the peer cutoff.
    attempts: HashMap<Endpoint, Instant>,
}

type EndpointObserver = Box<dyn Fn(&Endpoint) + Send + Sync>;
type DisconnectObserver = Box<dyn Fn() + Send + Sync>;

/// The gossip peer table.
pub struct PeerContainer {
    state: Mutex<PeerState>,
    self_endpoint: Endpoint,
    network: Network,
    peer_observer: EndpointObserver,
    disconnect_observer: DisconnectObserver,
}

impl PeerContainer {
    pub fn new(
        self_endpoint: Endpoint,
        network: Network,
        peer_observer: EndpointObserver,
        disconnect_observer: DisconnectObserver,
    ) -> Self {
        Self {
            state: Mutex::new(PeerState {
                peers: HashMap::new(),
                attempts: HashMap::new(),
            }),
            self_endpoint,
            network,
            peer_observer,
            disconnect_observer,
        }
    }

    /// Addresses we refuse to track: unspecified, reserved ranges, self.
    pub fn not_a_peer(&self, endpoint: &Endpoint) -> bool {
        if endpoint.ip().is_unspecified() || endpoint.port() == 0 {
            return true;
        }
        if reserved_address(endpoint, self.network) {
            return true;
        }
        *endpoint == self.self_endpoint
    }

    /// Track `endpoint`, bumping `last_contact` when already known. Returns
    /// `true` when nothing new was learned; a genuinely new peer fires the
    /// endpoint observer.
    pub fn insert(&self, endpoint: Endpoint, version: u8) -> bool {
        if self.not_a_peer(&endpoint) {
            return true;
        }
        let known = {
            let mut state = self.state.lock().expect("peers poisoned");
            match state.peers.get_mut(&endpoint) {
                Some(info) => {
                    info.last_contact = Instant::now();
                    true
                }
                None => {
                    state.peers.insert(endpoint, PeerInfo::new(endpoint, version));
                    false
                }
            }
        };
        if !known {
            (self.peer_observer)(&endpoint);
        }
        known
    }

    /// Idempotent upsert invoked on every received message.
    pub fn contacted(&self, endpoint: Endpoint, version: u8) {
        self.insert(endpoint, version);
    }

    pub fn known_peer(&self, endpoint: &Endpoint) -> bool {
        self.state.lock().expect("peers poisoned").peers.contains_key(endpoint)
    }

    /// Whether we should *not* initiate contact: invalid target, already a
    /// peer, or a reachout was already attempted recently. A `false` return
    /// records the new attempt.
    pub fn reachout(&self, endpoint: &Endpoint) -> bool {
        let mut result = self.not_a_peer(endpoint);
        result |= self.known_peer(endpoint);
        let mut state = self.state.lock().expect("peers poisoned");
        result |= state.attempts.contains_key(endpoint);
        state.attempts.insert(*endpoint, Instant::now());
        result
    }

    /// Evict peers not heard from since `cutoff` and return them; attempts
    /// age out on the same cutoff. An empty table afterwards fires the
    /// disconnect observer.
    pub fn purge_list(&self, cutoff: Instant) -> Vec<PeerInfo> {
        let (purged, now_empty) = {
            let mut state = self.state.lock().expect("peers poisoned");
            let stale: Vec<Endpoint> = state
                .peers
                .values()
                .filter(|info| info.last_contact < cutoff)
                .map(|info| info.endpoint)
                .collect();
            let mut purged = Vec::with_capacity(stale.len());
            for endpoint in stale {
                if let Some(info) = state.peers.remove(&endpoint) {
                    purged.push(info);
                }
            }
            for info in state.peers.values_mut() {
                info.last_attempt = Instant::now();
            }
            state.attempts.retain(|_, attempted| *attempted >= cutoff);
            (purged, state.peers.is_empty())
        };
        if now_empty {
            (self.disconnect_observer)();
        }
        purged
    }

    /// Sample up to `count` distinct peers uniformly; fall back to filling
    /// with the most recently contacted.
    pub fn random_set(&self, count: usize) -> Vec<Endpoint> {
        let state = self.state.lock().expect("peers poisoned");
        let all: Vec<&PeerInfo> = state.peers.values().collect();
        let mut result: HashSet<Endpoint> = HashSet::with_capacity(count);
        if !all.is_empty() {
            let mut rng = rand::thread_rng();
            // Random sampling with a bounded number of draws, then fill the
            // remainder deterministically.
            for _ in 0..count * 2 {
                if result.len() >= count {
                    break;
                }
                result.insert(all[rng.gen_range(0..all.len())].endpoint);
            }
        }
        if result.len() < count {
            let mut by_contact: Vec<&&PeerInfo> = all.iter().collect();
            by_contact.sort_by(|a, b| b.last_contact.cmp(&a.last_contact));
            for info in by_contact {
                if result.len() >= count {
                    break;
                }
                result.insert(info.endpoint);
            }
        }
        result.into_iter().collect()
    }

    /// Fill a keepalive peer array, padding unused slots with the
    /// unspecified endpoint.
    pub fn random_fill(&self, target: &mut [Endpoint; 8]) {
        let sample = self.random_set(target.len());
        target.fill(Endpoint::new(Ipv6Addr::UNSPECIFIED, 0, 0, 0));
        for (slot, endpoint) in target.iter_mut().zip(sample) {
            *slot = endpoint;
        }
    }

    /// `2 * ceil(sqrt(n))` random peers, enough to saturate the gossip graph
    /// with high probability given each recipient re-fans.
    pub fn list_sqrt(&self) -> Vec<Endpoint> {
        self.random_set(2 * self.size_sqrt())
    }

    /// Every peer, shuffled.
    pub fn list(&self) -> Vec<Endpoint> {
        let state = self.state.lock().expect("peers poisoned");
        let mut result: Vec<Endpoint> = state.peers.keys().copied().collect();
        result.shuffle(&mut rand::thread_rng());
        result
    }

    pub fn size(&self) -> usize {
        self.state.lock().expect("peers poisoned").peers.len()
    }

    pub fn size_sqrt(&self) -> usize {
        (self.size() as f64).sqrt().ceil() as usize
    }

    pub fn empty(&self) -> bool {
        self.size() == 0
    }

    /// Up to `count` known representatives, heaviest first.
    pub fn representatives(&self, count: usize) -> Vec<PeerInfo> {
        let state = self.state.lock().expect("peers poisoned");
        let mut reps: Vec<PeerInfo> = state
            .peers
            .values()
            .filter(|info| !info.rep_weight.is_zero())
            .cloned()
            .collect();
        reps.sort_by(|a, b| b.rep_weight.cmp(&a.rep_weight));
        reps.truncate(count);
        reps
    }

    /// Up to eight peers ordered by `last_rep_request` ascending; the ones
    /// we know least about, probed first.
    pub fn rep_crawl(&self) -> Vec<Endpoint> {
        let state = self.state.lock().expect("peers poisoned");
        let mut candidates: Vec<&PeerInfo> = state.peers.values().collect();
        candidates.sort_by_key(|info| info.last_rep_request);
        candidates.into_iter().take(8).map(|info| info.endpoint).collect()
    }

    pub fn rep_request(&self, endpoint: &Endpoint) {
        let mut state = self.state.lock().expect("peers poisoned");
        if let Some(info) = state.peers.get_mut(endpoint) {
            info.last_rep_request = Some(Instant::now());
        }
    }

    /// Record a confirm_ack answering one of our probes. Returns `true`
    /// when the weight increased, i.e. a representative was discovered.
    pub fn rep_response(&self, endpoint: &Endpoint, weight: Amount) -> bool {
        let mut state = self.state.lock().expect("peers poisoned");
        match state.peers.get_mut(endpoint) {
            Some(info) => {
                info.last_rep_response = Some(Instant::now());
                if info.rep_weight < weight {
                    info.rep_weight = weight;
                    true
                } else {
                    false
                }
            }
            None => false,
        }
    }

    /// Least recently tried bootstrap-capable peer, stamping its
    /// `last_bootstrap_attempt`.
    pub fn bootstrap_peer(&self) -> Option<Endpoint> {
        let mut state = self.state.lock().expect("peers poisoned");
        let chosen = state
            .peers
            .values()
            .filter(|info| info.network_version >= BOOTSTRAP_VERSION_MIN)
            .min_by_key(|info| info.last_bootstrap_attempt)
            .map(|info| info.endpoint)?;
        if let Some(info) = state.peers.get_mut(&chosen) {
            info.last_bootstrap_attempt = Some(Instant::now());
        }
        Some(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn endpoint(last: u8, port: u16) -> Endpoint {
        Endpoint::new(Ipv6Addr::new(0x2001, 0x4860, 0, 0, 0, 0, 0, last as u16), port, 0, 0)
    }

    fn container() -> PeerContainer {
        PeerContainer::new(
            endpoint(0xFF, 7075),
            Network::Live,
            Box::new(|_| {}),
            Box::new(|| {}),
        )
    }

    #[test]
    fn insert_fires_observer_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_l = Arc::clone(&hits);
        let peers = PeerContainer::new(
            endpoint(0xFF, 7075),
            Network::Live,
            Box::new(move |_| {
                hits_l.fetch_add(1, Ordering::SeqCst);
            }),
            Box::new(|| {}),
        );
        assert!(!peers.insert(endpoint(1, 7075), 6));
        assert!(peers.insert(endpoint(1, 7075), 6));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(peers.size(), 1);
    }

    #[test]
    fn self_and_reserved_rejected() {
        let peers = container();
        assert!(peers.not_a_peer(&endpoint(0xFF, 7075)));
        let multicast: Endpoint = "[ff02::1]:7075".parse().unwrap();
        assert!(peers.not_a_peer(&multicast));
        assert!(peers.insert(multicast, 6));
        assert_eq!(peers.size(), 0);
    }

    #[test]
    fn reachout_records_attempt() {
        let peers = container();
        let target = endpoint(9, 7075);
        assert!(!peers.reachout(&target));
        assert!(peers.reachout(&target));
    }

    #[test]
    fn purge_evicts_stale_peers() {
        let peers = container();
        peers.insert(endpoint(1, 7075), 6);
        let purged = peers.purge_list(Instant::now() + Duration::from_millis(1));
        assert_eq!(purged.len(), 1);
        assert!(peers.empty());
    }

    #[test]
    fn purge_to_empty_fires_disconnect() {
        let hits = Arc::new(AtomicUsize::new(0));
        let hits_l = Arc::clone(&hits);
        let peers = PeerContainer::new(
            endpoint(0xFF, 7075),
            Network::Live,
            Box::new(|_| {}),
            Box::new(move || {
                hits_l.fetch_add(1, Ordering::SeqCst);
            }),
        );
        peers.insert(endpoint(1, 7075), 6);
        peers.purge_list(Instant::now() + Duration::from_millis(1));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn random_set_returns_distinct_endpoints() {
        let peers = container();
        for i in 1..=10u8 {
            peers.insert(endpoint(i, 7075), 6);
        }
        let sample = peers.random_set(5);
        assert_eq!(sample.len(), 5);
        let unique: HashSet<Endpoint> = sample.into_iter().collect();
        assert_eq!(unique.len(), 5);
    }

    #[test]
    fn random_fill_pads_with_unspecified() {
        let peers = container();
        peers.insert(endpoint(1, 7075), 6);
        let mut target = [Endpoint::new(Ipv6Addr::LOCALHOST, 1, 0, 0); 8];
        peers.random_fill(&mut target);
        assert_eq!(target[0], endpoint(1, 7075));
        for slot in &target[1..] {
            assert!(slot.ip().is_unspecified());
        }
    }

    #[test]
    fn representatives_ordered_by_weight() {
        let peers = container();
        for i in 1..=3u8 {
            peers.insert(endpoint(i, 7075), 6);
        }
        peers.rep_response(&endpoint(1, 7075), Amount::new(10));
        peers.rep_response(&endpoint(2, 7075), Amount::new(30));
        let reps = peers.representatives(10);
        assert_eq!(reps.len(), 2);
        assert_eq!(reps[0].endpoint, endpoint(2, 7075));
        assert_eq!(reps[1].endpoint, endpoint(1, 7075));
    }

    #[test]
    fn rep_response_reports_weight_increase_only() {
        let peers = container();
        peers.insert(endpoint(1, 7075), 6);
        assert!(peers.rep_response(&endpoint(1, 7075), Amount::new(5)));
        assert!(!peers.rep_response(&endpoint(1, 7075), Amount::new(5)));
        assert!(peers.rep_response(&endpoint(1, 7075), Amount::new(6)));
    }

    #[test]
    fn rep_crawl_prefers_unprobed_peers() {
        let peers = container();
        for i in 1..=3u8 {
            peers.insert(endpoint(i, 7075), 6);
        }
        peers.rep_request(&endpoint(1, 7075));
        let crawl = peers.rep_crawl();
        assert_eq!(crawl.len(), 3);
        assert_eq!(crawl[2], endpoint(1, 7075));
    }

    #[test]
    fn bootstrap_peer_requires_minimum_version() {
        let peers = container();
        peers.insert(endpoint(1, 7075), 4);
        assert_eq!(peers.bootstrap_peer(), None);
        peers.insert(endpoint(2, 7075), 6);
        assert_eq!(peers.bootstrap_peer(), Some(endpoint(2, 7075)));
    }
}
