//! Distributed proof-of-work.
//!
//! One request fans out to every configured work peer in parallel over
//! plain HTTP; the first response that validates wins a compare-and-set
//! latch, the losers get a `work_cancel`, and total failure falls back to
//! the local pool. Without configured peers the pool is used directly.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use raze_types::BlockHash;
use raze_work::work_validate;

use crate::node::Node;

/// Per-peer connect/read budget.
const PEER_TIMEOUT: Duration = Duration::from_secs(5);

type WorkCallback = Box<dyn FnOnce(u64) + Send>;

/// One in-flight generation request racing the configured peers.
pub struct DistributedWork {
    node: Weak<Node>,
    root: BlockHash,
    threshold: u64,
    callback: Mutex<Option<WorkCallback>>,
    outstanding: Mutex<HashSet<String>>,
    completed: AtomicBool,
}

impl DistributedWork {
    pub fn new(
        node: Weak<Node>,
        root: BlockHash,
        threshold: u64,
        callback: impl FnOnce(u64) + Send + 'static,
    ) -> Arc<Self> {
        let peers: HashSet<String> = node
            .upgrade()
            .map(|node| node.config.work_peers.iter().cloned().collect())
            .unwrap_or_default();
        Arc::new(Self {
            node,
            root,
            threshold,
            callback: Mutex::new(Some(Box::new(callback))),
            outstanding: Mutex::new(peers),
            completed: AtomicBool::new(false),
        })
    }

    pub fn start(self: &Arc<Self>) {
        let Some(node) = self.node.upgrade() else {
            return;
        };
        let peers: Vec<String> = self
            .outstanding
            .lock()
            .expect("distributed work poisoned")
            .iter()
            .cloned()
            .collect();
        if peers.is_empty() {
            self.local_fallback(&node);
            return;
        }
        for peer in peers {
            let this = Arc::clone(self);
            node.background_async(async move {
                this.attempt(peer).await;
            });
        }
    }

    async fn attempt(self: Arc<Self>, peer: String) {
        let body = serde_json::json!({
            "action": "work_generate",
            "hash": self.root.to_string(),
        })
        .to_string();
        match tokio::time::timeout(PEER_TIMEOUT, http_post(&peer, "/", body)).await {
            Ok(Ok(response)) => match parse_work_response(&response) {
                Some(work) if work_validate(&self.root, work, self.threshold) => {
                    self.success(work, &peer);
                }
                Some(work) => {
                    tracing::warn!(
                        %peer,
                        root = %self.root,
                        work = format!("{work:016X}"),
                        "incorrect work response"
                    );
                    self.failure(&peer);
                }
                None => {
                    tracing::warn!(%peer, "work response wasn't parsable");
                    self.failure(&peer);
                }
            },
            Ok(Err(error)) => {
                tracing::warn!(%peer, %error, "unable to reach work peer");
                self.failure(&peer);
            }
            Err(_) => {
                tracing::warn!(%peer, "work peer timed out");
                self.failure(&peer);
            }
        }
    }

    /// Deliver the result once and cancel the slower peers.
    fn success(&self, work: u64, winner: &str) {
        let remaining: Vec<String> = {
            let mut outstanding = self.outstanding.lock().expect("distributed work poisoned");
            outstanding.remove(winner);
            outstanding.drain().collect()
        };
        if self.set_once(work) {
            if let Some(node) = self.node.upgrade() {
                let root = self.root;
                for peer in remaining {
                    node.background_async(async move {
                        let body = serde_json::json!({
                            "action": "work_cancel",
                            "hash": root.to_string(),
                        })
                        .to_string();
                        let _ =
                            tokio::time::timeout(PEER_TIMEOUT, http_post(&peer, "/", body)).await;
                    });
                }
            }
        }
    }

    /// Drop a failed peer; the last failure falls back to the local pool.
    fn failure(&self, peer: &str) {
        let exhausted = {
            let mut outstanding = self.outstanding.lock().expect("distributed work poisoned");
            outstanding.remove(peer);
            outstanding.is_empty()
        };
        if exhausted {
            if let Some(node) = self.node.upgrade() {
                self.local_fallback(&node);
            }
        }
    }

    fn local_fallback(&self, node: &Arc<Node>) {
        if self.completed.swap(true, Ordering::AcqRel) {
            return;
        }
        let callback = self.callback.lock().expect("distributed work poisoned").take();
        let Some(callback) = callback else {
            return;
        };
        node.work.generate(self.root, self.threshold, move |work| {
            if let Some(work) = work {
                callback(work);
            }
        });
    }

    /// Compare-and-set latch around the caller's callback.
    fn set_once(&self, work: u64) -> bool {
        if self.completed.swap(true, Ordering::AcqRel) {
            return false;
        }
        let callback = self.callback.lock().expect("distributed work poisoned").take();
        if let Some(callback) = callback {
            callback(work);
        }
        true
    }
}

/// Minimal HTTP/1.1 POST with `Connection: close` semantics. Also used by
/// the block-accepted callback.
pub(crate) async fn http_post(peer: &str, target: &str, body: String) -> std::io::Result<String> {
    let mut stream = TcpStream::connect(peer).await?;
    let host = peer.rsplit_once(':').map(|(host, _)| host).unwrap_or(peer);
    let request = format!(
        "POST {target} HTTP/1.1\r\nHost: {host}\r\nContent-Type: application/json\r\n\
         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    stream.write_all(request.as_bytes()).await?;
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await?;
    Ok(String::from_utf8_lossy(&response).into_owned())
}

/// Extract and decode the `work` field from a `200 OK` JSON response.
fn parse_work_response(response: &str) -> Option<u64> {
    let (head, body) = response.split_once("\r\n\r\n")?;
    let status = head.lines().next()?;
    if !status.contains(" 200 ") {
        return None;
    }
    let json: serde_json::Value = serde_json::from_str(body.trim()).ok()?;
    let text = json.get("work")?.as_str()?;
    u64::from_str_radix(text, 16).ok()
}
