//! Node configuration with TOML file support.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use raze_types::amount::{Amount, RAZE_RATIO};
use raze_types::{Account, Network};

use crate::error::NodeError;

/// Configuration for a raze node.
///
/// Can be loaded from a TOML file via [`NodeConfig::from_toml_file`] or
/// built programmatically (e.g. for tests).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Which network to join.
    #[serde(default = "default_network")]
    pub network: Network,

    /// Data directory for the LMDB store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// UDP peering port. Unset means the network's default port; tests bind
    /// port 0 for an OS-assigned one.
    #[serde(default)]
    pub peering_port: Option<u16>,

    /// Divisor numerator for the gap-cache bootstrap threshold
    /// (`supply / 256 * numerator`).
    #[serde(default = "default_bootstrap_fraction_numerator")]
    pub bootstrap_fraction_numerator: u32,

    /// Smallest send the wallet receives automatically.
    #[serde(default = "default_receive_minimum", with = "amount_dec")]
    pub receive_minimum: Amount,

    /// Supply assumed permanently offline, excluded from quorum math.
    #[serde(default = "amount_zero", with = "amount_dec")]
    pub inactive_supply: Amount,

    /// Wallet KDF fanout (pass-through to the wallet subsystem).
    #[serde(default = "default_password_fanout")]
    pub password_fanout: u32,

    /// Worker threads for the shared I/O executor.
    #[serde(default = "default_threads")]
    pub io_threads: usize,

    /// Threads in the local proof-of-work pool.
    #[serde(default = "default_threads")]
    pub work_threads: usize,

    /// Emit signed confirm_acks when this node holds representative keys.
    #[serde(default = "default_true")]
    pub enable_voting: bool,

    /// Seed hostnames contacted with keepalives on startup.
    #[serde(default)]
    pub preconfigured_peers: Vec<String>,

    /// Trusted default representatives (hex accounts), used on an empty
    /// ledger startup.
    #[serde(default = "default_representatives", with = "account_hex_vec")]
    pub preconfigured_representatives: Vec<Account>,

    /// `host:port` HTTP work peers raced for proof-of-work generation.
    #[serde(default)]
    pub work_peers: Vec<String>,

    /// HTTP POST target for block-accepted events; disabled when the
    /// address is empty.
    #[serde(default)]
    pub callback_address: String,
    #[serde(default)]
    pub callback_port: u16,
    #[serde(default)]
    pub callback_target: String,

    /// LMDB named-database capacity hint.
    #[serde(default = "default_lmdb_max_dbs")]
    pub lmdb_max_dbs: u32,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Per-area toggles for high-volume debug logging.
    #[serde(default)]
    pub log_detail: LogDetail,
}

/// Gates on chatty debug lines, independent of the global level filter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogDetail {
    #[serde(default)]
    pub ledger: bool,
    #[serde(default)]
    pub ledger_duplicate: bool,
    #[serde(default)]
    pub vote: bool,
    #[serde(default = "default_true")]
    pub network: bool,
    #[serde(default)]
    pub network_message: bool,
    #[serde(default)]
    pub network_publish: bool,
    #[serde(default)]
    pub network_packet: bool,
    #[serde(default)]
    pub network_keepalive: bool,
    #[serde(default = "default_true")]
    pub insufficient_work: bool,
    #[serde(default = "default_true")]
    pub work_generation_time: bool,
}

impl Default for LogDetail {
    fn default() -> Self {
        Self {
            ledger: false,
            ledger_duplicate: false,
            vote: false,
            network: true,
            network_message: false,
            network_publish: false,
            network_packet: false,
            network_keepalive: false,
            insufficient_work: true,
            work_generation_time: true,
        }
    }
}

// ── Serde default helpers ──────────────────────────────────────────────

fn default_network() -> Network {
    Network::Live
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./raze_data")
}

fn default_bootstrap_fraction_numerator() -> u32 {
    1
}

fn default_receive_minimum() -> Amount {
    Amount::new(RAZE_RATIO)
}

fn amount_zero() -> Amount {
    Amount::ZERO
}

fn default_password_fanout() -> u32 {
    1024
}

fn default_threads() -> usize {
    std::thread::available_parallelism().map_or(4, |n| n.get().max(4))
}

fn default_true() -> bool {
    true
}

fn default_representatives() -> Vec<Account> {
    vec![raze_ledger::dev_genesis().0.public]
}

fn default_lmdb_max_dbs() -> u32 {
    128
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// u128 amounts don't fit TOML integers; encode as decimal strings.
mod amount_dec {
    use super::Amount;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&amount.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let text = String::deserialize(deserializer)?;
        Amount::decode_dec(&text)
            .ok_or_else(|| serde::de::Error::custom(format!("bad amount: {text}")))
    }
}

/// Accounts appear in config files as 64-character hex strings.
mod account_hex_vec {
    use super::Account;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        accounts: &[Account],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(accounts.iter().map(|a| a.to_string()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Account>, D::Error> {
        let texts = Vec::<String>::deserialize(deserializer)?;
        texts
            .into_iter()
            .map(|text| {
                Account::decode_hex(&text)
                    .ok_or_else(|| serde::de::Error::custom(format!("bad account: {text}")))
            })
            .collect()
    }
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        let config: Self = toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("NodeConfig is always serializable to TOML")
    }

    /// The UDP port to bind: explicit, or the network default.
    pub fn port(&self) -> u16 {
        self.peering_port.unwrap_or(self.network.default_port())
    }

    /// A uniformly random preconfigured representative.
    pub fn random_representative(&self) -> Account {
        use rand::seq::SliceRandom;
        *self
            .preconfigured_representatives
            .choose(&mut rand::thread_rng())
            .expect("validated non-empty")
    }

    fn validate(&self) -> Result<(), NodeError> {
        if self.preconfigured_representatives.is_empty() {
            return Err(NodeError::Config(
                "preconfigured_representatives must not be empty".into(),
            ));
        }
        if self.io_threads == 0 || self.work_threads == 0 {
            return Err(NodeError::Config("thread counts must be non-zero".into()));
        }
        if !(16..=1024 * 1024).contains(&self.password_fanout) {
            return Err(NodeError::Config("password_fanout out of range".into()));
        }
        for peer in &self.work_peers {
            if !peer.contains(':') {
                return Err(NodeError::Config(format!("work peer without port: {peer}")));
            }
        }
        Ok(())
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network: default_network(),
            data_dir: default_data_dir(),
            peering_port: None,
            bootstrap_fraction_numerator: default_bootstrap_fraction_numerator(),
            receive_minimum: default_receive_minimum(),
            inactive_supply: Amount::ZERO,
            password_fanout: default_password_fanout(),
            io_threads: default_threads(),
            work_threads: default_threads(),
            enable_voting: true,
            preconfigured_peers: Vec::new(),
            preconfigured_representatives: default_representatives(),
            work_peers: Vec::new(),
            callback_address: String::new(),
            callback_port: 0,
            callback_target: String::new(),
            lmdb_max_dbs: default_lmdb_max_dbs(),
            log_format: default_log_format(),
            log_level: default_log_level(),
            log_detail: LogDetail::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let config = NodeConfig::default();
        let toml_str = config.to_toml_string();
        let parsed = NodeConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.network, config.network);
        assert_eq!(parsed.receive_minimum, config.receive_minimum);
        assert_eq!(
            parsed.preconfigured_representatives,
            config.preconfigured_representatives
        );
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config = NodeConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.network, Network::Live);
        assert_eq!(config.port(), 7075);
        assert_eq!(config.receive_minimum, Amount::new(RAZE_RATIO));
        assert!(config.enable_voting);
        assert!(config.log_detail.network);
        assert!(!config.log_detail.vote);
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            network = "test"
            peering_port = 24000
            receive_minimum = "5"
            enable_voting = false
        "#;
        let config = NodeConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.network, Network::Test);
        assert_eq!(config.port(), 24000);
        assert_eq!(config.receive_minimum, Amount::new(5));
        assert!(!config.enable_voting);
    }

    #[test]
    fn bad_amount_rejected() {
        assert!(NodeConfig::from_toml_str(r#"receive_minimum = "abc""#).is_err());
    }

    #[test]
    fn empty_representatives_rejected() {
        assert!(NodeConfig::from_toml_str("preconfigured_representatives = []").is_err());
    }

    #[test]
    fn work_peer_without_port_rejected() {
        assert!(NodeConfig::from_toml_str(r#"work_peers = ["localhost"]"#).is_err());
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = NodeConfig::from_toml_file("/nonexistent/raze.toml");
        assert!(matches!(result, Err(NodeError::Config(_))));
    }
}
