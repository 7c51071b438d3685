//! Configuration types for the cluster master
//!
//! The cluster configuration is static: slaves, chain topology and root chain
//! parameters are read once at startup and never mutated afterwards.

use crate::domain::{Branch, ChainMask, FullShardId, MasterError, SlaveInfo};
use crate::domain::{DEFAULT_HEARTBEAT_INTERVAL_SECS, DEFAULT_RPC_TIMEOUT_MS};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// File path
        path: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid JSON for this schema.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// Config parsed but violates a rule.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for MasterError {
    fn from(err: ConfigError) -> Self {
        MasterError::Config(err.to_string())
    }
}

/// Complete cluster configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Slaves in the cluster, in pool order.
    pub slaves: Vec<SlaveConfig>,
    /// Shard topology.
    pub topology: TopologyConfig,
    /// Root chain settings.
    pub root: RootConfig,
    /// Master runtime settings.
    pub master: MasterConfig,
}

impl Default for ClusterConfig {
    /// Two slaves serving two chains of two shards each.
    fn default() -> Self {
        Self {
            slaves: vec![
                SlaveConfig {
                    id: "S0".to_string(),
                    ip: "127.0.0.1".to_string(),
                    port: 38000,
                    chain_mask_list: vec![ChainMask(0b10)],
                },
                SlaveConfig {
                    id: "S1".to_string(),
                    ip: "127.0.0.1".to_string(),
                    port: 38001,
                    chain_mask_list: vec![ChainMask(0b11)],
                },
            ],
            topology: TopologyConfig {
                chains: vec![ChainConfig::new(0, 2), ChainConfig::new(1, 2)],
            },
            root: RootConfig::default(),
            master: MasterConfig::default(),
        }
    }
}

impl ClusterConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Parse configuration from a JSON string.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Apply environment overrides.
    ///
    /// - `QC_HEARTBEAT_INTERVAL_SECS`: liveness cycle interval
    /// - `QC_RPC_TIMEOUT_MS`: per-call slave RPC deadline
    /// - `QC_CONSENSUS`: root consensus type (`simulate`, `double_sha256`, `keccak256`)
    pub fn apply_env_overrides(&mut self) {
        if let Some(secs) = env_parse::<u64>("QC_HEARTBEAT_INTERVAL_SECS") {
            self.master.heartbeat_interval_secs = secs;
        }
        if let Some(ms) = env_parse::<u64>("QC_RPC_TIMEOUT_MS") {
            self.master.rpc_timeout_ms = ms;
        }
        if let Ok(raw) = std::env::var("QC_CONSENSUS") {
            match serde_json::from_value(serde_json::Value::String(raw.clone())) {
                Ok(kind) => self.root.consensus_type = kind,
                Err(_) => tracing::warn!("[qc-18] Ignoring unknown QC_CONSENSUS value: {}", raw),
            }
        }
    }

    /// Validate configuration rules.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slaves.is_empty() {
            return Err(ConfigError::Invalid("at least one slave is required".into()));
        }

        let mut ids = HashSet::new();
        for slave in &self.slaves {
            if !ids.insert(slave.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate slave id {}",
                    slave.id
                )));
            }
            if slave.chain_mask_list.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "slave {} has no chain masks",
                    slave.id
                )));
            }
            if let Some(mask) = slave.chain_mask_list.iter().find(|m| !m.is_valid()) {
                return Err(ConfigError::Invalid(format!(
                    "slave {} has invalid chain mask {}",
                    slave.id,
                    mask.value()
                )));
            }
        }

        if self.topology.chains.is_empty() {
            return Err(ConfigError::Invalid("topology has no chains".into()));
        }
        let mut chain_ids = HashSet::new();
        for chain in &self.topology.chains {
            if !chain_ids.insert(chain.chain_id) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate chain id {}",
                    chain.chain_id
                )));
            }
            if !chain.shard_size.is_power_of_two() || chain.shard_size > 0x8000 {
                return Err(ConfigError::Invalid(format!(
                    "chain {} shard size {} is not a power of two",
                    chain.chain_id, chain.shard_size
                )));
            }
            if chain.chain_id > 0xFFFF {
                return Err(ConfigError::Invalid(format!(
                    "chain id {} does not fit in 16 bits",
                    chain.chain_id
                )));
            }
        }

        if self.master.heartbeat_interval_secs == 0 {
            return Err(ConfigError::Invalid("heartbeat interval must be > 0".into()));
        }
        if self.master.rpc_timeout_ms == 0 {
            return Err(ConfigError::Invalid("rpc timeout must be > 0".into()));
        }

        Ok(())
    }

    /// All genesis full shard ids, ascending.
    pub fn genesis_shard_ids(&self) -> Vec<FullShardId> {
        let mut ids: Vec<FullShardId> = self
            .topology
            .chains
            .iter()
            .flat_map(|chain| chain.full_shard_ids())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Shards whose genesis root height is strictly below `root_height`.
    ///
    /// A shard created by root block `h` cannot contribute headers to `h`.
    pub fn initialized_shard_ids_before_root_height(&self, root_height: u32) -> Vec<FullShardId> {
        self.topology
            .chains
            .iter()
            .filter(|chain| chain.genesis_root_height < root_height)
            .flat_map(|chain| chain.full_shard_ids())
            .collect()
    }

    /// Resolve an address's full shard key to its full shard id.
    pub fn full_shard_id_by_full_shard_key(&self, full_shard_key: u32) -> Option<FullShardId> {
        let chain_id = full_shard_key >> 16;
        let chain = self.chain(chain_id)?;
        let shard_id = full_shard_key & (chain.shard_size - 1);
        Some(Branch::create(chain_id, chain.shard_size, shard_id).value)
    }

    /// Target block time of the chain owning `full_shard_id`.
    pub fn shard_target_block_time(&self, full_shard_id: FullShardId) -> Option<u32> {
        self.chain(full_shard_id >> 16)
            .map(|chain| chain.target_block_time)
    }

    /// Slave directory derived from configuration.
    pub fn slave_info_list(&self) -> Vec<SlaveInfo> {
        self.slaves
            .iter()
            .map(|slave| SlaveInfo {
                id: slave.id.clone(),
                host: slave.ip.clone(),
                port: slave.port,
                chain_mask_list: slave.chain_mask_list.clone(),
            })
            .collect()
    }

    fn chain(&self, chain_id: u32) -> Option<&ChainConfig> {
        self.topology.chains.iter().find(|c| c.chain_id == chain_id)
    }
}

/// One slave process.
#[derive(Clone, Debug, Deserialize)]
pub struct SlaveConfig {
    /// Slave id; must match the id the slave reports.
    pub id: String,
    /// Host.
    pub ip: String,
    /// RPC port.
    pub port: u16,
    /// Chain masks served by the slave, in order.
    pub chain_mask_list: Vec<ChainMask>,
}

impl SlaveConfig {
    /// `ip:port` target string.
    pub fn target(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

/// Shard topology.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct TopologyConfig {
    /// Chains, each split into `shard_size` shards.
    pub chains: Vec<ChainConfig>,
}

/// One chain of shards.
#[derive(Clone, Debug, Deserialize)]
pub struct ChainConfig {
    /// Chain id.
    pub chain_id: u32,
    /// Number of shards (power of two).
    pub shard_size: u32,
    /// Target minor block time in seconds.
    #[serde(default = "default_minor_block_time")]
    pub target_block_time: u32,
    /// Root height whose block creates this chain's shards.
    #[serde(default)]
    pub genesis_root_height: u32,
}

impl ChainConfig {
    /// Chain created at root genesis with default timing.
    pub fn new(chain_id: u32, shard_size: u32) -> Self {
        Self {
            chain_id,
            shard_size,
            target_block_time: default_minor_block_time(),
            genesis_root_height: 0,
        }
    }

    /// Full shard ids of this chain, ascending.
    pub fn full_shard_ids(&self) -> impl Iterator<Item = FullShardId> + '_ {
        (0..self.shard_size).map(move |shard_id| {
            Branch::create(self.chain_id, self.shard_size, shard_id).value
        })
    }
}

/// Root consensus algorithm.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsensusType {
    /// Deterministic engine that accepts every seal.
    Simulate,
    /// Ethash; recognized but not supported.
    Ethash,
    /// SHA-256d PoW.
    DoubleSha256,
    /// Keccak-256 PoW.
    Keccak256,
}

/// Root chain settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RootConfig {
    /// Consensus algorithm.
    pub consensus_type: ConsensusType,
    /// Target root block time in seconds.
    pub target_block_time: u32,
    /// Genesis (and minimum) root difficulty.
    pub genesis_difficulty: u64,
    /// Whether blocks are mined by an external miner.
    pub remote_mine: bool,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            consensus_type: ConsensusType::Simulate,
            target_block_time: 60,
            genesis_difficulty: 1_000,
            remote_mine: false,
        }
    }
}

/// Master runtime settings.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct MasterConfig {
    /// Interval between liveness cycles, in seconds.
    pub heartbeat_interval_secs: u64,
    /// Deadline for every slave RPC, in milliseconds.
    pub rpc_timeout_ms: u64,
}

impl Default for MasterConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
            rpc_timeout_ms: DEFAULT_RPC_TIMEOUT_MS,
        }
    }
}

impl MasterConfig {
    /// Liveness interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Slave RPC deadline.
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

fn default_minor_block_time() -> u32 {
    10
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
