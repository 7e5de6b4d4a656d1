//! Node configuration with TOML file support.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use certchain_chain::{GatewayConfig, DEFAULT_GAS_LIMIT};
use certchain_crypto::AdminKey;
use certchain_types::Address;
use zeroize::Zeroizing;

use crate::logging::LogFormat;
use crate::poller::PollerConfig;
use crate::NodeError;

/// Where the poller starts scanning when no cursor has been persisted yet.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "StartBlockRepr", into = "StartBlockRepr")]
pub enum StartBlock {
    /// The current head; history before startup is not mirrored.
    #[default]
    Latest,
    /// Block zero, a full backfill.
    Earliest,
    Number(u64),
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum StartBlockRepr {
    Number(u64),
    Tag(String),
}

impl FromStr for StartBlock {
    type Err = NodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "latest" => Ok(StartBlock::Latest),
            "earliest" => Ok(StartBlock::Earliest),
            other => other.parse::<u64>().map(StartBlock::Number).map_err(|_| {
                NodeError::Config(format!(
                    "start_block must be latest, earliest or a block number, got {other:?}"
                ))
            }),
        }
    }
}

impl TryFrom<StartBlockRepr> for StartBlock {
    type Error = NodeError;

    fn try_from(repr: StartBlockRepr) -> Result<Self, Self::Error> {
        match repr {
            StartBlockRepr::Number(n) => Ok(StartBlock::Number(n)),
            StartBlockRepr::Tag(tag) => tag.parse(),
        }
    }
}

impl From<StartBlock> for StartBlockRepr {
    fn from(start: StartBlock) -> Self {
        match start {
            StartBlock::Latest => StartBlockRepr::Tag("latest".into()),
            StartBlock::Earliest => StartBlockRepr::Tag("earliest".into()),
            StartBlock::Number(n) => StartBlockRepr::Number(n),
        }
    }
}

/// A hex-encoded private key held only in zeroized memory.
///
/// Never printed and never serialized back out.
pub struct SecretKeyHex(Zeroizing<String>);

impl SecretKeyHex {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(Zeroizing::new(hex.into()))
    }

    pub fn to_admin_key(&self) -> Result<AdminKey, NodeError> {
        Ok(AdminKey::from_hex(&self.0)?)
    }
}

impl Clone for SecretKeyHex {
    fn clone(&self) -> Self {
        Self(Zeroizing::new(self.0.as_str().to_owned()))
    }
}

impl fmt::Debug for SecretKeyHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretKeyHex(<redacted>)")
    }
}

impl<'de> Deserialize<'de> for SecretKeyHex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(SecretKeyHex::new)
    }
}

/// Configuration for a certchain node.
///
/// Loaded once at startup via [`NodeConfig::from_toml_file`], then
/// overridden field by field from the command line and environment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// JSON-RPC endpoint of the chain node.
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Expected chain id. Queried from the node when unset.
    #[serde(default)]
    pub chain_id: Option<u64>,

    /// Admin signing key (hex). Usually supplied via the environment.
    #[serde(default, skip_serializing)]
    pub signing_key: Option<SecretKeyHex>,

    /// Address of the deployed certificate registry.
    #[serde(default)]
    pub contract_address: Option<Address>,

    /// JSON ABI of the registry. The bundled ABI is used when unset.
    #[serde(default)]
    pub contract_abi_path: Option<PathBuf>,

    /// Directory holding the LMDB mirror.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Maximum LMDB map size in bytes.
    #[serde(default = "default_lmdb_map_size")]
    pub lmdb_map_size: usize,

    /// Seconds between poll cycles.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Blocks behind head the poller stays.
    #[serde(default)]
    pub confirmations: u64,

    /// Largest block span requested in one log query.
    #[serde(default = "default_max_block_range")]
    pub max_block_range: u64,

    #[serde(default)]
    pub start_block: StartBlock,

    /// Seconds to wait for a transaction receipt.
    #[serde(default = "default_tx_timeout_secs")]
    pub tx_timeout_secs: u64,

    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,

    #[serde(default = "default_gas_limit")]
    pub gas_limit: u64,

    /// Timeout for a single JSON-RPC request, in seconds.
    #[serde(default = "default_rpc_request_timeout_secs")]
    pub rpc_request_timeout_secs: u64,

    #[serde(default = "default_http_bind")]
    pub http_bind: String,

    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Origins allowed to call the HTTP API from a browser.
    #[serde(default = "default_cors_origins")]
    pub cors_origins: Vec<String>,

    /// Whether to serve `/metrics`.
    #[serde(default = "default_true")]
    pub enable_metrics: bool,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter (e.g. "info", "certchain_node=debug").
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Defaults ───────────────────────────────────────────────────────────

fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".into()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./certchain_data")
}

fn default_lmdb_map_size() -> usize {
    1 << 30
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_max_block_range() -> u64 {
    5_000
}

fn default_tx_timeout_secs() -> u64 {
    120
}

fn default_receipt_poll_interval_ms() -> u64 {
    1_000
}

fn default_gas_limit() -> u64 {
    DEFAULT_GAS_LIMIT
}

fn default_rpc_request_timeout_secs() -> u64 {
    30
}

fn default_http_bind() -> String {
    "0.0.0.0".into()
}

fn default_http_port() -> u16 {
    5000
}

fn default_cors_origins() -> Vec<String> {
    vec!["http://localhost:2206".into()]
}

fn default_true() -> bool {
    true
}

fn default_log_format() -> String {
    "human".into()
}

fn default_log_level() -> String {
    "info".into()
}

// ── Impl ───────────────────────────────────────────────────────────────

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, NodeError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| NodeError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string. The signing key is omitted.
    pub fn to_toml_string(&self) -> Result<String, NodeError> {
        toml::to_string_pretty(self).map_err(|e| NodeError::Config(e.to_string()))
    }

    pub fn log_format(&self) -> Result<LogFormat, NodeError> {
        self.log_format.parse()
    }

    pub fn admin_key(&self) -> Result<AdminKey, NodeError> {
        self.signing_key
            .as_ref()
            .ok_or_else(|| NodeError::Config("signing_key is required".into()))?
            .to_admin_key()
    }

    pub fn contract(&self) -> Result<Address, NodeError> {
        self.contract_address
            .ok_or_else(|| NodeError::Config("contract_address is required".into()))
    }

    pub fn gateway_config(&self) -> Result<GatewayConfig, NodeError> {
        if self.tx_timeout_secs == 0 {
            return Err(NodeError::Config("tx_timeout_secs must be positive".into()));
        }
        Ok(GatewayConfig {
            contract: self.contract()?,
            chain_id: self.chain_id,
            gas_limit: self.gas_limit,
            tx_timeout: Duration::from_secs(self.tx_timeout_secs),
            receipt_poll_interval: Duration::from_millis(self.receipt_poll_interval_ms.max(1)),
        })
    }

    pub fn poller_config(&self) -> Result<PollerConfig, NodeError> {
        if self.max_block_range == 0 {
            return Err(NodeError::Config("max_block_range must be positive".into()));
        }
        Ok(PollerConfig {
            interval: Duration::from_secs(self.poll_interval_secs.max(1)),
            confirmations: self.confirmations,
            max_block_range: self.max_block_range,
            start_block: self.start_block,
        })
    }

    pub fn rpc_request_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_request_timeout_secs.max(1))
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            chain_id: None,
            signing_key: None,
            contract_address: None,
            contract_abi_path: None,
            data_dir: default_data_dir(),
            lmdb_map_size: default_lmdb_map_size(),
            poll_interval_secs: default_poll_interval_secs(),
            confirmations: 0,
            max_block_range: default_max_block_range(),
            start_block: StartBlock::default(),
            tx_timeout_secs: default_tx_timeout_secs(),
            receipt_poll_interval_ms: default_receipt_poll_interval_ms(),
            gas_limit: default_gas_limit(),
            rpc_request_timeout_secs: default_rpc_request_timeout_secs(),
            http_bind: default_http_bind(),
            http_port: default_http_port(),
            cors_origins: default_cors_origins(),
            enable_metrics: default_true(),
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

    #[test]
    fn default_config_round_trips_through_toml() {
        let mut config = NodeConfig::default();
        config.contract_address = Some(Address::new([0xAB; 20]));
        config.start_block = StartBlock::Number(1234);
        let toml_str = config.to_toml_string().unwrap();
        let parsed = NodeConfig::from_toml_str(&toml_str).expect("should parse");
        assert_eq!(parsed.http_port, config.http_port);
        assert_eq!(parsed.contract_address, config.contract_address);
        assert_eq!(parsed.start_block, StartBlock::Number(1234));
    }

    #[test]
    fn minimal_toml_uses_defaults() {
        let config = NodeConfig::from_toml_str("").expect("empty toml should use defaults");
        assert_eq!(config.http_port, 5000);
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.confirmations, 0);
        assert_eq!(config.max_block_range, 5_000);
        assert_eq!(config.start_block, StartBlock::Latest);
        assert_eq!(config.gas_limit, 2_000_000);
        assert_eq!(config.cors_origins, vec!["http://localhost:2206".to_string()]);
        assert_eq!(config.log_format, "human");
    }

    #[test]
    fn partial_toml_overrides() {
        let toml = r#"
            rpc_url = "http://node:8545"
            contract_address = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
            start_block = "earliest"
            confirmations = 3
        "#;
        let config = NodeConfig::from_toml_str(toml).expect("should parse");
        assert_eq!(config.rpc_url, "http://node:8545");
        assert_eq!(config.start_block, StartBlock::Earliest);
        assert_eq!(config.confirmations, 3);
        assert!(config.contract().is_ok());
        assert_eq!(config.http_port, 5000);
    }

    #[test]
    fn numeric_and_bad_start_blocks() {
        let config = NodeConfig::from_toml_str("start_block = 17").unwrap();
        assert_eq!(config.start_block, StartBlock::Number(17));
        assert!(NodeConfig::from_toml_str("start_block = \"genesis\"").is_err());
        assert_eq!("99".parse::<StartBlock>().unwrap(), StartBlock::Number(99));
    }

    #[test]
    fn signing_key_is_never_echoed() {
        let config =
            NodeConfig::from_toml_str(&format!("signing_key = \"{TEST_KEY}\"")).unwrap();
        assert!(config.admin_key().is_ok());
        let debug = format!("{config:?}");
        assert!(!debug.contains("4c0883a6"));
        let toml = config.to_toml_string().unwrap();
        assert!(!toml.contains("signing_key"));
    }

    #[test]
    fn missing_required_settings_are_config_errors() {
        let config = NodeConfig::default();
        assert!(matches!(config.admin_key(), Err(NodeError::Config(_))));
        assert!(matches!(config.gateway_config(), Err(NodeError::Config(_))));
    }

    #[test]
    fn zero_block_range_is_rejected() {
        let config = NodeConfig::from_toml_str("max_block_range = 0").unwrap();
        assert!(config.poller_config().is_err());
    }

    #[test]
    fn missing_file_returns_config_error() {
        let result = NodeConfig::from_toml_file("/nonexistent/certchain.toml");
        assert!(matches!(result, Err(NodeError::Config(_))));
    }
}
