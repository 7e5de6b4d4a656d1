//! Command line and environment overrides.

use std::path::PathBuf;

use certchain_node::{NodeConfig, SecretKeyHex, StartBlock};
use certchain_types::Address;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "certchain-daemon", about = "Certificate registry mirror and HTTP API")]
pub struct Cli {
    /// Path to a TOML configuration file. File settings are the base;
    /// flags and environment variables override them.
    #[arg(long, env = "CERTCHAIN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Run the event poller and the HTTP API until interrupted.
    Run,
    /// Overwrite one mirror record with the chain's state.
    Repair {
        /// Certificate id to repair.
        #[arg(long)]
        id: String,
    },
}

#[derive(Args, Debug, Default)]
pub struct Overrides {
    /// JSON-RPC endpoint of the chain node.
    #[arg(long, env = "CERTCHAIN_RPC_URL")]
    pub rpc_url: Option<String>,

    /// Expected chain id.
    #[arg(long, env = "CERTCHAIN_CHAIN_ID")]
    pub chain_id: Option<u64>,

    /// Admin private key (hex).
    #[arg(long, env = "CERTCHAIN_SIGNING_KEY", hide_env_values = true)]
    pub signing_key: Option<String>,

    /// Deployed registry address.
    #[arg(long, env = "CERTCHAIN_CONTRACT_ADDRESS")]
    pub contract_address: Option<Address>,

    /// Registry ABI JSON; the bundled ABI is used otherwise.
    #[arg(long, env = "CERTCHAIN_CONTRACT_ABI")]
    pub contract_abi: Option<PathBuf>,

    /// Directory holding the LMDB mirror.
    #[arg(long, env = "CERTCHAIN_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Seconds between poll cycles.
    #[arg(long, env = "CERTCHAIN_POLL_INTERVAL")]
    pub poll_interval: Option<u64>,

    /// Blocks the poller stays behind head.
    #[arg(long, env = "CERTCHAIN_CONFIRMATIONS")]
    pub confirmations: Option<u64>,

    /// First block to scan without a persisted cursor: latest, earliest or a number.
    #[arg(long, env = "CERTCHAIN_START_BLOCK")]
    pub start_block: Option<String>,

    /// Seconds to wait for a transaction receipt.
    #[arg(long, env = "CERTCHAIN_TX_TIMEOUT")]
    pub tx_timeout: Option<u64>,

    /// HTTP bind address.
    #[arg(long, env = "CERTCHAIN_HTTP_BIND")]
    pub http_bind: Option<String>,

    /// HTTP port.
    #[arg(long, env = "CERTCHAIN_HTTP_PORT")]
    pub http_port: Option<u16>,

    /// Allowed CORS origins (comma-separated).
    #[arg(long, env = "CERTCHAIN_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Vec<String>,

    /// Log format: "human" or "json".
    #[arg(long, env = "CERTCHAIN_LOG_FORMAT")]
    pub log_format: Option<String>,

    /// Log level: "trace", "debug", "info", "warn", "error".
    #[arg(long, env = "CERTCHAIN_LOG_LEVEL")]
    pub log_level: Option<String>,
}

impl Overrides {
    /// Apply every override that was given on top of `config`.
    pub fn apply(self, config: &mut NodeConfig) -> anyhow::Result<()> {
        if let Some(v) = self.rpc_url {
            config.rpc_url = v;
        }
        if let Some(v) = self.chain_id {
            config.chain_id = Some(v);
        }
        if let Some(v) = self.signing_key {
            config.signing_key = Some(SecretKeyHex::new(v));
        }
        if let Some(v) = self.contract_address {
            config.contract_address = Some(v);
        }
        if let Some(v) = self.contract_abi {
            config.contract_abi_path = Some(v);
        }
        if let Some(v) = self.data_dir {
            config.data_dir = v;
        }
        if let Some(v) = self.poll_interval {
            config.poll_interval_secs = v;
        }
        if let Some(v) = self.confirmations {
            config.confirmations = v;
        }
        if let Some(v) = self.start_block {
            config.start_block = v.parse::<StartBlock>()?;
        }
        if let Some(v) = self.tx_timeout {
            config.tx_timeout_secs = v;
        }
        if let Some(v) = self.http_bind {
            config.http_bind = v;
        }
        if let Some(v) = self.http_port {
            config.http_port = v;
        }
        if !self.cors_origins.is_empty() {
            config.cors_origins = self.cors_origins;
        }
        if let Some(v) = self.log_format {
            config.log_format = v;
        }
        if let Some(v) = self.log_level {
            config.log_level = v;
        }
        Ok(())
    }
}

/// File settings (or defaults) with command line and environment on top.
pub fn resolve_config(cli: &mut Cli) -> anyhow::Result<NodeConfig> {
    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_toml_file(path)?,
        None => NodeConfig::default(),
    };
    std::mem::take(&mut cli.overrides).apply(&mut config)?;
    Ok(config)
}
