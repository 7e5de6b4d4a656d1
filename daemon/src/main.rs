//! certchain daemon: entry point for running a certificate mirror node.

mod cli;

use std::sync::Arc;

use anyhow::{bail, Context};
use certchain_chain::{ChainGateway, ChainTransport, ContractAbi, JsonRpcTransport};
use certchain_node::{
    init_logging, CertificateService, EventPoller, MirrorMetrics, NodeConfig, Reconciler,
    ShutdownController,
};
use certchain_rpc::{RpcConfig, RpcServer};
use certchain_store::MirrorStore;
use certchain_store_lmdb::LmdbEnvironment;
use clap::Parser;

use crate::cli::{resolve_config, Cli, Command};

/// Everything a running node shares between its tasks.
struct Components {
    gateway: Arc<ChainGateway>,
    store: Arc<dyn MirrorStore>,
    reconciler: Arc<Reconciler>,
    metrics: Arc<MirrorMetrics>,
    service: Arc<CertificateService>,
}

async fn build(config: &NodeConfig) -> anyhow::Result<Components> {
    let transport = Arc::new(
        JsonRpcTransport::new(&config.rpc_url, config.rpc_request_timeout())
            .context("creating JSON-RPC transport")?,
    );
    let remote_chain_id = transport
        .chain_id()
        .await
        .with_context(|| format!("querying chain id from {}", config.rpc_url))?;
    if let Some(expected) = config.chain_id {
        if expected != remote_chain_id {
            bail!("configured chain id {expected} but {} reports {remote_chain_id}", config.rpc_url);
        }
    }

    let abi = ContractAbi::load(config.contract_abi_path.as_deref()).context("loading contract ABI")?;
    let key = config.admin_key()?;
    let mut gateway_config = config.gateway_config()?;
    gateway_config.chain_id = Some(remote_chain_id);
    let gateway = Arc::new(ChainGateway::new(transport, abi, key, gateway_config));

    let env = LmdbEnvironment::open(&config.data_dir, config.lmdb_map_size)
        .with_context(|| format!("opening mirror at {}", config.data_dir.display()))?;
    let store: Arc<dyn MirrorStore> = Arc::new(env);

    let metrics = Arc::new(MirrorMetrics::new());
    let reconciler = Arc::new(Reconciler::new(
        store.clone(),
        gateway.clone(),
        metrics.clone(),
    ));
    let service = Arc::new(CertificateService::new(
        gateway.clone(),
        store.clone(),
        reconciler.clone(),
        metrics.clone(),
    ));

    tracing::info!(
        chain_id = remote_chain_id,
        contract = %gateway.contract(),
        admin = %gateway.admin_address(),
        data_dir = %config.data_dir.display(),
        "components ready"
    );
    Ok(Components {
        gateway,
        store,
        reconciler,
        metrics,
        service,
    })
}

async fn run(config: NodeConfig, components: Components) -> anyhow::Result<()> {
    let shutdown = ShutdownController::new();

    let poller = Arc::new(EventPoller::new(
        components.gateway.clone(),
        components.store.clone(),
        components.reconciler.clone(),
        components.metrics.clone(),
        config.poller_config()?,
    ));
    let poller_handle = tokio::spawn(poller.run(shutdown.subscribe()));

    let server = RpcServer::new(
        RpcConfig {
            bind: config.http_bind.clone(),
            port: config.http_port,
            cors_origins: config.cors_origins.clone(),
            enable_metrics: config.enable_metrics,
        },
        components.service.clone(),
    );
    let server_handle = tokio::spawn(server.serve(shutdown.subscribe()));

    let signals = shutdown.clone();
    tokio::spawn(async move { signals.wait_for_signal().await });

    let served = server_handle.await.context("HTTP server task panicked")?;
    // The server also returns on a bind failure; stop the poller either way.
    shutdown.shutdown();
    poller_handle.await.context("poller task panicked")?;
    served?;
    tracing::info!("certchain daemon exited cleanly");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mut cli = Cli::parse();
    let config = resolve_config(&mut cli)?;
    init_logging(config.log_format()?, &config.log_level)?;

    let components = build(&config).await?;
    match cli.command {
        Command::Run => run(config, components).await,
        Command::Repair { id } => {
            let record = components.service.repair_from_chain(&id).await?;
            tracing::info!(
                id = %record.id,
                revoked = record.revoked,
                plaintext_kept = record.recipient.is_some(),
                "mirror record repaired"
            );
            Ok(())
        }
    }
}
