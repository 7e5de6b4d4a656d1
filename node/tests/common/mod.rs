#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use certchain_chain::{ChainGateway, GatewayConfig};
use certchain_crypto::AdminKey;
use certchain_node::{
    CertificateService, EventPoller, MirrorMetrics, PollerConfig, Reconciler, StartBlock,
};
use certchain_nullables::chain::{NULL_CHAIN_ID, NULL_CONTRACT};
use certchain_nullables::{NullChain, NullMirrorStore};
use certchain_store::MirrorStore;

pub const ADMIN_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

pub fn admin_key() -> AdminKey {
    AdminKey::from_hex(ADMIN_KEY).unwrap()
}

pub struct Node {
    pub chain: Arc<NullChain>,
    pub gateway: Arc<ChainGateway>,
    pub metrics: Arc<MirrorMetrics>,
    pub reconciler: Arc<Reconciler>,
    pub service: Arc<CertificateService>,
    pub store: Arc<dyn MirrorStore>,
    pub poller_config: PollerConfig,
}

impl Node {
    pub fn poller(&self) -> Arc<EventPoller> {
        Arc::new(EventPoller::new(
            self.gateway.clone(),
            self.store.clone(),
            self.reconciler.clone(),
            self.metrics.clone(),
            self.poller_config.clone(),
        ))
    }
}

pub fn poller_config() -> PollerConfig {
    PollerConfig {
        interval: Duration::from_millis(10),
        confirmations: 0,
        max_block_range: 5_000,
        start_block: StartBlock::Earliest,
    }
}

pub fn gateway_config(tx_timeout: Duration) -> GatewayConfig {
    let mut config = GatewayConfig::new(NULL_CONTRACT);
    config.chain_id = Some(NULL_CHAIN_ID);
    config.tx_timeout = tx_timeout;
    config.receipt_poll_interval = Duration::from_millis(5);
    config
}

/// A node over a fresh in-memory ledger.
pub fn node() -> (Node, Arc<NullMirrorStore>) {
    let chain = Arc::new(NullChain::new(admin_key().address()));
    let store = Arc::new(NullMirrorStore::new());
    let node = node_with(chain, store.clone(), gateway_config(Duration::from_secs(5)));
    (node, store)
}

pub fn node_with(
    chain: Arc<NullChain>,
    store: Arc<dyn MirrorStore>,
    config: GatewayConfig,
) -> Node {
    let gateway = Arc::new(chain.gateway_with(admin_key(), config));
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
    Node {
        chain,
        gateway,
        metrics,
        reconciler,
        service,
        store,
        poller_config: poller_config(),
    }
}
