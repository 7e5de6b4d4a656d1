//! The poller and reconciler keeping the mirror in step with the ledger.

mod common;

use std::sync::Arc;
use std::time::Duration;

use certchain_chain::{ChainEvent, EventPayload};
use certchain_crypto::{hash_text, sign_certificate};
use certchain_node::{PollerPhase, ServiceError, ShutdownController, StartBlock};
use certchain_nullables::NullMirrorStore;
use certchain_store::{
    AdminStatus, AdminStore, CertificateStore, CursorStore, EventLogStore, MergeOutcome,
    MirrorStore,
};
use certchain_store_lmdb::LmdbEnvironment;
use certchain_types::{
    Address, CertificateId, EventKind, EventPosition, Timestamp, TxHash,
};

use common::{admin_key, gateway_config, node, node_with};

fn cert_id(s: &str) -> CertificateId {
    s.parse().unwrap()
}

fn issued_event(id: &str, block: u64) -> ChainEvent {
    let rh = hash_text("Alice");
    let ch = hash_text("Rust 101");
    ChainEvent {
        position: EventPosition::new(block, 0),
        tx_hash: TxHash::new([block as u8; 32]),
        payload: EventPayload::Issued {
            id: cert_id(id),
            recipient_hash: rh,
            course_hash: ch,
            issue_date: Timestamp::new(1_700_000_000 + block),
            signature: sign_certificate(&admin_key(), id, &rh, &ch).unwrap(),
        },
    }
}

fn revoked_event(id: &str, block: u64) -> ChainEvent {
    ChainEvent {
        position: EventPosition::new(block, 0),
        tx_hash: TxHash::new([block as u8; 32]),
        payload: EventPayload::Revoked { id: cert_id(id) },
    }
}

#[test]
fn issued_event_applied_twice_yields_one_record_and_one_entry() {
    let (node, store) = node();
    let event = issued_event("CERT-001", 5);
    let first = node.reconciler.apply_event(&event, Timestamp::new(10)).unwrap();
    let second = node.reconciler.apply_event(&event, Timestamp::new(10)).unwrap();
    assert_eq!(first, MergeOutcome::Created);
    assert_eq!(second, MergeOutcome::Unchanged);
    assert_eq!(store.certificate_count().unwrap(), 1);
    assert_eq!(store.event_count().unwrap(), 1);
}

#[test]
fn revoke_and_issue_commute() {
    for revoke_first in [true, false] {
        let (node, store) = node();
        let issued = issued_event("CERT-001", 5);
        let revoked = revoked_event("CERT-001", 6);
        let order = if revoke_first {
            [&revoked, &issued]
        } else {
            [&issued, &revoked]
        };
        for event in order {
            node.reconciler.apply_event(event, Timestamp::new(10)).unwrap();
        }
        let record = store.find_certificate(&cert_id("CERT-001")).unwrap().unwrap();
        assert!(record.revoked, "revoke_first = {revoke_first}");
        assert!(record.is_issued(), "revoke_first = {revoke_first}");
        assert_eq!(record.revoke_tx_hash, Some(TxHash::new([6; 32])));
        assert_eq!(store.event_count().unwrap(), 2);
    }
}

#[test]
fn conflicting_issue_event_is_counted_not_applied() {
    let (node, store) = node();
    node.reconciler
        .apply_event(&issued_event("CERT-001", 5), Timestamp::new(10))
        .unwrap();
    let mut forged = issued_event("CERT-001", 7);
    if let EventPayload::Issued { recipient_hash, .. } = &mut forged.payload {
        *recipient_hash = hash_text("Mallory");
    }
    let outcome = node.reconciler.apply_event(&forged, Timestamp::new(11)).unwrap();
    assert_eq!(outcome, MergeOutcome::Conflict);
    assert_eq!(node.metrics.merge_conflicts.get(), 1);
    let record = store.find_certificate(&cert_id("CERT-001")).unwrap().unwrap();
    assert_eq!(record.issuance.unwrap().recipient_hash, hash_text("Alice"));
}

#[tokio::test]
async fn issue_poll_verify_revoke_verify() {
    let (node, store) = node();
    let poller = node.poller();

    node.service.issue("CERT-001", "Alice", "Rust 101").await.unwrap();
    let report = poller.poll_once().await;
    assert_eq!(report.applied, 1);
    assert!(report.failed.is_empty());
    assert_eq!(poller.phase(), PollerPhase::Idle);

    let verified = node.service.verify("CERT-001").await.unwrap();
    assert_eq!(verified.recipient.as_deref(), Some("Alice"));
    assert!(!verified.revoked);

    node.service.revoke("CERT-001").await.unwrap();
    let report = poller.poll_once().await;
    assert_eq!(report.applied, 1);

    let verified = node.service.verify("CERT-001").await.unwrap();
    assert!(verified.revoked);

    let feed = node.service.list_events(0, 10).unwrap();
    let kinds: Vec<_> = feed.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, [EventKind::CertificateIssued, EventKind::CertificateRevoked]);
    assert!(feed.iter().all(|e| e.subject == "CERT-001"));
    assert_eq!(store.certificate_count().unwrap(), 1);
}

#[tokio::test]
async fn cursor_advances_past_scanned_range() {
    let (node, store) = node();
    node.service.issue("CERT-001", "Alice", "Rust 101").await.unwrap();
    node.poller().poll_once().await;
    let head = node.chain.head();
    for kind in EventKind::ALL {
        assert_eq!(store.get_cursor(kind).unwrap(), Some(head + 1));
    }
    assert_eq!(node.poller().poll_once().await.applied, 0);
}

#[tokio::test]
async fn transport_failure_is_survived() {
    let (node, store) = node();
    node.service.issue("CERT-001", "Alice", "Rust 101").await.unwrap();
    let poller = node.poller();

    node.chain.fail_next(1);
    let report = poller.poll_once().await;
    assert_eq!(report.head, None);
    assert_eq!(report.failed, EventKind::ALL.to_vec());
    assert_eq!(store.event_count().unwrap(), 0);

    let report = poller.poll_once().await;
    assert!(report.failed.is_empty());
    assert_eq!(store.event_count().unwrap(), 1);
}

#[tokio::test]
async fn failed_apply_keeps_cursor_and_replays() {
    let (node, store) = node();
    node.service.issue("CERT-001", "Alice", "Rust 101").await.unwrap();
    node.service.revoke("CERT-001").await.unwrap();
    let poller = node.poller();

    store.fail_next_writes(1);
    let report = poller.poll_once().await;
    assert_eq!(report.failed, vec![EventKind::CertificateIssued]);
    assert_eq!(store.get_cursor(EventKind::CertificateIssued).unwrap(), Some(0));
    assert_eq!(report.applied, 1, "the revoke range still went through");

    let report = poller.poll_once().await;
    assert!(report.failed.is_empty());
    assert_eq!(store.event_count().unwrap(), 2);
    let record = store.find_certificate(&cert_id("CERT-001")).unwrap().unwrap();
    assert!(record.revoked && record.is_issued());
}

/// Issue straight through the gateway, as another client of the registry would.
async fn issue_on_ledger(node: &common::Node, id: &CertificateId) {
    let rh = hash_text("Alice");
    let ch = hash_text("Rust 101");
    let signature = sign_certificate(&admin_key(), id.as_str(), &rh, &ch).unwrap();
    node.gateway
        .issue_certificate(id, &rh, &ch, &signature)
        .await
        .unwrap();
}

#[tokio::test]
async fn ledger_ids_outside_issue_policy_are_mirrored() {
    let (node, store) = node();
    let long = CertificateId::from_ledger("X".repeat(300));
    let bell = CertificateId::from_ledger("CERT\u{7}42");
    issue_on_ledger(&node, &long).await;
    issue_on_ledger(&node, &bell).await;

    let report = node.poller().poll_once().await;
    assert!(report.failed.is_empty());
    assert_eq!(report.applied, 2);
    assert_eq!(
        store.get_cursor(EventKind::CertificateIssued).unwrap(),
        Some(node.chain.head() + 1)
    );
    assert!(store.find_certificate(&long).unwrap().unwrap().is_issued());
    assert!(store.find_certificate(&bell).unwrap().unwrap().is_issued());
    assert_eq!(store.event_count().unwrap(), 2);

    let verified = node.service.verify(long.as_str()).await.unwrap();
    assert!(verified.mirror_synced);
    assert!(!verified.revoked);

    node.service.revoke(long.as_str()).await.unwrap();
    node.poller().poll_once().await;
    assert!(node.service.verify(long.as_str()).await.unwrap().revoked);

    // The local policy still applies to ids this node issues.
    assert!(matches!(
        node.service.issue(&"Y".repeat(300), "Bob", "Rust 101").await,
        Err(ServiceError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn undecodable_log_holds_the_cursor() {
    let (node, store) = node();
    issue_on_ledger(&node, &cert_id("CERT-001")).await;
    let topic = node
        .gateway
        .abi()
        .event(EventKind::CertificateIssued.as_str())
        .unwrap()
        .topic();
    node.chain.mine_raw_log(vec![topic], vec![0xDE, 0xAD]);
    let poller = node.poller();

    for cycle in 1..=2u64 {
        let report = poller.poll_once().await;
        assert_eq!(report.failed, vec![EventKind::CertificateIssued]);
        assert_eq!(store.get_cursor(EventKind::CertificateIssued).unwrap(), Some(0));
        assert_eq!(
            node.metrics
                .poll_errors
                .with_label_values(&[EventKind::CertificateIssued.as_str()])
                .get(),
            cycle
        );
    }
    // Nothing in the held range was applied, and the other kinds moved on.
    assert_eq!(store.certificate_count().unwrap(), 0);
    assert_eq!(store.event_count().unwrap(), 0);
    assert_eq!(
        store.get_cursor(EventKind::AdminAdded).unwrap(),
        Some(node.chain.head() + 1)
    );
}

#[tokio::test]
async fn block_range_limit_splits_backfill_over_cycles() {
    let (mut node, store) = node();
    node.poller_config.max_block_range = 1;
    for i in 0..3 {
        node.service
            .issue(&format!("CERT-{i}"), "Alice", "Rust 101")
            .await
            .unwrap();
    }
    let poller = node.poller();
    let mut cycles = 0;
    while store.event_count().unwrap() < 3 {
        poller.poll_once().await;
        cycles += 1;
        assert!(cycles <= 4, "backfill did not converge");
    }
    assert_eq!(cycles, 4);
}

#[tokio::test]
async fn confirmations_hold_back_recent_blocks() {
    let (mut node, store) = node();
    node.poller_config.confirmations = 2;
    node.service.issue("CERT-001", "Alice", "Rust 101").await.unwrap();
    let poller = node.poller();

    poller.poll_once().await;
    assert_eq!(store.event_count().unwrap(), 0);

    node.chain.mine_empty_blocks(2);
    poller.poll_once().await;
    assert_eq!(store.event_count().unwrap(), 1);
}

#[tokio::test]
async fn latest_start_skips_history() {
    let (mut node, store) = node();
    node.poller_config.start_block = StartBlock::Latest;
    node.service.issue("CERT-OLD", "Alice", "Rust 101").await.unwrap();
    node.chain.mine_empty_blocks(1);

    let poller = node.poller();
    poller.poll_once().await;
    node.service.issue("CERT-NEW", "Bob", "Rust 101").await.unwrap();
    poller.poll_once().await;

    let feed = store.list_events(0, 10).unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].subject, "CERT-NEW");
}

#[tokio::test]
async fn admin_add_remove_replay_converges() {
    let (node, store) = node();
    let newcomer = Address::new([0x22; 20]);
    node.service.add_admin(&newcomer).await.unwrap();
    node.service.remove_admin(&newcomer).await.unwrap();

    let poller = node.poller();
    poller.poll_once().await;
    let record = store.find_admin(&newcomer).unwrap().unwrap();
    assert_eq!(record.status, AdminStatus::Removed);

    // Replay history from scratch: the later removal still wins.
    for kind in EventKind::ALL {
        store.put_cursor(kind, 0).unwrap();
    }
    poller.poll_once().await;
    assert_eq!(
        store.find_admin(&newcomer).unwrap().unwrap().status,
        AdminStatus::Removed
    );
    assert_eq!(store.event_count().unwrap(), 2);
}

#[tokio::test]
async fn cursor_survives_restart_without_gaps_or_replays() {
    let dir = tempfile::tempdir().unwrap();
    let chain = Arc::new(certchain_nullables::NullChain::new(admin_key().address()));

    {
        let env: Arc<dyn MirrorStore> =
            Arc::new(LmdbEnvironment::open(dir.path(), 64 << 20).unwrap());
        let node = node_with(chain.clone(), env, gateway_config(Duration::from_secs(5)));
        node.service.issue("CERT-001", "Alice", "Rust 101").await.unwrap();
        node.service.issue("CERT-002", "Bob", "Rust 101").await.unwrap();
        assert_eq!(node.poller().poll_once().await.applied, 2);
    }

    // Emitted while the node was down.
    let offline = node_with(
        chain.clone(),
        Arc::new(NullMirrorStore::new()),
        gateway_config(Duration::from_secs(5)),
    );
    offline.service.issue("CERT-003", "Carol", "Rust 101").await.unwrap();

    let env = Arc::new(LmdbEnvironment::open(dir.path(), 64 << 20).unwrap());
    let node = node_with(chain, env.clone(), gateway_config(Duration::from_secs(5)));
    let report = node.poller().poll_once().await;
    assert_eq!(report.applied, 1);
    assert_eq!(env.event_count().unwrap(), 3);
    let subjects: Vec<_> = env
        .list_events(0, 10)
        .unwrap()
        .into_iter()
        .map(|e| e.subject)
        .collect();
    assert_eq!(subjects, ["CERT-001", "CERT-002", "CERT-003"]);
}

#[tokio::test]
async fn run_loop_stops_on_shutdown() {
    let (node, store) = node();
    let shutdown = ShutdownController::new();
    let handle = tokio::spawn(node.poller().run(shutdown.subscribe()));

    node.service.issue("CERT-001", "Alice", "Rust 101").await.unwrap();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while store.event_count().unwrap() == 0 {
        assert!(tokio::time::Instant::now() < deadline, "poller never applied the event");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    shutdown.shutdown();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("poller did not stop")
        .unwrap();
    assert!(node.metrics.poll_cycles.get() >= 1);
}
