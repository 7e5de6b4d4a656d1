//! Round trips against a real LMDB environment in a temp directory.

use certchain_store::{
    AdminRecord, AdminStatus, AdminStore, AppliedEvent, CertificatePatch, CertificateRecord,
    CertificateStore, CursorStore, EventLogStore, Issuance, MergeOutcome, MetaStore, StoreError,
};
use certchain_store_lmdb::{LmdbEnvironment, CURRENT_SCHEMA_VERSION};
use certchain_types::{
    Address, CertificateId, Digest, EventKind, EventPosition, RecoverableSignature, Timestamp,
    TxHash,
};

const MAP_SIZE: usize = 64 * 1024 * 1024;

fn temp_env() -> (tempfile::TempDir, LmdbEnvironment) {
    let dir = tempfile::tempdir().expect("temp dir");
    let env = LmdbEnvironment::open(dir.path(), MAP_SIZE).expect("open env");
    (dir, env)
}

fn cert_id(s: &str) -> CertificateId {
    s.parse().expect("valid id")
}

fn issuance(byte: u8) -> Issuance {
    Issuance {
        recipient_hash: Digest::new([byte; 32]),
        course_hash: Digest::new([byte.wrapping_add(1); 32]),
        issue_date: Timestamp::new(1_700_000_000),
        signature: RecoverableSignature::new([byte; 65]),
        tx_hash: Some(TxHash::new([0xAA; 32])),
    }
}

fn admin(seed: u8, status: AdminStatus, block: u64) -> AdminRecord {
    AdminRecord {
        address: Address::new([seed; 20]),
        status,
        last_tx_hash: TxHash::new([block as u8; 32]),
        updated_at: Timestamp::new(block),
        position: EventPosition::new(block, 0),
    }
}

#[test]
fn fresh_environment_is_at_current_schema() {
    let (_dir, env) = temp_env();
    assert_eq!(env.get_schema_version().unwrap(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn newer_schema_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    {
        let env = LmdbEnvironment::open(dir.path(), MAP_SIZE).unwrap();
        env.set_schema_version(CURRENT_SCHEMA_VERSION + 1).unwrap();
    }
    assert!(LmdbEnvironment::open(dir.path(), MAP_SIZE).is_err());
}

#[test]
fn insert_rejects_duplicates() {
    let (_dir, env) = temp_env();
    let mut record = CertificateRecord::empty(cert_id("CERT-1"), Timestamp::new(1));
    record.issuance = Some(issuance(1));
    env.insert_certificate(&record).unwrap();

    let mut other = record.clone();
    other.issuance = Some(issuance(2));
    assert!(matches!(
        env.insert_certificate(&other),
        Err(StoreError::Duplicate(_))
    ));
    assert_eq!(env.find_certificate(&record.id).unwrap(), Some(record));
}

#[test]
fn update_creates_then_is_idempotent() {
    let (_dir, env) = temp_env();
    let id = cert_id("CERT-2");
    let patch = CertificatePatch::issued(issuance(3));

    assert_eq!(
        env.update_certificate(&id, &patch, Timestamp::new(10)).unwrap(),
        MergeOutcome::Created
    );
    assert_eq!(
        env.update_certificate(&id, &patch, Timestamp::new(11)).unwrap(),
        MergeOutcome::Unchanged
    );

    let stored = env.find_certificate(&id).unwrap().unwrap();
    assert_eq!(stored.updated_at, Timestamp::new(10));
    assert_eq!(env.certificate_count().unwrap(), 1);
}

#[test]
fn ledger_ids_beyond_the_key_limit_are_stored() {
    let (_dir, env) = temp_env();
    let long = CertificateId::from_ledger("L".repeat(900));
    let longer = CertificateId::from_ledger(format!("{}\u{7}", "L".repeat(900)));
    let short = cert_id("CERT-LONG");

    for (i, id) in [&long, &longer, &short].into_iter().enumerate() {
        let patch = CertificatePatch::issued(issuance(10 + i as u8));
        assert_eq!(
            env.update_certificate(id, &patch, Timestamp::new(5)).unwrap(),
            MergeOutcome::Created
        );
    }

    let stored = env.find_certificate(&long).unwrap().unwrap();
    assert_eq!(stored.id, long);
    assert_eq!(stored.issuance, Some(issuance(10)));
    assert_eq!(env.find_certificate(&longer).unwrap().unwrap().id, longer);
    assert_eq!(env.certificate_count().unwrap(), 3);

    let revoke = CertificatePatch::revoked(Some(TxHash::new([0xBB; 32])));
    assert_eq!(
        env.update_certificate(&long, &revoke, Timestamp::new(6)).unwrap(),
        MergeOutcome::Updated
    );
    assert!(env.find_certificate(&long).unwrap().unwrap().revoked);
}

#[test]
fn revoke_before_issue_converges() {
    let (_dir, env) = temp_env();
    let id = cert_id("CERT-3");
    let revoke_tx = TxHash::new([0x77; 32]);

    env.update_certificate(&id, &CertificatePatch::revoked(Some(revoke_tx)), Timestamp::new(1))
        .unwrap();
    let placeholder = env.find_certificate(&id).unwrap().unwrap();
    assert!(placeholder.revoked);
    assert!(!placeholder.is_issued());

    env.update_certificate(&id, &CertificatePatch::issued(issuance(4)), Timestamp::new(2))
        .unwrap();
    let merged = env.find_certificate(&id).unwrap().unwrap();
    assert!(merged.revoked);
    assert_eq!(merged.revoke_tx_hash, Some(revoke_tx));
    assert_eq!(merged.issuance, Some(issuance(4)));
}

#[test]
fn conflicting_issuance_leaves_record_untouched() {
    let (_dir, env) = temp_env();
    let id = cert_id("CERT-4");
    env.update_certificate(&id, &CertificatePatch::issued(issuance(5)), Timestamp::new(1))
        .unwrap();

    let outcome = env
        .update_certificate(&id, &CertificatePatch::issued(issuance(6)), Timestamp::new(2))
        .unwrap();
    assert_eq!(outcome, MergeOutcome::Conflict);
    assert_eq!(
        env.find_certificate(&id).unwrap().unwrap().issuance,
        Some(issuance(5))
    );
}

#[test]
fn admin_updates_are_position_guarded() {
    let (_dir, env) = temp_env();
    let removed = admin(9, AdminStatus::Removed, 20);
    let added = admin(9, AdminStatus::Active, 10);

    assert_eq!(env.update_admin(&removed).unwrap(), MergeOutcome::Created);
    // The older add arrives late and must not resurrect the admin.
    assert_eq!(env.update_admin(&added).unwrap(), MergeOutcome::Unchanged);

    let stored = env.find_admin(&removed.address).unwrap().unwrap();
    assert_eq!(stored.status, AdminStatus::Removed);
    assert_eq!(env.find_all_admins().unwrap().len(), 1);
}

#[test]
fn event_feed_is_position_ordered_and_deduplicated() {
    let (_dir, env) = temp_env();
    let event = |block: u64, index: u64| AppliedEvent {
        position: EventPosition::new(block, index),
        kind: EventKind::CertificateIssued,
        subject: format!("CERT-{block}-{index}"),
        tx_hash: TxHash::new([block as u8; 32]),
        timestamp: Timestamp::new(block),
    };

    assert!(env.record_event(&event(300, 0)).unwrap());
    assert!(env.record_event(&event(2, 1)).unwrap());
    assert!(env.record_event(&event(2, 0)).unwrap());
    assert!(!env.record_event(&event(2, 0)).unwrap());

    let all = env.list_events(0, 10).unwrap();
    let positions: Vec<_> = all.iter().map(|e| e.position).collect();
    assert_eq!(
        positions,
        vec![
            EventPosition::new(2, 0),
            EventPosition::new(2, 1),
            EventPosition::new(300, 0)
        ]
    );
    assert_eq!(env.event_count().unwrap(), 3);
    assert_eq!(env.list_events(2, 10).unwrap(), vec![event(300, 0)]);
}

#[test]
fn cursors_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    {
        let env = LmdbEnvironment::open(dir.path(), MAP_SIZE).unwrap();
        assert_eq!(env.get_cursor(EventKind::CertificateRevoked).unwrap(), None);
        env.put_cursor(EventKind::CertificateRevoked, 1234).unwrap();
        env.put_cursor(EventKind::AdminAdded, 7).unwrap();
    }
    let env = LmdbEnvironment::open(dir.path(), MAP_SIZE).unwrap();
    assert_eq!(env.get_cursor(EventKind::CertificateRevoked).unwrap(), Some(1234));
    assert_eq!(env.get_cursor(EventKind::AdminAdded).unwrap(), Some(7));
    assert_eq!(env.get_cursor(EventKind::CertificateIssued).unwrap(), None);
}

#[test]
fn meta_roundtrip_and_delete() {
    let (_dir, env) = temp_env();
    env.put_meta("last_repair", b"CERT-9").unwrap();
    assert_eq!(env.get_meta("last_repair").unwrap(), Some(b"CERT-9".to_vec()));
    env.delete_meta("last_repair").unwrap();
    assert_eq!(env.get_meta("last_repair").unwrap(), None);
}
