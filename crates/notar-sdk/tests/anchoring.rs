use std::sync::{Arc, Barrier};
use std::thread;

use notar_index::{FileCertificateIndex, InMemoryCertificateIndex};
use notar_sdk::{
    AnchoringService, ConfirmationStatus, ErrorKind, IndexConfig, InMemoryLedger, ManualClock,
    NotarConfig, ServiceError, SigningKey, VerificationResult, WalletKeyStore,
};

const HELLO_DIGEST: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

fn funded_ledger(key: &SigningKey) -> Arc<InMemoryLedger> {
    Arc::new(InMemoryLedger::new().with_balance(key.address(), 10_000_000))
}

#[test]
fn hello_is_valid_world_is_not_found() {
    let key = SigningKey::from_bytes([1; 32]);
    let ledger = funded_ledger(&key);
    let service = AnchoringService::builder(
        ledger.clone(),
        Arc::new(key),
        Arc::new(InMemoryCertificateIndex::new()),
    )
    .clock(Arc::new(ManualClock::new()))
    .build();

    let record = service.issue(&b"hello"[..], "alice").unwrap();
    assert_eq!(record.digest.to_hex(), HELLO_DIGEST);
    assert_eq!(record.to_string(), "Certificate - alice (2cf24dba5f...)");

    let hello = service.verify(&b"hello"[..]).unwrap();
    assert_eq!(hello.status(), "valid");
    assert_eq!(hello.digest().to_hex(), HELLO_DIGEST);

    let world = service.verify(&b"world"[..]).unwrap();
    assert_eq!(world.status(), "not found");
}

#[test]
fn concurrent_issue_of_same_bytes_spends_one_transaction() {
    let key = SigningKey::from_bytes([2; 32]);
    let ledger = funded_ledger(&key);
    let service = Arc::new(
        AnchoringService::builder(
            ledger.clone(),
            Arc::new(key),
            Arc::new(InMemoryCertificateIndex::new()),
        )
        .clock(Arc::new(ManualClock::new()))
        .build(),
    );

    let threads = 6;
    let barrier = Arc::new(Barrier::new(threads));
    let handles: Vec<_> = (0..threads)
        .map(|i| {
            let service = Arc::clone(&service);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                service.issue(&b"same artifact"[..], &format!("owner-{i}"))
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(err.kind(), ErrorKind::Duplicate, "{err}");
    }
    assert_eq!(ledger.submitted().len(), 1);
    assert_eq!(service.list().unwrap().len(), 1);
}

#[test]
fn ambiguous_acknowledgement_records_local_signature() {
    let key = SigningKey::from_bytes([3; 32]);
    let ledger = funded_ledger(&key);
    ledger.acknowledge_ambiguously(1);
    let service = AnchoringService::builder(
        ledger.clone(),
        Arc::new(key),
        Arc::new(InMemoryCertificateIndex::new()),
    )
    .clock(Arc::new(ManualClock::new()))
    .build();

    let record = service.issue(&b"ambiguous"[..], "carol").unwrap();
    assert_eq!(
        record.transaction_signature,
        Some(ledger.submitted()[0].signature)
    );
    // Display of the status used for operator output.
    assert_eq!(ConfirmationStatus::LocallySigned.to_string(), "locally_signed");
}

#[test]
fn file_index_survives_service_restart() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("certs.log");
    let key = SigningKey::from_bytes([4; 32]);
    let ledger = funded_ledger(&key);

    let signature = {
        let service = AnchoringService::builder(
            ledger.clone(),
            Arc::new(SigningKey::from_bytes([4; 32])),
            Arc::new(FileCertificateIndex::open(&log).unwrap()),
        )
        .clock(Arc::new(ManualClock::new()))
        .build();
        service
            .issue(&b"diploma.pdf contents"[..], "dave")
            .unwrap()
            .transaction_signature
    };

    let service = AnchoringService::builder(
        ledger.clone(),
        Arc::new(key),
        Arc::new(FileCertificateIndex::open(&log).unwrap()),
    )
    .clock(Arc::new(ManualClock::new()))
    .build();

    match service.verify(&b"diploma.pdf contents"[..]).unwrap() {
        VerificationResult::Valid {
            owner,
            signature: sig,
            ..
        } => {
            assert_eq!(owner, "dave");
            assert_eq!(sig, signature);
        }
        other => panic!("expected valid, got {other:?}"),
    }

    let err = service
        .issue(&b"diploma.pdf contents"[..], "eve")
        .unwrap_err();
    assert!(matches!(err, ServiceError::AlreadyAnchored { .. }));
    assert_eq!(ledger.submitted().len(), 1);
}

#[test]
fn from_config_loads_wallet_and_index() {
    let dir = tempfile::tempdir().unwrap();
    let keypair = dir.path().join("id.json");
    let wallet = WalletKeyStore::generate();
    wallet.write_keypair_file(&keypair).unwrap();

    let config = NotarConfig {
        keypair_path: keypair,
        index: IndexConfig::Memory,
        ..NotarConfig::default()
    };
    let service = AnchoringService::from_config(&config).unwrap();
    assert_eq!(service.address(), wallet.address());

    // Verification never touches the ledger.
    assert!(!service.verify(&b"anything"[..]).unwrap().is_valid());
}

#[test]
fn from_config_reports_missing_keypair_as_input_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = NotarConfig {
        keypair_path: dir.path().join("absent.json"),
        index: IndexConfig::Memory,
        ..NotarConfig::default()
    };
    let err = AnchoringService::from_config(&config).unwrap_err();
    assert!(matches!(err, ServiceError::KeyLoad(_)));
    assert_eq!(err.kind(), ErrorKind::Input);
}
