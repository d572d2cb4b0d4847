use std::sync::Arc;
use std::thread;

use chrono::Duration;
use facegate_core::directory::StaticDirectory;
use facegate_core::faces::{
    cosine_similarity, enroll_identity, load_store, remove_identity, EmbeddingStore,
    EmbeddingVector, EnrollmentMode, EnrollmentRequest, FilesystemEnrollmentRepository,
};
use facegate_core::tokens::{FilesystemTokenRepository, ManualClock, TokenLedger, TokenState};
use facegate_core::{AppError, AuthCoordinator, AuthDecision, AuthPolicy, DecisionSummary};
use tempfile::TempDir;

const DIM: usize = 512;

fn basis(index: usize) -> EmbeddingVector {
    let mut values = vec![0.0; DIM];
    values[index] = 1.0;
    EmbeddingVector::new(values).unwrap()
}

fn equidistant(a: usize, b: usize) -> EmbeddingVector {
    let mut values = vec![0.0; DIM];
    values[a] = 1.0;
    values[b] = 1.0;
    values[DIM - 1] = 1.0;
    EmbeddingVector::new(values).unwrap()
}

struct Harness {
    _tmp: TempDir,
    enrollments: FilesystemEnrollmentRepository,
    clock: Arc<ManualClock>,
    coordinator: AuthCoordinator,
}

fn harness() -> Harness {
    let tmp = TempDir::new().unwrap();
    let enrollments = FilesystemEnrollmentRepository::new(tmp.path().join("enrollments.json"), None);
    let store = Arc::new(load_store(&enrollments).unwrap());
    let clock = Arc::new(ManualClock::default());
    let ledger = Arc::new(TokenLedger::with_clock(
        Arc::new(FilesystemTokenRepository::new(
            tmp.path().join("tokens.json"),
            None,
        )),
        clock.clone(),
    ));
    let coordinator = AuthCoordinator::new(
        store,
        ledger,
        Arc::new(StaticDirectory::new()),
        AuthPolicy::default(),
    );
    Harness {
        _tmp: tmp,
        enrollments,
        clock,
        coordinator,
    }
}

fn enroll(harness: &Harness, identity: &str, vector: EmbeddingVector) {
    enroll_identity(
        EnrollmentRequest {
            identity: identity.into(),
            vectors: vec![vector],
            source_tag: Some(format!("{identity}.jpg")),
            mode: EnrollmentMode::Append,
        },
        harness.coordinator.store(),
        &harness.enrollments,
    )
    .unwrap();
}

#[test]
fn self_similarity_is_one() {
    let v = equidistant(3, 9);
    let score = cosine_similarity(v.as_slice(), v.as_slice()).unwrap();
    assert!((score - 1.0).abs() < 1e-12);
}

#[test]
fn recognize_accepts_exact_match_and_rejects_equidistant_noise() {
    let harness = harness();
    enroll(&harness, "u1", basis(0));
    enroll(&harness, "u2", basis(1));

    match harness.coordinator.recognize(&basis(0)).unwrap() {
        AuthDecision::Accepted {
            identity,
            confidence,
            ..
        } => {
            assert_eq!(identity, "u1");
            assert!((confidence - 100.0).abs() < 1e-9);
        }
        other => panic!("unexpected decision: {other:?}"),
    }

    match harness.coordinator.recognize(&equidistant(0, 1)).unwrap() {
        AuthDecision::RejectedLowConfidence {
            confidence,
            required,
            ..
        } => {
            assert!(confidence < required);
            assert_eq!(required, 70.0);
        }
        other => panic!("unexpected decision: {other:?}"),
    }
}

#[test]
fn verify_reports_mismatch_when_someone_else_is_closer() {
    let harness = harness();
    enroll(&harness, "u1", basis(0));
    enroll(&harness, "u2", basis(1));

    let decision = harness.coordinator.verify("u2", &basis(0)).unwrap();
    match &decision {
        AuthDecision::RejectedIdentityMismatch {
            claimed, predicted, ..
        } => {
            assert_eq!(claimed, "u2");
            assert_eq!(predicted, "u1");
        }
        other => panic!("unexpected decision: {other:?}"),
    }
    assert_eq!(DecisionSummary::from(&decision).status, 403);

    let accepted = harness.coordinator.verify("u1", &basis(0)).unwrap();
    assert!(accepted.is_accepted());
}

#[test]
fn empty_store_is_a_rejection_not_a_crash() {
    let harness = harness();
    enroll(&harness, "u1", basis(0));
    remove_identity("u1", harness.coordinator.store(), &harness.enrollments).unwrap();

    assert_eq!(
        harness.coordinator.recognize(&basis(0)).unwrap(),
        AuthDecision::RejectedNoEnrollment { claimed: None }
    );
    assert_eq!(harness.coordinator.store_info().total_entries, 0);
}

#[test]
fn enrollment_survives_reload() {
    let harness = harness();
    enroll(&harness, "u1", basis(0));
    enroll(&harness, "u1", basis(2));
    enroll(&harness, "u2", basis(1));

    let reloaded = load_store(&harness.enrollments).unwrap();
    let stats = reloaded.stats();
    assert_eq!(stats.identities, 2);
    assert_eq!(stats.total_entries, 3);
    assert_eq!(stats.dimension, Some(DIM));
    assert_eq!(stats.samples_per_identity.get("u1"), Some(&2));
}

#[test]
fn dimension_contamination_is_refused() {
    let harness = harness();
    enroll(&harness, "u1", basis(0));

    let err = enroll_identity(
        EnrollmentRequest {
            identity: "u2".into(),
            vectors: vec![EmbeddingVector::new(vec![1.0; 128]).unwrap()],
            source_tag: None,
            mode: EnrollmentMode::Append,
        },
        harness.coordinator.store(),
        &harness.enrollments,
    )
    .unwrap_err();
    match err {
        AppError::DimensionMismatch { expected, found } => {
            assert_eq!(expected, DIM);
            assert_eq!(found, 128);
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert_eq!(load_store(&harness.enrollments).unwrap().stats().identities, 1);
}

#[test]
fn token_lifecycle_through_coordinator() {
    let harness = harness();
    enroll(&harness, "u1", basis(0));

    let decision = harness.coordinator.recognize(&basis(0)).unwrap();
    let token = decision.token().cloned().expect("accepted decision");

    let info = harness
        .coordinator
        .validate_token(&token.token_id)
        .unwrap()
        .unwrap();
    assert_eq!(info.identity, "u1");
    assert_eq!(info.confidence, token.confidence);

    assert_eq!(harness.coordinator.list_active_tokens("u1").unwrap().len(), 1);
    assert!(harness.coordinator.logout(&token.token_id).unwrap());
    assert!(!harness.coordinator.logout(&token.token_id).unwrap());
    assert!(harness
        .coordinator
        .validate_token(&token.token_id)
        .unwrap()
        .is_none());
    assert!(harness.coordinator.list_active_tokens("u1").unwrap().is_empty());
}

#[test]
fn expired_tokens_drop_out_and_sweep_is_idempotent() {
    let harness = harness();
    enroll(&harness, "u1", basis(0));

    let first = harness.coordinator.recognize(&basis(0)).unwrap();
    let second = harness.coordinator.recognize(&basis(0)).unwrap();
    let first = first.token().cloned().unwrap();
    let second = second.token().cloned().unwrap();

    harness.clock.advance(Duration::hours(25));
    assert!(harness
        .coordinator
        .validate_token(&first.token_id)
        .unwrap()
        .is_none());
    assert!(harness.coordinator.list_active_tokens("u1").unwrap().is_empty());
    assert_eq!(harness.coordinator.sweep_expired_tokens().unwrap(), 0);

    let audit = harness
        .coordinator
        .inspect_token(&second.token_id)
        .unwrap()
        .unwrap();
    assert_eq!(audit.state, TokenState::Expired);
}

#[test]
fn concurrent_issuance_keeps_every_row() {
    let harness = harness();
    enroll(&harness, "u1", basis(0));
    let ledger = harness.coordinator.ledger().clone();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                (0..5)
                    .map(|_| ledger.issue("u1", 90.0, Duration::hours(1)).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut issued = Vec::new();
    for handle in handles {
        issued.extend(handle.join().unwrap());
    }
    assert_eq!(issued.len(), 40);
    assert_eq!(ledger.active_tokens_for("u1").unwrap().len(), 40);
    for token in &issued {
        assert!(ledger.validate(&token.token_id).unwrap().is_some());
    }
}

#[test]
fn ledgers_sharing_one_token_file_never_lose_issued_tokens() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("tokens.json");

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let ledger = TokenLedger::new(Arc::new(FilesystemTokenRepository::new(&path, None)));
            thread::spawn(move || {
                (0..30)
                    .map(|_| ledger.issue("u1", 90.0, Duration::hours(1)).unwrap())
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let mut issued = Vec::new();
    for handle in handles {
        issued.extend(handle.join().unwrap());
    }

    let reader = TokenLedger::new(Arc::new(FilesystemTokenRepository::new(&path, None)));
    assert_eq!(issued.len(), 60);
    for token in &issued {
        assert!(reader.validate(&token.token_id).unwrap().is_some());
    }
    assert_eq!(reader.active_tokens_for("u1").unwrap().len(), 60);
}
