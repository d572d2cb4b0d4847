use serde::Serialize;
use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::faces::repository::EnrollmentRepository;
use crate::faces::store::{EmbeddingStore, EnrollmentEntry, EnrollmentSnapshot};
use crate::faces::vector::EmbeddingVector;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnrollmentMode {
    /// Add the new embeddings next to the identity's existing ones.
    #[default]
    Append,
    /// Drop the identity's existing embeddings first.
    Replace,
}

#[derive(Debug, Clone)]
pub struct EnrollmentRequest {
    pub identity: String,
    pub vectors: Vec<EmbeddingVector>,
    pub source_tag: Option<String>,
    pub mode: EnrollmentMode,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EnrollmentRecord {
    pub id: String,
    pub embedding_len: usize,
    pub source_tag: Option<String>,
    pub created_at: String,
}

#[derive(Debug)]
pub struct EnrollmentOutcome {
    pub identity: String,
    pub added: Vec<EnrollmentRecord>,
    pub replaced: usize,
    pub total_for_identity: usize,
    pub logs: Vec<String>,
}

#[derive(Debug)]
pub struct RemovalOutcome {
    pub identity: String,
    pub removed: usize,
    pub logs: Vec<String>,
}

#[derive(Debug)]
pub struct RebuildOutcome {
    pub identities: usize,
    pub total_entries: usize,
}

/// Builds the live store from durable rows.
pub fn load_store<R: EnrollmentRepository + ?Sized>(repository: &R) -> AppResult<EmbeddingStore> {
    let entries = repository.load_all()?;
    let store = EmbeddingStore::from_entries(entries)?;
    let stats = store.stats();
    info!(
        identities = stats.identities,
        entries = stats.total_entries,
        dimension = ?stats.dimension,
        "loaded enrollment store"
    );
    Ok(store)
}

/// Persists the identity's full row set, then publishes it to `store`.
///
/// The durable write happens while the store's writer lock is held, so a
/// failed write never becomes visible to matching.
pub fn enroll_identity<R: EnrollmentRepository + ?Sized>(
    request: EnrollmentRequest,
    store: &EmbeddingStore,
    repository: &R,
) -> AppResult<EnrollmentOutcome> {
    validate_identity(&request.identity)?;
    if request.vectors.is_empty() {
        return Err(AppError::EmptyVector);
    }

    let identity = request.identity.clone();

    store.update(|current| {
        let mut logs = Vec::new();
        // existing rows keep their ids, so the merge leaves them in place
        let mut rows: Vec<EnrollmentEntry> = match request.mode {
            EnrollmentMode::Append => current.entries_for(&identity).cloned().collect(),
            EnrollmentMode::Replace => Vec::new(),
        };
        let replaced = match request.mode {
            EnrollmentMode::Append => 0,
            EnrollmentMode::Replace => current.entries_for(&identity).count(),
        };

        let mut added = Vec::with_capacity(request.vectors.len());
        for vector in request.vectors {
            let entry = EnrollmentEntry::new(identity.clone(), vector, request.source_tag.clone());
            added.push(EnrollmentRecord {
                id: entry.id.clone(),
                embedding_len: entry.vector.dim(),
                source_tag: entry.source_tag.clone(),
                created_at: entry.created_at.to_rfc3339(),
            });
            rows.push(entry);
        }

        let next = current.with_identity_replaced(&identity, rows.clone())?;
        logs.push(format!(
            "Validated {} embedding(s) with length {}",
            added.len(),
            next.dimension().unwrap_or_default()
        ));

        repository.replace_identity(&identity, &rows)?;
        logs.push(format!(
            "Persisted {} row(s) for identity {}",
            rows.len(),
            identity
        ));
        info!(
            identity = %identity,
            added = added.len(),
            replaced,
            "enrolled embeddings"
        );

        let outcome = EnrollmentOutcome {
            identity: identity.clone(),
            added,
            replaced,
            total_for_identity: rows.len(),
            logs,
        };
        Ok((next, outcome))
    })
}

/// Removes every embedding of `identity`; unknown identities succeed with zero.
pub fn remove_identity<R: EnrollmentRepository + ?Sized>(
    identity: &str,
    store: &EmbeddingStore,
    repository: &R,
) -> AppResult<RemovalOutcome> {
    validate_identity(identity)?;

    store.update(|current| {
        let (next, removed) = current.without_identity(identity);
        repository.replace_identity(identity, &[])?;
        info!(identity = %identity, removed, "removed enrollment");
        let logs = vec![format!(
            "Removed {removed} embedding(s) for identity {identity}"
        )];
        Ok((
            next,
            RemovalOutcome {
                identity: identity.to_string(),
                removed,
                logs,
            },
        ))
    })
}

/// Full rebuild: persists every row, then swaps the new store in one step.
pub fn rebuild_store<R: EnrollmentRepository + ?Sized>(
    entries: Vec<EnrollmentEntry>,
    store: &EmbeddingStore,
    repository: &R,
) -> AppResult<RebuildOutcome> {
    for entry in &entries {
        validate_identity(&entry.identity)?;
    }
    let snapshot = EnrollmentSnapshot::from_entries(entries)?;

    store.update(|_current| {
        repository.replace_all(snapshot.all_entries())?;
        let stats = snapshot.stats();
        info!(
            identities = stats.identities,
            entries = stats.total_entries,
            "rebuilt enrollment store"
        );
        let outcome = RebuildOutcome {
            identities: stats.identities,
            total_entries: stats.total_entries,
        };
        Ok((snapshot, outcome))
    })
}

pub fn validate_identity(identity: &str) -> AppResult<()> {
    if identity.is_empty() {
        return Err(AppError::InvalidIdentity {
            identity: identity.to_string(),
            message: "identity cannot be empty".into(),
        });
    }

    if !identity
        .chars()
        .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.' | '@'))
    {
        return Err(AppError::InvalidIdentity {
            identity: identity.to_string(),
            message: "use ASCII letters, numbers, '-', '_', '.' or '@' only".into(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faces::repository::MemoryEnrollmentRepository;

    struct FailingRepository;

    impl EnrollmentRepository for FailingRepository {
        fn load_all(&self) -> AppResult<Vec<EnrollmentEntry>> {
            Ok(Vec::new())
        }

        fn replace_identity(&self, _identity: &str, _entries: &[EnrollmentEntry]) -> AppResult<()> {
            Err(AppError::persistence("enrollment write", "backing store offline"))
        }

        fn replace_all(&self, _entries: &[EnrollmentEntry]) -> AppResult<()> {
            Err(AppError::persistence("enrollment rebuild", "backing store offline"))
        }
    }

    fn vector(values: &[f64]) -> EmbeddingVector {
        EmbeddingVector::new(values.to_vec()).unwrap()
    }

    fn request(identity: &str, vectors: Vec<EmbeddingVector>, mode: EnrollmentMode) -> EnrollmentRequest {
        EnrollmentRequest {
            identity: identity.into(),
            vectors,
            source_tag: Some("upload".into()),
            mode,
        }
    }

    #[test]
    fn enroll_persists_and_publishes() {
        let store = EmbeddingStore::new();
        let repo = MemoryEnrollmentRepository::new();

        let outcome = enroll_identity(
            request("alice", vec![vector(&[1.0, 0.0]), vector(&[0.9, 0.1])], EnrollmentMode::Append),
            &store,
            &repo,
        )
        .unwrap();

        assert_eq!(outcome.added.len(), 2);
        assert_eq!(outcome.total_for_identity, 2);
        assert_eq!(store.entries_for("alice").len(), 2);
        assert_eq!(repo.load_all().unwrap().len(), 2);
        assert!(!outcome.logs.is_empty());
    }

    #[test]
    fn replace_mode_swaps_identity_rows() {
        let store = EmbeddingStore::new();
        let repo = MemoryEnrollmentRepository::new();
        enroll_identity(
            request("alice", vec![vector(&[1.0, 0.0])], EnrollmentMode::Append),
            &store,
            &repo,
        )
        .unwrap();
        enroll_identity(
            request("bob", vec![vector(&[0.0, 1.0])], EnrollmentMode::Append),
            &store,
            &repo,
        )
        .unwrap();

        let outcome = enroll_identity(
            request("alice", vec![vector(&[0.6, 0.8])], EnrollmentMode::Replace),
            &store,
            &repo,
        )
        .unwrap();
        assert_eq!(outcome.replaced, 1);

        let alice = store.entries_for("alice");
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].vector.as_slice(), &[0.6, 0.8]);
        assert_eq!(store.entries_for("bob").len(), 1);
        assert_eq!(repo.load_all().unwrap().len(), 2);
    }

    #[test]
    fn append_keeps_enrollment_order_in_store_and_repository() {
        let store = EmbeddingStore::new();
        let repo = MemoryEnrollmentRepository::new();
        for (identity, values) in [("alice", [1.0, 0.0]), ("bob", [0.0, 1.0]), ("alice", [0.9, 0.1])] {
            enroll_identity(
                request(identity, vec![vector(&values)], EnrollmentMode::Append),
                &store,
                &repo,
            )
            .unwrap();
        }

        let order: Vec<(String, Vec<f64>)> = store
            .all_entries()
            .into_iter()
            .map(|entry| (entry.identity, entry.vector.into_inner()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("alice".to_string(), vec![1.0, 0.0]),
                ("bob".to_string(), vec![0.0, 1.0]),
                ("alice".to_string(), vec![0.9, 0.1]),
            ]
        );
        assert_eq!(repo.load_all().unwrap(), store.all_entries());
    }

    #[test]
    fn failed_write_leaves_store_unchanged() {
        let store = EmbeddingStore::new();
        store.upsert("alice", vector(&[1.0, 0.0]), None).unwrap();

        let err = enroll_identity(
            request("alice", vec![vector(&[0.0, 1.0])], EnrollmentMode::Replace),
            &store,
            &FailingRepository,
        )
        .unwrap_err();
        assert!(err.is_persistence());

        let alice = store.entries_for("alice");
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].vector.as_slice(), &[1.0, 0.0]);
    }

    #[test]
    fn dimension_mismatch_is_rejected_before_write() {
        let store = EmbeddingStore::new();
        let repo = MemoryEnrollmentRepository::new();
        enroll_identity(
            request("alice", vec![vector(&[1.0, 0.0])], EnrollmentMode::Append),
            &store,
            &repo,
        )
        .unwrap();

        let err = enroll_identity(
            request("bob", vec![vector(&[1.0, 0.0, 0.0])], EnrollmentMode::Append),
            &store,
            &repo,
        )
        .unwrap_err();
        assert!(matches!(err, AppError::DimensionMismatch { .. }));
        assert_eq!(repo.load_all().unwrap().len(), 1);
    }

    #[test]
    fn removal_is_idempotent() {
        let store = EmbeddingStore::new();
        let repo = MemoryEnrollmentRepository::new();
        enroll_identity(
            request("alice", vec![vector(&[1.0, 0.0])], EnrollmentMode::Append),
            &store,
            &repo,
        )
        .unwrap();

        assert_eq!(remove_identity("alice", &store, &repo).unwrap().removed, 1);
        assert_eq!(remove_identity("alice", &store, &repo).unwrap().removed, 0);
        assert!(repo.load_all().unwrap().is_empty());
    }

    #[test]
    fn rebuild_replaces_everything_or_nothing() {
        let store = EmbeddingStore::new();
        store.upsert("alice", vector(&[1.0, 0.0]), None).unwrap();

        let rows = vec![
            EnrollmentEntry::new("bob", vector(&[0.0, 1.0]), None),
            EnrollmentEntry::new("carol", vector(&[1.0, 1.0]), None),
        ];
        assert!(rebuild_store(rows.clone(), &store, &FailingRepository).is_err());
        assert_eq!(store.snapshot().identities(), vec!["alice"]);

        let repo = MemoryEnrollmentRepository::new();
        let outcome = rebuild_store(rows, &store, &repo).unwrap();
        assert_eq!(outcome.identities, 2);
        assert_eq!(store.snapshot().identities(), vec!["bob", "carol"]);
    }

    #[test]
    fn load_store_reads_repository() {
        let repo = MemoryEnrollmentRepository::with_rows(vec![EnrollmentEntry::new(
            "alice",
            vector(&[1.0, 0.0]),
            None,
        )]);
        let store = load_store(&repo).unwrap();
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn identity_names_are_validated() {
        assert!(validate_identity("alice.smith@corp").is_ok());
        assert!(validate_identity("user_42").is_ok());
        assert!(matches!(
            validate_identity(""),
            Err(AppError::InvalidIdentity { .. })
        ));
        assert!(matches!(
            validate_identity("../etc/passwd"),
            Err(AppError::InvalidIdentity { .. })
        ));
    }
}
