use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{AppError, AppResult};
use crate::faces::vector::EmbeddingVector;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EnrollmentEntry {
    pub id: String,
    pub identity: String,
    #[serde(rename = "embedding")]
    pub vector: EmbeddingVector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_tag: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl EnrollmentEntry {
    pub fn new(
        identity: impl Into<String>,
        vector: EmbeddingVector,
        source_tag: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            identity: identity.into(),
            vector,
            source_tag,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct StoreStats {
    pub identities: usize,
    pub total_entries: usize,
    pub dimension: Option<usize>,
    pub samples_per_identity: BTreeMap<String, usize>,
}

/// Immutable view of every enrolled embedding, in enrollment order.
///
/// The dimension is fixed by the first entry; an empty snapshot accepts any
/// dimension on its next insert.
#[derive(Debug, Clone, Default)]
pub struct EnrollmentSnapshot {
    dimension: Option<usize>,
    entries: Vec<EnrollmentEntry>,
}

impl EnrollmentSnapshot {
    pub fn from_entries(entries: Vec<EnrollmentEntry>) -> AppResult<Self> {
        let dimension = entries.first().map(|entry| entry.vector.dim());
        if let Some(expected) = dimension {
            if let Some(bad) = entries.iter().find(|entry| entry.vector.dim() != expected) {
                return Err(AppError::DimensionMismatch {
                    expected,
                    found: bad.vector.dim(),
                });
            }
        }
        Ok(Self { dimension, entries })
    }

    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn all_entries(&self) -> &[EnrollmentEntry] {
        &self.entries
    }

    pub fn entries_for<'a>(
        &'a self,
        identity: &'a str,
    ) -> impl Iterator<Item = &'a EnrollmentEntry> + 'a {
        self.entries
            .iter()
            .filter(move |entry| entry.identity == identity)
    }

    pub fn contains_identity(&self, identity: &str) -> bool {
        self.entries_for(identity).next().is_some()
    }

    /// Identities in order of their first enrollment.
    pub fn identities(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for entry in &self.entries {
            if !seen.contains(&entry.identity.as_str()) {
                seen.push(&entry.identity);
            }
        }
        seen
    }

    pub fn check_dimension(&self, vector: &EmbeddingVector) -> AppResult<()> {
        match self.dimension {
            Some(expected) if expected != vector.dim() => Err(AppError::DimensionMismatch {
                expected,
                found: vector.dim(),
            }),
            _ => Ok(()),
        }
    }

    pub fn with_entry(&self, entry: EnrollmentEntry) -> AppResult<Self> {
        self.check_dimension(&entry.vector)?;
        let mut entries = self.entries.clone();
        let dimension = Some(entry.vector.dim());
        entries.push(entry);
        Ok(Self { dimension, entries })
    }

    /// Returns the snapshot without `identity` and the number of entries dropped.
    pub fn without_identity(&self, identity: &str) -> (Self, usize) {
        let entries: Vec<EnrollmentEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.identity != identity)
            .cloned()
            .collect();
        let removed = self.entries.len() - entries.len();
        let dimension = entries.first().map(|entry| entry.vector.dim());
        (Self { dimension, entries }, removed)
    }

    /// Makes `replacement` the full row set of `identity` in one step.
    ///
    /// Rows already present keep their position; only new rows go to the end.
    pub fn with_identity_replaced(
        &self,
        identity: &str,
        replacement: Vec<EnrollmentEntry>,
    ) -> AppResult<Self> {
        if let Some(stray) = replacement.iter().find(|entry| entry.identity != identity) {
            return Err(AppError::InvalidIdentity {
                identity: stray.identity.clone(),
                message: format!("entry does not belong to '{identity}'"),
            });
        }
        let mut entries = self.entries.clone();
        merge_identity_rows(&mut entries, identity, &replacement);
        Self::from_entries(entries)
    }

    pub fn stats(&self) -> StoreStats {
        let mut samples_per_identity = BTreeMap::new();
        for entry in &self.entries {
            *samples_per_identity
                .entry(entry.identity.clone())
                .or_insert(0usize) += 1;
        }
        StoreStats {
            identities: samples_per_identity.len(),
            total_entries: self.entries.len(),
            dimension: self.dimension,
            samples_per_identity,
        }
    }
}

/// Rewrites the rows of `identity` to match `replacement`, keyed by entry id.
pub(crate) fn merge_identity_rows(
    rows: &mut Vec<EnrollmentEntry>,
    identity: &str,
    replacement: &[EnrollmentEntry],
) {
    rows.retain(|row| {
        row.identity != identity || replacement.iter().any(|entry| entry.id == row.id)
    });
    for entry in replacement {
        match rows.iter_mut().find(|row| row.id == entry.id) {
            Some(row) => *row = entry.clone(),
            None => rows.push(entry.clone()),
        }
    }
}

/// Shared, read-mostly collection of enrolled embeddings.
///
/// Readers take a cheap `Arc` snapshot and never block on writers for longer
/// than the pointer swap. Writers are serialised and always publish a fully
/// built snapshot.
#[derive(Debug, Default)]
pub struct EmbeddingStore {
    current: RwLock<Arc<EnrollmentSnapshot>>,
    writer: Mutex<()>,
}

impl EmbeddingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<EnrollmentEntry>) -> AppResult<Self> {
        let snapshot = EnrollmentSnapshot::from_entries(entries)?;
        Ok(Self {
            current: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
        })
    }

    pub fn snapshot(&self) -> Arc<EnrollmentSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn upsert(
        &self,
        identity: &str,
        vector: EmbeddingVector,
        source_tag: Option<String>,
    ) -> AppResult<EnrollmentEntry> {
        self.update(|current| {
            let entry = EnrollmentEntry::new(identity, vector, source_tag);
            let next = current.with_entry(entry.clone())?;
            Ok((next, entry))
        })
    }

    /// Removes every entry for `identity`; unknown identities are a no-op.
    pub fn remove_all(&self, identity: &str) -> usize {
        let removed = self.update(|current| {
            let (next, removed) = current.without_identity(identity);
            Ok((next, removed))
        });
        removed.unwrap_or(0)
    }

    pub fn all_entries(&self) -> Vec<EnrollmentEntry> {
        self.snapshot().all_entries().to_vec()
    }

    pub fn entries_for(&self, identity: &str) -> Vec<EnrollmentEntry> {
        self.snapshot().entries_for(identity).cloned().collect()
    }

    pub fn stats(&self) -> StoreStats {
        self.snapshot().stats()
    }

    /// Swaps in a completely rebuilt snapshot.
    pub fn replace(&self, snapshot: EnrollmentSnapshot) {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        self.publish(snapshot);
    }

    /// Runs `build` under the writer lock and publishes its snapshot only if it
    /// succeeds, so a failed durable write leaves the live store untouched.
    pub fn update<T, F>(&self, build: F) -> AppResult<T>
    where
        F: FnOnce(&EnrollmentSnapshot) -> AppResult<(EnrollmentSnapshot, T)>,
    {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let current = self.snapshot();
        let (next, value) = build(current.as_ref())?;
        self.publish(next);
        Ok(value)
    }

    fn publish(&self, snapshot: EnrollmentSnapshot) {
        let mut slot = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *slot = Arc::new(snapshot);
    }
}
