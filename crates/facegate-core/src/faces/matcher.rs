use std::cmp::Ordering;

use serde::Serialize;
use tracing::debug;

use crate::errors::{AppError, AppResult};
use crate::faces::store::{EnrollmentEntry, EnrollmentSnapshot};
use crate::faces::vector::EmbeddingVector;

pub const DEFAULT_CANDIDATE_LIMIT: usize = 3;

/// Closest enrolled entry for a query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchCandidate {
    pub identity: String,
    pub entry_id: String,
    pub score: f64,
}

/// Cosine similarity of two equal-length vectors.
///
/// Each side is scaled by its largest component first, so very small or very
/// large magnitudes neither underflow nor overflow. All-zero inputs are
/// rejected instead of producing NaN.
pub fn cosine_similarity(lhs: &[f64], rhs: &[f64]) -> AppResult<f64> {
    if lhs.len() != rhs.len() {
        return Err(AppError::DimensionMismatch {
            expected: rhs.len(),
            found: lhs.len(),
        });
    }

    let scale_lhs = max_abs(lhs);
    let scale_rhs = max_abs(rhs);
    if scale_lhs == 0.0 || scale_rhs == 0.0 || !scale_lhs.is_finite() || !scale_rhs.is_finite() {
        return Err(AppError::InvalidVector {
            reason: "zero-magnitude embedding cannot be compared".into(),
        });
    }

    let mut dot = 0.0;
    let mut norm_lhs = 0.0;
    let mut norm_rhs = 0.0;

    for (l, r) in lhs.iter().zip(rhs.iter()) {
        let (l, r) = (l / scale_lhs, r / scale_rhs);
        dot += l * r;
        norm_lhs += l * l;
        norm_rhs += r * r;
    }

    Ok(dot / (norm_lhs.sqrt() * norm_rhs.sqrt()))
}

fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0, |acc: f64, value| acc.max(value.abs()))
}

/// Scores a query against one consistent enrollment snapshot.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityMatcher<'a> {
    snapshot: &'a EnrollmentSnapshot,
}

impl<'a> SimilarityMatcher<'a> {
    pub fn new(snapshot: &'a EnrollmentSnapshot) -> Self {
        Self { snapshot }
    }

    /// 1:N search. Ties keep the earliest enrolled entry.
    pub fn best_match(&self, query: &EmbeddingVector) -> AppResult<MatchCandidate> {
        if self.snapshot.is_empty() {
            return Err(AppError::EmptyStore);
        }
        self.validate_query(query)?;
        best_of(query, self.snapshot.all_entries().iter())?.ok_or(AppError::EmptyStore)
    }

    /// 1:1 score: best-of-N over the identity's own reference embeddings.
    pub fn score_identity(&self, query: &EmbeddingVector, identity: &str) -> AppResult<f64> {
        self.validate_query(query)?;
        best_of(query, self.snapshot.entries_for(identity))?
            .map(|candidate| candidate.score)
            .ok_or_else(|| AppError::NoEnrollmentForIdentity {
                identity: identity.to_string(),
            })
    }

    /// Best score per identity, highest first, at most `limit` identities.
    pub fn ranked(&self, query: &EmbeddingVector, limit: usize) -> AppResult<Vec<MatchCandidate>> {
        if self.snapshot.is_empty() {
            return Err(AppError::EmptyStore);
        }
        self.validate_query(query)?;

        let mut ranked = Vec::new();
        for identity in self.snapshot.identities() {
            if let Some(candidate) = best_of(query, self.snapshot.entries_for(identity))? {
                ranked.push(candidate);
            }
        }
        // stable sort keeps enrollment order among equal scores
        ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        ranked.truncate(limit);
        Ok(ranked)
    }

    fn validate_query(&self, query: &EmbeddingVector) -> AppResult<()> {
        self.snapshot.check_dimension(query)?;
        if query.is_zero() {
            return Err(AppError::InvalidVector {
                reason: "query embedding has zero magnitude".into(),
            });
        }
        Ok(())
    }
}

fn best_of<'e>(
    query: &EmbeddingVector,
    entries: impl Iterator<Item = &'e EnrollmentEntry>,
) -> AppResult<Option<MatchCandidate>> {
    let mut best: Option<MatchCandidate> = None;
    for entry in entries {
        let score = cosine_similarity(query.as_slice(), entry.vector.as_slice())?;
        debug!(identity = %entry.identity, entry = %entry.id, score, "scored enrolled embedding");
        let better = best.as_ref().map_or(true, |current| score > current.score);
        if better {
            best = Some(MatchCandidate {
                identity: entry.identity.clone(),
                entry_id: entry.id.clone(),
                score,
            });
        }
    }
    Ok(best)
}
