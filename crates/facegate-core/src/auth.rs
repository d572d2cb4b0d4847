//! Authentication flows: recognition, verification and token passthroughs.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::directory::{IdentityDirectory, IdentityProfile};
use crate::errors::{AppError, AppResult};
use crate::faces::extractor::EmbeddingExtractor;
use crate::faces::gate::{evaluate, to_percentage, GateDecision, DEFAULT_THRESHOLD};
use crate::faces::matcher::{SimilarityMatcher, DEFAULT_CANDIDATE_LIMIT};
use crate::faces::store::{EmbeddingStore, StoreStats};
use crate::faces::vector::EmbeddingVector;
use crate::tokens::ledger::{TokenAudit, TokenLedger};
use crate::tokens::token::{Token, TokenInfo};

pub const DEFAULT_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Per-deployment knobs for the flows.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthPolicy {
    /// 0-100 scale.
    pub recognition_threshold: f64,
    /// 0-100 scale.
    pub verification_threshold: f64,
    pub token_ttl: Duration,
    pub candidate_limit: usize,
}

impl Default for AuthPolicy {
    fn default() -> Self {
        Self {
            recognition_threshold: DEFAULT_THRESHOLD,
            verification_threshold: DEFAULT_THRESHOLD,
            token_ttl: Duration::seconds(DEFAULT_TOKEN_TTL_SECS),
            candidate_limit: DEFAULT_CANDIDATE_LIMIT,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthDecision {
    Accepted {
        identity: String,
        confidence: f64,
        token: Token,
        profile: IdentityProfile,
    },
    /// `best_identity` is informational; the caller is not that identity.
    RejectedLowConfidence {
        best_identity: String,
        confidence: f64,
        required: f64,
        profile: IdentityProfile,
    },
    RejectedIdentityMismatch {
        claimed: String,
        predicted: String,
        confidence: f64,
    },
    /// Nobody is enrolled (recognition) or the claimed identity has no
    /// reference embeddings (verification).
    RejectedNoEnrollment { claimed: Option<String> },
}

impl AuthDecision {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AuthDecision::Accepted { .. })
    }

    pub fn token(&self) -> Option<&Token> {
        match self {
            AuthDecision::Accepted { token, .. } => Some(token),
            _ => None,
        }
    }
}

/// One identity from a diagnostic ranking.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedCandidate {
    pub identity: String,
    pub display_name: String,
    pub score: f64,
    pub confidence: f64,
}

/// Wires matching, gating and the token ledger together. Shared across
/// request threads; every collaborator is injected.
pub struct AuthCoordinator {
    store: Arc<EmbeddingStore>,
    ledger: Arc<TokenLedger>,
    directory: Arc<dyn IdentityDirectory>,
    policy: AuthPolicy,
}

impl AuthCoordinator {
    pub fn new(
        store: Arc<EmbeddingStore>,
        ledger: Arc<TokenLedger>,
        directory: Arc<dyn IdentityDirectory>,
        policy: AuthPolicy,
    ) -> Self {
        Self {
            store,
            ledger,
            directory,
            policy,
        }
    }

    pub fn store(&self) -> &Arc<EmbeddingStore> {
        &self.store
    }

    pub fn ledger(&self) -> &Arc<TokenLedger> {
        &self.ledger
    }

    pub fn policy(&self) -> &AuthPolicy {
        &self.policy
    }

    /// 1:N recognition against every enrolled identity.
    pub fn recognize(&self, query: &EmbeddingVector) -> AppResult<AuthDecision> {
        let snapshot = self.store.snapshot();
        let matcher = SimilarityMatcher::new(&snapshot);

        let best = match matcher.best_match(query) {
            Ok(best) => best,
            Err(AppError::EmptyStore) => {
                warn!("recognition attempted against an empty store");
                return Ok(AuthDecision::RejectedNoEnrollment { claimed: None });
            }
            Err(err) => return Err(err),
        };

        match evaluate(best.score, self.policy.recognition_threshold) {
            GateDecision::Accepted { confidence } => self.accept(best.identity, confidence),
            GateDecision::Rejected {
                confidence,
                required,
            } => {
                warn!(
                    best_identity = %best.identity,
                    confidence,
                    required,
                    "recognition rejected: low confidence"
                );
                Ok(AuthDecision::RejectedLowConfidence {
                    profile: self.directory.describe(&best.identity),
                    best_identity: best.identity,
                    confidence,
                    required,
                })
            }
        }
    }

    /// 1:1 verification of `claimed`. A global best match belonging to
    /// someone else is a mismatch regardless of the claimed identity's score.
    pub fn verify(&self, claimed: &str, query: &EmbeddingVector) -> AppResult<AuthDecision> {
        let snapshot = self.store.snapshot();
        if !snapshot.contains_identity(claimed) {
            warn!(claimed, "verification for an identity without enrollment");
            return Ok(AuthDecision::RejectedNoEnrollment {
                claimed: Some(claimed.to_string()),
            });
        }

        let matcher = SimilarityMatcher::new(&snapshot);
        let best = matcher.best_match(query)?;
        if best.identity != claimed {
            let confidence = to_percentage(best.score);
            warn!(
                claimed,
                predicted = %best.identity,
                confidence,
                "verification rejected: identity mismatch"
            );
            return Ok(AuthDecision::RejectedIdentityMismatch {
                claimed: claimed.to_string(),
                predicted: best.identity,
                confidence,
            });
        }

        let score = matcher.score_identity(query, claimed)?;
        match evaluate(score, self.policy.verification_threshold) {
            GateDecision::Accepted { confidence } => self.accept(claimed.to_string(), confidence),
            GateDecision::Rejected {
                confidence,
                required,
            } => {
                warn!(
                    claimed,
                    confidence, required, "verification rejected: low confidence"
                );
                Ok(AuthDecision::RejectedLowConfidence {
                    best_identity: claimed.to_string(),
                    confidence,
                    required,
                    profile: self.directory.describe(claimed),
                })
            }
        }
    }

    /// Recognition straight from a capture; extraction failures such as
    /// `NoFaceDetected` are returned as errors, not rejections.
    pub fn recognize_image<E: EmbeddingExtractor + ?Sized>(
        &self,
        extractor: &E,
        image: &[u8],
    ) -> AppResult<AuthDecision> {
        let query = extractor.embed(image)?;
        self.recognize(&query)
    }

    pub fn verify_image<E: EmbeddingExtractor + ?Sized>(
        &self,
        extractor: &E,
        claimed: &str,
        image: &[u8],
    ) -> AppResult<AuthDecision> {
        let query = extractor.embed(image)?;
        self.verify(claimed, &query)
    }

    pub fn validate_token(&self, token_id: &str) -> AppResult<Option<TokenInfo>> {
        self.ledger.validate(token_id)
    }

    pub fn logout(&self, token_id: &str) -> AppResult<bool> {
        self.ledger.revoke(token_id)
    }

    pub fn list_active_tokens(&self, identity: &str) -> AppResult<Vec<Token>> {
        self.ledger.active_tokens_for(identity)
    }

    pub fn sweep_expired_tokens(&self) -> AppResult<usize> {
        self.ledger.sweep_expired()
    }

    pub fn inspect_token(&self, token_id: &str) -> AppResult<Option<TokenAudit>> {
        self.ledger.inspect(token_id)
    }

    /// Top candidates with directory names. Never issues a token.
    pub fn rank(&self, query: &EmbeddingVector) -> AppResult<Vec<RankedCandidate>> {
        let snapshot = self.store.snapshot();
        let ranked = SimilarityMatcher::new(&snapshot).ranked(query, self.policy.candidate_limit)?;
        Ok(ranked
            .into_iter()
            .map(|candidate| RankedCandidate {
                display_name: self.directory.describe(&candidate.identity).display_name,
                confidence: to_percentage(candidate.score),
                score: candidate.score,
                identity: candidate.identity,
            })
            .collect())
    }

    pub fn store_info(&self) -> StoreStats {
        self.store.stats()
    }

    fn accept(&self, identity: String, confidence: f64) -> AppResult<AuthDecision> {
        let token = self
            .ledger
            .issue(&identity, confidence, self.policy.token_ttl)?;
        let profile = self.directory.describe(&identity);
        info!(identity = %identity, confidence, "authentication accepted");
        Ok(AuthDecision::Accepted {
            identity,
            confidence,
            token,
            profile,
        })
    }
}

/// Serializable response body for an outer transport layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecisionSummary {
    pub outcome: &'static str,
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub required: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl DecisionSummary {
    fn bare(outcome: &'static str, status: u16, message: impl Into<String>) -> Self {
        Self {
            outcome,
            status,
            message: message.into(),
            identity: None,
            display_name: None,
            confidence: None,
            required: None,
            token: None,
            expires_at: None,
        }
    }
}

impl From<&AuthDecision> for DecisionSummary {
    fn from(decision: &AuthDecision) -> Self {
        match decision {
            AuthDecision::Accepted {
                identity,
                confidence,
                token,
                profile,
            } => DecisionSummary {
                identity: Some(identity.clone()),
                display_name: Some(profile.display_name.clone()),
                confidence: Some(*confidence),
                token: Some(token.token_id.clone()),
                expires_at: Some(token.expires_at),
                ..DecisionSummary::bare("accepted", 200, "face authenticated")
            },
            AuthDecision::RejectedLowConfidence {
                best_identity,
                confidence,
                required,
                profile,
            } => DecisionSummary {
                identity: Some(best_identity.clone()),
                display_name: Some(profile.display_name.clone()),
                confidence: Some(*confidence),
                required: Some(*required),
                ..DecisionSummary::bare(
                    "low_confidence",
                    401,
                    format!("confidence {confidence:.2} is below the required {required:.2}"),
                )
            },
            // predicted identity and its score stay internal
            AuthDecision::RejectedIdentityMismatch { claimed, .. } => DecisionSummary {
                identity: Some(claimed.clone()),
                ..DecisionSummary::bare(
                    "identity_mismatch",
                    403,
                    "face does not match the claimed identity",
                )
            },
            AuthDecision::RejectedNoEnrollment { claimed } => DecisionSummary {
                identity: claimed.clone(),
                ..DecisionSummary::bare(
                    "no_enrollment",
                    404,
                    match claimed {
                        Some(_) => "claimed identity has no enrolled faces",
                        None => "no faces are enrolled",
                    },
                )
            },
        }
    }
}
