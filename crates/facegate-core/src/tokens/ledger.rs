use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::errors::{AppError, AppResult};
use crate::tokens::clock::{Clock, SystemClock};
use crate::tokens::repository::TokenRepository;
use crate::tokens::token::{
    fingerprint, Deactivation, DeactivationReason, Token, TokenInfo, TokenState,
};

/// Random bytes behind every token id (256 bits).
pub const TOKEN_ID_BYTES: usize = 32;

/// Housekeeping view of a token, including why it stopped being valid.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenAudit {
    pub token: Token,
    pub state: TokenState,
}

/// Issues and tracks session credentials.
///
/// Every method reaches the repository; storage failures surface as
/// [`AppError::Persistence`] and are never swallowed.
pub struct TokenLedger {
    repository: Arc<dyn TokenRepository>,
    clock: Arc<dyn Clock>,
}

impl TokenLedger {
    pub fn new(repository: Arc<dyn TokenRepository>) -> Self {
        Self::with_clock(repository, Arc::new(SystemClock))
    }

    pub fn with_clock(repository: Arc<dyn TokenRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    /// Mints a token and records it. The token is only returned once the
    /// repository has accepted the row.
    pub fn issue(&self, identity: &str, confidence: f64, ttl: Duration) -> AppResult<Token> {
        if ttl <= Duration::zero() {
            return Err(AppError::InvalidTokenTtl {
                seconds: ttl.num_seconds(),
            });
        }

        let created_at = self.clock.now();
        let expires_at = created_at
            .checked_add_signed(ttl)
            .ok_or(AppError::InvalidTokenTtl {
                seconds: ttl.num_seconds(),
            })?;
        let token = Token {
            token_id: generate_token_id(),
            identity: identity.to_string(),
            confidence: clamp_confidence(confidence),
            created_at,
            expires_at,
            active: true,
            deactivation: None,
        };

        self.repository
            .insert(&token)
            .map_err(|err| storage_failure("token insert", err))?;

        info!(
            identity = %token.identity,
            token = token.fingerprint(),
            expires_at = %token.expires_at,
            "issued token"
        );
        Ok(token)
    }

    /// Returns the bearer's details while the token is live.
    ///
    /// Absent, revoked and expired tokens all yield `None`. An expired token
    /// that is still marked active is deactivated on the way out.
    pub fn validate(&self, token_id: &str) -> AppResult<Option<TokenInfo>> {
        let Some(token) = self
            .repository
            .get(token_id)
            .map_err(|err| storage_failure("token lookup", err))?
        else {
            debug!(token = fingerprint(token_id), "unknown token");
            return Ok(None);
        };

        if !token.active {
            debug!(token = token.fingerprint(), "inactive token presented");
            return Ok(None);
        }

        let now = self.clock.now();
        if token.is_expired_at(now) {
            self.expire(&token, now)?;
            return Ok(None);
        }

        Ok(Some(token.info()))
    }

    /// Deactivates the token. `false` when it was unknown or already inactive.
    pub fn revoke(&self, token_id: &str) -> AppResult<bool> {
        let deactivation = Deactivation {
            reason: DeactivationReason::Revoked,
            at: self.clock.now(),
        };
        let revoked = self
            .repository
            .deactivate(token_id, deactivation)
            .map_err(|err| storage_failure("token revoke", err))?;
        if revoked {
            info!(token = fingerprint(token_id), "revoked token");
        } else {
            debug!(token = fingerprint(token_id), "revoke had nothing to do");
        }
        Ok(revoked)
    }

    /// Live tokens owned by `identity`, newest first. Expired rows found on
    /// the way are deactivated.
    pub fn active_tokens_for(&self, identity: &str) -> AppResult<Vec<Token>> {
        let rows = self
            .repository
            .list_for_identity(identity)
            .map_err(|err| storage_failure("token listing", err))?;

        let now = self.clock.now();
        let mut live = Vec::new();
        for token in rows.into_iter().filter(|token| token.active) {
            if token.is_expired_at(now) {
                self.expire(&token, now)?;
            } else {
                live.push(token);
            }
        }
        Ok(live)
    }

    /// Deactivates every expired token that is still marked active.
    pub fn sweep_expired(&self) -> AppResult<usize> {
        let now = self.clock.now();
        let count = self
            .repository
            .deactivate_expired(now)
            .map_err(|err| storage_failure("token sweep", err))?;
        if count > 0 {
            info!(count, "swept expired tokens");
        } else {
            debug!("sweep found no expired tokens");
        }
        Ok(count)
    }

    /// Full record plus lifecycle state, for audit tooling only.
    pub fn inspect(&self, token_id: &str) -> AppResult<Option<TokenAudit>> {
        let token = self
            .repository
            .get(token_id)
            .map_err(|err| storage_failure("token lookup", err))?;
        let now = self.clock.now();
        Ok(token.map(|token| TokenAudit {
            state: token.state_at(now),
            token,
        }))
    }

    fn expire(&self, token: &Token, now: DateTime<Utc>) -> AppResult<()> {
        let deactivation = Deactivation {
            reason: DeactivationReason::Expired,
            at: now,
        };
        self.repository
            .deactivate(&token.token_id, deactivation)
            .map_err(|err| storage_failure("token expiry", err))?;
        warn!(
            identity = %token.identity,
            token = token.fingerprint(),
            "token expired"
        );
        Ok(())
    }
}

fn generate_token_id() -> String {
    let mut bytes = [0u8; TOKEN_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        0.0
    } else {
        confidence.clamp(0.0, 100.0)
    }
}

fn storage_failure(operation: &'static str, err: AppError) -> AppError {
    error!(operation, error = %err, "token storage failure");
    match err {
        AppError::Persistence { .. } => err,
        other => AppError::persistence(operation, other),
    }
}
