use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeactivationReason {
    Expired,
    Revoked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deactivation {
    pub reason: DeactivationReason,
    pub at: DateTime<Utc>,
}

/// Lifecycle position of a token at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    Active,
    Expired,
    Revoked,
}

/// Session credential record. Only `active` and `deactivation` ever change,
/// and only from active to inactive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub token_id: String,
    pub identity: String,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deactivation: Option<Deactivation>,
}

impl Token {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> TokenState {
        if !self.active {
            return match self.deactivation.map(|d| d.reason) {
                Some(DeactivationReason::Expired) => TokenState::Expired,
                _ => TokenState::Revoked,
            };
        }
        if self.is_expired_at(now) {
            TokenState::Expired
        } else {
            TokenState::Active
        }
    }

    /// Short prefix safe to write to logs.
    pub fn fingerprint(&self) -> &str {
        fingerprint(&self.token_id)
    }

    pub fn info(&self) -> TokenInfo {
        TokenInfo {
            identity: self.identity.clone(),
            confidence: self.confidence,
            created_at: self.created_at,
            expires_at: self.expires_at,
        }
    }
}

pub(crate) fn fingerprint(token_id: &str) -> &str {
    let end = token_id
        .char_indices()
        .nth(8)
        .map_or(token_id.len(), |(idx, _)| idx);
    &token_id[..end]
}

/// What a successful validation reveals about the bearer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TokenInfo {
    pub identity: String,
    pub confidence: f64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
