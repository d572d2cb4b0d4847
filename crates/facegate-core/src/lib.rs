//! Embedding-based identity matching and session token lifecycle.

pub mod auth;
pub mod directory;
pub mod errors;
pub mod faces;
pub mod persist;
pub mod tokens;

pub use auth::{AuthCoordinator, AuthDecision, AuthPolicy, DecisionSummary, RankedCandidate};
pub use errors::{AppError, AppResult};
