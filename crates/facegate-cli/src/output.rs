use std::error::Error;
use std::io::{self, Write};

use facegate_core::auth::RankedCandidate;
use facegate_core::faces::{EnrollmentOutcome, RemovalOutcome, StoreStats};
use facegate_core::tokens::{Token, TokenInfo};
use facegate_core::{AuthDecision, DecisionSummary};
use serde::Serialize;
use serde_json::json;

use crate::cli::OutputMode;
use crate::errors::{AppError, AppResult};

fn emit_json<T: Serialize + ?Sized>(payload: &T) -> AppResult<()> {
    let stdout = io::stdout();
    let mut handle = stdout.lock();
    let payload = serde_json::to_string(payload)?;
    handle.write_all(payload.as_bytes())?;
    handle.write_all(b"\n")?;
    Ok(())
}

pub fn render_enroll(outcome: &EnrollmentOutcome, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            for line in &outcome.logs {
                println!("{line}");
            }
            if outcome.replaced > 0 {
                println!("Replaced {} previous embedding(s)", outcome.replaced);
            }
            println!(
                "Enrollment successful: {} embedding(s) added for {} ({} total)",
                outcome.added.len(),
                outcome.identity,
                outcome.total_for_identity
            );
        }
        OutputMode::Json => emit_json(&json!({
            "identity": outcome.identity,
            "added": outcome.added,
            "replaced": outcome.replaced,
            "total_for_identity": outcome.total_for_identity,
        }))?,
    }
    Ok(())
}

pub fn render_remove(outcome: &RemovalOutcome, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            for line in &outcome.logs {
                println!("{line}");
            }
            if outcome.removed == 0 {
                println!("No embeddings were enrolled for {}", outcome.identity);
            }
        }
        OutputMode::Json => emit_json(&json!({
            "identity": outcome.identity,
            "removed": outcome.removed,
        }))?,
    }
    Ok(())
}

pub fn render_info(stats: &StoreStats, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            println!("Identities: {}", stats.identities);
            println!("Embeddings: {}", stats.total_entries);
            match stats.dimension {
                Some(dim) => println!("Dimension: {dim}"),
                None => println!("Dimension: (empty store)"),
            }
            for (identity, count) in &stats.samples_per_identity {
                println!("  {identity}: {count}");
            }
        }
        OutputMode::Json => emit_json(stats)?,
    }
    Ok(())
}

pub fn render_decision(decision: &AuthDecision, mode: OutputMode) -> AppResult<()> {
    let summary = DecisionSummary::from(decision);
    match mode {
        OutputMode::Human => match decision {
            AuthDecision::Accepted {
                identity,
                confidence,
                token,
                profile,
            } => {
                println!(
                    "Accepted: {} ({}) confidence {:.2}",
                    identity, profile.display_name, confidence
                );
                println!("Token: {}", token.token_id);
                println!("Expires: {}", token.expires_at.to_rfc3339());
            }
            AuthDecision::RejectedLowConfidence {
                best_identity,
                confidence,
                required,
                profile,
            } => {
                println!(
                    "Rejected: confidence {:.2} below required {:.2} (closest: {} ({}))",
                    confidence, required, best_identity, profile.display_name
                );
            }
            AuthDecision::RejectedIdentityMismatch { claimed, .. } => {
                println!("Rejected: face does not match claimed identity {claimed}");
            }
            AuthDecision::RejectedNoEnrollment { .. } => {
                println!("Rejected: {}", summary.message);
            }
        },
        OutputMode::Json => emit_json(&summary)?,
    }
    Ok(())
}

pub fn render_rank(candidates: &[RankedCandidate], mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            for (rank, candidate) in candidates.iter().enumerate() {
                println!(
                    "{}. {} ({}) confidence {:.2} score {:.4}",
                    rank + 1,
                    candidate.identity,
                    candidate.display_name,
                    candidate.confidence,
                    candidate.score
                );
            }
        }
        OutputMode::Json => emit_json(candidates)?,
    }
    Ok(())
}

pub fn render_validation(info: Option<&TokenInfo>, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => match info {
            Some(info) => {
                println!(
                    "Token valid for {} (confidence {:.2})",
                    info.identity, info.confidence
                );
                println!("Expires: {}", info.expires_at.to_rfc3339());
            }
            None => println!("Token invalid"),
        },
        OutputMode::Json => emit_json(&json!({
            "valid": info.is_some(),
            "token": info,
        }))?,
    }
    Ok(())
}

pub fn render_logout(revoked: bool, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => {
            if revoked {
                println!("Token revoked");
            } else {
                println!("Token was not active");
            }
        }
        OutputMode::Json => emit_json(&json!({ "revoked": revoked }))?,
    }
    Ok(())
}

#[derive(Serialize)]
struct TokenListing<'a> {
    token: &'a str,
    confidence: f64,
    created_at: String,
    expires_at: String,
}

/// Listings show token fingerprints only.
pub fn render_tokens(identity: &str, tokens: &[Token], mode: OutputMode) -> AppResult<()> {
    let listing: Vec<TokenListing<'_>> = tokens
        .iter()
        .map(|token| TokenListing {
            token: token.fingerprint(),
            confidence: token.confidence,
            created_at: token.created_at.to_rfc3339(),
            expires_at: token.expires_at.to_rfc3339(),
        })
        .collect();
    match mode {
        OutputMode::Human => {
            println!("{} active token(s) for {}", listing.len(), identity);
            for entry in &listing {
                println!(
                    "  {}... confidence {:.2} expires {}",
                    entry.token, entry.confidence, entry.expires_at
                );
            }
        }
        OutputMode::Json => emit_json(&json!({
            "identity": identity,
            "tokens": listing,
        }))?,
    }
    Ok(())
}

pub fn render_sweep(count: usize, mode: OutputMode) -> AppResult<()> {
    match mode {
        OutputMode::Human => println!("Deactivated {count} expired token(s)"),
        OutputMode::Json => emit_json(&json!({ "swept": count }))?,
    }
    Ok(())
}

pub fn render_error(err: &AppError, mode: OutputMode) {
    match mode {
        OutputMode::Human => {
            eprintln!("error: {}", err.human_message());
            if let Some(source) = err.source() {
                eprintln!("cause: {source}");
            }
        }
        OutputMode::Json => {
            let payload = json!({
                "success": false,
                "error": err.human_message(),
            });
            if let Ok(json) = serde_json::to_string(&payload) {
                println!("{json}");
            }
        }
    }
}
