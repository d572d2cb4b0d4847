use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};
use crate::persist::{lock_document, read_document, write_document, StoreKey};
use crate::tokens::token::{Deactivation, DeactivationReason, Token};

const TOKEN_DOCUMENT_VERSION: u32 = 1;

/// Durable home of token rows. Rows are never deleted.
pub trait TokenRepository: Send + Sync {
    /// Fails if a row with the same id already exists.
    fn insert(&self, token: &Token) -> AppResult<()>;

    fn get(&self, token_id: &str) -> AppResult<Option<Token>>;

    /// Marks the row inactive. Returns `false` when the row is absent or
    /// already inactive, leaving it untouched.
    fn deactivate(&self, token_id: &str, deactivation: Deactivation) -> AppResult<bool>;

    /// Every row owned by `identity`, newest first.
    fn list_for_identity(&self, identity: &str) -> AppResult<Vec<Token>>;

    /// Deactivates every active row with `expires_at < now`.
    fn deactivate_expired(&self, now: DateTime<Utc>) -> AppResult<usize>;
}

fn insert_row(rows: &mut Vec<Token>, token: &Token) -> AppResult<()> {
    if rows.iter().any(|row| row.token_id == token.token_id) {
        return Err(AppError::persistence(
            "token insert",
            "token id already recorded",
        ));
    }
    rows.push(token.clone());
    Ok(())
}

fn deactivate_row(rows: &mut [Token], token_id: &str, deactivation: Deactivation) -> bool {
    match rows
        .iter_mut()
        .find(|row| row.token_id == token_id && row.active)
    {
        Some(row) => {
            row.active = false;
            row.deactivation = Some(deactivation);
            true
        }
        None => false,
    }
}

fn deactivate_expired_rows(rows: &mut [Token], now: DateTime<Utc>) -> usize {
    let mut count = 0;
    for row in rows.iter_mut().filter(|row| row.active && row.is_expired_at(now)) {
        row.active = false;
        row.deactivation = Some(Deactivation {
            reason: DeactivationReason::Expired,
            at: now,
        });
        count += 1;
    }
    count
}

fn rows_for_identity(rows: &[Token], identity: &str) -> Vec<Token> {
    let mut owned: Vec<Token> = rows
        .iter()
        .filter(|row| row.identity == identity)
        .cloned()
        .collect();
    owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    owned
}

#[derive(Debug, Default)]
pub struct MemoryTokenRepository {
    rows: Mutex<Vec<Token>>,
}

impl MemoryTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TokenRepository for MemoryTokenRepository {
    fn insert(&self, token: &Token) -> AppResult<()> {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        insert_row(&mut rows, token)
    }

    fn get(&self, token_id: &str) -> AppResult<Option<Token>> {
        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(rows.iter().find(|row| row.token_id == token_id).cloned())
    }

    fn deactivate(&self, token_id: &str, deactivation: Deactivation) -> AppResult<bool> {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(deactivate_row(&mut rows, token_id, deactivation))
    }

    fn list_for_identity(&self, identity: &str) -> AppResult<Vec<Token>> {
        let rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(rows_for_identity(&rows, identity))
    }

    fn deactivate_expired(&self, now: DateTime<Utc>) -> AppResult<usize> {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(deactivate_expired_rows(&mut rows, now))
    }
}

#[derive(Serialize, Deserialize, Default)]
struct TokenDocument {
    version: u32,
    tokens: Vec<Token>,
}

/// JSON document whose read-modify-write cycles run under an exclusive
/// file lock, so several processes may share one path.
///
/// A write that fails leaves the previous document in place and the
/// operation reports the error; nothing is acknowledged before the rename.
#[derive(Debug)]
pub struct FilesystemTokenRepository {
    path: PathBuf,
    key: Option<StoreKey>,
}

impl FilesystemTokenRepository {
    pub fn new(path: impl Into<PathBuf>, key: Option<StoreKey>) -> Self {
        Self {
            path: path.into(),
            key,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> AppResult<Vec<Token>> {
        let document: Option<TokenDocument> = read_document(&self.path, self.key.as_ref())?;
        Ok(document.map(|doc| doc.tokens).unwrap_or_default())
    }

    fn write(&self, tokens: Vec<Token>) -> AppResult<()> {
        let document = TokenDocument {
            version: TOKEN_DOCUMENT_VERSION,
            tokens,
        };
        write_document(&self.path, &document, self.key.as_ref())
    }

    fn modify<T, F>(&self, change: F) -> AppResult<T>
    where
        F: FnOnce(&mut Vec<Token>) -> AppResult<(T, bool)>,
    {
        let _lock = lock_document(&self.path)?;
        let mut rows = self.read()?;
        let (value, dirty) = change(&mut rows)?;
        if dirty {
            self.write(rows)?;
        }
        Ok(value)
    }
}

impl TokenRepository for FilesystemTokenRepository {
    fn insert(&self, token: &Token) -> AppResult<()> {
        self.modify(|rows| insert_row(rows, token).map(|()| ((), true)))
    }

    fn get(&self, token_id: &str) -> AppResult<Option<Token>> {
        Ok(self
            .read()?
            .into_iter()
            .find(|row| row.token_id == token_id))
    }

    fn deactivate(&self, token_id: &str, deactivation: Deactivation) -> AppResult<bool> {
        self.modify(|rows| {
            let changed = deactivate_row(rows, token_id, deactivation);
            Ok((changed, changed))
        })
    }

    fn list_for_identity(&self, identity: &str) -> AppResult<Vec<Token>> {
        Ok(rows_for_identity(&self.read()?, identity))
    }

    fn deactivate_expired(&self, now: DateTime<Utc>) -> AppResult<usize> {
        self.modify(|rows| {
            let count = deactivate_expired_rows(rows, now);
            Ok((count, count > 0))
        })
    }
}
