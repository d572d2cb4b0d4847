use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::errors::AppResult;
use crate::faces::store::{merge_identity_rows, EnrollmentEntry};
use crate::persist::{lock_document, read_document, write_document, StoreKey};

const ENROLLMENT_DOCUMENT_VERSION: u32 = 1;

/// Durable home of enrollment rows.
///
/// Both write operations are all-or-nothing: on error the previously stored
/// rows remain intact.
pub trait EnrollmentRepository: Send + Sync {
    fn load_all(&self) -> AppResult<Vec<EnrollmentEntry>>;

    /// Makes `entries` the full row set of `identity` atomically. Rows whose
    /// id is kept stay where they were; new rows are appended.
    fn replace_identity(&self, identity: &str, entries: &[EnrollmentEntry]) -> AppResult<()>;

    /// Wholesale rebuild.
    fn replace_all(&self, entries: &[EnrollmentEntry]) -> AppResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryEnrollmentRepository {
    rows: Mutex<Vec<EnrollmentEntry>>,
}

impl MemoryEnrollmentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<EnrollmentEntry>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }
}

impl EnrollmentRepository for MemoryEnrollmentRepository {
    fn load_all(&self) -> AppResult<Vec<EnrollmentEntry>> {
        Ok(self
            .rows
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn replace_identity(&self, identity: &str, entries: &[EnrollmentEntry]) -> AppResult<()> {
        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        merge_identity_rows(&mut rows, identity, entries);
        Ok(())
    }

    fn replace_all(&self, entries: &[EnrollmentEntry]) -> AppResult<()> {
        *self.rows.lock().unwrap_or_else(PoisonError::into_inner) = entries.to_vec();
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct EnrollmentDocument {
    version: u32,
    entries: Vec<EnrollmentEntry>,
}

/// Single JSON document, optionally sealed with a [`StoreKey`]. Writes hold
/// an exclusive file lock so concurrent processes do not lose rows.
#[derive(Debug)]
pub struct FilesystemEnrollmentRepository {
    path: PathBuf,
    key: Option<StoreKey>,
}

impl FilesystemEnrollmentRepository {
    pub fn new(path: impl Into<PathBuf>, key: Option<StoreKey>) -> Self {
        Self {
            path: path.into(),
            key,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> AppResult<Vec<EnrollmentEntry>> {
        let document: Option<EnrollmentDocument> = read_document(&self.path, self.key.as_ref())?;
        Ok(document.map(|doc| doc.entries).unwrap_or_default())
    }

    fn write(&self, entries: Vec<EnrollmentEntry>) -> AppResult<()> {
        let document = EnrollmentDocument {
            version: ENROLLMENT_DOCUMENT_VERSION,
            entries,
        };
        write_document(&self.path, &document, self.key.as_ref())
    }
}

impl EnrollmentRepository for FilesystemEnrollmentRepository {
    fn load_all(&self) -> AppResult<Vec<EnrollmentEntry>> {
        self.read()
    }

    fn replace_identity(&self, identity: &str, entries: &[EnrollmentEntry]) -> AppResult<()> {
        let _lock = lock_document(&self.path)?;
        let mut rows = self.read()?;
        merge_identity_rows(&mut rows, identity, entries);
        self.write(rows)
    }

    fn replace_all(&self, entries: &[EnrollmentEntry]) -> AppResult<()> {
        let _lock = lock_document(&self.path)?;
        self.write(entries.to_vec())
    }
}
