//! Atomic JSON documents on disk, optionally sealed with AES-256-GCM.
//!
//! Every write goes through a temporary file in the destination directory,
//! is fsynced, then renamed over the target, so readers observe either the
//! previous document or the new one and never a partial write. Writers that
//! read the document first hold [`DocumentLock`] for the whole cycle so
//! separate processes sharing a store cannot overwrite each other's rows.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose, Engine as _};
#[cfg(unix)]
use nix::fcntl::{Flock, FlockArg};
use rand::{rngs::OsRng, RngCore};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::errors::{AppError, AppResult};

const SEALED_VERSION: u32 = 1;
const SEALED_ALGORITHM: &str = "AES-256-GCM";
const NONCE_LEN: usize = 12;
pub const STORE_KEY_BYTES: usize = 32;

/// 256-bit key used to seal stores at rest.
#[derive(Clone)]
pub struct StoreKey([u8; STORE_KEY_BYTES]);

impl StoreKey {
    pub fn generate() -> Self {
        let mut bytes = [0u8; STORE_KEY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> AppResult<Self> {
        let array: [u8; STORE_KEY_BYTES] = bytes.try_into().map_err(|_| {
            AppError::InvalidKey(format!(
                "expected {STORE_KEY_BYTES} bytes but found {}",
                bytes.len()
            ))
        })?;
        Ok(Self(array))
    }

    pub fn from_base64(encoded: &str) -> AppResult<Self> {
        let bytes = general_purpose::STANDARD
            .decode(encoded.trim())
            .map_err(|err| AppError::InvalidKey(format!("invalid base64: {err}")))?;
        Self::from_bytes(&bytes)
    }

    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(self.0)
    }

    fn cipher(&self) -> AppResult<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.0)
            .map_err(|_| AppError::Encryption("invalid AES-GCM key length".into()))
    }
}

impl fmt::Debug for StoreKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StoreKey(..)")
    }
}

#[derive(Serialize, Deserialize)]
struct SealedDocument {
    version: u32,
    algorithm: String,
    nonce: String,
    ciphertext: String,
}

/// Reads `path`, returning `None` when the file does not exist yet.
pub(crate) fn read_document<T: DeserializeOwned>(
    path: &Path,
    key: Option<&StoreKey>,
) -> AppResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let data = fs::read(path).map_err(|source| AppError::FeatureRead {
        path: path.to_path_buf(),
        source,
    })?;

    let plaintext = match serde_json::from_slice::<SealedDocument>(&data) {
        Ok(sealed) => open_sealed(path, sealed, key)?,
        Err(_) => data,
    };

    serde_json::from_slice(&plaintext)
        .map(Some)
        .map_err(|err| AppError::InvalidFeatureFile {
            path: path.to_path_buf(),
            message: format!("invalid store contents: {err}"),
        })
}

pub(crate) fn write_document<T: Serialize>(
    path: &Path,
    value: &T,
    key: Option<&StoreKey>,
) -> AppResult<()> {
    let parent = ensure_parent(path)?;

    let serialized = match key {
        Some(key) => seal(value, key)?,
        None => serde_json::to_vec_pretty(value)?,
    };

    let write_err = |source| AppError::FeatureWrite {
        path: path.to_path_buf(),
        source,
    };

    let mut tmp = NamedTempFile::new_in(parent).map_err(write_err)?;
    {
        let file = tmp.as_file_mut();
        {
            let mut writer = BufWriter::new(&mut *file);
            writer.write_all(&serialized).map_err(write_err)?;
            writer.write_all(b"\n").map_err(write_err)?;
            writer.flush().map_err(write_err)?;
        }
        file.sync_all().map_err(write_err)?;
    }

    let file = tmp.persist(path).map_err(|err| write_err(err.error))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = file.metadata().map_err(write_err)?.permissions();
        perms.set_mode(0o600);
        file.set_permissions(perms).map_err(write_err)?;
    }
    #[cfg(not(unix))]
    drop(file);

    Ok(())
}

fn ensure_parent(path: &Path) -> AppResult<&Path> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|source| AppError::FeatureWrite {
        path: parent.to_path_buf(),
        source,
    })?;
    Ok(parent)
}

/// Exclusive advisory lock on the sibling `<document>.lock` file.
///
/// Released when dropped. The lock file itself is never removed.
pub(crate) struct DocumentLock {
    #[cfg(unix)]
    _flock: Flock<File>,
    #[cfg(not(unix))]
    _file: File,
}

pub(crate) fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

/// Blocks until no other holder, in this process or another, has the lock.
pub(crate) fn lock_document(path: &Path) -> AppResult<DocumentLock> {
    let lock_file = lock_path(path);
    ensure_parent(&lock_file)?;

    let mut options = OpenOptions::new();
    options.read(true).write(true).create(true).truncate(false);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let file = options
        .open(&lock_file)
        .map_err(|source| AppError::FeatureWrite {
            path: lock_file.clone(),
            source,
        })?;

    #[cfg(unix)]
    let lock = DocumentLock {
        _flock: Flock::lock(file, FlockArg::LockExclusive).map_err(|(_, errno)| {
            AppError::FeatureWrite {
                path: lock_file,
                source: std::io::Error::from(errno),
            }
        })?,
    };
    #[cfg(not(unix))]
    let lock = DocumentLock { _file: file };
    Ok(lock)
}

fn seal<T: Serialize>(value: &T, key: &StoreKey) -> AppResult<Vec<u8>> {
    let plaintext = serde_json::to_vec(value)?;
    let cipher = key.cipher()?;
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext.as_ref())
        .map_err(|err| AppError::Encryption(format!("failed to seal store: {err}")))?;
    let sealed = SealedDocument {
        version: SEALED_VERSION,
        algorithm: SEALED_ALGORITHM.to_string(),
        nonce: general_purpose::STANDARD.encode(nonce),
        ciphertext: general_purpose::STANDARD.encode(ciphertext),
    };
    serde_json::to_vec_pretty(&sealed).map_err(AppError::from)
}

fn open_sealed(path: &Path, sealed: SealedDocument, key: Option<&StoreKey>) -> AppResult<Vec<u8>> {
    if sealed.algorithm != SEALED_ALGORITHM {
        return Err(AppError::Encryption(format!(
            "unsupported store algorithm '{}'",
            sealed.algorithm
        )));
    }
    if sealed.version != SEALED_VERSION {
        return Err(AppError::Encryption(format!(
            "unsupported store version {}",
            sealed.version
        )));
    }

    let key = key.ok_or_else(|| AppError::EncryptedStoreRequiresKey {
        path: path.to_path_buf(),
    })?;

    let nonce = general_purpose::STANDARD
        .decode(sealed.nonce.trim())
        .map_err(|err| AppError::Encryption(format!("invalid nonce encoding: {err}")))?;
    if nonce.len() != NONCE_LEN {
        return Err(AppError::Encryption(format!(
            "expected nonce of {NONCE_LEN} bytes but found {}",
            nonce.len()
        )));
    }
    let ciphertext = general_purpose::STANDARD
        .decode(sealed.ciphertext.trim())
        .map_err(|err| AppError::Encryption(format!("invalid ciphertext encoding: {err}")))?;

    key.cipher()?
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
        .map_err(|err| AppError::Encryption(format!("failed to open sealed store: {err}")))
}
