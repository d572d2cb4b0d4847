use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("embedding dimension mismatch: expected {expected} values, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("embedding vector is empty")]
    EmptyVector,

    #[error("embedding vector is invalid: {reason}")]
    InvalidVector { reason: String },

    #[error("no enrolled embeddings are available for matching")]
    EmptyStore,

    #[error("identity '{identity}' has no enrolled embeddings")]
    NoEnrollmentForIdentity { identity: String },

    #[error("no face detected in {source_name}")]
    NoFaceDetected { source_name: String },

    #[error("invalid identity '{identity}': {message}")]
    InvalidIdentity { identity: String, message: String },

    #[error("persistence failure during {operation}: {message}")]
    Persistence {
        operation: &'static str,
        message: String,
    },

    #[error("token ttl must be positive and yield a representable expiry (got {seconds}s)")]
    InvalidTokenTtl { seconds: i64 },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to write {path}: {source}")]
    FeatureWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to read {path}: {source}")]
    FeatureRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("embedding file {path} is invalid: {message}")]
    InvalidFeatureFile { path: PathBuf, message: String },

    #[error("identity directory {path} could not be read: {source}")]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("identity directory {path} is invalid: {message}")]
    InvalidDirectory { path: PathBuf, message: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("failed to read configuration file {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration file {path}: {message}")]
    ConfigParse { path: PathBuf, message: String },

    #[error("store {path} is encrypted and requires a key")]
    EncryptedStoreRequiresKey { path: PathBuf },

    #[error("store encryption key is invalid: {0}")]
    InvalidKey(String),

    #[error("store encryption error: {0}")]
    Encryption(String),
}

impl AppError {
    pub fn persistence(operation: &'static str, err: impl std::fmt::Display) -> Self {
        AppError::Persistence {
            operation,
            message: err.to_string(),
        }
    }

    /// Storage-layer failures that abort the current request.
    pub fn is_persistence(&self) -> bool {
        matches!(
            self,
            AppError::Persistence { .. }
                | AppError::Io(_)
                | AppError::FeatureWrite { .. }
                | AppError::FeatureRead { .. }
                | AppError::Encryption(_)
                | AppError::EncryptedStoreRequiresKey { .. }
        )
    }

    pub fn exit_code(&self) -> ExitCode {
        match self {
            AppError::DimensionMismatch { .. } => ExitCode::from(2),
            AppError::EmptyVector => ExitCode::from(2),
            AppError::InvalidVector { .. } => ExitCode::from(2),
            AppError::NoFaceDetected { .. } => ExitCode::from(2),
            AppError::InvalidIdentity { .. } => ExitCode::from(2),
            AppError::InvalidFeatureFile { .. } => ExitCode::from(2),
            AppError::InvalidTokenTtl { .. } => ExitCode::from(2),
            AppError::ConfigRead { .. } => ExitCode::from(2),
            AppError::ConfigParse { .. } => ExitCode::from(2),
            AppError::DirectoryRead { .. } => ExitCode::from(2),
            AppError::InvalidDirectory { .. } => ExitCode::from(2),
            AppError::EmptyStore => ExitCode::from(3),
            AppError::NoEnrollmentForIdentity { .. } => ExitCode::from(3),
            AppError::Persistence { .. } => ExitCode::from(4),
            AppError::FeatureWrite { .. } => ExitCode::from(4),
            AppError::FeatureRead { .. } => ExitCode::from(4),
            AppError::Io(_) => ExitCode::from(4),
            AppError::EncryptedStoreRequiresKey { .. } => ExitCode::from(4),
            AppError::InvalidKey(_) => ExitCode::from(4),
            AppError::Encryption(_) => ExitCode::from(4),
            _ => ExitCode::from(1),
        }
    }

    pub fn human_message(&self) -> String {
        self.to_string()
    }
}

pub type AppResult<T> = Result<T, AppError>;
