//! Turns resolved configuration into a wired-up coordinator.

use std::env;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use facegate_config::{
    load_from_paths, load_resolved_config, ConfigError, ResolvedConfig, ResolvedConfigWithSource,
};
use facegate_core::directory::{IdentityDirectory, StaticDirectory};
use facegate_core::faces::{load_store, FilesystemEnrollmentRepository};
use facegate_core::persist::StoreKey;
use facegate_core::tokens::{FilesystemTokenRepository, TokenLedger};
use facegate_core::{AuthCoordinator, AuthPolicy};
use tracing::{debug, info};

use crate::errors::{AppError, AppResult};

/// Command-line values that take precedence over the configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PolicyOverrides {
    pub recognition_threshold: Option<f64>,
    pub verification_threshold: Option<f64>,
    pub token_ttl_secs: Option<u64>,
    pub candidate_limit: Option<usize>,
}

pub struct Runtime {
    pub config: ResolvedConfig,
    pub source: Option<PathBuf>,
    pub enrollments: FilesystemEnrollmentRepository,
    pub coordinator: AuthCoordinator,
}

impl Runtime {
    pub fn open(config_path: Option<&Path>, overrides: &PolicyOverrides) -> AppResult<Self> {
        let resolved = resolve_config(config_path)?;
        Self::from_resolved(resolved, overrides)
    }

    pub fn from_resolved(
        resolved: ResolvedConfigWithSource,
        overrides: &PolicyOverrides,
    ) -> AppResult<Self> {
        let ResolvedConfigWithSource {
            resolved: config,
            source,
        } = resolved;
        match &source {
            Some(path) => debug!(path = %path.display(), "using configuration file"),
            None => debug!("no configuration file found; using defaults"),
        }

        let key = store_key(&config.store_key_env)?;
        if key.is_some() {
            info!(env = %config.store_key_env, "stores are encrypted at rest");
        }

        let enrollments =
            FilesystemEnrollmentRepository::new(&config.enrollment_store_path, key.clone());
        let store = Arc::new(load_store(&enrollments)?);

        let tokens = FilesystemTokenRepository::new(&config.token_store_path, key);
        let ledger = Arc::new(TokenLedger::new(Arc::new(tokens)));

        let directory: Arc<dyn IdentityDirectory> = match &config.directory_path {
            Some(path) => Arc::new(StaticDirectory::load(path)?),
            None => Arc::new(StaticDirectory::new()),
        };

        let policy = build_policy(&config, overrides)?;
        let coordinator = AuthCoordinator::new(store, ledger, directory, policy);

        Ok(Self {
            config,
            source,
            enrollments,
            coordinator,
        })
    }
}

/// An explicit path must exist; otherwise the default search paths apply.
pub fn resolve_config(explicit: Option<&Path>) -> AppResult<ResolvedConfigWithSource> {
    let Some(path) = explicit else {
        return load_resolved_config().map_err(config_error);
    };

    match load_from_paths(&[path.to_path_buf()]).map_err(config_error)? {
        Some(loaded) => Ok(ResolvedConfigWithSource {
            resolved: ResolvedConfig::from_raw(loaded.contents),
            source: Some(loaded.source),
        }),
        None => Err(AppError::ConfigRead {
            path: path.to_path_buf(),
            source: io::Error::new(io::ErrorKind::NotFound, "configuration file not found"),
        }),
    }
}

pub fn config_error(err: ConfigError) -> AppError {
    match err {
        ConfigError::Read { path, source } => AppError::ConfigRead { path, source },
        ConfigError::Parse { path, message } => AppError::ConfigParse { path, message },
    }
}

/// Reads the base64 store key from `env_name`. Unset or blank means plaintext.
pub fn store_key(env_name: &str) -> AppResult<Option<StoreKey>> {
    match env::var(env_name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => StoreKey::from_base64(&value).map(Some),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(AppError::InvalidKey(format!(
            "{env_name} does not contain valid UTF-8"
        ))),
    }
}

pub fn build_policy(config: &ResolvedConfig, overrides: &PolicyOverrides) -> AppResult<AuthPolicy> {
    let ttl = overrides
        .token_ttl_secs
        .map(std::time::Duration::from_secs)
        .unwrap_or(config.token_ttl);
    let seconds = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
    if seconds <= 0 {
        return Err(AppError::InvalidTokenTtl { seconds });
    }
    let token_ttl = chrono::Duration::from_std(ttl)
        .ok()
        .filter(|ttl| chrono::Utc::now().checked_add_signed(*ttl).is_some())
        .ok_or(AppError::InvalidTokenTtl { seconds })?;

    Ok(AuthPolicy {
        recognition_threshold: clamp_threshold(
            overrides
                .recognition_threshold
                .unwrap_or(config.recognition_threshold),
        ),
        verification_threshold: clamp_threshold(
            overrides
                .verification_threshold
                .unwrap_or(config.verification_threshold),
        ),
        token_ttl,
        candidate_limit: overrides
            .candidate_limit
            .unwrap_or(config.candidate_limit)
            .max(1),
    })
}

fn clamp_threshold(value: f64) -> f64 {
    if value.is_nan() {
        facegate_config::DEFAULT_THRESHOLD
    } else {
        value.clamp(0.0, 100.0)
    }
}
