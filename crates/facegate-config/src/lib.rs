use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub const PRIMARY_CONFIG_PATH: &str = "/etc/facegate/config.toml";
pub const SECONDARY_CONFIG_PATH: &str = "/usr/local/etc/facegate/config.toml";
pub const DEFAULT_THRESHOLD: f64 = 70.0;
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 24 * 60 * 60;
pub const DEFAULT_CANDIDATE_LIMIT: usize = 3;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_ENROLLMENT_STORE_PATH: &str = "/var/lib/facegate/enrollments.json";
pub const DEFAULT_TOKEN_STORE_PATH: &str = "/var/lib/facegate/tokens.json";
pub const DEFAULT_STORE_KEY_ENV: &str = "FACEGATE_STORE_KEY";

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub recognition_threshold: Option<f64>,
    pub verification_threshold: Option<f64>,
    pub token_ttl_secs: Option<u64>,
    pub enrollment_store_path: Option<PathBuf>,
    pub token_store_path: Option<PathBuf>,
    pub directory_path: Option<PathBuf>,
    pub candidate_limit: Option<usize>,
    pub sweep_interval_secs: Option<u64>,
    pub store_key_env: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedConfig {
    pub recognition_threshold: f64,
    pub verification_threshold: f64,
    pub token_ttl: Duration,
    pub enrollment_store_path: PathBuf,
    pub token_store_path: PathBuf,
    pub directory_path: Option<PathBuf>,
    pub candidate_limit: usize,
    pub sweep_interval: Duration,
    pub store_key_env: String,
}

impl ResolvedConfig {
    pub fn from_raw(raw: ConfigFile) -> Self {
        Self {
            recognition_threshold: clamp_threshold(raw.recognition_threshold),
            verification_threshold: clamp_threshold(raw.verification_threshold),
            token_ttl: Duration::from_secs(
                raw.token_ttl_secs.unwrap_or(DEFAULT_TOKEN_TTL_SECS).max(1),
            ),
            enrollment_store_path: raw
                .enrollment_store_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ENROLLMENT_STORE_PATH)),
            token_store_path: raw
                .token_store_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_TOKEN_STORE_PATH)),
            directory_path: raw.directory_path,
            candidate_limit: raw.candidate_limit.unwrap_or(DEFAULT_CANDIDATE_LIMIT).max(1),
            sweep_interval: Duration::from_secs(
                raw.sweep_interval_secs
                    .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS)
                    .max(1),
            ),
            store_key_env: raw
                .store_key_env
                .unwrap_or_else(|| DEFAULT_STORE_KEY_ENV.to_string()),
        }
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self::from_raw(ConfigFile::default())
    }
}

fn clamp_threshold(value: Option<f64>) -> f64 {
    match value {
        Some(value) if value.is_nan() => DEFAULT_THRESHOLD,
        Some(value) => value.clamp(0.0, 100.0),
        None => DEFAULT_THRESHOLD,
    }
}

#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub contents: ConfigFile,
    pub source: PathBuf,
}

impl LoadedConfig {
    pub fn new(contents: ConfigFile, source: PathBuf) -> Self {
        Self { contents, source }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

#[derive(Debug, Clone)]
pub struct ResolvedConfigWithSource {
    pub resolved: ResolvedConfig,
    pub source: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

pub fn default_search_paths() -> [PathBuf; 2] {
    [
        PathBuf::from(PRIMARY_CONFIG_PATH),
        PathBuf::from(SECONDARY_CONFIG_PATH),
    ]
}

pub fn load_resolved_config() -> Result<ResolvedConfigWithSource, ConfigError> {
    load_resolved_from_paths(&default_search_paths())
}

/// First readable file wins; missing files are skipped.
pub fn load_from_paths(paths: &[PathBuf]) -> Result<Option<LoadedConfig>, ConfigError> {
    for path in paths {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let parsed =
                    toml::from_str::<ConfigFile>(&contents).map_err(|err| ConfigError::Parse {
                        path: path.clone(),
                        message: err.to_string(),
                    })?;
                return Ok(Some(LoadedConfig::new(parsed, path.clone())));
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => {
                return Err(ConfigError::Read {
                    path: path.clone(),
                    source: err,
                })
            }
        }
    }

    Ok(None)
}

pub fn load_resolved_from_paths(
    paths: &[PathBuf],
) -> Result<ResolvedConfigWithSource, ConfigError> {
    match load_from_paths(paths)? {
        Some(entry) => Ok(ResolvedConfigWithSource {
            resolved: ResolvedConfig::from_raw(entry.contents),
            source: Some(entry.source),
        }),
        None => Ok(ResolvedConfigWithSource {
            resolved: ResolvedConfig::default(),
            source: None,
        }),
    }
}
