//! Human-readable identity metadata used to decorate auth responses.

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{AppError, AppResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contact: Option<String>,
}

impl IdentityProfile {
    pub fn placeholder(identity: &str) -> Self {
        Self {
            display_name: format!("User {identity}"),
            contact: None,
        }
    }
}

pub trait IdentityDirectory: Send + Sync {
    fn lookup(&self, identity: &str) -> Option<IdentityProfile>;

    /// Never fails; identities without metadata get a placeholder profile.
    fn describe(&self, identity: &str) -> IdentityProfile {
        self.lookup(identity).unwrap_or_else(|| {
            debug!(identity, "no directory entry, using placeholder");
            IdentityProfile::placeholder(identity)
        })
    }
}

/// Fixed map of identity to profile, typically loaded from a JSON object
/// keyed by identity.
#[derive(Debug, Clone, Default)]
pub struct StaticDirectory {
    profiles: HashMap<String, IdentityProfile>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_profile(mut self, identity: impl Into<String>, profile: IdentityProfile) -> Self {
        self.profiles.insert(identity.into(), profile);
        self
    }

    pub fn load(path: &Path) -> AppResult<Self> {
        let bytes = fs::read(path).map_err(|source| AppError::DirectoryRead {
            path: path.to_path_buf(),
            source,
        })?;
        let profiles: HashMap<String, IdentityProfile> =
            serde_json::from_slice(&bytes).map_err(|err| AppError::InvalidDirectory {
                path: path.to_path_buf(),
                message: err.to_string(),
            })?;
        debug!(path = %path.display(), count = profiles.len(), "loaded identity directory");
        Ok(Self { profiles })
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl IdentityDirectory for StaticDirectory {
    fn lookup(&self, identity: &str) -> Option<IdentityProfile> {
        self.profiles.get(identity).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn unknown_identity_gets_placeholder() {
        let directory = StaticDirectory::new().with_profile(
            "alice",
            IdentityProfile {
                display_name: "Alice Liddell".into(),
                contact: Some("alice@example.com".into()),
            },
        );
        assert_eq!(directory.describe("alice").display_name, "Alice Liddell");
        assert_eq!(directory.describe("bob"), IdentityProfile::placeholder("bob"));
        assert_eq!(directory.describe("bob").display_name, "User bob");
    }

    #[test]
    fn loads_profiles_from_json_object() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("directory.json");
        fs::write(
            &path,
            r#"{"alice": {"display_name": "Alice"}, "bob": {"display_name": "Bob", "contact": "bob@example.com"}}"#,
        )
        .unwrap();

        let directory = StaticDirectory::load(&path).unwrap();
        assert_eq!(directory.len(), 2);
        assert_eq!(
            directory.lookup("bob").and_then(|p| p.contact),
            Some("bob@example.com".into())
        );
    }

    #[test]
    fn malformed_directory_is_an_input_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("directory.json");
        fs::write(&path, "[1, 2, 3]").unwrap();
        let err = StaticDirectory::load(&path).unwrap_err();
        assert!(err.to_string().starts_with("identity directory"));
        assert_eq!(err.exit_code(), std::process::ExitCode::from(2));
        match err {
            AppError::InvalidDirectory { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn missing_directory_file_names_the_directory() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("absent.json");
        match StaticDirectory::load(&path).unwrap_err() {
            AppError::DirectoryRead { path: reported, .. } => assert_eq!(reported, path),
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
