//! Owner identity files.
//!
//! An environment proves it is still alive through a small file holding a
//! random 32-character hex token. Leases snapshot that token; deleting or
//! rewriting the file invalidates every lease taken through it.

use std::io;
use std::path::{Path, PathBuf};

use labnet_core::error::{LeaseError, Result};
use uuid::Uuid;

use crate::fs::atomic_write;

/// Handle to an owner identity file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnerIdentity {
    path: PathBuf,
}

/// Generate a fresh identity token (32 lowercase hex characters).
pub fn generate_token() -> String {
    Uuid::new_v4().simple().to_string()
}

impl OwnerIdentity {
    /// Write a new identity file at `path`, replacing any previous one.
    ///
    /// Replacing an existing file makes the leases taken through it stale.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| unavailable(&path, e))?;
        }

        let token = generate_token();
        atomic_write(&path, token.as_bytes()).map_err(|e| unavailable(&path, e))?;
        tracing::debug!(path = %path.display(), "Created owner identity");
        Ok(Self { path })
    }

    /// Open an existing identity file.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(Self { path }),
            Ok(_) => Err(LeaseError::OwnerUnavailable {
                path,
                message: "not a regular file".to_string(),
            }),
            Err(e) => Err(unavailable(&path, e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current content of the identity file.
    pub fn token(&self) -> Result<String> {
        std::fs::read_to_string(&self.path).map_err(|e| unavailable(&self.path, e))
    }

    /// Delete the identity file. Leases taken through it become stale.
    pub fn invalidate(self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(unavailable(&self.path, e)),
        }
    }
}

impl AsRef<Path> for OwnerIdentity {
    fn as_ref(&self) -> &Path {
        &self.path
    }
}

fn unavailable(path: &Path, err: io::Error) -> LeaseError {
    LeaseError::OwnerUnavailable {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_format() {
        let token = generate_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_create_and_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prefix").join("uuid");

        let owner = OwnerIdentity::create(&path).unwrap();
        assert_eq!(owner.path(), path);
        let token = owner.token().unwrap();
        assert_eq!(token.len(), 32);

        let reopened = OwnerIdentity::open(&path).unwrap();
        assert_eq!(reopened.token().unwrap(), token);
    }

    #[test]
    fn test_create_replaces_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uuid");
        let first = OwnerIdentity::create(&path).unwrap().token().unwrap();
        let second = OwnerIdentity::create(&path).unwrap().token().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_open_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = OwnerIdentity::open(dir.path().join("uuid")).unwrap_err();
        assert!(matches!(err, LeaseError::OwnerUnavailable { .. }));
    }

    #[test]
    fn test_open_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = OwnerIdentity::open(dir.path()).unwrap_err();
        assert!(matches!(err, LeaseError::OwnerUnavailable { .. }));
    }

    #[test]
    fn test_invalidate() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uuid");
        let owner = OwnerIdentity::create(&path).unwrap();
        owner.clone().invalidate().unwrap();
        assert!(!path.exists());
        assert!(owner.token().is_err());
        // Second invalidation is a no-op
        owner.invalidate().unwrap();
    }
}
