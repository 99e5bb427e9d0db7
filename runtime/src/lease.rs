//! Subnet leases.
//!
//! A lease is stored as `{store_dir}/{N}.lease`, where `N` is the third octet
//! of the subnet. The file holds a JSON array:
//!
//! ```json
//! ["/path/to/prefix/uuid", "4f1c0e0a9b2d4c5e8f7a6b5c4d3e2f10"]
//! ```
//!
//! The first element is the owner's identity file, the second its content at
//! the time the lease was taken. The lease is live only while that file still
//! holds exactly that content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Path, PathBuf};

use labnet_core::error::{LeaseError, Result};
use labnet_core::subnet::{Subnet, SubnetPool};

use crate::fs::atomic_write;

/// File extension of lease files.
pub const LEASE_EXTENSION: &str = "lease";

/// Ownership metadata persisted in a lease file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "(PathBuf, String)", into = "(PathBuf, String)")]
pub struct LeaseRecord {
    /// Path of the owner's identity file
    pub owner_path: PathBuf,
    /// Content of the identity file when the lease was taken
    pub owner_snapshot: String,
}

impl From<(PathBuf, String)> for LeaseRecord {
    fn from((owner_path, owner_snapshot): (PathBuf, String)) -> Self {
        Self {
            owner_path,
            owner_snapshot,
        }
    }
}

impl From<LeaseRecord> for (PathBuf, String) {
    fn from(record: LeaseRecord) -> Self {
        (record.owner_path, record.owner_snapshot)
    }
}

impl LeaseRecord {
    /// Whether the owner identity file still exists with the recorded content.
    pub fn is_current(&self) -> Result<bool> {
        match std::fs::metadata(&self.owner_path) {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => return Ok(false),
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(LeaseError::io(
                    format!("checking owner {}", self.owner_path.display()),
                    e,
                ))
            }
        }

        match std::fs::read(&self.owner_path) {
            Ok(content) => Ok(content == self.owner_snapshot.as_bytes()),
            // Removed between the two calls
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LeaseError::io(
                format!("reading owner {}", self.owner_path.display()),
                e,
            )),
        }
    }
}

/// One candidate subnet of a store and its lease file.
///
/// Building a lease does no I/O; the file only exists once the lease is taken.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Lease {
    subnet: Subnet,
    path: PathBuf,
}

impl Lease {
    /// Lease for pool index `index` (third octet).
    pub fn from_index(store_dir: &Path, pool: &SubnetPool, index: u8) -> Result<Self> {
        let subnet = pool.subnet_for_index(index)?;
        Ok(Self::for_subnet(store_dir, subnet))
    }

    /// Lease for a dotted address, with or without the `/24` suffix.
    pub fn from_subnet(store_dir: &Path, pool: &SubnetPool, subnet: &str) -> Result<Self> {
        let subnet = pool.parse(subnet)?;
        Ok(Self::for_subnet(store_dir, subnet))
    }

    /// Lease for an already range-checked subnet.
    pub(crate) fn for_subnet(store_dir: &Path, subnet: Subnet) -> Self {
        Self {
            path: Self::file_path(store_dir, subnet.octet()),
            subnet,
        }
    }

    /// Path of the lease file for `index` inside `store_dir`.
    pub fn file_path(store_dir: &Path, index: u8) -> PathBuf {
        store_dir.join(format!("{}.{}", index, LEASE_EXTENSION))
    }

    /// Pool index encoded in a lease file name, if it is one.
    pub fn parse_file_name(name: &str) -> Option<u8> {
        let stem = name.strip_suffix(LEASE_EXTENSION)?.strip_suffix('.')?;
        if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        // Only the canonical spelling, so each index maps to a single file
        let index: u8 = stem.parse().ok()?;
        (index.to_string() == stem).then_some(index)
    }

    pub fn subnet(&self) -> Subnet {
        self.subnet
    }

    pub fn index(&self) -> u8 {
        self.subnet.octet()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the lease file is present.
    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Read the owner metadata.
    ///
    /// Fails with `CorruptLease` if the file cannot be parsed.
    pub fn read_metadata(&self) -> Result<LeaseRecord> {
        self.load()?.ok_or_else(|| {
            LeaseError::io(
                format!("reading lease {}", self.path.display()),
                io::Error::new(io::ErrorKind::NotFound, "lease file does not exist"),
            )
        })
    }

    /// Owner metadata, or `None` when the lease file is absent.
    pub fn load(&self) -> Result<Option<LeaseRecord>> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                return Err(self.corrupt(e.to_string()));
            }
            Err(e) => {
                return Err(LeaseError::io(
                    format!("reading lease {}", self.path.display()),
                    e,
                ))
            }
        };

        serde_json::from_str(&data)
            .map(Some)
            .map_err(|e| self.corrupt(e.to_string()))
    }

    /// Whether the lease file exists and its owner still holds it.
    pub fn is_live(&self) -> Result<bool> {
        match self.load()? {
            Some(record) => record.is_current(),
            None => Ok(false),
        }
    }

    /// Whether the lease is live and was taken through `owner_path`.
    pub fn is_owned_by(&self, owner_path: &Path) -> Result<bool> {
        match self.load()? {
            Some(record) => Ok(record.owner_path == owner_path && record.is_current()?),
            None => Ok(false),
        }
    }

    /// Take the lease for the owner whose identity file is `owner_path`.
    ///
    /// Must be called with the store lock held.
    pub fn persist(&self, owner_path: &Path) -> Result<LeaseRecord> {
        let owner_snapshot =
            std::fs::read_to_string(owner_path).map_err(|e| LeaseError::OwnerUnavailable {
                path: owner_path.to_path_buf(),
                message: e.to_string(),
            })?;

        let record = LeaseRecord {
            owner_path: owner_path.to_path_buf(),
            owner_snapshot,
        };
        let json = serde_json::to_string(&record).map_err(|e| {
            LeaseError::io(
                format!("serializing lease {}", self.path.display()),
                io::Error::new(io::ErrorKind::InvalidData, e),
            )
        })?;

        atomic_write(&self.path, json.as_bytes()).map_err(|e| {
            LeaseError::io(format!("writing lease {}", self.path.display()), e)
        })?;
        Ok(record)
    }

    /// Delete the lease file. Returns whether a file was removed.
    pub fn remove(&self) -> Result<bool> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(LeaseError::io(
                format!("removing lease {}", self.path.display()),
                e,
            )),
        }
    }

    /// When the lease file was last written, if it exists.
    pub fn leased_at(&self) -> Result<Option<DateTime<Utc>>> {
        match std::fs::metadata(&self.path).and_then(|m| m.modified()) {
            Ok(modified) => Ok(Some(DateTime::<Utc>::from(modified))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LeaseError::io(
                format!("reading lease {} metadata", self.path.display()),
                e,
            )),
        }
    }

    fn corrupt(&self, reason: String) -> LeaseError {
        LeaseError::CorruptLease {
            path: self.path.clone(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        _dir: tempfile::TempDir,
        store: PathBuf,
        owner: PathBuf,
        pool: SubnetPool,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = dir.path().join("store");
        std::fs::create_dir(&store).unwrap();
        let owner = dir.path().join("uuid");
        std::fs::write(&owner, "0123456789abcdef0123456789abcdef").unwrap();
        Fixture {
            store,
            owner,
            pool: SubnetPool::default(),
            _dir: dir,
        }
    }

    #[test]
    fn test_from_index_path() {
        let fx = fixture();
        let lease = Lease::from_index(&fx.store, &fx.pool, 201).unwrap();
        assert_eq!(lease.subnet().to_string(), "192.168.201.0/24");
        assert_eq!(lease.path(), fx.store.join("201.lease"));
        assert_eq!(lease.index(), 201);
        assert!(!lease.exists());
    }

    #[test]
    fn test_from_index_out_of_range() {
        let fx = fixture();
        assert!(matches!(
            Lease::from_index(&fx.store, &fx.pool, 10),
            Err(LeaseError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_from_subnet_matches_from_index() {
        let fx = fixture();
        for index in fx.pool.indices() {
            let by_index = Lease::from_index(&fx.store, &fx.pool, index).unwrap();
            let by_subnet =
                Lease::from_subnet(&fx.store, &fx.pool, &by_index.subnet().to_string()).unwrap();
            assert_eq!(by_index, by_subnet);
        }
    }

    #[test]
    fn test_from_subnet_errors() {
        let fx = fixture();
        assert!(matches!(
            Lease::from_subnet(&fx.store, &fx.pool, "0.0.0.-1"),
            Err(LeaseError::MalformedAddress { .. })
        ));
        assert!(matches!(
            Lease::from_subnet(&fx.store, &fx.pool, "10.10.10.0"),
            Err(LeaseError::OutOfRange { .. })
        ));
    }

    #[test]
    fn test_parse_file_name() {
        assert_eq!(Lease::parse_file_name("201.lease"), Some(201));
        assert_eq!(Lease::parse_file_name("0.lease"), Some(0));
        assert_eq!(Lease::parse_file_name("256.lease"), None);
        assert_eq!(Lease::parse_file_name("subnet-lease.lock"), None);
        assert_eq!(Lease::parse_file_name(".lease"), None);
        assert_eq!(Lease::parse_file_name("+1.lease"), None);
        assert_eq!(Lease::parse_file_name("201.lease.tmp"), None);
        assert_eq!(Lease::parse_file_name("abc.lease"), None);
        assert_eq!(Lease::parse_file_name("0200.lease"), None);
        assert_eq!(Lease::parse_file_name("00.lease"), None);
    }

    #[test]
    fn test_persist_writes_json_array() {
        let fx = fixture();
        let lease = Lease::from_index(&fx.store, &fx.pool, 200).unwrap();
        let record = lease.persist(&fx.owner).unwrap();

        let data = std::fs::read_to_string(lease.path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&data).unwrap();
        assert_eq!(
            value,
            serde_json::json!([
                fx.owner.to_str().unwrap(),
                "0123456789abcdef0123456789abcdef"
            ])
        );
        assert_eq!(lease.read_metadata().unwrap(), record);
        assert!(lease.exists());
        assert!(lease.leased_at().unwrap().is_some());
    }

    #[test]
    fn test_persist_missing_owner() {
        let fx = fixture();
        let lease = Lease::from_index(&fx.store, &fx.pool, 200).unwrap();
        let err = lease.persist(&fx.store.join("nope")).unwrap_err();
        assert!(matches!(err, LeaseError::OwnerUnavailable { .. }));
        assert!(!lease.exists());
    }

    #[test]
    fn test_liveness_follows_owner_file() {
        let fx = fixture();
        let lease = Lease::from_index(&fx.store, &fx.pool, 202).unwrap();
        assert!(!lease.is_live().unwrap());

        lease.persist(&fx.owner).unwrap();
        assert!(lease.is_live().unwrap());
        assert!(lease.is_owned_by(&fx.owner).unwrap());

        // Directory reused by a new environment with a fresh identity
        std::fs::write(&fx.owner, "ffffffffffffffffffffffffffffffff").unwrap();
        assert!(!lease.is_live().unwrap());
        assert!(!lease.is_owned_by(&fx.owner).unwrap());

        std::fs::remove_file(&fx.owner).unwrap();
        assert!(!lease.is_live().unwrap());
        assert!(lease.exists());
    }

    #[test]
    fn test_owner_path_replaced_by_directory_is_stale() {
        let fx = fixture();
        let lease = Lease::from_index(&fx.store, &fx.pool, 203).unwrap();
        lease.persist(&fx.owner).unwrap();
        std::fs::remove_file(&fx.owner).unwrap();
        std::fs::create_dir(&fx.owner).unwrap();
        assert!(!lease.is_live().unwrap());
    }

    #[test]
    fn test_is_owned_by_other_path() {
        let fx = fixture();
        let lease = Lease::from_index(&fx.store, &fx.pool, 204).unwrap();
        lease.persist(&fx.owner).unwrap();
        assert!(!lease.is_owned_by(Path::new("/some/other/uuid")).unwrap());
    }

    #[test]
    fn test_corrupt_lease() {
        let fx = fixture();
        let lease = Lease::from_index(&fx.store, &fx.pool, 205).unwrap();
        std::fs::write(lease.path(), "{not json").unwrap();
        assert!(matches!(
            lease.read_metadata(),
            Err(LeaseError::CorruptLease { .. })
        ));
        assert!(matches!(
            lease.is_live(),
            Err(LeaseError::CorruptLease { .. })
        ));

        std::fs::write(lease.path(), "[\"/only/one/element\"]").unwrap();
        assert!(matches!(
            lease.read_metadata(),
            Err(LeaseError::CorruptLease { .. })
        ));
    }

    #[test]
    fn test_read_metadata_absent() {
        let fx = fixture();
        let lease = Lease::from_index(&fx.store, &fx.pool, 206).unwrap();
        assert!(lease.load().unwrap().is_none());
        assert!(matches!(lease.read_metadata(), Err(LeaseError::Io { .. })));
        assert!(lease.leased_at().unwrap().is_none());
    }

    #[test]
    fn test_remove_is_idempotent() {
        let fx = fixture();
        let lease = Lease::from_index(&fx.store, &fx.pool, 207).unwrap();
        lease.persist(&fx.owner).unwrap();
        assert!(lease.remove().unwrap());
        assert!(!lease.remove().unwrap());
        assert!(!lease.exists());
    }
}
