//! Subnet lease store.
//!
//! A directory of `{N}.lease` files plus one lock file. All mutations happen
//! with the lock held and re-read the directory from disk; listing is
//! lock-free and may race with a concurrent mutation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use labnet_core::config::StoreConfig;
use labnet_core::error::{LeaseError, Result};
use labnet_core::subnet::{Subnet, SubnetPool};

use crate::lease::Lease;
use crate::lock::{DirLock, LockGuard};

/// Name of the lock file inside the store directory.
pub const LOCK_FILE_NAME: &str = "subnet-lease.lock";

/// Default wait for the store lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// File-backed allocator of `/24` subnets.
#[derive(Debug, Clone)]
pub struct SubnetStore {
    /// Store directory (canonical).
    path: PathBuf,
    pool: SubnetPool,
    lock: DirLock,
    lock_timeout: Duration,
}

impl SubnetStore {
    /// Open (creating if needed) a store with the default pool.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        Self::with_pool(path, SubnetPool::default())
    }

    /// Open (creating if needed) a store over the given pool.
    pub fn with_pool(path: impl Into<PathBuf>, pool: SubnetPool) -> Result<Self> {
        let path = path.into();
        std::fs::create_dir_all(&path).map_err(|e| unavailable(&path, e))?;
        let path = std::fs::canonicalize(&path).map_err(|e| unavailable(&path, e))?;

        let lock = DirLock::new(path.join(LOCK_FILE_NAME));
        Ok(Self {
            path,
            pool,
            lock,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        })
    }

    /// Open the store described by a config.
    pub fn from_config(config: &StoreConfig) -> Result<Self> {
        config.validate()?;
        let store = Self::with_pool(&config.path, config.pool()?)?;
        Ok(store.with_lock_timeout(config.lock_timeout()))
    }

    /// Set how long mutating calls wait for the store lock.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn pool(&self) -> &SubnetPool {
        &self.pool
    }

    pub fn min_octet(&self) -> u8 {
        self.pool.min_octet()
    }

    pub fn max_octet(&self) -> u8 {
        self.pool.max_octet()
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    pub fn lock_path(&self) -> &Path {
        self.lock.path()
    }

    /// Lease for pool index `index` in this store.
    pub fn lease_for_index(&self, index: u8) -> Result<Lease> {
        Lease::from_index(&self.path, &self.pool, index)
    }

    /// Lease for a dotted address or CIDR string in this store.
    pub fn lease_for_subnet(&self, subnet: &str) -> Result<Lease> {
        Lease::from_subnet(&self.path, &self.pool, subnet)
    }

    fn lease_for(&self, subnet: Subnet) -> Result<Lease> {
        Ok(Lease::for_subnet(&self.path, self.pool.check(subnet)?))
    }

    fn lock(&self) -> Result<LockGuard> {
        self.lock.acquire(self.lock_timeout)
    }

    /// Lease a subnet for the owner whose identity file is `owner_path`.
    ///
    /// With `subnet` given, that subnet is taken unless another live owner
    /// holds it; asking again for a subnet the caller already holds returns
    /// it unchanged. Without `subnet`, the lowest free index is taken,
    /// removing a stale lease found on the way.
    pub fn acquire(&self, owner_path: impl AsRef<Path>, subnet: Option<&str>) -> Result<Subnet> {
        let requested = subnet.map(|s| self.lease_for_subnet(s)).transpose()?;
        let owner_path = resolve_owner(owner_path.as_ref())?;

        let _guard = self.lock()?;
        match requested {
            Some(lease) => self.take(&lease, &owner_path),
            None => self.take_free(&owner_path),
        }
    }

    /// Lease `count` free subnets in one lock hold.
    ///
    /// Either all are taken or, on failure, the ones taken by this call are
    /// released again before the error is returned.
    pub fn acquire_many(&self, owner_path: impl AsRef<Path>, count: usize) -> Result<Vec<Subnet>> {
        let owner_path = resolve_owner(owner_path.as_ref())?;
        if count > self.pool.capacity() {
            return Err(self.full());
        }

        let _guard = self.lock()?;
        let mut taken = Vec::with_capacity(count);
        for _ in 0..count {
            match self.acquire(&owner_path, None) {
                Ok(subnet) => taken.push(subnet),
                Err(e) => {
                    if let Err(rollback) = self.release(&taken) {
                        tracing::warn!(error = %rollback, "Failed to roll back partial allocation");
                    }
                    return Err(e);
                }
            }
        }
        Ok(taken)
    }

    fn take(&self, lease: &Lease, owner_path: &Path) -> Result<Subnet> {
        let subnet = lease.subnet();
        if let Some(record) = lease.load()? {
            if record.is_current()? {
                if record.owner_path == owner_path {
                    tracing::debug!(%subnet, owner = %owner_path.display(), "Subnet already leased by caller");
                    return Ok(subnet);
                }
                return Err(LeaseError::AlreadyTaken {
                    subnet: subnet.to_string(),
                    owner: record.owner_path,
                });
            }
            tracing::warn!(
                %subnet,
                previous_owner = %record.owner_path.display(),
                "Taking over stale lease"
            );
        }

        lease.persist(owner_path)?;
        tracing::info!(%subnet, owner = %owner_path.display(), "Leased subnet");
        Ok(subnet)
    }

    fn take_free(&self, owner_path: &Path) -> Result<Subnet> {
        for index in self.pool.indices() {
            let lease = self.lease_for_index(index)?;
            if let Some(record) = lease.load()? {
                if record.is_current()? {
                    continue;
                }
                tracing::warn!(
                    subnet = %lease.subnet(),
                    previous_owner = %record.owner_path.display(),
                    "Removing stale lease"
                );
                lease.remove()?;
            }

            lease.persist(owner_path)?;
            tracing::info!(subnet = %lease.subnet(), owner = %owner_path.display(), "Leased subnet");
            return Ok(lease.subnet());
        }

        Err(self.full())
    }

    fn full(&self) -> LeaseError {
        LeaseError::StoreFull {
            min: self.pool.min_octet(),
            max: self.pool.max_octet(),
        }
    }

    /// Release the leases of the given subnets.
    ///
    /// Every target is validated before anything is removed. Releasing a
    /// subnet that is not leased is a no-op. Returns the subnets whose lease
    /// files were actually removed.
    pub fn release<I>(&self, subnets: I) -> Result<Vec<Subnet>>
    where
        I: IntoIterator,
        I::Item: LeaseTarget,
    {
        let leases = subnets
            .into_iter()
            .map(|target| target.resolve(self))
            .collect::<Result<Vec<_>>>()?;
        if leases.is_empty() {
            return Ok(Vec::new());
        }

        let _guard = self.lock()?;
        let mut released = Vec::with_capacity(leases.len());
        for lease in &leases {
            if lease.remove()? {
                tracing::info!(subnet = %lease.subnet(), "Released subnet");
                released.push(lease.subnet());
            } else {
                tracing::debug!(subnet = %lease.subnet(), "Subnet was not leased");
            }
        }
        Ok(released)
    }

    /// List lease files, sorted by index.
    ///
    /// With `owner` given, only leases whose recorded owner token equals it
    /// are returned. Takes no lock.
    pub fn list_leases(&self, owner: Option<&str>) -> Result<Vec<Lease>> {
        let entries = std::fs::read_dir(&self.path).map_err(|e| unavailable(&self.path, e))?;

        let mut leases = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| unavailable(&self.path, e))?;
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                continue;
            };
            if name == LOCK_FILE_NAME {
                continue;
            }
            let Some(index) = Lease::parse_file_name(name) else {
                tracing::debug!(entry = name, "Skipping non-lease entry");
                continue;
            };
            let lease = match self.lease_for_index(index) {
                Ok(lease) => lease,
                Err(e) => {
                    tracing::warn!(entry = name, error = %e, "Skipping lease outside the pool");
                    continue;
                }
            };

            if let Some(token) = owner {
                // May have been released since the directory was read
                match lease.load()? {
                    Some(record) if record.owner_snapshot == token => {}
                    _ => continue,
                }
            }
            leases.push(lease);
        }

        leases.sort_by_key(Lease::index);
        Ok(leases)
    }

    /// Remove every stale lease. Returns the freed subnets.
    pub fn prune(&self) -> Result<Vec<Subnet>> {
        let _guard = self.lock()?;
        let mut freed = Vec::new();
        for lease in self.list_leases(None)? {
            match lease.load()? {
                Some(record) if !record.is_current()? => {
                    tracing::warn!(
                        subnet = %lease.subnet(),
                        previous_owner = %record.owner_path.display(),
                        "Removing stale lease"
                    );
                    if lease.remove()? {
                        freed.push(lease.subnet());
                    }
                }
                _ => {}
            }
        }
        Ok(freed)
    }
}

/// Anything that names a subnet of a store: CIDR or dotted strings, subnets,
/// or leases.
pub trait LeaseTarget {
    /// The lease in `store` for this target.
    fn resolve(self, store: &SubnetStore) -> Result<Lease>;
}

impl LeaseTarget for &str {
    fn resolve(self, store: &SubnetStore) -> Result<Lease> {
        store.lease_for_subnet(self)
    }
}

impl LeaseTarget for String {
    fn resolve(self, store: &SubnetStore) -> Result<Lease> {
        store.lease_for_subnet(&self)
    }
}

impl LeaseTarget for &String {
    fn resolve(self, store: &SubnetStore) -> Result<Lease> {
        store.lease_for_subnet(self)
    }
}

impl LeaseTarget for Subnet {
    fn resolve(self, store: &SubnetStore) -> Result<Lease> {
        store.lease_for(self)
    }
}

impl LeaseTarget for &Subnet {
    fn resolve(self, store: &SubnetStore) -> Result<Lease> {
        store.lease_for(*self)
    }
}

impl LeaseTarget for Lease {
    fn resolve(self, store: &SubnetStore) -> Result<Lease> {
        store.lease_for(self.subnet())
    }
}

impl LeaseTarget for &Lease {
    fn resolve(self, store: &SubnetStore) -> Result<Lease> {
        store.lease_for(self.subnet())
    }
}

/// Canonical path of an existing owner identity file.
fn resolve_owner(owner_path: &Path) -> Result<PathBuf> {
    let canonical =
        std::fs::canonicalize(owner_path).map_err(|e| LeaseError::OwnerUnavailable {
            path: owner_path.to_path_buf(),
            message: e.to_string(),
        })?;
    if !canonical.is_file() {
        return Err(LeaseError::OwnerUnavailable {
            path: owner_path.to_path_buf(),
            message: "not a regular file".to_string(),
        });
    }
    Ok(canonical)
}

fn unavailable(path: &Path, err: std::io::Error) -> LeaseError {
    LeaseError::StoreUnavailable {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}
