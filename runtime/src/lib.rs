//! labnet Runtime - File-backed subnet lease store.
//!
//! Hands out mutually exclusive `192.168.N.0/24` subnets to independent
//! processes sharing one directory. Mutations are serialized with an advisory
//! lock on a file inside the store; leases whose owner identity file vanished
//! or changed are reclaimed lazily.

#![allow(clippy::result_large_err)]

mod fs;
pub mod lease;
pub mod lock;
pub mod owner;
pub mod store;

// Re-export common types
pub use labnet_core::{LeaseError, Result, StoreConfig, Subnet, SubnetPool};
pub use lease::{Lease, LeaseRecord, LEASE_EXTENSION};
pub use lock::{DirLock, LockGuard};
pub use owner::OwnerIdentity;
pub use store::{LeaseTarget, SubnetStore, DEFAULT_LOCK_TIMEOUT, LOCK_FILE_NAME};

/// labnet Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
