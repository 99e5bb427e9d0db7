//! labnet Core - Subnet Pool Types and Errors
//!
//! This crate provides the value types shared by the lease store and its
//! callers: the canonical `/24` subnet, the leasable pool bounds, the store
//! configuration and the error taxonomy.

pub mod config;
pub mod error;
pub mod subnet;

// Re-export commonly used types
pub use config::StoreConfig;
pub use error::{LeaseError, Result};
pub use subnet::{Subnet, SubnetPool, CIDR_BITS, DEFAULT_MAX_OCTET, DEFAULT_MIN_OCTET};

/// labnet version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
