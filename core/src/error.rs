use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// labnet lease store error types
#[derive(Error, Debug)]
pub enum LeaseError {
    /// Store directory could not be created or read
    #[error("Subnet store unavailable at {}: {message}", path.display())]
    StoreUnavailable { path: PathBuf, message: String },

    /// Exclusive store lock not obtained within the timeout
    #[error("Unable to lock {} within {}s", path.display(), timeout.as_secs_f64())]
    LockUnavailable { path: PathBuf, timeout: Duration },

    /// Input is not a parseable IPv4 /24 network
    #[error("Malformed subnet address '{input}': {reason}")]
    MalformedAddress { input: String, reason: String },

    /// Well-formed subnet outside the leasable pool
    #[error("Subnet {subnet} is out of range 192.168.{min}.0 - 192.168.{max}.0")]
    OutOfRange { subnet: String, min: u8, max: u8 },

    /// Subnet is held by a live lease of another owner
    #[error("Subnet {subnet} is already leased by {}", owner.display())]
    AlreadyTaken { subnet: String, owner: PathBuf },

    /// No free subnet left in the pool
    #[error("Subnet store is full: no free subnet in 192.168.{min}.0 - 192.168.{max}.0")]
    StoreFull { min: u8, max: u8 },

    /// Lease file exists but its content is not a lease record
    #[error("Corrupt lease file {}: {reason}", path.display())]
    CorruptLease { path: PathBuf, reason: String },

    /// Owner identity file missing or unreadable
    #[error("Owner identity {} unavailable: {message}", path.display())]
    OwnerUnavailable { path: PathBuf, message: String },

    /// Invalid store configuration
    #[error("Configuration error: {0}")]
    InvalidConfig(String),

    /// I/O error with context
    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

impl LeaseError {
    /// Build an `Io` error with a short description of the failed step.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        LeaseError::Io {
            context: context.into(),
            source,
        }
    }

    /// Whether calling again later may succeed without changing the input.
    ///
    /// Only lock contention is transient; every other variant is a semantic
    /// rejection or an environment problem the caller has to fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LeaseError::LockUnavailable { .. })
    }

    /// Stable snake_case tag for the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            LeaseError::StoreUnavailable { .. } => "store_unavailable",
            LeaseError::LockUnavailable { .. } => "lock_unavailable",
            LeaseError::MalformedAddress { .. } => "malformed_address",
            LeaseError::OutOfRange { .. } => "out_of_range",
            LeaseError::AlreadyTaken { .. } => "already_taken",
            LeaseError::StoreFull { .. } => "store_full",
            LeaseError::CorruptLease { .. } => "corrupt_lease",
            LeaseError::OwnerUnavailable { .. } => "owner_unavailable",
            LeaseError::InvalidConfig(_) => "invalid_config",
            LeaseError::Io { .. } => "io",
        }
    }
}

impl From<serde_yaml::Error> for LeaseError {
    fn from(err: serde_yaml::Error) -> Self {
        LeaseError::InvalidConfig(err.to_string())
    }
}

/// Result type alias for lease store operations
pub type Result<T> = std::result::Result<T, LeaseError>;
