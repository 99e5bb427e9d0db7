//! CLI command definitions and dispatch.

mod acquire;
mod info;
mod ls;
mod owner;
mod prune;
mod release;
mod version;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use labnet_core::{LeaseError, StoreConfig};
use labnet_runtime::SubnetStore;

/// Exit status when the store lock could not be taken (`EX_TEMPFAIL`).
pub const EXIT_LOCK_UNAVAILABLE: i32 = 75;

/// labnet - hand out lab subnets from a shared lease directory.
#[derive(Parser)]
#[command(name = "labnet", version, about)]
pub struct Cli {
    #[command(flatten)]
    pub store: StoreArgs,

    /// Enable debug logging (overrides RUST_LOG)
    #[arg(long, global = true)]
    pub debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Options locating and shaping the store.
#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// Store directory (default: $LABNET_LEASE_DIR or ~/.labnet/subnets)
    #[arg(long = "store", global = true, value_name = "DIR")]
    pub path: Option<PathBuf>,

    /// YAML config file
    #[arg(long, global = true, value_name = "FILE", env = "LABNET_CONFIG")]
    pub config: Option<PathBuf>,

    /// Lowest leasable third octet
    #[arg(long, global = true, value_name = "OCTET")]
    pub min_octet: Option<u8>,

    /// Highest leasable third octet
    #[arg(long, global = true, value_name = "OCTET")]
    pub max_octet: Option<u8>,

    /// Seconds to wait for the store lock
    #[arg(long, global = true, value_name = "SECS")]
    pub lock_timeout: Option<u64>,
}

impl StoreArgs {
    /// Merge flags over environment over config file over defaults.
    pub fn resolve(&self) -> labnet_core::Result<StoreConfig> {
        let base = match &self.config {
            Some(file) => StoreConfig::load(file)?,
            None => StoreConfig::default(),
        };
        let mut config = base.apply_env()?;

        if let Some(path) = &self.path {
            config.path = path.clone();
        }
        if let Some(min) = self.min_octet {
            config.min_octet = min;
        }
        if let Some(max) = self.max_octet {
            config.max_octet = max;
        }
        if let Some(secs) = self.lock_timeout {
            config.lock_timeout_secs = secs;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Available commands.
#[derive(Subcommand)]
pub enum Command {
    /// Lease one or more subnets for an owner
    Acquire(acquire::AcquireArgs),
    /// Release leased subnets
    Release(release::ReleaseArgs),
    /// List leases
    Ls(ls::LsArgs),
    /// Remove leases whose owner is gone
    Prune(prune::PruneArgs),
    /// Create or show an owner identity file
    Owner(owner::OwnerArgs),
    /// Show store configuration and usage
    Info(info::InfoArgs),
    /// Show version information
    Version(version::VersionArgs),
}

/// Run `f` against the configured store on the blocking thread pool.
///
/// Store calls may sleep while waiting for the lock.
pub(crate) async fn with_store<T, F>(args: &StoreArgs, f: F) -> Result<T, Box<dyn std::error::Error>>
where
    F: FnOnce(&SubnetStore) -> labnet_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let config = args.resolve()?;
    let result = tokio::task::spawn_blocking(move || {
        let store = SubnetStore::from_config(&config)?;
        f(&store)
    })
    .await?;
    Ok(result?)
}

/// Process exit status for a failed command.
pub fn exit_code(err: &(dyn std::error::Error + 'static)) -> i32 {
    match err.downcast_ref::<LeaseError>() {
        Some(e) if e.is_retryable() => EXIT_LOCK_UNAVAILABLE,
        _ => 1,
    }
}

/// Dispatch a parsed CLI to the appropriate command handler.
pub async fn dispatch(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let store = cli.store;
    match cli.command {
        Command::Acquire(args) => acquire::execute(&store, args).await,
        Command::Release(args) => release::execute(&store, args).await,
        Command::Ls(args) => ls::execute(&store, args).await,
        Command::Prune(args) => prune::execute(&store, args).await,
        Command::Owner(args) => owner::execute(args).await,
        Command::Info(args) => info::execute(&store, args).await,
        Command::Version(args) => version::execute(args).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_global_store_flags() {
        let cli = Cli::try_parse_from([
            "labnet",
            "acquire",
            "--owner",
            "/tmp/uuid",
            "--store",
            "/tmp/leases",
            "--min-octet",
            "210",
            "--max-octet",
            "212",
        ])
        .unwrap();
        assert_eq!(cli.store.path, Some(PathBuf::from("/tmp/leases")));
        assert_eq!(cli.store.min_octet, Some(210));
        assert_eq!(cli.store.max_octet, Some(212));
        assert!(matches!(cli.command, Command::Acquire(_)));
    }

    #[test]
    fn test_parse_rejects_octet_overflow() {
        let res = Cli::try_parse_from(["labnet", "ls", "--max-octet", "256"]);
        assert!(res.is_err());
    }

    #[test]
    fn test_resolve_flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("labnet.yaml");
        std::fs::write(&file, "path: /from/file\nmin_octet: 201\nlock_timeout_secs: 9\n").unwrap();

        let args = StoreArgs {
            path: Some(dir.path().join("flag")),
            config: Some(file),
            min_octet: None,
            max_octet: Some(205),
            lock_timeout: None,
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.path, dir.path().join("flag"));
        assert_eq!(config.min_octet, 201);
        assert_eq!(config.max_octet, 205);
        assert_eq!(config.lock_timeout(), Duration::from_secs(9));
    }

    #[test]
    fn test_resolve_rejects_inverted_range() {
        let args = StoreArgs {
            path: Some(PathBuf::from("/tmp/leases")),
            min_octet: Some(250),
            max_octet: Some(240),
            ..StoreArgs::default()
        };
        assert!(matches!(args.resolve(), Err(LeaseError::InvalidConfig(_))));
    }

    #[test]
    fn test_exit_code() {
        let contended: Box<dyn std::error::Error> = Box::new(LeaseError::LockUnavailable {
            path: PathBuf::from("/tmp/x.lock"),
            timeout: Duration::from_secs(5),
        });
        assert_eq!(exit_code(contended.as_ref()), EXIT_LOCK_UNAVAILABLE);

        let full: Box<dyn std::error::Error> = Box::new(LeaseError::StoreFull { min: 1, max: 2 });
        assert_eq!(exit_code(full.as_ref()), 1);

        let other: Box<dyn std::error::Error> = "plain message".into();
        assert_eq!(exit_code(other.as_ref()), 1);
    }
}
