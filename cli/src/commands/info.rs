//! `labnet info` command - Show store configuration and usage.

use std::path::PathBuf;

use clap::Args;
use labnet_runtime::SubnetStore;
use serde::Serialize;

use super::{with_store, StoreArgs};

#[derive(Args)]
pub struct InfoArgs {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct StoreInfo {
    pub path: PathBuf,
    pub lock_file: PathBuf,
    pub first_subnet: String,
    pub last_subnet: String,
    pub capacity: usize,
    /// Leases whose owner is still alive
    pub in_use: usize,
    /// Lease files on disk, stale ones included
    pub lease_files: usize,
    pub lock_timeout_secs: f64,
}

/// Describe `store` and count its leases.
pub(crate) fn gather(store: &SubnetStore) -> labnet_core::Result<StoreInfo> {
    let pool = store.pool();
    let leases = store.list_leases(None)?;
    let mut in_use = 0;
    for lease in &leases {
        if lease.is_live()? {
            in_use += 1;
        }
    }

    Ok(StoreInfo {
        path: store.path().to_path_buf(),
        lock_file: store.lock_path().to_path_buf(),
        first_subnet: pool.subnet_for_index(pool.min_octet())?.to_string(),
        last_subnet: pool.subnet_for_index(pool.max_octet())?.to_string(),
        capacity: pool.capacity(),
        in_use,
        lease_files: leases.len(),
        lock_timeout_secs: store.lock_timeout().as_secs_f64(),
    })
}

pub async fn execute(store: &StoreArgs, args: InfoArgs) -> Result<(), Box<dyn std::error::Error>> {
    let info = with_store(store, gather).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&info)?);
        return Ok(());
    }

    println!("Store:        {}", info.path.display());
    println!("Lock file:    {}", info.lock_file.display());
    println!("Range:        {} - {}", info.first_subnet, info.last_subnet);
    println!("Capacity:     {}", info.capacity);
    println!("In use:       {}", info.in_use);
    println!("Lease files:  {}", info.lease_files);
    println!("Lock timeout: {}s", info.lock_timeout_secs);
    Ok(())
}
