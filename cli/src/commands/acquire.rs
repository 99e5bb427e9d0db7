//! `labnet acquire` command - Lease subnets for an owner.

use std::path::PathBuf;

use clap::Args;

use super::{with_store, StoreArgs};

#[derive(Args)]
pub struct AcquireArgs {
    /// Owner identity file of the environment taking the lease
    #[arg(long, value_name = "FILE")]
    pub owner: PathBuf,

    /// Lease this subnet (e.g. "192.168.201.0/24") instead of the lowest free one
    #[arg(long, conflicts_with = "count")]
    pub subnet: Option<String>,

    /// Number of free subnets to lease
    #[arg(short = 'n', long, default_value_t = 1)]
    pub count: usize,

    /// Print the gateway address (x.y.z.1) instead of the network
    #[arg(long)]
    pub gateway: bool,
}

pub async fn execute(store: &StoreArgs, args: AcquireArgs) -> Result<(), Box<dyn std::error::Error>> {
    if args.count == 0 {
        return Err("--count must be at least 1".into());
    }

    let owner = args.owner;
    let requested = args.subnet;
    let count = args.count;
    let subnets = with_store(store, move |store| match requested {
        Some(subnet) => store.acquire(&owner, Some(&subnet)).map(|s| vec![s]),
        None if count == 1 => store.acquire(&owner, None).map(|s| vec![s]),
        None => store.acquire_many(&owner, count),
    })
    .await?;

    for subnet in subnets {
        if args.gateway {
            println!("{}", subnet.gateway());
        } else {
            println!("{subnet}");
        }
    }
    Ok(())
}
