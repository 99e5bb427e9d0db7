//! `labnet prune` command - Remove leases whose owner is gone.

use clap::Args;

use super::{with_store, StoreArgs};

#[derive(Args)]
pub struct PruneArgs {
    /// Only print the number of freed subnets
    #[arg(short, long)]
    pub quiet: bool,
}

pub async fn execute(store: &StoreArgs, args: PruneArgs) -> Result<(), Box<dyn std::error::Error>> {
    let freed = with_store(store, |store| store.prune()).await?;

    if args.quiet {
        println!("{}", freed.len());
        return Ok(());
    }
    for subnet in &freed {
        println!("{subnet}");
    }
    Ok(())
}
