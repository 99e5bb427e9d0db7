//! `labnet release` command - Release leased subnets.

use clap::Args;

use super::{with_store, StoreArgs};

#[derive(Args)]
pub struct ReleaseArgs {
    /// Subnet(s) to release, as network, CIDR or any address inside it
    #[arg(required = true)]
    pub subnets: Vec<String>,
}

pub async fn execute(store: &StoreArgs, args: ReleaseArgs) -> Result<(), Box<dyn std::error::Error>> {
    let subnets = args.subnets;
    let released = with_store(store, move |store| store.release(&subnets)).await?;

    for subnet in released {
        println!("{subnet}");
    }
    Ok(())
}
