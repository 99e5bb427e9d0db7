//! `labnet owner` command - Create or show an owner identity file.
//!
//! Orchestration creates one identity file per environment and passes it to
//! `labnet acquire --owner`. Deleting the file later lets the store reclaim
//! every subnet the environment forgot to release.

use std::path::PathBuf;

use clap::Args;
use labnet_runtime::OwnerIdentity;

#[derive(Args)]
pub struct OwnerArgs {
    /// Identity file path
    pub path: PathBuf,

    /// Print the token of an existing file instead of creating a new one
    #[arg(long)]
    pub show: bool,
}

pub async fn execute(args: OwnerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let owner = if args.show {
        OwnerIdentity::open(&args.path)?
    } else {
        OwnerIdentity::create(&args.path)?
    };
    println!("{}", owner.token()?);
    Ok(())
}
