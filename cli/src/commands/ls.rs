//! `labnet ls` command - List leases.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::Args;
use labnet_core::Subnet;
use labnet_runtime::SubnetStore;
use serde::Serialize;

use super::{with_store, StoreArgs};
use crate::output;

#[derive(Args)]
pub struct LsArgs {
    /// Only show leases taken by the owner with this identity token
    #[arg(long, value_name = "TOKEN")]
    pub uuid: Option<String>,

    /// Only display subnets
    #[arg(short, long)]
    pub quiet: bool,

    /// Print as JSON
    #[arg(long, conflicts_with = "quiet")]
    pub json: bool,
}

/// One listed lease.
#[derive(Debug, Serialize)]
pub(crate) struct LeaseRow {
    pub subnet: Subnet,
    pub gateway: String,
    pub live: bool,
    pub owner: PathBuf,
    pub leased_at: Option<DateTime<Utc>>,
}

/// Describe the leases of `store`, optionally only those of one owner token.
pub(crate) fn collect_rows(store: &SubnetStore, uuid: Option<&str>) -> labnet_core::Result<Vec<LeaseRow>> {
    let mut rows = Vec::new();
    for lease in store.list_leases(uuid)? {
        // Released between listing and reading
        let Some(record) = lease.load()? else {
            continue;
        };
        rows.push(LeaseRow {
            subnet: lease.subnet(),
            gateway: lease.subnet().gateway().to_string(),
            live: record.is_current()?,
            owner: record.owner_path,
            leased_at: lease.leased_at()?,
        });
    }
    Ok(rows)
}

pub async fn execute(store: &StoreArgs, args: LsArgs) -> Result<(), Box<dyn std::error::Error>> {
    let uuid = args.uuid;
    let rows = with_store(store, move |store| collect_rows(store, uuid.as_deref())).await?;

    if args.quiet {
        for row in &rows {
            println!("{}", row.subnet);
        }
        return Ok(());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    let mut table = output::new_table(&["SUBNET", "GATEWAY", "STATUS", "OWNER", "LEASED"]);
    for row in &rows {
        table.add_row(vec![
            row.subnet.to_string(),
            row.gateway.clone(),
            if row.live { "live" } else { "stale" }.to_string(),
            row.owner.display().to_string(),
            row.leased_at
                .as_ref()
                .map(output::format_ago)
                .unwrap_or_else(|| "-".to_string()),
        ]);
    }

    println!("{table}");
    Ok(())
}
