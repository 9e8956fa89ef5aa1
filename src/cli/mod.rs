//! # ribsd CLI
//!
//! Besides running the services, the `ribsd` binary can query the
//! diagnostic tables of a running core over its JSON-RPC API. It uses the
//! default core endpoint (127.0.0.1:50071); point it elsewhere with `--api`.
//!
//! ## Nexthops
//!
//! ```sh
//! $ ribsd show nexthops
//!  Key                 Owner             Address    Source     Age
//! ---------------------------------------------------------------------
//!  127.1.0.1           core              127.1.0.1             00:03:12
//!  10.1.0.1@65000:100  tenant 65000:100  10.1.0.1   10.0.0.2   00:03:10
//! ```
//!
//! ## Tenants
//!
//! ```sh
//! $ ribsd show tenants
//!  Route Target  Node  Subscription  Uptime
//! --------------------------------------------
//!  65000:100     2     1             00:03:12
//!  65000:200     3     4             00:01:02
//! ```
//!
//! ## Aliases
//!
//! ```sh
//! $ ribsd show aliases
//!  Next Hop   Alias
//! ----------------------
//!  192.0.2.1  127.1.0.1
//! ```

use std::error::Error;

use clap::Parser;
use colored::*;
use jsonrpsee::http_client::HttpClientBuilder;

use crate::api::{RibsApiClient, REQUEST_TIMEOUT};

mod display;
mod table;

use table::{OutputTable, ToRow};

#[derive(Parser, Debug)]
#[clap(rename_all = "kebab-case")]
pub struct ShowArgs {
    /// Core API address
    #[clap(long, default_value = "127.0.0.1:50071")]
    pub api: String,
    #[clap(subcommand)]
    pub what: Show,
}

#[derive(Parser, Debug)]
#[clap(rename_all = "kebab-case")]
pub enum Show {
    /// Nexthop ownership table
    #[clap(alias = "n")]
    Nexthops,
    /// Connected tenant subscriptions
    #[clap(alias = "t")]
    Tenants,
    /// Next-hop aliases handed to tenants
    #[clap(alias = "a")]
    Aliases,
}

fn print_table<T: ToRow>(rows: Vec<T>) {
    let mut table = OutputTable::new();
    for row in &rows {
        table.add_row(row);
    }
    if table.len() == 0 {
        println!("{}", "No entries".dimmed());
    } else {
        table.print();
    }
}

async fn run_cmd(args: &ShowArgs) -> Result<(), Box<dyn Error>> {
    let client = HttpClientBuilder::default()
        .request_timeout(REQUEST_TIMEOUT)
        .build(format!("http://{}", args.api))?;
    match args.what {
        Show::Nexthops => print_table(client.show_nexthops().await?),
        Show::Tenants => print_table(client.show_tenants().await?),
        Show::Aliases => print_table(client.show_aliases().await?),
    }
    Ok(())
}

/// Query a running core (anything other than running a service).
/// Returns false if the query failed.
pub async fn query_ribsd(args: &ShowArgs) -> bool {
    match run_cmd(args).await {
        Ok(()) => true,
        Err(err) => {
            eprintln!("{}", err.to_string().red());
            false
        }
    }
}
