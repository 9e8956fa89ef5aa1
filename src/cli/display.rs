use colored::*;
use prettytable::{cell, row, Row};

use super::table::ToRow;
use crate::api::{AliasSummary, NexthopSummary, TenantSummary};
use crate::utils::{format_timestamp_as_elapsed, maybe_string};

impl ToRow for NexthopSummary {
    fn columns() -> Row {
        row!["Key", "Owner", "Address", "Source", "Age"]
    }

    fn to_row(&self) -> Row {
        let owner = match &self.route_target {
            Some(rt) => format!("tenant {}", rt).normal(),
            None => "core".cyan(),
        };
        row![
            self.key,
            owner,
            self.address,
            maybe_string(self.source_id.as_ref()),
            format_timestamp_as_elapsed(self.created_at),
        ]
    }
}

impl ToRow for TenantSummary {
    fn columns() -> Row {
        row!["Route Target", "Node", "Subscription", "Uptime"]
    }

    fn to_row(&self) -> Row {
        row![
            self.route_target,
            self.node_id,
            self.subscription_id,
            format_timestamp_as_elapsed(self.connected_at),
        ]
    }
}

impl ToRow for AliasSummary {
    fn columns() -> Row {
        row!["Next Hop", "Alias"]
    }

    fn to_row(&self) -> Row {
        row![self.original, self.alias]
    }
}
