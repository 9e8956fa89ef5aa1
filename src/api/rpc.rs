use std::net::IpAddr;

use ipnetwork::IpNetwork;
use jsonrpsee::core::{RpcResult, SubscriptionResult};
use jsonrpsee::proc_macros::rpc;
use serde::{self, Deserialize, Serialize};

use crate::rib::{Family, RouteUpdate};

/// Synchronization API served by the core, used by tenants
#[rpc(server, client, namespace = "ribs")]
pub trait CoreApi {
    /// Push one (VPN) route from a tenant into the core speaker
    #[method(name = "modRoute")]
    async fn mod_route(&self, update: RouteUpdate) -> RpcResult<()>;

    /// Ask the core to replay its table for a route target (or "*")
    #[method(name = "syncRoutes")]
    async fn sync_routes(&self, rt: String) -> RpcResult<()>;

    /// Stream of plain routes for one tenant
    #[subscription(name = "monitorRoutes" => "route", unsubscribe = "unmonitorRoutes", item = RouteUpdate)]
    async fn monitor_routes(&self, node_id: u32, rt: String) -> SubscriptionResult;
}

/// Read-only diagnostics served next to [`CoreApi`]
#[rpc(server, client, namespace = "ribs")]
pub trait RibsApi {
    #[method(name = "showNexthops")]
    async fn show_nexthops(&self) -> RpcResult<Vec<NexthopSummary>>;
    #[method(name = "showTenants")]
    async fn show_tenants(&self) -> RpcResult<Vec<TenantSummary>>;
    #[method(name = "showAliases")]
    async fn show_aliases(&self) -> RpcResult<Vec<AliasSummary>>;
}

/// Path table of a BGP speaker
#[rpc(client, namespace = "speaker")]
pub trait SpeakerApi {
    #[method(name = "addPath")]
    async fn add_path(&self, update: RouteUpdate) -> RpcResult<()>;
    #[method(name = "deletePath")]
    async fn delete_path(&self, update: RouteUpdate) -> RpcResult<()>;
    #[method(name = "listPaths")]
    async fn list_paths(&self, family: Family) -> RpcResult<Vec<RouteUpdate>>;
    /// Current paths of `family` followed by every change
    #[subscription(name = "monitorPaths" => "path", unsubscribe = "unmonitorPaths", item = RouteUpdate)]
    async fn monitor_paths(&self, family: Family) -> SubscriptionResult;
}

/// Distributed link-state directory
#[rpc(client, namespace = "nla")]
pub trait LinkStateApi {
    #[method(name = "modVpn")]
    async fn mod_vpn(&self, request: VpnRequest) -> RpcResult<()>;
    #[subscription(name = "monitorNetlink" => "netlink", unsubscribe = "unmonitorNetlink", item = LinkStateEvent)]
    async fn monitor_netlink(&self) -> SubscriptionResult;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Add,
    Delete,
}

/// VPN route registration for the dataplane
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct VpnRequest {
    pub op: Operation,
    pub node_id: u32,
    pub dst: IpNetwork,
    // Alias the tenant sees as next-hop (add only)
    pub gateway: Option<IpAddr>,
    #[serde(default = "Vec::new")]
    pub labels: Vec<u32>,
    // Real VPN next-hop (add only)
    pub vpn_gateway: Option<IpAddr>,
}

/// Kernel state change reported by the link-state directory
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LinkStateEvent {
    Route {
        op: Operation,
        node_id: u32,
        dst: IpNetwork,
        gateway: Option<IpAddr>,
    },
    /// Links, addresses, neighbors: nothing to do here
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NexthopSummary {
    pub key: String,
    pub route_target: Option<String>,
    pub address: IpAddr,
    pub source_id: Option<IpAddr>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TenantSummary {
    pub route_target: String,
    pub node_id: u32,
    pub subscription_id: u64,
    pub connected_at: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AliasSummary {
    pub original: IpAddr,
    pub alias: IpAddr,
}
