use std::net::IpAddr;

use async_trait::async_trait;
use futures::stream::BoxStream;
use ipnetwork::IpNetwork;

use crate::api::{
    into_stream, ClientError, Connector, LinkStateApiClient, LinkStateEvent, Operation,
    VpnRequest,
};

/// Distributed link-state directory ("NLA")
#[async_trait]
pub trait LinkState: Send + Sync {
    /// Program a tenant's VPN route: `dst` via `gateway` (the alias),
    /// encapsulated with `labels` towards `vpn_gateway`
    async fn register_vpn_route(
        &self,
        node_id: u32,
        dst: IpNetwork,
        gateway: IpAddr,
        labels: Vec<u32>,
        vpn_gateway: IpAddr,
    ) -> Result<(), ClientError>;

    async fn unregister_vpn_route(&self, node_id: u32, dst: IpNetwork) -> Result<(), ClientError>;

    async fn monitor(&self) -> Result<BoxStream<'static, LinkStateEvent>, ClientError>;
}

pub struct RpcLinkState {
    connector: Connector,
}

impl RpcLinkState {
    pub fn new(endpoint: &str) -> Self {
        Self {
            connector: Connector::new(endpoint),
        }
    }
}

#[async_trait]
impl LinkState for RpcLinkState {
    async fn register_vpn_route(
        &self,
        node_id: u32,
        dst: IpNetwork,
        gateway: IpAddr,
        labels: Vec<u32>,
        vpn_gateway: IpAddr,
    ) -> Result<(), ClientError> {
        let client = self.connector.client().await?;
        let request = VpnRequest {
            op: Operation::Add,
            node_id,
            dst,
            gateway: Some(gateway),
            labels,
            vpn_gateway: Some(vpn_gateway),
        };
        client.mod_vpn(request).await?;
        Ok(())
    }

    async fn unregister_vpn_route(&self, node_id: u32, dst: IpNetwork) -> Result<(), ClientError> {
        let client = self.connector.client().await?;
        let request = VpnRequest {
            op: Operation::Delete,
            node_id,
            dst,
            gateway: None,
            labels: vec![],
            vpn_gateway: None,
        };
        client.mod_vpn(request).await?;
        Ok(())
    }

    async fn monitor(&self) -> Result<BoxStream<'static, LinkStateEvent>, ClientError> {
        let client = self.connector.client().await?;
        let subscription = client.monitor_netlink().await?;
        Ok(into_stream(subscription, "link-state"))
    }
}
