use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use jsonrpsee::core::client::Subscription;
use jsonrpsee::ws_client::{WsClient, WsClientBuilder};
use log::{debug, warn};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::sync::Mutex;

use super::rpc::CoreApiClient;
use crate::rib::RouteUpdate;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("cannot reach {endpoint}: {source}")]
    Connect {
        endpoint: String,
        source: jsonrpsee::core::ClientError,
    },
    #[error(transparent)]
    Rpc(#[from] jsonrpsee::core::ClientError),
}

/// Lazily (re)dialed WebSocket client for one endpoint
pub struct Connector {
    endpoint: String,
    client: Mutex<Option<Arc<WsClient>>>,
}

impl Connector {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            client: Mutex::new(None),
        }
    }

    /// Connected client, dialing again if the last one dropped
    pub async fn client(&self) -> Result<Arc<WsClient>, ClientError> {
        let mut cached = self.client.lock().await;
        if let Some(client) = cached.as_ref() {
            if client.is_connected() {
                return Ok(Arc::clone(client));
            }
            debug!("Connection to {} lost, redialing", self.endpoint);
        }
        let client = WsClientBuilder::default()
            .request_timeout(REQUEST_TIMEOUT)
            .build(&self.endpoint)
            .await
            .map_err(|source| ClientError::Connect {
                endpoint: self.endpoint.clone(),
                source,
            })?;
        let client = Arc::new(client);
        *cached = Some(Arc::clone(&client));
        Ok(client)
    }
}

/// Turn a subscription into a stream that ends on the first bad item
pub fn into_stream<T>(subscription: Subscription<T>, what: &'static str) -> BoxStream<'static, T>
where
    T: DeserializeOwned + Send + 'static,
{
    subscription
        .take_while(move |item| {
            if let Err(err) = item {
                warn!("Dropping {} stream: {}", what, err);
            }
            futures::future::ready(item.is_ok())
        })
        .filter_map(|item| futures::future::ready(item.ok()))
        .boxed()
}

/// The tenant's view of the core
#[async_trait]
pub trait CoreLink: Send + Sync {
    async fn mod_route(&self, update: RouteUpdate) -> Result<(), ClientError>;
    async fn sync_routes(&self, rt: &str) -> Result<(), ClientError>;
    async fn monitor_routes(
        &self,
        node_id: u32,
        rt: &str,
    ) -> Result<BoxStream<'static, RouteUpdate>, ClientError>;
}

pub struct RpcCoreLink {
    connector: Connector,
}

impl RpcCoreLink {
    pub fn new(endpoint: &str) -> Self {
        Self {
            connector: Connector::new(endpoint),
        }
    }
}

#[async_trait]
impl CoreLink for RpcCoreLink {
    async fn mod_route(&self, update: RouteUpdate) -> Result<(), ClientError> {
        let client = self.connector.client().await?;
        client.mod_route(update).await?;
        Ok(())
    }

    async fn sync_routes(&self, rt: &str) -> Result<(), ClientError> {
        let client = self.connector.client().await?;
        client.sync_routes(rt.to_string()).await?;
        Ok(())
    }

    async fn monitor_routes(
        &self,
        node_id: u32,
        rt: &str,
    ) -> Result<BoxStream<'static, RouteUpdate>, ClientError> {
        let client = self.connector.client().await?;
        let subscription = client.monitor_routes(node_id, rt.to_string()).await?;
        Ok(into_stream(subscription, "core routes"))
    }
}
