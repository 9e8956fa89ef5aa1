use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::api::{into_stream, ClientError, Connector, SpeakerApiClient};
use crate::rib::{Family, RouteUpdate};

/// A BGP speaker's global path table
#[async_trait]
pub trait Speaker: Send + Sync {
    async fn add_path(&self, update: RouteUpdate) -> Result<(), ClientError>;
    async fn delete_path(&self, update: RouteUpdate) -> Result<(), ClientError>;
    /// Snapshot of every path of `family`
    async fn list_paths(&self, family: Family) -> Result<Vec<RouteUpdate>, ClientError>;
    /// Current paths of `family`, then changes, until the speaker goes away
    async fn monitor_paths(
        &self,
        family: Family,
    ) -> Result<BoxStream<'static, RouteUpdate>, ClientError>;

    /// Add or delete depending on the withdraw flag
    async fn mod_path(&self, update: RouteUpdate) -> Result<(), ClientError> {
        if update.withdraw {
            self.delete_path(update).await
        } else {
            self.add_path(update).await
        }
    }
}

/// [`Speaker`] over the speaker's JSON-RPC API
pub struct RpcSpeaker {
    connector: Connector,
}

impl RpcSpeaker {
    pub fn new(endpoint: &str) -> Self {
        Self {
            connector: Connector::new(endpoint),
        }
    }
}

#[async_trait]
impl Speaker for RpcSpeaker {
    async fn add_path(&self, update: RouteUpdate) -> Result<(), ClientError> {
        let client = self.connector.client().await?;
        client.add_path(update).await?;
        Ok(())
    }

    async fn delete_path(&self, update: RouteUpdate) -> Result<(), ClientError> {
        let client = self.connector.client().await?;
        client.delete_path(update).await?;
        Ok(())
    }

    async fn list_paths(&self, family: Family) -> Result<Vec<RouteUpdate>, ClientError> {
        let client = self.connector.client().await?;
        Ok(client.list_paths(family).await?)
    }

    async fn monitor_paths(
        &self,
        family: Family,
    ) -> Result<BoxStream<'static, RouteUpdate>, ClientError> {
        let client = self.connector.client().await?;
        let subscription = client.monitor_paths(family).await?;
        Ok(into_stream(subscription, "speaker paths"))
    }
}
