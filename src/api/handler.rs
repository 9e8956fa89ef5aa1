use std::net::SocketAddr;

use async_trait::async_trait;
use jsonrpsee::core::{RpcResult, SubscriptionResult};
use jsonrpsee::server::{PendingSubscriptionSink, Server, ServerHandle, SubscriptionMessage};
use jsonrpsee::types::error::{ErrorObject, ErrorObjectOwned, INTERNAL_ERROR_CODE, INVALID_PARAMS_CODE};
use jsonrpsee::RpcModule;
use log::{debug, info};
use thiserror::Error;
use tokio::sync::mpsc;

use super::rpc::{AliasSummary, CoreApiServer, NexthopSummary, RibsApiServer, TenantSummary};
use crate::rib::{RouteTarget, RouteUpdate, ROUTE_TARGET_ANY};
use crate::service::core::{CoreEvent, CoreHandle};
use crate::tables::TenantSubscription;

/// Routes queued per subscriber before the core loop starts timing out
const SUBSCRIBER_BUFFER: usize = 64;

#[derive(Debug, Error)]
pub enum ServeError {
    #[error("cannot listen on {listen}: {source}")]
    Bind {
        listen: SocketAddr,
        source: std::io::Error,
    },
    #[error("cannot register API: {0}")]
    Register(String),
}

fn invalid_params(reason: String) -> ErrorObjectOwned {
    ErrorObject::owned(INVALID_PARAMS_CODE, reason, None::<()>)
}

fn stopped() -> ErrorObjectOwned {
    ErrorObject::owned(INTERNAL_ERROR_CODE, "core service stopped", None::<()>)
}

fn parse_route_target(rt: &str) -> Result<RouteTarget, ErrorObjectOwned> {
    rt.parse()
        .map_err(|err| invalid_params(format!("invalid route target '{}': {}", rt, err)))
}

/// JSON-RPC front end of a running core service
#[derive(Clone)]
pub struct CoreRpc {
    handle: CoreHandle,
}

impl CoreRpc {
    pub fn new(handle: CoreHandle) -> Self {
        Self { handle }
    }

    pub fn into_module(self) -> Result<RpcModule<()>, ServeError> {
        let mut module = RpcModule::new(());
        module
            .merge(CoreApiServer::into_rpc(self.clone()))
            .map_err(|err| ServeError::Register(err.to_string()))?;
        module
            .merge(RibsApiServer::into_rpc(self))
            .map_err(|err| ServeError::Register(err.to_string()))?;
        Ok(module)
    }
}

#[async_trait]
impl CoreApiServer for CoreRpc {
    async fn mod_route(&self, update: RouteUpdate) -> RpcResult<()> {
        if !self.handle.send(CoreEvent::FromTenant(update)).await {
            return Err(stopped());
        }
        Ok(())
    }

    async fn sync_routes(&self, rt: String) -> RpcResult<()> {
        let filter = if rt == ROUTE_TARGET_ANY {
            rt
        } else {
            parse_route_target(&rt)?.to_string()
        };
        if !self.handle.send(CoreEvent::Sync(filter)).await {
            return Err(stopped());
        }
        Ok(())
    }

    async fn monitor_routes(
        &self,
        pending: PendingSubscriptionSink,
        node_id: u32,
        rt: String,
    ) -> SubscriptionResult {
        let route_target = match parse_route_target(&rt) {
            Ok(route_target) => route_target.to_string(),
            Err(err) => {
                pending.reject(err).await;
                return Ok(());
            }
        };
        let sink = pending.accept().await?;

        let (tx, mut rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        let id = self.handle.next_subscription_id();
        let subscription = TenantSubscription::new(id, node_id, &route_target, tx);
        if !self.handle.send(CoreEvent::Attach(subscription)).await {
            return Err("core service stopped".into());
        }
        debug!("Subscription {} open for nid={} rt={}", id, node_id, route_target);

        let result = loop {
            tokio::select! {
                _ = sink.closed() => break Ok(()),
                update = rx.recv() => match update {
                    Some(update) => {
                        let message = match SubscriptionMessage::from_json(&update) {
                            Ok(message) => message,
                            Err(err) => break Err(err.to_string().into()),
                        };
                        if sink.send(message).await.is_err() {
                            break Ok(());
                        }
                    }
                    // Replaced by a newer subscriber for the same route target
                    None => break Ok(()),
                },
            }
        };

        debug!("Subscription {} closed for nid={} rt={}", id, node_id, route_target);
        self.handle
            .send(CoreEvent::Detach { id, route_target })
            .await;
        result
    }
}

#[async_trait]
impl RibsApiServer for CoreRpc {
    async fn show_nexthops(&self) -> RpcResult<Vec<NexthopSummary>> {
        let entries = self.handle.tables().nexthops.entries();
        Ok(entries
            .into_iter()
            .map(|entry| NexthopSummary {
                key: entry.key(),
                route_target: entry.owner.route_target().map(String::from),
                address: entry.address,
                source_id: entry.source_id,
                created_at: entry.created_at.timestamp(),
            })
            .collect())
    }

    async fn show_tenants(&self) -> RpcResult<Vec<TenantSummary>> {
        let tenants = self.handle.tables().tenants.list();
        Ok(tenants
            .into_iter()
            .map(|sub| TenantSummary {
                route_target: sub.route_target,
                node_id: sub.node_id,
                subscription_id: sub.id,
                connected_at: sub.connected_at.timestamp(),
            })
            .collect())
    }

    async fn show_aliases(&self) -> RpcResult<Vec<AliasSummary>> {
        let aliases = self.handle.tables().aliases.entries();
        Ok(aliases
            .into_iter()
            .map(|(original, alias)| AliasSummary { original, alias })
            .collect())
    }
}

/// Start serving the core API (WebSocket and HTTP on one port)
pub async fn serve(listen: SocketAddr, handle: CoreHandle) -> Result<ServerHandle, ServeError> {
    let module = CoreRpc::new(handle).into_module()?;
    let server = Server::builder()
        .build(listen)
        .await
        .map_err(|source| ServeError::Bind { listen, source })?;
    info!("Starting JSON-RPC server on {}...", listen);
    Ok(server.start(module))
}
