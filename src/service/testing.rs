//! In-memory stand-ins for the speaker, link-state directory, core link
//! and dummy-route installer.

use std::net::IpAddr;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use ipnetwork::IpNetwork;
use parking_lot::Mutex;

use super::dummy::{DummyRouteError, DummyRoutes};
use crate::api::{ClientError, CoreLink, LinkStateEvent};
use crate::linkstate::LinkState;
use crate::rib::{Family, Nlri, PathAttribute, RouteUpdate};
use crate::speaker::Speaker;

/// Path table keyed by NLRI, plus a log of every call
#[derive(Default)]
pub struct FakeSpeaker {
    pub table: Mutex<Vec<RouteUpdate>>,
    pub added: Mutex<Vec<RouteUpdate>>,
    pub deleted: Mutex<Vec<RouteUpdate>>,
}

impl FakeSpeaker {
    pub fn with_paths(paths: Vec<RouteUpdate>) -> Self {
        Self {
            table: Mutex::new(paths),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Speaker for FakeSpeaker {
    async fn add_path(&self, update: RouteUpdate) -> Result<(), ClientError> {
        let mut table = self.table.lock();
        table.retain(|p| p.nlri != update.nlri);
        table.push(update.clone());
        self.added.lock().push(update);
        Ok(())
    }

    async fn delete_path(&self, update: RouteUpdate) -> Result<(), ClientError> {
        self.table.lock().retain(|p| p.nlri != update.nlri);
        self.deleted.lock().push(update);
        Ok(())
    }

    async fn list_paths(&self, family: Family) -> Result<Vec<RouteUpdate>, ClientError> {
        Ok(self
            .table
            .lock()
            .iter()
            .filter(|p| p.nlri.family() == family)
            .cloned()
            .collect())
    }

    async fn monitor_paths(
        &self,
        _family: Family,
    ) -> Result<BoxStream<'static, RouteUpdate>, ClientError> {
        Ok(stream::pending().boxed())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Registration {
    pub node_id: u32,
    pub dst: IpNetwork,
    pub gateway: IpAddr,
    pub labels: Vec<u32>,
    pub vpn_gateway: IpAddr,
}

#[derive(Default)]
pub struct FakeLinkState {
    pub registered: Mutex<Vec<Registration>>,
    pub unregistered: Mutex<Vec<(u32, IpNetwork)>>,
}

#[async_trait]
impl LinkState for FakeLinkState {
    async fn register_vpn_route(
        &self,
        node_id: u32,
        dst: IpNetwork,
        gateway: IpAddr,
        labels: Vec<u32>,
        vpn_gateway: IpAddr,
    ) -> Result<(), ClientError> {
        self.registered.lock().push(Registration {
            node_id,
            dst,
            gateway,
            labels,
            vpn_gateway,
        });
        Ok(())
    }

    async fn unregister_vpn_route(&self, node_id: u32, dst: IpNetwork) -> Result<(), ClientError> {
        self.unregistered.lock().push((node_id, dst));
        Ok(())
    }

    async fn monitor(&self) -> Result<BoxStream<'static, LinkStateEvent>, ClientError> {
        Ok(stream::pending().boxed())
    }
}

#[derive(Default)]
pub struct FakeCore {
    pub modified: Mutex<Vec<RouteUpdate>>,
    pub syncs: Mutex<Vec<String>>,
}

#[async_trait]
impl CoreLink for FakeCore {
    async fn mod_route(&self, update: RouteUpdate) -> Result<(), ClientError> {
        self.modified.lock().push(update);
        Ok(())
    }

    async fn sync_routes(&self, rt: &str) -> Result<(), ClientError> {
        self.syncs.lock().push(rt.to_string());
        Ok(())
    }

    async fn monitor_routes(
        &self,
        _node_id: u32,
        _rt: &str,
    ) -> Result<BoxStream<'static, RouteUpdate>, ClientError> {
        Ok(stream::pending().boxed())
    }
}

#[derive(Default)]
pub struct FakeDummies {
    pub installed: Mutex<Vec<IpAddr>>,
    pub removed: Mutex<Vec<IpAddr>>,
}

#[async_trait]
impl DummyRoutes for FakeDummies {
    async fn install(&self, addr: IpAddr) -> Result<(), DummyRouteError> {
        self.installed.lock().push(addr);
        Ok(())
    }

    async fn remove(&self, addr: IpAddr) -> Result<(), DummyRouteError> {
        self.removed.lock().push(addr);
        Ok(())
    }
}

pub fn plain_route(prefix: &str, next_hop: &str) -> RouteUpdate {
    RouteUpdate::new(
        Nlri::Unicast(prefix.parse().unwrap()),
        vec![PathAttribute::NextHop(next_hop.parse().unwrap())],
    )
}

pub fn vpn_route(prefix: &str, next_hop: &str, rt: &str) -> RouteUpdate {
    let rt: crate::rib::RouteTarget = rt.parse().unwrap();
    RouteUpdate::new(
        Nlri::LabeledVpn {
            rd: "65000:1".parse().unwrap(),
            labels: vec![10001],
            prefix: prefix.parse().unwrap(),
        },
        vec![
            PathAttribute::MpReachNlri {
                next_hop: next_hop.parse().unwrap(),
            },
            PathAttribute::ExtendedCommunities(vec![rt.to_ext_community()]),
        ],
    )
    .with_route_target(&rt.to_string())
}
