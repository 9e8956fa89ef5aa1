use std::sync::Arc;

use log::{debug, error, info, trace, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::dummy::{DummyRefs, DummyRoutes};
use super::monitor::{watch, Feed};
use crate::api::CoreLink;
use crate::config::TenantConfig;
use crate::rib::{Family, RouteDistinguisher, RouteTarget, RouteUpdate};
use crate::speaker::Speaker;
use crate::translate;

const EVENT_BUFFER: usize = 16;

#[derive(Debug)]
pub enum TenantEvent {
    /// Local (tenant) speaker
    Bgp(Feed<RouteUpdate>),
    /// `monitorRoutes` stream from the core
    Core(Feed<RouteUpdate>),
}

pub struct TenantService {
    node_id: u32,
    family: Family,
    route_target: RouteTarget,
    rd: RouteDistinguisher,
    labels: Vec<u32>,
    speaker: Arc<dyn Speaker>,
    core: Arc<dyn CoreLink>,
    dummies: Arc<dyn DummyRoutes>,
    dummy_refs: DummyRefs,
    bgp_connected: bool,
    core_connected: bool,
    tx: mpsc::Sender<TenantEvent>,
    rx: mpsc::Receiver<TenantEvent>,
}

impl TenantService {
    pub fn new(
        config: &TenantConfig,
        speaker: Arc<dyn Speaker>,
        core: Arc<dyn CoreLink>,
        dummies: Arc<dyn DummyRoutes>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        Self {
            node_id: config.node_id,
            family: config.family,
            route_target: config.route_target,
            rd: config.rd,
            labels: config.labels.clone(),
            speaker,
            core,
            dummies,
            dummy_refs: DummyRefs::default(),
            bgp_connected: false,
            core_connected: false,
            tx,
            rx,
        }
    }

    fn synchronized(&self) -> bool {
        self.bgp_connected && self.core_connected
    }

    pub async fn run(mut self, done: CancellationToken) {
        info!(
            "Tenant service running: nid={} rt={} rd={} labels={:?}",
            self.node_id, self.route_target, self.rd, self.labels
        );

        let speaker = Arc::clone(&self.speaker);
        let family = self.family;
        tokio::spawn(watch(
            "tenant speaker",
            move || {
                let speaker = Arc::clone(&speaker);
                async move { speaker.monitor_paths(family).await }
            },
            self.tx.clone(),
            TenantEvent::Bgp,
            done.clone(),
        ));
        let core = Arc::clone(&self.core);
        let (node_id, rt) = (self.node_id, self.route_target.to_string());
        tokio::spawn(watch(
            "core routes",
            move || {
                let core = Arc::clone(&core);
                let rt = rt.clone();
                async move { core.monitor_routes(node_id, &rt).await }
            },
            self.tx.clone(),
            TenantEvent::Core,
            done.clone(),
        ));

        loop {
            tokio::select! {
                _ = done.cancelled() => break,
                event = self.rx.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
            }
        }
        info!("Tenant service stopped");
    }

    async fn handle_event(&mut self, event: TenantEvent) {
        match event {
            TenantEvent::Bgp(Feed::Connected) => {
                info!("Tenant speaker connected");
                self.bgp_connected = true;
                if self.synchronized() {
                    self.request_sync().await;
                }
            }
            TenantEvent::Bgp(Feed::Disconnected) => {
                warn!("Tenant speaker disconnected");
                self.bgp_connected = false;
            }
            TenantEvent::Bgp(Feed::Item(update)) => self.send_to_core(update).await,
            TenantEvent::Core(Feed::Connected) => {
                info!("Subscribed to core for rt {}", self.route_target);
                self.core_connected = true;
                if self.synchronized() {
                    self.request_sync().await;
                }
            }
            TenantEvent::Core(Feed::Disconnected) => {
                warn!("Core connection lost");
                self.core_connected = false;
            }
            TenantEvent::Core(Feed::Item(update)) => self.send_to_speaker(update).await,
        }
    }

    async fn request_sync(&self) {
        let rt = self.route_target.to_string();
        debug!("Requesting sync of rt {}", rt);
        if let Err(err) = self.core.sync_routes(&rt).await {
            error!("Sync request failed: {}", err);
        }
    }

    /// Tenant speaker -> core, as a VPN route
    async fn send_to_core(&self, update: RouteUpdate) {
        let vpn = match translate::to_vpn(&update, self.rd, &self.labels, self.route_target) {
            Ok(vpn) => vpn,
            Err(err) => {
                warn!("Dropping tenant route: {}", err);
                return;
            }
        };
        trace!("Tenant->core {}", vpn);
        if let Err(err) = self.core.mod_route(vpn).await {
            error!("Failed to send {} to core: {}", update.nlri, err);
        }
    }

    /// Core -> tenant speaker, making the next-hop resolvable first
    async fn send_to_speaker(&mut self, update: RouteUpdate) {
        let prefix = update.nlri.prefix();
        if update.withdraw {
            if let Some(stale) = self.dummy_refs.withdraw(prefix) {
                self.remove_dummy(stale).await;
            }
        } else if let Some(next_hop) = update.next_hop() {
            if let Some(stale) = self.dummy_refs.announce(prefix, next_hop) {
                self.remove_dummy(stale).await;
            }
            debug!(
                "Installing dummy route {} ({} routes)",
                next_hop,
                self.dummy_refs.users(next_hop)
            );
            if let Err(err) = self.dummies.install(next_hop).await {
                error!("Failed to install dummy route {}: {}", next_hop, err);
            }
        }

        trace!("Core->tenant {}", update);
        if let Err(err) = self.speaker.mod_path(update).await {
            error!("Failed to update tenant speaker: {}", err);
        }
    }

    async fn remove_dummy(&self, next_hop: std::net::IpAddr) {
        debug!("Removing dummy route {}", next_hop);
        if let Err(err) = self.dummies.remove(next_hop).await {
            warn!("Failed to remove dummy route {}: {}", next_hop, err);
        }
    }
}
