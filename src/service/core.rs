use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, trace, warn};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;

use super::monitor::{watch, Feed};
use crate::api::{LinkStateEvent, Operation};
use crate::config::CoreConfig;
use crate::linkstate::LinkState;
use crate::rib::{Family, Nlri, RouteTarget, RouteUpdate, ROUTE_TARGET_ANY};
use crate::speaker::Speaker;
use crate::tables::{AliasPool, NexthopTable, Owner, TenantSubscription, TenantTable};
use crate::translate;

const EVENT_BUFFER: usize = 16;
/// Longest a single delivery to a tenant may block the loop
pub const SEND_TIMEOUT: Duration = Duration::from_secs(3);
pub const RESYNC_MIN: Duration = Duration::from_millis(100);
pub const RESYNC_MAX: Duration = Duration::from_secs(3600);

/// Resync period, with anything under [`RESYNC_MIN`] meaning "hourly"
pub fn resync_interval(configured: Duration) -> Duration {
    if configured < RESYNC_MIN {
        RESYNC_MAX
    } else {
        configured
    }
}

/// Tables owned by the core service
pub struct CoreTables {
    pub nexthops: NexthopTable,
    pub tenants: TenantTable,
    pub aliases: AliasPool,
}

#[derive(Debug)]
pub enum CoreEvent {
    /// Core speaker paths (live or replayed by a sync)
    Speaker(Feed<RouteUpdate>),
    LinkState(Feed<LinkStateEvent>),
    Attach(TenantSubscription),
    Detach { id: u64, route_target: String },
    /// Replay the core table for a route target, or [`ROUTE_TARGET_ANY`]
    Sync(String),
    FromTenant(RouteUpdate),
}

/// Cloneable entry point into a running core service
#[derive(Clone)]
pub struct CoreHandle {
    tx: mpsc::Sender<CoreEvent>,
    tables: Arc<CoreTables>,
    next_id: Arc<AtomicU64>,
}

impl CoreHandle {
    pub fn tables(&self) -> &CoreTables {
        &self.tables
    }

    pub fn next_subscription_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Queue `event`; false once the service has stopped
    pub async fn send(&self, event: CoreEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }
}

pub struct CoreService {
    family: Family,
    resync: Duration,
    tables: Arc<CoreTables>,
    speaker: Arc<dyn Speaker>,
    linkstate: Arc<dyn LinkState>,
    tx: mpsc::Sender<CoreEvent>,
    rx: mpsc::Receiver<CoreEvent>,
    next_id: Arc<AtomicU64>,
}

impl CoreService {
    pub fn new(config: &CoreConfig, speaker: Arc<dyn Speaker>, linkstate: Arc<dyn LinkState>) -> Self {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let tables = CoreTables {
            nexthops: NexthopTable::new(),
            tenants: TenantTable::new(),
            aliases: AliasPool::new(config.nexthops),
        };
        Self {
            family: config.family,
            resync: resync_interval(config.resync),
            tables: Arc::new(tables),
            speaker,
            linkstate,
            tx,
            rx,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn handle(&self) -> CoreHandle {
        CoreHandle {
            tx: self.tx.clone(),
            tables: Arc::clone(&self.tables),
            next_id: Arc::clone(&self.next_id),
        }
    }

    pub async fn run(mut self, done: CancellationToken) {
        info!(
            "Core service running: family={} aliases={} resync={:?}",
            self.family,
            self.tables.aliases.mode(),
            self.resync
        );

        let speaker = Arc::clone(&self.speaker);
        let family = self.family;
        tokio::spawn(watch(
            "core speaker",
            move || {
                let speaker = Arc::clone(&speaker);
                async move { speaker.monitor_paths(family).await }
            },
            self.tx.clone(),
            CoreEvent::Speaker,
            done.clone(),
        ));
        let linkstate = Arc::clone(&self.linkstate);
        tokio::spawn(watch(
            "link-state",
            move || {
                let linkstate = Arc::clone(&linkstate);
                async move { linkstate.monitor().await }
            },
            self.tx.clone(),
            CoreEvent::LinkState,
            done.clone(),
        ));

        let mut ticker = interval_at(Instant::now() + self.resync, self.resync);
        loop {
            tokio::select! {
                _ = done.cancelled() => break,
                _ = ticker.tick() => {
                    debug!("Periodic resync");
                    self.sync(ROUTE_TARGET_ANY.to_string());
                }
                event = self.rx.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
            }
        }
        info!("Core service stopped");
    }

    async fn handle_event(&self, event: CoreEvent) {
        match event {
            CoreEvent::Speaker(Feed::Item(update)) => self.forward_to_tenant(update).await,
            CoreEvent::Speaker(Feed::Connected) => info!("Core speaker connected"),
            CoreEvent::Speaker(Feed::Disconnected) => warn!("Core speaker disconnected"),
            CoreEvent::LinkState(Feed::Item(event)) => self.on_link_state(event).await,
            CoreEvent::LinkState(Feed::Connected) => info!("Link-state directory connected"),
            CoreEvent::LinkState(Feed::Disconnected) => {
                warn!("Link-state directory disconnected")
            }
            CoreEvent::Attach(subscription) => self.attach(subscription),
            CoreEvent::Detach { id, route_target } => self.detach(id, &route_target),
            CoreEvent::Sync(route_target) => self.sync(route_target),
            CoreEvent::FromTenant(update) => self.forward_to_core(update).await,
        }
    }

    fn attach(&self, subscription: TenantSubscription) {
        let rt = subscription.route_target.clone();
        if self.tables.tenants.contains(&rt) {
            let removed = self.tables.nexthops.delete_by_route_target(&rt);
            debug!("Cleared {} nexthops of replaced tenant rt {}", removed, rt);
        }
        info!(
            "Tenant attached: nid={} rt={} id={}",
            subscription.node_id, rt, subscription.id
        );
        if let Some(previous) = self.tables.tenants.insert(subscription) {
            info!("Replaced subscription {} for rt {}", previous.id, rt);
        }
        debug!("{} tenants attached", self.tables.tenants.len());
        self.sync(rt);
    }

    fn detach(&self, id: u64, rt: &str) {
        match self.tables.tenants.remove(rt, id) {
            Some(subscription) => {
                let removed = self.tables.nexthops.delete_by_route_target(rt);
                info!(
                    "Tenant detached: nid={} rt={} id={} ({} nexthops cleared)",
                    subscription.node_id, rt, id, removed
                );
            }
            None => debug!("Ignoring detach of stale subscription {} for rt {}", id, rt),
        }
    }

    /// List the core table in the background and feed matching paths
    /// back through the loop as if the speaker had just sent them
    fn sync(&self, filter: String) {
        debug!("Syncing rt '{}'", filter);
        let speaker = Arc::clone(&self.speaker);
        let tx = self.tx.clone();
        let family = self.family;
        tokio::spawn(async move {
            let paths = match speaker.list_paths(family).await {
                Ok(paths) => paths,
                Err(err) => {
                    error!("Sync of rt '{}' failed: {}", filter, err);
                    return;
                }
            };
            let matching = paths.into_iter().filter(|path| {
                path.route_target_community()
                    .map(|rt| rt.matches(&filter))
                    .unwrap_or(false)
            });
            for path in matching {
                if tx.send(CoreEvent::Speaker(Feed::Item(path))).await.is_err() {
                    break;
                }
            }
        });
    }

    /// Tenant -> Core
    async fn forward_to_core(&self, update: RouteUpdate) {
        if !update.nlri.family().is_vpn() {
            warn!("Dropping non-VPN route from tenant: {}", update);
            return;
        }
        let rt = if update.route_target.is_empty() {
            translate::route_target(&update).map_err(|err| err.to_string())
        } else {
            update.route_target.parse::<RouteTarget>()
        };
        let rt = match rt {
            Ok(rt) => rt.to_string(),
            Err(err) => {
                warn!("Dropping route from tenant: {}", err);
                return;
            }
        };

        match update.next_hop() {
            Some(next_hop) => {
                let mut nexthops = self.tables.nexthops.write();
                if nexthops.select(next_hop, &Owner::Core) {
                    debug!("Reject tenant->core {} via {} rt {}", update.nlri, next_hop, rt);
                    return;
                }
                if nexthops.add(next_hop, Owner::Tenant(rt.clone()), update.source_id) {
                    debug!("Registered nexthop {} for rt {}", next_hop, rt);
                }
            }
            None if update.withdraw => debug!("Bare withdraw of {} from rt {}", update.nlri, rt),
            None => {
                warn!("Dropping route from tenant without next-hop: {}", update);
                return;
            }
        }

        trace!("Tenant->core {}", update);
        if let Err(err) = self.speaker.mod_path(update).await {
            error!("Failed to update core speaker: {}", err);
        }
    }

    /// Core -> Tenant
    async fn forward_to_tenant(&self, update: RouteUpdate) {
        let rt = match translate::route_target(&update) {
            Ok(rt) => rt.to_string(),
            Err(err) => {
                warn!("Dropping core route: {}", err);
                return;
            }
        };
        let tenant = match self.tables.tenants.get(&rt) {
            Some(tenant) => tenant,
            None => {
                debug!("No tenant for rt {}, dropping {}", rt, update.nlri);
                return;
            }
        };
        let (prefix, labels) = match &update.nlri {
            Nlri::LabeledVpn { prefix, labels, .. } => (*prefix, labels.clone()),
            other => {
                error!("Unsupported prefix type from core speaker: {}", other);
                return;
            }
        };
        let next_hop = match update.next_hop() {
            Some(next_hop) => next_hop,
            None if update.withdraw => {
                self.deliver(&tenant, &rt, &update, None).await;
                return;
            }
            None => {
                warn!("Dropping core route without next-hop: {}", update);
                return;
            }
        };

        let alias = {
            let mut nexthops = self.tables.nexthops.write();
            if nexthops.select(next_hop, &Owner::Tenant(rt.clone())) {
                debug!("Reject core->tenant {} via {} rt {}", update.nlri, next_hop, rt);
                return;
            }
            let alias = match self.tables.aliases.value(next_hop) {
                Ok(alias) => alias,
                Err(err) => {
                    error!("No alias for {}: {}", next_hop, err);
                    return;
                }
            };
            if nexthops.add(alias, Owner::Core, None) {
                debug!("Registered alias {} for {} as core", alias, next_hop);
            }
            alias
        };

        if !update.withdraw {
            debug!(
                "Registering VPN route nid={} dst={} gw={} labels={:?} vpn-gw={}",
                tenant.node_id, prefix, alias, labels, next_hop
            );
            if let Err(err) = self
                .linkstate
                .register_vpn_route(tenant.node_id, prefix, alias, labels, next_hop)
                .await
            {
                error!("Failed to register VPN route {}: {}", prefix, err);
            }
        }

        self.deliver(&tenant, &rt, &update, Some(alias)).await;
    }

    async fn deliver(
        &self,
        tenant: &TenantSubscription,
        rt: &str,
        update: &RouteUpdate,
        alias: Option<IpAddr>,
    ) {
        let plain = match translate::to_plain(update, alias) {
            Ok(plain) => plain.with_route_target(rt),
            Err(err) => {
                warn!("Dropping core route: {}", err);
                return;
            }
        };
        trace!("Core->tenant {}", plain);
        if let Err(err) = tenant.tx.send_timeout(plain, SEND_TIMEOUT).await {
            warn!("Failed to deliver to tenant rt {}: {}", rt, err);
        }
    }

    async fn on_link_state(&self, event: LinkStateEvent) {
        let (node_id, dst, gateway) = match event {
            LinkStateEvent::Route {
                op: Operation::Delete,
                node_id,
                dst,
                gateway: Some(gateway),
            } if node_id != 0 => (node_id, dst, gateway),
            other => {
                trace!("Ignoring link-state event {:?}", other);
                return;
            }
        };
        if !self.tables.nexthops.select(gateway, &Owner::Core) {
            debug!("Not a VPN route: nid={} dst={} gw={}", node_id, dst, gateway);
            return;
        }
        debug!("Unregistering VPN route nid={} dst={}", node_id, dst);
        if let Err(err) = self.linkstate.unregister_vpn_route(node_id, dst).await {
            error!("Failed to unregister VPN route {} for nid {}: {}", dst, node_id, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rib::PathAttribute;
    use crate::service::testing::{plain_route, vpn_route, FakeLinkState, FakeSpeaker};
    use crate::tables::AliasMode;
    use ipnetwork::IpNetwork;
    use std::net::IpAddr;
    use tokio::time::timeout;

    const RT: &str = "65000:100";

    fn config(nexthops: AliasMode) -> CoreConfig {
        CoreConfig {
            listen: "127.0.0.1:0".parse().unwrap(),
            nla_api: String::new(),
            bgpd_api: String::new(),
            family: Family::ipv4_vpn(),
            resync: Duration::from_secs(60),
            nexthops,
        }
    }

    fn service(speaker: Arc<FakeSpeaker>, linkstate: Arc<FakeLinkState>) -> CoreService {
        CoreService::new(
            &config(AliasMode::Net("127.1.0.0/24".parse().unwrap())),
            speaker,
            linkstate,
        )
    }

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    /// Handle queued events (sync replays included) until the loop is idle
    async fn settle(service: &mut CoreService) {
        while let Ok(Some(event)) = timeout(Duration::from_millis(50), service.rx.recv()).await {
            service.handle_event(event).await;
        }
    }

    async fn attach(
        service: &mut CoreService,
        id: u64,
        rt: &str,
    ) -> mpsc::Receiver<RouteUpdate> {
        let (tx, rx) = mpsc::channel(64);
        let subscription = TenantSubscription::new(id, 7, rt, tx);
        service.handle_event(CoreEvent::Attach(subscription)).await;
        settle(service).await;
        rx
    }

    fn drain(rx: &mut mpsc::Receiver<RouteUpdate>) -> Vec<RouteUpdate> {
        let mut routes = vec![];
        while let Ok(route) = rx.try_recv() {
            routes.push(route);
        }
        routes
    }

    fn tenant_vpn(prefix: &str, next_hop: &str) -> RouteUpdate {
        let rt: crate::rib::RouteTarget = RT.parse().unwrap();
        translate::to_vpn(
            &plain_route(prefix, next_hop),
            "65000:100".parse().unwrap(),
            &[10007],
            rt,
        )
        .unwrap()
    }

    #[test]
    fn test_resync_interval() {
        assert_eq!(resync_interval(Duration::from_millis(99)), RESYNC_MAX);
        assert_eq!(resync_interval(Duration::from_millis(0)), RESYNC_MAX);
        assert_eq!(resync_interval(Duration::from_millis(100)), RESYNC_MIN);
        assert_eq!(resync_interval(Duration::from_secs(30)), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_tenant_route_reaches_core_and_not_back() {
        let speaker = Arc::new(FakeSpeaker::default());
        let linkstate = Arc::new(FakeLinkState::default());
        let mut core = service(speaker.clone(), linkstate.clone());
        let mut tenant = attach(&mut core, 1, RT).await;

        let update = tenant_vpn("10.1.0.0/24", "10.1.0.1");
        core.handle_event(CoreEvent::FromTenant(update.clone())).await;
        assert_eq!(speaker.added.lock().clone(), vec![update.clone()]);
        assert!(core
            .tables
            .nexthops
            .select(addr("10.1.0.1"), &Owner::Tenant(RT.to_string())));

        // The core speaker reports the injected path back
        core.handle_event(CoreEvent::Speaker(Feed::Item(update))).await;
        assert!(drain(&mut tenant).is_empty());
        assert!(linkstate.registered.lock().is_empty());
    }

    #[tokio::test]
    async fn test_core_route_reaches_tenant_with_alias() {
        let speaker = Arc::new(FakeSpeaker::default());
        let linkstate = Arc::new(FakeLinkState::default());
        let mut core = service(speaker.clone(), linkstate.clone());
        let mut tenant = attach(&mut core, 1, RT).await;

        let update = vpn_route("10.1.0.0/24", "192.0.2.1", RT);
        core.handle_event(CoreEvent::Speaker(Feed::Item(update))).await;

        let alias = core.tables.aliases.value(addr("192.0.2.1")).unwrap();
        assert_eq!(alias, addr("127.1.0.1"));
        let routes = drain(&mut tenant);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].nlri, Nlri::Unicast("10.1.0.0/24".parse().unwrap()));
        assert_eq!(routes[0].next_hop(), Some(alias));
        assert_eq!(routes[0].route_target, RT);

        let registered = linkstate.registered.lock().clone();
        assert_eq!(registered.len(), 1);
        assert_eq!(registered[0].node_id, 7);
        assert_eq!(registered[0].gateway, alias);
        assert_eq!(registered[0].vpn_gateway, addr("192.0.2.1"));
        assert_eq!(registered[0].labels, vec![10001]);

        // The tenant's speaker echoes the route back via the alias
        let echo = tenant_vpn("10.1.0.0/24", "127.1.0.1");
        core.handle_event(CoreEvent::FromTenant(echo)).await;
        assert!(speaker.added.lock().is_empty());
    }

    #[tokio::test]
    async fn test_identity_alias_rejects_echo_of_real_next_hop() {
        let speaker = Arc::new(FakeSpeaker::default());
        let linkstate = Arc::new(FakeLinkState::default());
        let mut core = CoreService::new(&config(AliasMode::None), speaker.clone(), linkstate);
        let mut tenant = attach(&mut core, 1, RT).await;

        core.handle_event(CoreEvent::Speaker(Feed::Item(vpn_route(
            "10.1.0.0/24",
            "192.0.2.1",
            RT,
        ))))
        .await;
        assert_eq!(drain(&mut tenant)[0].next_hop(), Some(addr("192.0.2.1")));

        core.handle_event(CoreEvent::FromTenant(tenant_vpn("10.1.0.0/24", "192.0.2.1")))
            .await;
        assert!(speaker.added.lock().is_empty());
    }

    #[tokio::test]
    async fn test_withdraw_is_not_registered() {
        let speaker = Arc::new(FakeSpeaker::default());
        let linkstate = Arc::new(FakeLinkState::default());
        let mut core = service(speaker, linkstate.clone());
        let mut tenant = attach(&mut core, 1, RT).await;

        let withdraw = vpn_route("10.1.0.0/24", "192.0.2.1", RT).with_withdraw(true);
        core.handle_event(CoreEvent::Speaker(Feed::Item(withdraw))).await;
        let routes = drain(&mut tenant);
        assert!(routes[0].withdraw);
        assert!(linkstate.registered.lock().is_empty());
    }

    #[tokio::test]
    async fn test_routes_without_subscriber_or_route_target_are_dropped() {
        let speaker = Arc::new(FakeSpeaker::default());
        let linkstate = Arc::new(FakeLinkState::default());
        let mut core = service(speaker, linkstate.clone());
        let mut tenant = attach(&mut core, 1, RT).await;

        core.handle_event(CoreEvent::Speaker(Feed::Item(vpn_route(
            "10.2.0.0/24",
            "192.0.2.1",
            "65000:200",
        ))))
        .await;
        let mut untagged = vpn_route("10.3.0.0/24", "192.0.2.1", RT);
        untagged
            .attributes
            .retain(|a| !matches!(a, PathAttribute::ExtendedCommunities(_)));
        core.handle_event(CoreEvent::Speaker(Feed::Item(untagged))).await;

        assert!(drain(&mut tenant).is_empty());
        assert!(linkstate.registered.lock().is_empty());
        assert!(core.tables.aliases.entries().is_empty());
    }

    #[tokio::test]
    async fn test_attach_replays_existing_routes() {
        let speaker = Arc::new(FakeSpeaker::with_paths(vec![
            vpn_route("10.1.0.0/24", "192.0.2.1", RT),
            vpn_route("10.2.0.0/24", "192.0.2.2", RT),
            vpn_route("10.9.0.0/24", "192.0.2.9", "65000:900"),
        ]));
        let linkstate = Arc::new(FakeLinkState::default());
        let mut core = service(speaker, linkstate);
        let mut tenant = attach(&mut core, 1, RT).await;

        let mut prefixes: Vec<_> = drain(&mut tenant)
            .into_iter()
            .map(|r| r.nlri.prefix().to_string())
            .collect();
        prefixes.sort();
        assert_eq!(prefixes, vec!["10.1.0.0/24", "10.2.0.0/24"]);
    }

    #[tokio::test]
    async fn test_resync_is_idempotent() {
        let speaker = Arc::new(FakeSpeaker::with_paths(vec![
            vpn_route("10.1.0.0/24", "192.0.2.1", RT),
            vpn_route("10.2.0.0/24", "192.0.2.2", RT),
        ]));
        let linkstate = Arc::new(FakeLinkState::default());
        let mut core = service(speaker, linkstate);
        let mut tenant = attach(&mut core, 1, RT).await;
        drain(&mut tenant);

        let mut rounds = vec![];
        for _ in 0..2 {
            core.handle_event(CoreEvent::Sync(RT.to_string())).await;
            settle(&mut core).await;
            let mut routes = drain(&mut tenant);
            routes.sort_by_key(|r| r.nlri.prefix().to_string());
            rounds.push(routes);
        }
        assert_eq!(rounds[0].len(), 2);
        assert_eq!(rounds[0], rounds[1]);

        // The wildcard reaches the same routes
        core.handle_event(CoreEvent::Sync(ROUTE_TARGET_ANY.to_string())).await;
        settle(&mut core).await;
        assert_eq!(drain(&mut tenant).len(), 2);
    }

    #[tokio::test]
    async fn test_detach_clears_history() {
        let speaker = Arc::new(FakeSpeaker::default());
        let linkstate = Arc::new(FakeLinkState::default());
        let mut core = service(speaker.clone(), linkstate);
        let _tenant = attach(&mut core, 1, RT).await;

        // Tenant introduces a nexthop, which then shows up in the core table
        let update = tenant_vpn("10.1.0.0/24", "10.1.0.1");
        core.handle_event(CoreEvent::FromTenant(update)).await;

        core.handle_event(CoreEvent::Detach {
            id: 1,
            route_target: RT.to_string(),
        })
        .await;
        assert!(core.tables.tenants.is_empty());
        assert!(!core
            .tables
            .nexthops
            .select(addr("10.1.0.1"), &Owner::Tenant(RT.to_string())));

        // A fresh subscriber gets the route as if nothing had happened
        let mut tenant = attach(&mut core, 2, RT).await;
        let routes = drain(&mut tenant);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].nlri, Nlri::Unicast("10.1.0.0/24".parse().unwrap()));
        assert_eq!(routes[0].source_id, Some(addr("10.1.0.1")));
    }

    #[tokio::test]
    async fn test_stale_detach_keeps_replacement() {
        let speaker = Arc::new(FakeSpeaker::default());
        let linkstate = Arc::new(FakeLinkState::default());
        let mut core = service(speaker, linkstate);
        let _old = attach(&mut core, 1, RT).await;
        let _new = attach(&mut core, 2, RT).await;

        core.handle_event(CoreEvent::FromTenant(tenant_vpn("10.1.0.0/24", "10.1.0.1")))
            .await;
        core.handle_event(CoreEvent::Detach {
            id: 1,
            route_target: RT.to_string(),
        })
        .await;
        assert_eq!(core.tables.tenants.get(RT).unwrap().id, 2);
        assert!(core
            .tables
            .nexthops
            .select(addr("10.1.0.1"), &Owner::Tenant(RT.to_string())));
    }

    #[tokio::test]
    async fn test_link_state_route_delete() {
        let speaker = Arc::new(FakeSpeaker::default());
        let linkstate = Arc::new(FakeLinkState::default());
        let mut core = service(speaker, linkstate.clone());
        let _tenant = attach(&mut core, 1, RT).await;
        core.handle_event(CoreEvent::Speaker(Feed::Item(vpn_route(
            "10.1.0.0/24",
            "192.0.2.1",
            RT,
        ))))
        .await;

        let delete = |node_id: u32, gateway: &str| LinkStateEvent::Route {
            op: Operation::Delete,
            node_id,
            dst: "10.1.0.0/24".parse().unwrap(),
            gateway: Some(gateway.parse().unwrap()),
        };
        // Not an alias, from the core node, and an add: all ignored
        core.handle_event(CoreEvent::LinkState(Feed::Item(delete(7, "10.9.9.9"))))
            .await;
        core.handle_event(CoreEvent::LinkState(Feed::Item(delete(0, "127.1.0.1"))))
            .await;
        core.handle_event(CoreEvent::LinkState(Feed::Item(LinkStateEvent::Route {
            op: Operation::Add,
            node_id: 7,
            dst: "10.1.0.0/24".parse().unwrap(),
            gateway: Some(addr("127.1.0.1")),
        })))
        .await;
        assert!(linkstate.unregistered.lock().is_empty());

        core.handle_event(CoreEvent::LinkState(Feed::Item(delete(7, "127.1.0.1"))))
            .await;
        let expected: Vec<(u32, IpNetwork)> = vec![(7, "10.1.0.0/24".parse().unwrap())];
        assert_eq!(linkstate.unregistered.lock().clone(), expected);
    }

    #[tokio::test]
    async fn test_no_loop_across_alternating_injections() {
        let speaker = Arc::new(FakeSpeaker::default());
        let linkstate = Arc::new(FakeLinkState::default());
        let mut core = service(speaker.clone(), linkstate);
        let mut tenant = attach(&mut core, 1, RT).await;

        let tenant_hops = ["10.1.0.1", "10.1.0.2", "10.1.0.3"];
        let core_hops = ["192.0.2.1", "192.0.2.2", "192.0.2.3"];
        for (i, (t, c)) in tenant_hops.iter().zip(core_hops.iter()).enumerate() {
            let tenant_route = tenant_vpn(&format!("10.{}.1.0/24", i), t);
            core.handle_event(CoreEvent::FromTenant(tenant_route.clone())).await;
            // The core speaker reflects what the tenant injected
            core.handle_event(CoreEvent::Speaker(Feed::Item(tenant_route))).await;

            core.handle_event(CoreEvent::Speaker(Feed::Item(vpn_route(
                &format!("10.{}.2.0/24", i),
                c,
                RT,
            ))))
            .await;
            // The tenant reflects everything it received
            for plain in drain(&mut tenant) {
                let next_hop = plain.next_hop().unwrap();
                assert!(!tenant_hops.contains(&next_hop.to_string().as_str()));
                let echo = tenant_vpn(&plain.nlri.prefix().to_string(), &next_hop.to_string());
                core.handle_event(CoreEvent::FromTenant(echo)).await;
            }
        }

        // Only the tenant's own next-hops ever reached the core speaker
        let added: Vec<_> = speaker
            .added
            .lock()
            .iter()
            .map(|r| r.next_hop().unwrap().to_string())
            .collect();
        assert_eq!(added, tenant_hops.to_vec());
    }

    fn bare_withdraw(prefix: &str) -> RouteUpdate {
        let mut withdraw = vpn_route(prefix, "192.0.2.1", RT).with_withdraw(true);
        withdraw
            .attributes
            .retain(|a| !matches!(a, PathAttribute::MpReachNlri { .. }));
        withdraw
    }

    #[tokio::test]
    async fn test_bare_withdraws_cross_both_ways() {
        let speaker = Arc::new(FakeSpeaker::default());
        let linkstate = Arc::new(FakeLinkState::default());
        let mut core = service(speaker.clone(), linkstate.clone());
        let mut tenant = attach(&mut core, 1, RT).await;

        core.handle_event(CoreEvent::Speaker(Feed::Item(vpn_route(
            "10.1.0.0/24",
            "192.0.2.1",
            RT,
        ))))
        .await;
        core.handle_event(CoreEvent::Speaker(Feed::Item(bare_withdraw("10.1.0.0/24"))))
            .await;
        let routes = drain(&mut tenant);
        assert_eq!(routes.len(), 2);
        assert!(routes[1].withdraw);
        assert_eq!(routes[1].nlri, Nlri::Unicast("10.1.0.0/24".parse().unwrap()));
        assert_eq!(routes[1].next_hop(), None);
        assert_eq!(routes[1].route_target, RT);
        assert_eq!(linkstate.registered.lock().len(), 1);

        let rt: crate::rib::RouteTarget = RT.parse().unwrap();
        let local = RouteUpdate::new(Nlri::Unicast("10.5.0.0/24".parse().unwrap()), vec![])
            .with_withdraw(true);
        let withdraw = translate::to_vpn(&local, "65000:7".parse().unwrap(), &[10007], rt).unwrap();
        core.handle_event(CoreEvent::FromTenant(withdraw.clone())).await;
        assert_eq!(speaker.deleted.lock().clone(), vec![withdraw]);
        assert!(core.tables.nexthops.entries().iter().all(|e| e.owner == Owner::Core));
    }

    #[tokio::test]
    async fn test_tenant_route_target_is_normalized() {
        let speaker = Arc::new(FakeSpeaker::default());
        let linkstate = Arc::new(FakeLinkState::default());
        let mut core = service(speaker.clone(), linkstate);
        let _tenant = attach(&mut core, 1, RT).await;

        let padded = tenant_vpn("10.1.0.0/24", "10.1.0.1").with_route_target("65000:0100");
        core.handle_event(CoreEvent::FromTenant(padded)).await;
        assert!(core
            .tables
            .nexthops
            .select(addr("10.1.0.1"), &Owner::Tenant(RT.to_string())));

        let bogus = tenant_vpn("10.2.0.0/24", "10.1.0.2").with_route_target("bogus");
        core.handle_event(CoreEvent::FromTenant(bogus)).await;
        assert_eq!(speaker.added.lock().len(), 1);

        core.handle_event(CoreEvent::Detach {
            id: 1,
            route_target: RT.to_string(),
        })
        .await;
        assert!(core.tables.nexthops.entries().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_subscriber_does_not_block_loop() {
        let speaker = Arc::new(FakeSpeaker::default());
        let linkstate = Arc::new(FakeLinkState::default());
        let mut core = service(speaker, linkstate);
        let gone = attach(&mut core, 1, RT).await;
        let mut other = attach(&mut core, 2, "65000:200").await;
        drop(gone);

        let start = Instant::now();
        core.handle_event(CoreEvent::Speaker(Feed::Item(vpn_route(
            "10.1.0.0/24",
            "192.0.2.1",
            RT,
        ))))
        .await;
        assert!(start.elapsed() < SEND_TIMEOUT);
        assert!(core.tables.tenants.contains(RT));

        core.handle_event(CoreEvent::Speaker(Feed::Item(vpn_route(
            "10.2.0.0/24",
            "192.0.2.2",
            "65000:200",
        ))))
        .await;
        let routes = drain(&mut other);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].nlri, Nlri::Unicast("10.2.0.0/24".parse().unwrap()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_subscriber_drops_after_timeout() {
        let speaker = Arc::new(FakeSpeaker::default());
        let linkstate = Arc::new(FakeLinkState::default());
        let mut core = service(speaker, linkstate);
        let (tx, mut slow) = mpsc::channel(1);
        core.handle_event(CoreEvent::Attach(TenantSubscription::new(1, 7, RT, tx)))
            .await;
        settle(&mut core).await;
        let mut other = attach(&mut core, 2, "65000:200").await;

        let start = Instant::now();
        for prefix in &["10.1.0.0/24", "10.2.0.0/24"] {
            core.handle_event(CoreEvent::Speaker(Feed::Item(vpn_route(prefix, "192.0.2.1", RT))))
                .await;
        }
        assert!(start.elapsed() >= SEND_TIMEOUT);
        let routes = drain(&mut slow);
        assert_eq!(routes.len(), 1);
        assert_eq!(routes[0].nlri, Nlri::Unicast("10.1.0.0/24".parse().unwrap()));

        // The loop carries on for everyone else
        core.handle_event(CoreEvent::Speaker(Feed::Item(vpn_route(
            "10.3.0.0/24",
            "192.0.2.3",
            "65000:200",
        ))))
        .await;
        assert_eq!(drain(&mut other).len(), 1);
    }
}
