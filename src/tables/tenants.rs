use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::mpsc;

use crate::rib::RouteUpdate;

/// A connected tenant's `monitorRoutes` stream
#[derive(Debug, Clone)]
pub struct TenantSubscription {
    /// Unique per attach, so a stale detach can't remove a newer subscriber
    pub id: u64,
    pub node_id: u32,
    pub route_target: String,
    pub tx: mpsc::Sender<RouteUpdate>,
    pub connected_at: DateTime<Utc>,
}

impl TenantSubscription {
    pub fn new(id: u64, node_id: u32, route_target: &str, tx: mpsc::Sender<RouteUpdate>) -> Self {
        Self {
            id,
            node_id,
            route_target: route_target.to_string(),
            tx,
            connected_at: Utc::now(),
        }
    }
}

/// Subscriptions keyed by route target
#[derive(Debug, Default)]
pub struct TenantTable {
    inner: RwLock<HashMap<String, TenantSubscription>>,
}

impl TenantTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `subscription`, returning the one it replaced
    pub fn insert(&self, subscription: TenantSubscription) -> Option<TenantSubscription> {
        self.inner
            .write()
            .insert(subscription.route_target.clone(), subscription)
    }

    /// Remove the subscription for `rt`, only if it is still `id`
    pub fn remove(&self, rt: &str, id: u64) -> Option<TenantSubscription> {
        let mut inner = self.inner.write();
        match inner.get(rt) {
            Some(sub) if sub.id == id => inner.remove(rt),
            _ => None,
        }
    }

    pub fn get(&self, rt: &str) -> Option<TenantSubscription> {
        self.inner.read().get(rt).cloned()
    }

    pub fn contains(&self, rt: &str) -> bool {
        self.inner.read().contains_key(rt)
    }

    /// Snapshot, ordered by route target
    pub fn list(&self) -> Vec<TenantSubscription> {
        let mut subs: Vec<_> = self.inner.read().values().cloned().collect();
        subs.sort_by(|a, b| a.route_target.cmp(&b.route_target));
        subs
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }
}
