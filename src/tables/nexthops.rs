use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use log::trace;
use parking_lot::{RwLock, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

/// Which side of the boundary first introduced a nexthop
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Owner {
    Core,
    /// A tenant, by route target
    Tenant(String),
}

impl Owner {
    pub fn route_target(&self) -> Option<&str> {
        match self {
            Owner::Core => None,
            Owner::Tenant(rt) => Some(rt),
        }
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Owner::Core => write!(f, "core"),
            Owner::Tenant(rt) => write!(f, "tenant({})", rt),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NexthopEntry {
    pub address: IpAddr,
    pub owner: Owner,
    pub source_id: Option<IpAddr>,
    pub created_at: DateTime<Utc>,
}

impl NexthopEntry {
    /// "address" for core entries, "address@rt" for tenant entries
    pub fn key(&self) -> String {
        match &self.owner {
            Owner::Core => self.address.to_string(),
            Owner::Tenant(rt) => format!("{}@{}", self.address, rt),
        }
    }
}

/// Nexthops keyed by (address, owner)
///
/// Core entries and tenant entries live in disjoint key spaces: a core
/// entry is keyed by its address alone, a tenant entry by address and
/// route target.
#[derive(Debug, Default)]
pub struct Nexthops {
    entries: HashMap<(IpAddr, Owner), NexthopEntry>,
}

impl Nexthops {
    pub fn select(&self, address: IpAddr, owner: &Owner) -> bool {
        self.entries.contains_key(&(address, owner.clone()))
    }

    /// Register `address` for `owner`; an existing entry is left as is.
    /// Returns whether a new entry was created.
    pub fn add(&mut self, address: IpAddr, owner: Owner, source_id: Option<IpAddr>) -> bool {
        let key = (address, owner);
        if self.entries.contains_key(&key) {
            return false;
        }
        trace!("Nexthop {} registered for {}", address, key.1);
        let entry = NexthopEntry {
            address,
            owner: key.1.clone(),
            source_id,
            created_at: Utc::now(),
        };
        self.entries.insert(key, entry);
        true
    }

    /// Drop every entry a tenant introduced; returns how many went
    pub fn delete_by_route_target(&mut self, rt: &str) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|(_, owner), _| owner.route_target() != Some(rt));
        before - self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Nexthop ownership, shared between the event loop and the API handler
///
/// Use [`NexthopTable::write`] to hold the lock across a check-and-register
/// sequence.
#[derive(Debug, Default)]
pub struct NexthopTable {
    inner: RwLock<Nexthops>,
}

impl NexthopTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Nexthops> {
        self.inner.write()
    }

    pub fn select(&self, address: IpAddr, owner: &Owner) -> bool {
        self.inner.read().select(address, owner)
    }

    pub fn add(&self, address: IpAddr, owner: Owner, source_id: Option<IpAddr>) -> bool {
        self.inner.write().add(address, owner, source_id)
    }

    pub fn delete_by_route_target(&self, rt: &str) -> usize {
        self.inner.write().delete_by_route_target(rt)
    }

    /// Snapshot, ordered by owner then address
    pub fn entries(&self) -> Vec<NexthopEntry> {
        let mut entries: Vec<_> = self.inner.read().entries.values().cloned().collect();
        entries.sort_by(|a, b| (&a.owner, a.address).cmp(&(&b.owner, b.address)));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn tenant(rt: &str) -> Owner {
        Owner::Tenant(rt.to_string())
    }

    #[test]
    fn test_select_and_add() {
        let table = NexthopTable::new();
        let nh = addr("10.1.0.1");
        assert!(!table.select(nh, &Owner::Core));
        assert!(table.add(nh, Owner::Core, None));
        assert!(table.select(nh, &Owner::Core));
        // Keyspaces don't overlap
        assert!(!table.select(nh, &tenant("65000:100")));
    }

    #[test]
    fn test_add_is_idempotent() {
        let table = NexthopTable::new();
        let nh = addr("10.1.0.1");
        assert!(table.add(nh, tenant("65000:100"), Some(addr("10.9.9.9"))));
        assert!(!table.add(nh, tenant("65000:100"), None));
        let entries = table.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].source_id, Some(addr("10.9.9.9")));
        assert_eq!(entries[0].key(), "10.1.0.1@65000:100");
    }

    #[test]
    fn test_delete_by_route_target() {
        let table = NexthopTable::new();
        table.add(addr("10.1.0.1"), tenant("65000:100"), None);
        table.add(addr("10.1.0.2"), tenant("65000:100"), None);
        table.add(addr("10.1.0.1"), tenant("65000:200"), None);
        table.add(addr("127.1.0.1"), Owner::Core, None);

        assert_eq!(table.delete_by_route_target("65000:100"), 2);
        assert!(!table.select(addr("10.1.0.1"), &tenant("65000:100")));
        assert!(table.select(addr("10.1.0.1"), &tenant("65000:200")));
        assert!(table.select(addr("127.1.0.1"), &Owner::Core));
        assert_eq!(table.delete_by_route_target("65000:100"), 0);
    }

    #[test]
    fn test_write_guard_check_then_add() {
        let table = NexthopTable::new();
        {
            let mut nexthops = table.write();
            assert!(!nexthops.select(addr("10.1.0.1"), &Owner::Core));
            nexthops.add(addr("10.1.0.1"), Owner::Core, None);
            assert_eq!(nexthops.len(), 1);
        }
        assert_eq!(table.entries()[0].owner, Owner::Core);
    }
}
