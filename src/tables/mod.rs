mod alias;
mod nexthops;
mod tenants;

pub use alias::{AliasMode, AliasPool, PoolError};
pub use nexthops::{NexthopEntry, NexthopTable, Nexthops, Owner};
pub use tenants::{TenantSubscription, TenantTable};
