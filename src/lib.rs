//! # ribsd
//!
//! Route synchronization between tenant BGP speakers and a shared core
//! VPN speaker. One [`CoreService`] runs beside the core speaker; each
//! tenant runs a [`TenantService`] beside its own speaker and subscribes
//! to the core by route target.
//!
//! Routes cross the boundary translated (plain unicast on the tenant
//! side, labeled VPN in the core) and the core keeps a nexthop ownership
//! table so that a route never comes back to the side it came from.

pub mod api;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod linkstate;
pub mod rib;
pub mod service;
pub mod speaker;
pub mod tables;
pub mod translate;
#[cfg(feature = "cli")]
mod utils;

pub use config::{CoreConfig, ServiceConfig, TenantConfig};
pub use service::{CoreService, TenantService};
