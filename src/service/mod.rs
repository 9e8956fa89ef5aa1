//! The two event loops: [`core::CoreService`] beside the shared VPN
//! speaker and [`tenant::TenantService`] beside each tenant's speaker.

pub mod core;
pub mod dummy;
mod monitor;
pub mod tenant;
#[cfg(test)]
pub(crate) mod testing;

pub use self::core::{CoreEvent, CoreHandle, CoreService, CoreTables};
pub use dummy::{DummyRouteError, DummyRoutes, IpCommand};
pub use monitor::{Feed, RECONNECT_INTERVAL};
pub use tenant::{TenantEvent, TenantService};
