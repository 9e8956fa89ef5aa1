//! Host addresses ("dummy routes") that let a tenant speaker treat an
//! aliased next-hop as directly connected.

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use log::trace;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

const IP_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum DummyRouteError {
    #[error("failed to spawn `ip {args}`: {source}")]
    Spawn {
        args: String,
        source: std::io::Error,
    },
    #[error("`ip {args}` failed: {stderr}")]
    Failed { args: String, stderr: String },
    #[error("`ip {0}` timed out")]
    Timeout(String),
}

#[async_trait]
pub trait DummyRoutes: Send + Sync {
    async fn install(&self, addr: IpAddr) -> Result<(), DummyRouteError>;
    async fn remove(&self, addr: IpAddr) -> Result<(), DummyRouteError>;
}

/// Host addresses on a local interface, through iproute2
pub struct IpCommand {
    iface: String,
}

impl IpCommand {
    pub fn new(iface: &str) -> Self {
        Self {
            iface: iface.to_string(),
        }
    }

    async fn addr(&self, action: &str, addr: IpAddr) -> Result<(), DummyRouteError> {
        let host = IpNetwork::from(addr).to_string();
        let args = ["addr", action, &host, "dev", &self.iface];
        let joined = args.join(" ");
        trace!("Running `ip {}`", joined);

        let output = Command::new("ip").args(&args).output();
        let output = timeout(IP_COMMAND_TIMEOUT, output)
            .await
            .map_err(|_| DummyRouteError::Timeout(joined.clone()))?
            .map_err(|source| DummyRouteError::Spawn {
                args: joined.clone(),
                source,
            })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(DummyRouteError::Failed {
                args: joined,
                stderr: if stderr.is_empty() {
                    "unknown error".to_string()
                } else {
                    stderr
                },
            });
        }
        Ok(())
    }
}

#[async_trait]
impl DummyRoutes for IpCommand {
    async fn install(&self, addr: IpAddr) -> Result<(), DummyRouteError> {
        self.addr("replace", addr).await
    }

    async fn remove(&self, addr: IpAddr) -> Result<(), DummyRouteError> {
        self.addr("del", addr).await
    }
}

/// Which next-hop each announced prefix uses, and how many prefixes
/// hold each next-hop
#[derive(Debug, Default)]
pub struct DummyRefs {
    by_prefix: HashMap<IpNetwork, IpAddr>,
    refs: HashMap<IpAddr, usize>,
}

impl DummyRefs {
    /// Record `prefix` via `next_hop`. Returns a next-hop nothing uses anymore.
    pub fn announce(&mut self, prefix: IpNetwork, next_hop: IpAddr) -> Option<IpAddr> {
        match self.by_prefix.insert(prefix, next_hop) {
            Some(previous) if previous == next_hop => None,
            Some(previous) => {
                *self.refs.entry(next_hop).or_insert(0) += 1;
                self.release(previous)
            }
            None => {
                *self.refs.entry(next_hop).or_insert(0) += 1;
                None
            }
        }
    }

    /// Forget `prefix`. Returns its next-hop if that was the last user.
    pub fn withdraw(&mut self, prefix: IpNetwork) -> Option<IpAddr> {
        let next_hop = self.by_prefix.remove(&prefix)?;
        self.release(next_hop)
    }

    fn release(&mut self, next_hop: IpAddr) -> Option<IpAddr> {
        let count = self.refs.get_mut(&next_hop)?;
        *count -= 1;
        if *count == 0 {
            self.refs.remove(&next_hop);
            return Some(next_hop);
        }
        None
    }

    pub fn users(&self, next_hop: IpAddr) -> usize {
        self.refs.get(&next_hop).copied().unwrap_or(0)
    }
}
