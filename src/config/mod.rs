mod file;

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::rib::{Family, RouteDistinguisher, RouteTarget};
use crate::tables::AliasMode;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str) -> impl Fn(String) -> ConfigError {
    move |reason| ConfigError::Invalid { field, reason }
}

/// Parse a TOML config file and return the service it describes
pub fn from_file(path: &str) -> Result<ServiceConfig, ConfigError> {
    let spec = file::ConfigSpec::from_file(path)?;
    ServiceConfig::from_spec(spec)
}

#[derive(Debug)]
pub enum ServiceConfig {
    /// `[ribs] disable = true`
    Disabled,
    Core(CoreConfig),
    Tenant(TenantConfig),
}

/// Core service: beside the shared VPN speaker
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub listen: SocketAddr,
    pub nla_api: String,
    pub bgpd_api: String,
    pub family: Family,
    pub resync: Duration,
    pub nexthops: AliasMode,
}

/// Tenant service: beside one tenant's speaker
#[derive(Debug, Clone)]
pub struct TenantConfig {
    pub node_id: u32,
    pub core_api: String,
    pub bgpd_api: String,
    pub family: Family,
    pub route_target: RouteTarget,
    pub rd: RouteDistinguisher,
    pub labels: Vec<u32>,
    pub dummy_iface: String,
}

impl ServiceConfig {
    fn from_spec(spec: file::ConfigSpec) -> Result<Self, ConfigError> {
        if spec.ribs.disable {
            return Ok(ServiceConfig::Disabled);
        }

        let family = |default: Family| -> Result<Family, ConfigError> {
            match &spec.ribs.bgpd.family {
                Some(family) => family.parse().map_err(invalid("ribs.bgpd.family")),
                None => Ok(default),
            }
        };

        if spec.node.nid == 0 {
            let listen = spec
                .ribs
                .core
                .parse()
                .map_err(|e| invalid("ribs.core")(format!("'{}': {}", spec.ribs.core, e)))?;
            let nexthops = AliasMode::from_parts(&spec.ribs.nexthops.mode, &spec.ribs.nexthops.args)
                .map_err(invalid("ribs.nexthops"))?;
            return Ok(ServiceConfig::Core(CoreConfig {
                listen,
                nla_api: spec.nla.api.clone(),
                bgpd_api: spec.ribs.bgpd.api.clone(),
                family: family(Family::ipv4_vpn())?,
                resync: Duration::from_millis(spec.ribs.resync),
                nexthops,
            }));
        }

        let vrf = spec.ribs.vrf.as_ref().ok_or_else(|| ConfigError::Invalid {
            field: "ribs.vrf",
            reason: format!("required for tenant node {}", spec.node.nid),
        })?;
        let label = spec
            .node
            .label
            .checked_add(spec.node.nid)
            .filter(|label| *label < 1 << 20)
            .ok_or_else(|| {
                invalid("node.label")(format!(
                    "{} + {} is not a 20-bit MPLS label",
                    spec.node.label, spec.node.nid
                ))
            })?;
        Ok(ServiceConfig::Tenant(TenantConfig {
            node_id: spec.node.nid,
            core_api: format!("ws://{}", spec.ribs.core),
            bgpd_api: spec.ribs.bgpd.api.clone(),
            family: family(Family::ipv4_unicast())?,
            route_target: vrf.rt.parse().map_err(invalid("ribs.vrf.rt"))?,
            rd: vrf.rd.parse().map_err(invalid("ribs.vrf.rd"))?,
            labels: vec![label],
            dummy_iface: vrf.iface.clone(),
        }))
    }
}
