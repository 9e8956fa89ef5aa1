use std::fs::File;
use std::io::Read;

use serde::Deserialize;
use toml;

use super::ConfigError;

struct Defaults {}

impl Defaults {
    fn label() -> u32 {
        10000
    }

    fn nla_api() -> String {
        "ws://127.0.0.1:50061".to_string()
    }

    fn core() -> String {
        "127.0.0.1:50071".to_string()
    }

    fn resync() -> u64 {
        60_000
    }

    fn bgpd_api() -> String {
        "ws://127.0.0.1:50051".to_string()
    }

    fn nexthop_mode() -> String {
        "net".to_string()
    }

    fn nexthop_network() -> String {
        "127.1.0.0/24".to_string()
    }

    fn dummy_iface() -> String {
        "ribs0".to_string()
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct NodeSpec {
    // 0 runs the core service, anything else is a tenant node id
    #[serde(default)]
    pub(super) nid: u32,
    // Base MPLS label, tenants add their node id
    #[serde(default = "Defaults::label")]
    pub(super) label: u32,
}

#[derive(Debug, Deserialize)]
pub(super) struct NlaSpec {
    #[serde(default = "Defaults::nla_api")]
    pub(super) api: String,
}

impl Default for NlaSpec {
    fn default() -> Self {
        Self {
            api: Defaults::nla_api(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct BgpdSpec {
    #[serde(default = "Defaults::bgpd_api")]
    pub(super) api: String,
    // Defaults per role: "ipv4 vpn" at the core, "ipv4 unicast" at tenants
    pub(super) family: Option<String>,
}

impl Default for BgpdSpec {
    fn default() -> Self {
        Self {
            api: Defaults::bgpd_api(),
            family: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct NexthopsSpec {
    #[serde(default = "Defaults::nexthop_mode")]
    pub(super) mode: String,
    #[serde(default = "Defaults::nexthop_network")]
    pub(super) args: String,
}

impl Default for NexthopsSpec {
    fn default() -> Self {
        Self {
            mode: Defaults::nexthop_mode(),
            args: Defaults::nexthop_network(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct VrfSpec {
    pub(super) rt: String,
    pub(super) rd: String,
    #[serde(default = "Defaults::dummy_iface")]
    pub(super) iface: String,
}

#[derive(Debug, Deserialize)]
pub(super) struct RibsSpec {
    #[serde(default)]
    pub(super) disable: bool,
    // Core listen address, and where tenants dial it
    #[serde(default = "Defaults::core")]
    pub(super) core: String,
    // Periodic full resync, in milliseconds
    #[serde(default = "Defaults::resync")]
    pub(super) resync: u64,
    #[serde(default)]
    pub(super) bgpd: BgpdSpec,
    #[serde(default)]
    pub(super) nexthops: NexthopsSpec,
    pub(super) vrf: Option<VrfSpec>,
}

#[derive(Debug, Deserialize)]
pub(super) struct ConfigSpec {
    pub(super) node: NodeSpec,
    #[serde(default)]
    pub(super) nla: NlaSpec,
    pub(super) ribs: RibsSpec,
}

impl ConfigSpec {
    pub(super) fn from_file(path: &str) -> Result<Self, ConfigError> {
        let mut file = File::open(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|source| ConfigError::Read {
                path: path.to_string(),
                source,
            })?;
        Self::from_toml(&contents)
    }

    pub(super) fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }
}
