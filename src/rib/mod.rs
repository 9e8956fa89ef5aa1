pub mod attributes;
pub mod community;
pub mod families;
pub mod vpn;

pub use attributes::{Origin, PathAttribute, PathAttributes};
pub use community::{Community, ExtCommunity, NO_EXPORT};
pub use families::Family;
pub use vpn::{RouteDistinguisher, RouteTarget, ROUTE_TARGET_ANY};

use std::fmt;
use std::net::IpAddr;

use bgp_rs::{AFI, SAFI};
use ipnetwork::IpNetwork;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// Network Layer Reachability Information for the two families in play
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Nlri {
    /// Plain unicast prefix (tenant side)
    Unicast(IpNetwork),
    /// RD-prefixed, label-stacked prefix (core side, RFC 4364)
    LabeledVpn {
        rd: RouteDistinguisher,
        labels: Vec<u32>,
        prefix: IpNetwork,
    },
}

impl Nlri {
    pub fn prefix(&self) -> IpNetwork {
        match self {
            Nlri::Unicast(prefix) => *prefix,
            Nlri::LabeledVpn { prefix, .. } => *prefix,
        }
    }

    pub fn family(&self) -> Family {
        let afi = match self.prefix() {
            IpNetwork::V4(_) => AFI::IPV4,
            IpNetwork::V6(_) => AFI::IPV6,
        };
        match self {
            Nlri::Unicast(_) => Family::new(afi, SAFI::Unicast),
            Nlri::LabeledVpn { .. } => Family::new(afi, SAFI::MplsVpn),
        }
    }
}

impl fmt::Display for Nlri {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Nlri::Unicast(prefix) => write!(f, "{}", prefix),
            Nlri::LabeledVpn { rd, labels, prefix } => {
                write!(f, "{}:{} [{}]", rd, prefix, labels.iter().join(","))
            }
        }
    }
}

/// One path announced or withdrawn by a BGP speaker
///
/// `route_target` tags which tenant the update is travelling for;
/// `source_id` is the peer the path was learned from, when known.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RouteUpdate {
    pub nlri: Nlri,
    pub attributes: Vec<PathAttribute>,
    #[serde(default)]
    pub withdraw: bool,
    #[serde(default)]
    pub route_target: String,
    #[serde(default)]
    pub source_id: Option<IpAddr>,
}

impl RouteUpdate {
    pub fn new(nlri: Nlri, attributes: Vec<PathAttribute>) -> Self {
        Self {
            nlri,
            attributes,
            withdraw: false,
            route_target: String::new(),
            source_id: None,
        }
    }

    pub fn next_hop(&self) -> Option<IpAddr> {
        self.attributes.next_hop()
    }

    /// First Route Target extended community, if any
    pub fn route_target_community(&self) -> Option<RouteTarget> {
        self.attributes.route_targets().into_iter().next()
    }

    pub fn with_route_target(mut self, rt: &str) -> Self {
        self.route_target = rt.to_string();
        self
    }

    pub fn with_withdraw(mut self, withdraw: bool) -> Self {
        self.withdraw = withdraw;
        self
    }
}

impl fmt::Display for RouteUpdate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "<{} {} via {} rt='{}'>",
            if self.withdraw { "Withdraw" } else { "Announce" },
            self.nlri,
            self.next_hop()
                .map(|nh| nh.to_string())
                .unwrap_or_else(|| "-".to_string()),
            self.route_target,
        )
    }
}
