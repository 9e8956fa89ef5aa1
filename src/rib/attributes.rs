use std::fmt;
use std::net::IpAddr;

use itertools::Itertools;
use serde::{Deserialize, Serialize};

use super::{Community, ExtCommunity, RouteTarget};

#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq)]
pub enum Origin {
    Igp,
    Egp,
    Incomplete,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let word = match self {
            Origin::Igp => "IGP",
            Origin::Egp => "EGP",
            Origin::Incomplete => "Incomplete",
        };
        write!(f, "{}", word)
    }
}

/// BGP path attributes carried across the tenant/core boundary
///
/// Attributes the translator doesn't inspect are carried as `Other`
/// (type code + raw value) so they survive translation untouched.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PathAttribute {
    Origin(Origin),
    AsPath(Vec<u32>),
    NextHop(IpAddr),
    MultiExitDisc(u32),
    LocalPref(u32),
    Communities(Vec<Community>),
    ExtendedCommunities(Vec<ExtCommunity>),
    /// Multiprotocol reachability (RFC 4760), next-hop only
    MpReachNlri { next_hop: IpAddr },
    MpUnreachNlri,
    Other { type_code: u8, value: Vec<u8> },
}

impl PathAttribute {
    /// Attributes that only make sense inside the VPN address family
    pub fn is_multiprotocol(&self) -> bool {
        matches!(
            self,
            PathAttribute::MpReachNlri { .. } | PathAttribute::MpUnreachNlri
        )
    }
}

impl fmt::Display for PathAttribute {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PathAttribute::Origin(origin) => write!(f, "origin {}", origin),
            PathAttribute::AsPath(path) => write!(f, "as-path [{}]", path.iter().join(" ")),
            PathAttribute::NextHop(nh) => write!(f, "next-hop {}", nh),
            PathAttribute::MultiExitDisc(med) => write!(f, "med {}", med),
            PathAttribute::LocalPref(pref) => write!(f, "local-pref {}", pref),
            PathAttribute::Communities(comms) => {
                write!(f, "communities [{}]", comms.iter().join(" "))
            }
            PathAttribute::ExtendedCommunities(comms) => {
                write!(f, "ext-communities [{}]", comms.iter().join(" "))
            }
            PathAttribute::MpReachNlri { next_hop } => write!(f, "mp-reach via {}", next_hop),
            PathAttribute::MpUnreachNlri => write!(f, "mp-unreach"),
            PathAttribute::Other { type_code, value } => {
                write!(f, "attr({}) {} bytes", type_code, value.len())
            }
        }
    }
}

/// Convenience lookups over an attribute list
pub trait PathAttributes {
    /// Next hop, preferring the MP_REACH_NLRI next hop over NEXT_HOP
    fn next_hop(&self) -> Option<IpAddr>;
    fn route_targets(&self) -> Vec<RouteTarget>;
}

impl PathAttributes for [PathAttribute] {
    fn next_hop(&self) -> Option<IpAddr> {
        self.iter()
            .find_map(|attr| match attr {
                PathAttribute::MpReachNlri { next_hop } => Some(*next_hop),
                _ => None,
            })
            .or_else(|| {
                self.iter().find_map(|attr| match attr {
                    PathAttribute::NextHop(next_hop) => Some(*next_hop),
                    _ => None,
                })
            })
    }

    fn route_targets(&self) -> Vec<RouteTarget> {
        self.iter()
            .filter_map(|attr| match attr {
                PathAttribute::ExtendedCommunities(comms) => Some(comms),
                _ => None,
            })
            .flatten()
            .filter_map(ExtCommunity::route_target)
            .collect()
    }
}
