use std::fmt;
use std::str::FromStr;

use bgp_rs::{AFI, SAFI};
use serde::{self, Deserialize, Deserializer, Serialize, Serializer};

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct Family {
    pub afi: AFI,
    pub safi: SAFI,
}

impl fmt::Display for Family {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let afi = match self.afi {
            AFI::IPV4 => "ipv4",
            AFI::IPV6 => "ipv6",
            _ => "unknown",
        };
        let safi = match self.safi {
            SAFI::Unicast => "unicast",
            SAFI::MplsVpn => "vpn",
            _ => "unknown",
        };
        write!(f, "{} {}", afi, safi)
    }
}

impl Family {
    pub fn new(afi: AFI, safi: SAFI) -> Self {
        Self { afi, safi }
    }

    pub fn ipv4_unicast() -> Self {
        Self::new(AFI::IPV4, SAFI::Unicast)
    }

    pub fn ipv4_vpn() -> Self {
        Self::new(AFI::IPV4, SAFI::MplsVpn)
    }

    pub fn is_vpn(&self) -> bool {
        self.safi == SAFI::MplsVpn
    }
}

impl FromStr for Family {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split_whitespace().collect();
        if parts.len() != 2 {
            return Err(format!("Incorrect family format: '{}'", s));
        }
        let afi = match parts[0] {
            "ipv4" => AFI::IPV4,
            "ipv6" => AFI::IPV6,
            family => return Err(format!("Unsupported AFI: '{}'", family)),
        };
        let safi = match parts[1] {
            "unicast" => SAFI::Unicast,
            "vpn" | "l3vpn" | "mpls-vpn" => SAFI::MplsVpn,
            sfamily => return Err(format!("Unsupported SAFI: '{}'", sfamily)),
        };
        Ok(Family::new(afi, safi))
    }
}

impl Serialize for Family {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Family {
    fn deserialize<D>(deserializer: D) -> Result<Family, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
