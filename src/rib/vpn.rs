//! VPN identifiers: Route Distinguishers (RFC 4364 §4.2) and
//! Route Targets (RFC 4360 §4 / RFC 5668).
//!
//! Both share the `<administrator>:<assigned number>` text form:
//!
//! | form               | type | administrator | assigned |
//! |--------------------|------|---------------|----------|
//! | `65000:100`        | 0    | 2-octet ASN   | 4 octets |
//! | `10.0.0.1:100`     | 1    | IPv4 address  | 2 octets |
//! | `4200000000:100`   | 2    | 4-octet ASN   | 2 octets |

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{self, Deserialize, Deserializer, Serialize, Serializer};

use super::community::ExtCommunity;

const SUBTYPE_ROUTE_TARGET: u8 = 0x02;

/// Matches every route target in resync requests
pub const ROUTE_TARGET_ANY: &str = "*";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum AdminValue {
    Asn2(u16, u32),
    Ipv4(Ipv4Addr, u16),
    Asn4(u32, u16),
}

impl AdminValue {
    fn type_code(&self) -> u8 {
        match self {
            AdminValue::Asn2(..) => 0,
            AdminValue::Ipv4(..) => 1,
            AdminValue::Asn4(..) => 2,
        }
    }

    /// Lower 48 bits: administrator + assigned number
    fn value(&self) -> u64 {
        match self {
            AdminValue::Asn2(asn, num) => (u64::from(*asn) << 32) | u64::from(*num),
            AdminValue::Ipv4(addr, num) => (u64::from(u32::from(*addr)) << 16) | u64::from(*num),
            AdminValue::Asn4(asn, num) => (u64::from(*asn) << 16) | u64::from(*num),
        }
    }

    fn from_parts(type_code: u8, value: u64) -> Option<Self> {
        match type_code {
            0 => Some(AdminValue::Asn2(
                ((value >> 32) & 0xffff) as u16,
                (value & 0xffff_ffff) as u32,
            )),
            1 => Some(AdminValue::Ipv4(
                Ipv4Addr::from(((value >> 16) & 0xffff_ffff) as u32),
                (value & 0xffff) as u16,
            )),
            2 => Some(AdminValue::Asn4(
                ((value >> 16) & 0xffff_ffff) as u32,
                (value & 0xffff) as u16,
            )),
            _ => None,
        }
    }
}

impl FromStr for AdminValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (admin, assigned) = s
            .trim()
            .rsplit_once(':')
            .ok_or_else(|| format!("Missing ':' in '{}'", s))?;
        let invalid = |_| format!("Invalid assigned number in '{}'", s);
        if let Ok(addr) = admin.parse::<Ipv4Addr>() {
            return Ok(AdminValue::Ipv4(addr, assigned.parse().map_err(invalid)?));
        }
        let asn: u32 = admin
            .parse()
            .map_err(|_| format!("Invalid administrator in '{}'", s))?;
        if asn <= u32::from(u16::MAX) {
            Ok(AdminValue::Asn2(asn as u16, assigned.parse().map_err(invalid)?))
        } else {
            Ok(AdminValue::Asn4(asn, assigned.parse().map_err(invalid)?))
        }
    }
}

impl fmt::Display for AdminValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AdminValue::Asn2(asn, num) => write!(f, "{}:{}", asn, num),
            AdminValue::Ipv4(addr, num) => write!(f, "{}:{}", addr, num),
            AdminValue::Asn4(asn, num) => write!(f, "{}:{}", asn, num),
        }
    }
}

/// 8-byte Route Distinguisher prefixed to VPN NLRI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteDistinguisher(AdminValue);

impl RouteDistinguisher {
    pub fn to_u64(&self) -> u64 {
        (u64::from(self.0.type_code()) << 48) | self.0.value()
    }

    pub fn from_u64(raw: u64) -> Option<Self> {
        AdminValue::from_parts(((raw >> 48) & 0xffff) as u8, raw & 0xffff_ffff_ffff)
            .map(RouteDistinguisher)
    }
}

impl FromStr for RouteDistinguisher {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(RouteDistinguisher)
    }
}

impl fmt::Display for RouteDistinguisher {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Route Target extended community, identifying the tenant a VPN route belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RouteTarget(AdminValue);

impl RouteTarget {
    pub fn to_ext_community(&self) -> ExtCommunity {
        let raw = (u64::from(self.0.type_code()) << 56)
            | (u64::from(SUBTYPE_ROUTE_TARGET) << 48)
            | self.0.value();
        ExtCommunity(raw)
    }

    pub fn from_ext_community(community: &ExtCommunity) -> Option<Self> {
        let raw = community.0;
        let subtype = ((raw >> 48) & 0xff) as u8;
        if subtype != SUBTYPE_ROUTE_TARGET {
            return None;
        }
        AdminValue::from_parts((raw >> 56) as u8, raw & 0xffff_ffff_ffff).map(RouteTarget)
    }

    /// Does this RT satisfy a filter (an RT string or [`ROUTE_TARGET_ANY`])
    pub fn matches(&self, filter: &str) -> bool {
        filter == ROUTE_TARGET_ANY || self.to_string() == filter
    }
}

impl FromStr for RouteTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(RouteTarget)
    }
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! serde_as_string {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D>(deserializer: D) -> Result<$ty, D::Error>
            where
                D: Deserializer<'de>,
            {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

serde_as_string!(RouteDistinguisher);
serde_as_string!(RouteTarget);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_target_forms() {
        for rt in &["65000:100", "10.0.0.1:5", "4200000000:7"] {
            let parsed: RouteTarget = rt.parse().unwrap();
            assert_eq!(&parsed.to_string(), rt);
        }
        assert!("65000".parse::<RouteTarget>().is_err());
        assert!("as:100".parse::<RouteTarget>().is_err());
        assert!("4200000000:70000".parse::<RouteTarget>().is_err());
    }

    #[test]
    fn test_route_target_ext_community() {
        let rt: RouteTarget = "65000:100".parse().unwrap();
        let community = rt.to_ext_community();
        assert_eq!(community.0, 0x0002_fde8_0000_0064);
        assert_eq!(RouteTarget::from_ext_community(&community), Some(rt));

        // Route origin (subtype 0x03) is not a route target
        assert_eq!(RouteTarget::from_ext_community(&ExtCommunity(0x0003_fde8_0000_0064)), None);
    }

    #[test]
    fn test_route_target_matches() {
        let rt: RouteTarget = "65000:100".parse().unwrap();
        assert!(rt.matches("65000:100"));
        assert!(rt.matches(ROUTE_TARGET_ANY));
        assert!(!rt.matches("65000:200"));
    }

    #[test]
    fn test_route_distinguisher() {
        let rd: RouteDistinguisher = "10.0.0.1:100".parse().unwrap();
        assert_eq!(rd.to_u64(), 0x0001_0a00_0001_0064);
        assert_eq!(RouteDistinguisher::from_u64(rd.to_u64()), Some(rd));
        assert_eq!(RouteDistinguisher::from_u64(0x0009_0000_0000_0000), None);
    }
}
