use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

use super::vpn::RouteTarget;

/// Well-known NO_EXPORT community (RFC 1997)
pub const NO_EXPORT: Community = Community(0xFFFF_FF01);

/// Standard (RFC 1997) community
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Community(pub u32);

impl fmt::Display for Community {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == NO_EXPORT {
            return write!(f, "no-export");
        }
        write!(f, "{}:{}", self.0 >> 16, self.0 & 0xffff)
    }
}

/// Extended (RFC 4360) community, kept in its 8-byte wire value
#[derive(Serialize, Deserialize, Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ExtCommunity(pub u64);

impl ExtCommunity {
    pub fn route_target(&self) -> Option<RouteTarget> {
        RouteTarget::from_ext_community(self)
    }
}

impl fmt::Display for ExtCommunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(rt) = self.route_target() {
            return write!(f, "target:{}", rt);
        }
        let value = self.0;
        let c_type: u8 = (value >> 56) as u8;
        match c_type {
            // 2-octet AS Specific Extended Community (RFC 4360)
            0x0 => {
                let asn: u16 = ((value >> 32) & 0xffff) as u16;
                let number: u32 = (value & 0xffff_ffff) as u32;
                write!(f, "{}:{}", asn, number)
            }
            // IPv4 Address Specific Extended Community (RFC 4360)
            0x1 => {
                let addr = Ipv4Addr::from(((value >> 16) & 0xffff_ffff) as u32);
                let number: u16 = (value & 0xffff) as u16;
                write!(f, "{}:{}", addr, number)
            }
            // Opaque Extended Community (RFC 4360)
            0x3 => write!(f, "opaque:{}", value),
            _ => write!(f, "unknown:{}:{}", c_type, value),
        }
    }
}
