use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use ipnetwork::IpNetwork;
use log::trace;
use parking_lot::Mutex;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("alias pool {0} exhausted")]
    PoolExhausted(IpNetwork),
    #[error("cannot alias {original} from {network}")]
    AddressFamilyMismatch { original: IpAddr, network: IpNetwork },
}

/// How nexthop aliases are produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AliasMode {
    /// Monotonic scan of the network, never reusing an address
    Net(IpNetwork),
    /// Like `Net`, but freed aliases are handed out again (oldest first)
    Pool(IpNetwork),
    /// Alias is the original address
    None,
}

impl AliasMode {
    pub fn from_parts(mode: &str, args: &str) -> Result<Self, String> {
        let network = || {
            IpNetwork::from_str(args.trim())
                .map_err(|e| format!("Invalid nexthop network '{}': {}", args, e))
        };
        match mode.trim().to_lowercase().as_str() {
            "net" => Ok(AliasMode::Net(network()?)),
            "pool" => Ok(AliasMode::Pool(network()?)),
            "none" | "" => Ok(AliasMode::None),
            other => Err(format!("Unsupported nexthop mode: '{}'", other)),
        }
    }
}

impl fmt::Display for AliasMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AliasMode::Net(network) => write!(f, "net {}", network),
            AliasMode::Pool(network) => write!(f, "pool {}", network),
            AliasMode::None => write!(f, "none"),
        }
    }
}

trait Generator: Send {
    fn next(&mut self) -> Option<IpAddr>;
    fn release(&mut self, addr: IpAddr);
}

/// Walks the usable host addresses of a network, in order
///
/// IPv4 skips the network and broadcast addresses (except /31 and /32,
/// where every address is usable); IPv6 only skips the subnet-router anycast.
struct NetGenerator {
    network: IpNetwork,
    next: Option<u128>,
    last: u128,
}

impl NetGenerator {
    fn new(network: IpNetwork) -> Self {
        let (base, host_bits) = match network {
            IpNetwork::V4(net) => (
                u128::from(u32::from(net.network())),
                32 - u32::from(net.prefix()),
            ),
            IpNetwork::V6(net) => (u128::from(net.network()), 128 - u32::from(net.prefix())),
        };
        // Highest host offset inside the network
        let span = if host_bits >= 128 {
            u128::MAX
        } else {
            (1u128 << host_bits) - 1
        };
        let (first, last) = match network {
            IpNetwork::V4(_) if host_bits <= 1 => (0, span),
            IpNetwork::V4(_) => (1, span - 1),
            IpNetwork::V6(_) if host_bits == 0 => (0, 0),
            IpNetwork::V6(_) => (1, span),
        };
        Self {
            network,
            next: Some(base + first),
            last: base + last,
        }
    }

    fn to_addr(&self, raw: u128) -> IpAddr {
        match self.network {
            IpNetwork::V4(_) => IpAddr::V4(Ipv4Addr::from(raw as u32)),
            IpNetwork::V6(_) => IpAddr::V6(Ipv6Addr::from(raw)),
        }
    }
}

impl Generator for NetGenerator {
    fn next(&mut self) -> Option<IpAddr> {
        let current = self.next?;
        self.next = if current < self.last {
            Some(current + 1)
        } else {
            None
        };
        Some(self.to_addr(current))
    }

    fn release(&mut self, _addr: IpAddr) {}
}

/// FIFO free-list over a [`NetGenerator`]
struct PoolGenerator {
    fresh: NetGenerator,
    free: VecDeque<IpAddr>,
}

impl Generator for PoolGenerator {
    fn next(&mut self) -> Option<IpAddr> {
        self.free.pop_front().or_else(|| self.fresh.next())
    }

    fn release(&mut self, addr: IpAddr) {
        self.free.push_back(addr);
    }
}

struct Aliases {
    generator: Option<Box<dyn Generator>>,
    by_original: HashMap<IpAddr, IpAddr>,
}

/// Stable mapping of real nexthops to synthetic addresses
pub struct AliasPool {
    mode: AliasMode,
    inner: Mutex<Aliases>,
}

impl AliasPool {
    pub fn new(mode: AliasMode) -> Self {
        let generator: Option<Box<dyn Generator>> = match mode {
            AliasMode::Net(network) => Some(Box::new(NetGenerator::new(network))),
            AliasMode::Pool(network) => Some(Box::new(PoolGenerator {
                fresh: NetGenerator::new(network),
                free: VecDeque::new(),
            })),
            AliasMode::None => None,
        };
        Self {
            mode,
            inner: Mutex::new(Aliases {
                generator,
                by_original: HashMap::new(),
            }),
        }
    }

    pub fn mode(&self) -> AliasMode {
        self.mode
    }

    /// Alias for `original`, allocating one on first use
    pub fn value(&self, original: IpAddr) -> Result<IpAddr, PoolError> {
        let network = match self.mode {
            AliasMode::Net(network) | AliasMode::Pool(network) => network,
            AliasMode::None => return Ok(original),
        };
        if original.is_ipv4() != network.is_ipv4() {
            return Err(PoolError::AddressFamilyMismatch { original, network });
        }

        let mut inner = self.inner.lock();
        if let Some(alias) = inner.by_original.get(&original) {
            return Ok(*alias);
        }
        let alias = inner
            .generator
            .as_mut()
            .and_then(|g| g.next())
            .ok_or(PoolError::PoolExhausted(network))?;
        trace!("Allocated alias {} for {}", alias, original);
        inner.by_original.insert(original, alias);
        Ok(alias)
    }

    /// Forget the alias of `original`, returning it to the generator
    pub fn free(&self, original: IpAddr) -> Option<IpAddr> {
        let mut inner = self.inner.lock();
        let alias = inner.by_original.remove(&original)?;
        if let Some(generator) = inner.generator.as_mut() {
            generator.release(alias);
        }
        Some(alias)
    }

    /// (original, alias) pairs, sorted by original
    pub fn entries(&self) -> Vec<(IpAddr, IpAddr)> {
        let inner = self.inner.lock();
        let mut entries: Vec<_> = inner.by_original.iter().map(|(o, a)| (*o, *a)).collect();
        entries.sort();
        entries
    }
}
