use core::{fmt, net::Ipv6Addr, str::FromStr};

use serde::{Deserialize, Serialize};

/// Neighbours whose address is known to the stack and can be named instead of
/// spelled out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IpAddressKind {
    BorderRouter,
    PrimaryParent,
    SecondaryParent,
}

const ADDRESS_ALIASES: &[(&str, IpAddressKind)] = &[
    ("br", IpAddressKind::BorderRouter),
    ("border_router", IpAddressKind::BorderRouter),
    ("p1", IpAddressKind::PrimaryParent),
    ("parent1", IpAddressKind::PrimaryParent),
    ("p2", IpAddressKind::SecondaryParent),
    ("parent2", IpAddressKind::SecondaryParent),
];

/// A remote address argument, either an IPv6 literal or an alias the stack
/// has to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteAddress {
    Literal(Ipv6Addr),
    Named(IpAddressKind),
}

impl RemoteAddress {
    /// Parse an address argument. Aliases win over literals.
    pub fn parse(s: &str) -> Option<Self> {
        if let Some((_, kind)) = ADDRESS_ALIASES.iter().find(|(name, _)| *name == s) {
            return Some(Self::Named(*kind));
        }
        Ipv6Addr::from_str(s).ok().map(Self::Literal)
    }
}

impl From<Ipv6Addr> for RemoteAddress {
    fn from(value: Ipv6Addr) -> Self {
        Self::Literal(value)
    }
}

/// An EUI-64 MAC address, as reported in mode switch fallback indications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MacAddress(pub [u8; 8]);

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g, h, i] = self.0;
        write!(
            f,
            "{a:02x}:{b:02x}:{c:02x}:{d:02x}:{e:02x}:{g:02x}:{h:02x}:{i:02x}"
        )
    }
}
