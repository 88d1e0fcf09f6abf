//! Address Classification
//!
//! Pure helpers used by the crawler to decide what a remote address is.
//! Probe targets come from untrusted remote data, so nothing here panics or
//! returns an error on malformed input.

use once_cell::sync::Lazy;
use std::net::IpAddr;

/// Private, loopback and link-local ranges (IPv4 and IPv6)
const PRIVATE_CIDRS: &[&str] = &[
    "127.0.0.0/8",
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "169.254.0.0/16",
    "::1/128",
    "fe80::/10",
    "fc00::/7",
];

/// Parsed CIDR block
#[derive(Debug, Clone, Copy)]
struct Cidr {
    network: IpAddr,
    prefix: u8,
}

impl Cidr {
    fn parse(s: &str) -> Option<Self> {
        let (addr, prefix) = s.split_once('/')?;
        let network: IpAddr = addr.parse().ok()?;
        let prefix: u8 = prefix.parse().ok()?;

        let max = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        if prefix > max {
            return None;
        }

        Some(Self { network, prefix })
    }

    fn contains(&self, ip: &IpAddr) -> bool {
        match (self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = u32::MAX.checked_shl(32 - self.prefix as u32).unwrap_or(0);
                (u32::from(net) & mask) == (u32::from(*ip) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = u128::MAX.checked_shl(128 - self.prefix as u32).unwrap_or(0);
                (u128::from(net) & mask) == (u128::from(*ip) & mask)
            }
            _ => false,
        }
    }
}

/// CIDR table, parsed once on first use
static PRIVATE_BLOCKS: Lazy<Vec<Cidr>> = Lazy::new(|| {
    PRIVATE_CIDRS
        .iter()
        .filter_map(|block| Cidr::parse(block))
        .collect()
});

/// Returns true if `s` is an IPv4 or IPv6 literal
pub fn is_ip(s: &str) -> bool {
    s.parse::<IpAddr>().is_ok()
}

/// Returns true if the address is loopback, link-local or in a private range
pub fn is_private(ip: &IpAddr) -> bool {
    // IPv4-mapped IPv6 addresses are classified by their IPv4 part
    if let IpAddr::V6(v6) = ip {
        if let Some(v4) = v6.to_ipv4_mapped() {
            return is_private(&IpAddr::V4(v4));
        }
    }

    if ip.is_loopback() || is_link_local_multicast(ip) {
        return true;
    }

    PRIVATE_BLOCKS.iter().any(|block| block.contains(ip))
}

fn is_link_local_multicast(ip: &IpAddr) -> bool {
    match ip {
        // 224.0.0.0/24
        IpAddr::V4(v4) => {
            let o = v4.octets();
            o[0] == 224 && o[1] == 0 && o[2] == 0
        }
        // ff02::/16
        IpAddr::V6(v6) => v6.segments()[0] == 0xff02,
    }
}

/// Split a listen address into host and port.
///
/// Accepts `host:port`, `[v6]:port` and URL-style addresses such as
/// `tcp://0.0.0.0:26656` or `http://[::1]:26657/`. Returns `None` when no
/// host/port pair can be extracted.
pub fn split_host_port(address: &str) -> Option<(String, u16)> {
    let trimmed = address.trim();

    // Strip scheme and any trailing path
    let without_scheme = match trimmed.find("://") {
        Some(idx) => &trimmed[idx + 3..],
        None => trimmed,
    };
    let authority = without_scheme.split('/').next()?;

    // Drop userinfo
    let authority = authority.rsplit('@').next()?;

    if authority.is_empty() {
        return None;
    }

    let (host, port) = if let Some(rest) = authority.strip_prefix('[') {
        let (host, after) = rest.split_once(']')?;
        let port = after.strip_prefix(':')?;
        (host, port)
    } else {
        let (host, port) = authority.rsplit_once(':')?;
        // Bare IPv6 without brackets is ambiguous
        if host.contains(':') {
            return None;
        }
        (host, port)
    };

    if host.is_empty() {
        return None;
    }

    let port: u16 = port.parse().ok()?;
    Some((host.to_string(), port))
}
