//! Endpoint normalization and reserved-address screening.
//!
//! All endpoints are IPv6 on the wire; IPv4 addresses are carried as
//! IPv4-mapped IPv6 (`::ffff:a.b.c.d`).

use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};

use crate::network::Network;

/// A normalized (always-IPv6) UDP endpoint.
pub type Endpoint = SocketAddrV6;

/// Normalize any socket address to an IPv6 endpoint.
pub fn canonical(addr: SocketAddr) -> Endpoint {
    match addr {
        SocketAddr::V4(v4) => SocketAddrV6::new(v4.ip().to_ipv6_mapped(), v4.port(), 0, 0),
        SocketAddr::V6(v6) => SocketAddrV6::new(*v6.ip(), v6.port(), 0, 0),
    }
}

/// Parse `host:port` where host is a bare IPv4/IPv6 address.
pub fn parse(s: &str) -> Option<Endpoint> {
    let addr: SocketAddr = s.parse().ok()?;
    Some(canonical(addr))
}

fn mapped_v4(a: u8, b: u8, c: u8, d: u8) -> u128 {
    u128::from_be_bytes(Ipv6Addr::new(0, 0, 0, 0, 0, 0xffff, ((a as u16) << 8) | b as u16, ((c as u16) << 8) | d as u16).octets())
}

fn in_range(value: u128, min: u128, max: u128) -> bool {
    value >= min && value <= max
}

/// Whether an endpoint falls into an address range that must never appear as
/// a gossip sender or target.
///
/// Covers RFC 1700 (0.0.0.0/8), the IPv4 documentation ranges (RFC 5737),
/// IPv4/IPv6 multicast, RFC 6890 (240.0.0.0/4), the IPv6 discard prefix
/// (RFC 6666) and documentation prefix (RFC 3849). Loopback is reserved on
/// every network except the test network.
pub fn reserved_address(endpoint: &Endpoint, network: Network) -> bool {
    let ip = *endpoint.ip();
    let value = u128::from_be_bytes(ip.octets());

    let rfc1700 = (mapped_v4(0, 0, 0, 0), mapped_v4(0, 255, 255, 255));
    let v4_loopback = (mapped_v4(127, 0, 0, 0), mapped_v4(127, 255, 255, 255));
    let rfc5737_1 = (mapped_v4(192, 0, 2, 0), mapped_v4(192, 0, 2, 255));
    let rfc5737_2 = (mapped_v4(198, 51, 100, 0), mapped_v4(198, 51, 100, 255));
    let rfc5737_3 = (mapped_v4(203, 0, 113, 0), mapped_v4(203, 0, 113, 255));
    let v4_multicast = (mapped_v4(224, 0, 0, 0), mapped_v4(239, 255, 255, 255));
    let rfc6890 = (mapped_v4(240, 0, 0, 0), mapped_v4(255, 255, 255, 255));
    let rfc6666 = (
        u128::from_be_bytes(Ipv6Addr::new(0x100, 0, 0, 0, 0, 0, 0, 0).octets()),
        u128::from_be_bytes(Ipv6Addr::new(0x100, 0, 0, 0, 0xffff, 0xffff, 0xffff, 0xffff).octets()),
    );
    let rfc3849 = (
        u128::from_be_bytes(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 0).octets()),
        u128::from_be_bytes(
            Ipv6Addr::new(0x2001, 0xdb8, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff).octets(),
        ),
    );
    let v6_multicast = (
        u128::from_be_bytes(Ipv6Addr::new(0xff00, 0, 0, 0, 0, 0, 0, 0).octets()),
        u128::from_be_bytes(
            Ipv6Addr::new(0xff00, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff, 0xffff).octets(),
        ),
    );

    for (min, max) in [
        rfc1700,
        rfc5737_1,
        rfc5737_2,
        rfc5737_3,
        v4_multicast,
        rfc6890,
        rfc6666,
        rfc3849,
        v6_multicast,
    ] {
        if in_range(value, min, max) {
            return true;
        }
    }

    if network != Network::Test {
        if ip.is_loopback() {
            return true;
        }
        if in_range(value, v4_loopback.0, v4_loopback.1) {
            return true;
        }
    }

    false
}
