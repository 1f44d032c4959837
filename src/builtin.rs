//! Built-in address classes backing the `loopback`, `private` and
//! `external` rules.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Fold IPv4-mapped (`::ffff:a.b.c.d`) and IPv4-compatible (`::a.b.c.d`)
/// IPv6 addresses down to the IPv4 address they carry.
pub(crate) fn canonical(ip: IpAddr) -> IpAddr {
    let IpAddr::V6(v6) = ip else {
        return ip;
    };

    // ::1 and :: keep their IPv6 meaning
    if v6.is_loopback() || v6.is_unspecified() {
        return ip;
    }

    if let Some(v4) = v6.to_ipv4_mapped() {
        return IpAddr::V4(v4);
    }

    let segments = v6.segments();
    if segments[0..6] == [0, 0, 0, 0, 0, 0] {
        let v4 = Ipv4Addr::new(
            (segments[6] >> 8) as u8,
            segments[6] as u8,
            (segments[7] >> 8) as u8,
            segments[7] as u8,
        );
        return IpAddr::V4(v4);
    }

    ip
}

/// Loopback and unspecified addresses: both reach the local host.
pub fn is_loopback(ip: IpAddr) -> bool {
    match canonical(ip) {
        IpAddr::V4(v4) => v4.is_loopback() || v4.is_unspecified(),
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

/// RFC 1918 (IPv4) and unique local (IPv6, fc00::/7) ranges.
///
/// Link-local and carrier-grade NAT addresses are not private; they are
/// only kept out of [`is_external`].
pub fn is_private(ip: IpAddr) -> bool {
    match canonical(ip) {
        IpAddr::V4(v4) => v4.is_private(),
        IpAddr::V6(v6) => is_ipv6_unique_local(v6),
    }
}

/// Anything routable on the public internet: not loopback, not private,
/// not link-local, CGNAT, multicast or broadcast.
pub fn is_external(ip: IpAddr) -> bool {
    if is_loopback(ip) || is_private(ip) {
        return false;
    }
    match canonical(ip) {
        IpAddr::V4(v4) => {
            !v4.is_link_local() && !is_shared_ipv4(v4) && !v4.is_multicast() && !v4.is_broadcast()
        }
        IpAddr::V6(v6) => !is_ipv6_link_local(v6) && !v6.is_multicast(),
    }
}

/// Carrier-grade NAT shared address space (100.64.0.0/10).
fn is_shared_ipv4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    octets[0] == 100 && (octets[1] & 0xc0) == 0x40
}

/// Check if IPv6 is link-local (fe80::/10).
fn is_ipv6_link_local(ip: Ipv6Addr) -> bool {
    let segments = ip.segments();
    (segments[0] & 0xffc0) == 0xfe80
}

/// Check if IPv6 is unique local (fc00::/7).
fn is_ipv6_unique_local(ip: Ipv6Addr) -> bool {
    let segments = ip.segments();
    (segments[0] & 0xfe00) == 0xfc00
}
