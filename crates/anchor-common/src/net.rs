//! Local network helpers

use std::net::{IpAddr, Ipv4Addr};

use if_addrs::{get_if_addrs, IfAddr};

/// First non-loopback IPv4 address of this host, or 127.0.0.1
pub fn local_ipv4() -> IpAddr {
    let interfaces = match get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            tracing::warn!("Failed to enumerate network interfaces: {}", e);
            return IpAddr::V4(Ipv4Addr::LOCALHOST);
        }
    };

    interfaces
        .into_iter()
        .filter(|iface| !iface.is_loopback())
        .find_map(|iface| match iface.addr {
            IfAddr::V4(v4) => Some(IpAddr::V4(v4.ip)),
            IfAddr::V6(_) => None,
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}
