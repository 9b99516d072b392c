//! Discovery of the IPv4 address a companion device should connect back to.
//!
//! The advertised address ends up inside the scannable code, so it must be
//! an address that is reachable from the phone, not the wildcard the
//! listener binds to.
//!
//! Resolution order:
//!
//! 1. An explicit `advertise_address` from the configuration.
//! 2. The local address the OS would route outbound traffic from.  This is
//!    learned by "connecting" a UDP socket, which only consults the routing
//!    table and sends no packets.
//! 3. Every other IPv4 address assigned to a host interface, in enumeration
//!    order.  Hosts without a default route (offline LANs, phone hotspots)
//!    only have these.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};

use tracing::debug;

/// Any routable public address works as the probe target; nothing is sent.
const ROUTE_PROBE_TARGET: SocketAddr =
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)), 9);

/// Returns the interface addresses to advertise, best candidate first.
///
/// An empty result means the host has no usable IPv4 interface.
pub fn candidate_addresses(advertise: Option<Ipv4Addr>) -> Vec<IpAddr> {
    if let Some(addr) = advertise {
        return vec![IpAddr::V4(addr)];
    }

    let candidates = order_candidates(routed_local_address(), interface_addresses());
    if candidates.is_empty() {
        debug!("no IPv4 interface found");
    }
    candidates
}

/// Puts the routed address first, then the enumerated ones, keeping only
/// usable addresses and dropping duplicates.
fn order_candidates(routed: Option<IpAddr>, enumerated: Vec<IpAddr>) -> Vec<IpAddr> {
    let mut ordered: Vec<IpAddr> = Vec::new();
    for ip in routed.into_iter().chain(enumerated) {
        if usable(ip) && !ordered.contains(&ip) {
            ordered.push(ip);
        }
    }
    ordered
}

fn routed_local_address() -> Option<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    if let Err(e) = socket.connect(ROUTE_PROBE_TARGET) {
        debug!("no default route: {e}");
        return None;
    }
    Some(socket.local_addr().ok()?.ip())
}

fn interface_addresses() -> Vec<IpAddr> {
    match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces
            .into_iter()
            .filter(|iface| !iface.is_loopback())
            .map(|iface| iface.ip())
            .collect(),
        Err(e) => {
            debug!("interface enumeration failed: {e}");
            Vec::new()
        }
    }
}

fn usable(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => !v4.is_unspecified() && !v4.is_loopback(),
        IpAddr::V6(_) => false,
    }
}
