use std::net::{Ipv4Addr, SocketAddrV4};

use anyhow::{anyhow, Result};
use nix::net::if_::if_nametoindex;

/// Resolves a network interface name into its index.
pub(crate) fn ifindex_from_name(name: &str) -> Result<u32> {
    if_nametoindex(name).map_err(|e| anyhow!("Error on input interface {name}: {e}"))
}

/// Builds an IPv4 endpoint out of an address and port stored in network byte
/// order, as the kernel program reads them from packet headers.
pub(crate) fn endpoint_from_be(addr: u32, port: u16) -> SocketAddrV4 {
    SocketAddrV4::new(Ipv4Addr::from(u32::from_be(addr)), u16::from_be(port))
}
