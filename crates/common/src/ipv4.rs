//! IPv4 address arithmetic

use crate::{Error, Result};
use std::net::Ipv4Addr;

/// Next address in base-256 order: bump the last octet and carry leftward.
///
/// Returns `None` past `255.255.255.255`.
pub fn successor(addr: Ipv4Addr) -> Option<Ipv4Addr> {
    u32::from(addr).checked_add(1).map(Ipv4Addr::from)
}

/// Like [`successor`], but running off the end of the address space is an error.
pub fn next_address(addr: Ipv4Addr) -> Result<Ipv4Addr> {
    successor(addr).ok_or_else(|| {
        Error::validation(format!("address space exhausted after {}", addr))
    })
}

/// Numeric sort key stored alongside the dotted-quad text.
pub fn sort_key(addr: Ipv4Addr) -> i64 {
    i64::from(u32::from(addr))
}
