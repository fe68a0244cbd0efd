//! IPv4 CIDR blocks.
//!
//! A `CidrBlock` is always aligned: the base address has no bits set below
//! the prefix. Parsing is non-strict, so `192.168.1.77/24` is accepted and
//! truncated to `192.168.1.0/24`.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::error::CidrParseError;

/// An aligned IPv4 network (base address + prefix length)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CidrBlock(Ipv4Net);

impl CidrBlock {
    /// Build a block from an address and prefix, clearing any host bits.
    pub fn new(addr: Ipv4Addr, prefix: u8) -> Result<Self, CidrParseError> {
        Ipv4Net::new(addr, prefix)
            .map(|net| CidrBlock(net.trunc()))
            .map_err(|_| CidrParseError::Prefix(format!("{}/{}", addr, prefix)))
    }

    /// Build a block from a raw 32-bit base address.
    pub fn from_raw(base: u32, prefix: u8) -> Result<Self, CidrParseError> {
        Self::new(Ipv4Addr::from(base), prefix)
    }

    pub(crate) const fn from_net(net: Ipv4Net) -> Self {
        CidrBlock(net)
    }

    /// Network address as an integer
    pub fn base(&self) -> u32 {
        u32::from(self.0.network())
    }

    /// Broadcast address as an integer
    pub fn last(&self) -> u32 {
        u32::from(self.0.broadcast())
    }

    pub fn prefix(&self) -> u8 {
        self.0.prefix_len()
    }

    pub fn network(&self) -> Ipv4Addr {
        self.0.network()
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        self.0.broadcast()
    }

    pub fn netmask(&self) -> Ipv4Addr {
        self.0.netmask()
    }

    /// Number of addresses in the block, `2^(32 - prefix)`.
    pub fn capacity(&self) -> u64 {
        1u64 << (32 - u32::from(self.prefix()))
    }

    /// Addresses excluding network and broadcast.
    pub fn usable_hosts(&self) -> u64 {
        self.capacity().saturating_sub(2)
    }

    /// First usable host, `None` for /31 and /32.
    pub fn first_usable(&self) -> Option<Ipv4Addr> {
        (self.usable_hosts() > 0).then(|| Ipv4Addr::from(self.base() + 1))
    }

    /// Last usable host, `None` for /31 and /32.
    pub fn last_usable(&self) -> Option<Ipv4Addr> {
        (self.usable_hosts() > 0).then(|| Ipv4Addr::from(self.last() - 1))
    }

    /// Address at `offset` from the network address, if it is inside the block.
    pub fn nth(&self, offset: u32) -> Option<Ipv4Addr> {
        if u64::from(offset) < self.capacity() {
            Some(Ipv4Addr::from(self.base() + offset))
        } else {
            None
        }
    }

    /// Offset of `addr` from the network address, if it is inside the block.
    pub fn offset_of(&self, addr: Ipv4Addr) -> Option<u32> {
        self.contains(addr).then(|| u32::from(addr) - self.base())
    }

    /// Membership, inclusive of network and broadcast addresses.
    pub fn contains(&self, addr: Ipv4Addr) -> bool {
        let value = u32::from(addr);
        value >= self.base() && value <= self.last()
    }

    pub fn contains_block(&self, other: &CidrBlock) -> bool {
        other.base() >= self.base() && other.last() <= self.last()
    }

    /// True when the two blocks share at least one address.
    pub fn overlaps(&self, other: &CidrBlock) -> bool {
        self.base() <= other.last() && other.base() <= self.last()
    }

    /// True when the inclusive integer range `[start, end]` touches this block.
    pub(crate) fn overlaps_range(&self, start: u64, end: u64) -> bool {
        start <= u64::from(self.last()) && u64::from(self.base()) <= end
    }
}

impl fmt::Display for CidrBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix())
    }
}

impl FromStr for CidrBlock {
    type Err = CidrParseError;

    /// Accepts `a.b.c.d/n` or a bare address (treated as /32).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let text = s.trim();
        let (addr_part, prefix_part) = match text.split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (text, None),
        };

        let addr: Ipv4Addr = addr_part
            .parse()
            .map_err(|_| CidrParseError::Address(s.to_string()))?;

        let prefix = match prefix_part {
            Some(p) => p
                .parse::<u8>()
                .map_err(|_| CidrParseError::Prefix(s.to_string()))?,
            None => 32,
        };
        if prefix > 32 {
            return Err(CidrParseError::Prefix(s.to_string()));
        }

        Self::new(addr, prefix)
    }
}

impl TryFrom<String> for CidrBlock {
    type Error = CidrParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CidrBlock> for String {
    fn from(block: CidrBlock) -> Self {
        block.to_string()
    }
}

impl From<Ipv4Net> for CidrBlock {
    fn from(net: Ipv4Net) -> Self {
        CidrBlock(net.trunc())
    }
}

impl From<CidrBlock> for Ipv4Net {
    fn from(block: CidrBlock) -> Self {
        block.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(s: &str) -> CidrBlock {
        s.parse().unwrap()
    }

    #[test]
    fn test_parse_and_derived_addresses() {
        let b = block("192.168.1.0/24");
        assert_eq!(b.network(), Ipv4Addr::new(192, 168, 1, 0));
        assert_eq!(b.broadcast(), Ipv4Addr::new(192, 168, 1, 255));
        assert_eq!(b.netmask(), Ipv4Addr::new(255, 255, 255, 0));
        assert_eq!(b.capacity(), 256);
        assert_eq!(b.usable_hosts(), 254);
        assert_eq!(b.first_usable(), Some(Ipv4Addr::new(192, 168, 1, 1)));
        assert_eq!(b.last_usable(), Some(Ipv4Addr::new(192, 168, 1, 254)));
    }

    #[test]
    fn test_non_strict_parse_truncates_host_bits() {
        let b = block("192.168.1.77/24");
        assert_eq!(b.to_string(), "192.168.1.0/24");
        assert_eq!(b.base() & !u32::from(b.netmask()), 0);
    }

    #[test]
    fn test_bare_address_is_host_route() {
        let b = block("10.1.2.3");
        assert_eq!(b.prefix(), 32);
        assert_eq!(b.capacity(), 1);
        assert_eq!(b.first_usable(), None);
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(matches!("10.0.0.0/33".parse::<CidrBlock>(), Err(CidrParseError::Prefix(_))));
        assert!(matches!("10.0.0/24".parse::<CidrBlock>(), Err(CidrParseError::Address(_))));
        assert!(matches!("10.0.0.0/abc".parse::<CidrBlock>(), Err(CidrParseError::Prefix(_))));
        assert!("".parse::<CidrBlock>().is_err());
    }

    #[test]
    fn test_whole_address_space() {
        let b = block("0.0.0.0/0");
        assert_eq!(b.capacity(), 1u64 << 32);
        assert!(b.contains(Ipv4Addr::new(255, 255, 255, 255)));
    }

    #[test]
    fn test_contains_boundaries() {
        let b = block("10.0.1.0/24");
        assert!(b.contains(Ipv4Addr::new(10, 0, 1, 0)));
        assert!(b.contains(Ipv4Addr::new(10, 0, 1, 255)));
        assert!(!b.contains(Ipv4Addr::new(10, 0, 2, 0)));
        assert!(!b.contains(Ipv4Addr::new(10, 0, 0, 255)));
    }

    #[test]
    fn test_overlap_and_containment() {
        let parent = block("10.0.0.0/16");
        let child = block("10.0.8.0/24");
        let other = block("10.1.0.0/24");

        assert!(parent.contains_block(&child));
        assert!(!child.contains_block(&parent));
        assert!(parent.overlaps(&child));
        assert!(child.overlaps(&parent));
        assert!(!parent.overlaps(&other));
    }

    #[test]
    fn test_offsets() {
        let b = block("192.168.255.0/24");
        assert_eq!(b.nth(10), Some(Ipv4Addr::new(192, 168, 255, 10)));
        assert_eq!(b.nth(256), None);
        assert_eq!(b.offset_of(Ipv4Addr::new(192, 168, 255, 42)), Some(42));
        assert_eq!(b.offset_of(Ipv4Addr::new(192, 168, 254, 42)), None);
    }

    #[test]
    fn test_serde_uses_text_form() {
        let b = block("172.16.1.0/24");
        let json = serde_json::to_string(&b).unwrap();
        assert_eq!(json, "\"172.16.1.0/24\"");
        let back: CidrBlock = serde_json::from_str("\"172.16.1.9/24\"").unwrap();
        assert_eq!(back, b);
        assert!(serde_json::from_str::<CidrBlock>("\"nope\"").is_err());
    }
}
