//! Variable Length Subnet Masking (VLSM) allocation.
//!
//! Carves a parent CIDR block into subnets sized to per-subnet host
//! requirements. Requirements are placed with an address cursor that only
//! moves forward, so the results of one call never overlap and never leave
//! the parent block. The allocator holds no state between calls.

use std::net::Ipv4Addr;
use std::str::FromStr;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::cidr::CidrBlock;
use crate::error::AllocationError;

/// Smallest prefix a usable subnet can have (/30 = 2 usable hosts)
pub const MAX_SUBNET_PREFIX: u8 = 30;

/// Order in which requirements are carved from the parent block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationOrder {
    /// Largest requirement first (stable among equal host counts)
    #[default]
    LargestFirst,
    /// Caller order; the cursor is aligned up to each block's size
    AsRequested,
}

impl FromStr for AllocationOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "largest_first" => Ok(AllocationOrder::LargestFirst),
            "as_requested" => Ok(AllocationOrder::AsRequested),
            other => Err(format!(
                "unknown allocation order '{}' (expected largest-first or as-requested)",
                other
            )),
        }
    }
}

/// One granted subnet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubnetAllocation {
    /// 1-based position in the allocation order
    pub rank: usize,
    /// Host count the caller asked for
    pub requested_hosts: u32,
    pub block: CidrBlock,
    pub first_usable: Ipv4Addr,
    pub last_usable: Ipv4Addr,
    pub usable_hosts: u64,
    pub netmask: Ipv4Addr,
}

/// Result of one allocation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    pub parent: CidrBlock,
    /// Granted subnets in allocation order
    pub subnets: Vec<SubnetAllocation>,
    /// Requirements that did not fit, in allocation order
    pub unplaced: Vec<u32>,
}

impl AllocationPlan {
    /// True when every requirement received a subnet.
    pub fn is_complete(&self) -> bool {
        self.unplaced.is_empty()
    }

    /// Addresses consumed by the granted subnets.
    pub fn allocated_addresses(&self) -> u64 {
        self.subnets.iter().map(|s| s.block.capacity()).sum()
    }

    /// Convert an incomplete plan into `AddressSpaceExhausted`.
    pub fn into_result(self) -> Result<Vec<SubnetAllocation>, AllocationError> {
        if self.is_complete() {
            Ok(self.subnets)
        } else {
            Err(AllocationError::AddressSpaceExhausted {
                parent: self.parent,
                allocated: self.subnets,
                unplaced: self.unplaced,
            })
        }
    }
}

/// Host bits needed to hold `hosts` usable addresses plus network and
/// broadcast: exact `ceil(log2(hosts + 2))`. `None` when it exceeds 32 bits.
pub fn host_bits_for(hosts: u32) -> Option<u32> {
    let slots = u64::from(hosts) + 2;
    let bits = ceil_log2(slots);
    (bits <= 32).then_some(bits)
}

fn ceil_log2(n: u64) -> u32 {
    if n <= 1 {
        0
    } else {
        u64::BITS - (n - 1).leading_zeros()
    }
}

fn align_up(value: u64, size: u64) -> u64 {
    (value + size - 1) & !(size - 1)
}

/// VLSM allocator with an ordering policy and a set of reserved blocks it
/// never hands out (typically the quarantine block).
#[derive(Debug, Clone, Default)]
pub struct AddressSpaceAllocator {
    order: AllocationOrder,
    reserved: Vec<CidrBlock>,
}

impl AddressSpaceAllocator {
    pub fn new(order: AllocationOrder) -> Self {
        Self { order, reserved: Vec::new() }
    }

    /// Exclude `block` from every allocation.
    pub fn with_reserved(mut self, block: CidrBlock) -> Self {
        self.reserved.push(block);
        self
    }

    pub fn order(&self) -> AllocationOrder {
        self.order
    }

    pub fn reserved(&self) -> &[CidrBlock] {
        &self.reserved
    }

    /// Map host-count requirements onto disjoint subnets of `parent`.
    ///
    /// Every requirement is validated before anything is placed. Running out
    /// of room is not an error: the plan carries the subnets that fit and
    /// the requirements that did not (see [`AllocationPlan::is_complete`]).
    pub fn allocate(
        &self,
        parent: CidrBlock,
        requirements: &[u32],
    ) -> Result<AllocationPlan, AllocationError> {
        let mut host_bits = Vec::with_capacity(requirements.len());
        for (idx, &hosts) in requirements.iter().enumerate() {
            if hosts == 0 {
                return Err(AllocationError::InvalidRequest(format!(
                    "requirement #{} has a non-positive host count",
                    idx + 1
                )));
            }
            let bits = host_bits_for(hosts).ok_or_else(|| {
                AllocationError::InvalidRequest(format!(
                    "requirement #{} ({} hosts) exceeds the IPv4 address space",
                    idx + 1,
                    hosts
                ))
            })?;
            host_bits.push(bits);
        }

        let mut order: Vec<usize> = (0..requirements.len()).collect();
        if self.order == AllocationOrder::LargestFirst {
            // sort_by is stable: equal host counts keep caller order
            order.sort_by(|&a, &b| requirements[b].cmp(&requirements[a]));
        }

        let bound = u64::from(parent.last());
        let mut cursor = u64::from(parent.base());
        let mut subnets = Vec::with_capacity(requirements.len());
        let mut unplaced = Vec::new();

        for (position, &idx) in order.iter().enumerate() {
            let hosts = requirements[idx];
            let bits = host_bits[idx];
            let size = 1u64 << bits;

            let Some(start) = self.place(cursor, size, bound) else {
                unplaced.extend(order[position..].iter().map(|&i| requirements[i]));
                warn!(
                    "Cannot allocate {} hosts (/{}) in {}: {} requirements unplaced",
                    hosts,
                    32 - bits,
                    parent,
                    unplaced.len()
                );
                break;
            };

            // start + size - 1 <= bound <= u32::MAX, so start fits in u32
            let block = CidrBlock::from_raw(start as u32, (32 - bits) as u8)
                .map_err(|e| AllocationError::InvalidRequest(e.to_string()))?;
            let allocation = SubnetAllocation {
                rank: position + 1,
                requested_hosts: hosts,
                block,
                first_usable: Ipv4Addr::from(block.base() + 1),
                last_usable: Ipv4Addr::from(block.last() - 1),
                usable_hosts: block.usable_hosts(),
                netmask: block.netmask(),
            };
            debug!(
                "Subnet {}: {} hosts requested -> {} ({} usable, {} - {})",
                allocation.rank,
                hosts,
                block,
                allocation.usable_hosts,
                allocation.first_usable,
                allocation.last_usable
            );
            subnets.push(allocation);
            cursor = start + size;
        }

        info!(
            "Allocated {} of {} subnets from {}",
            subnets.len(),
            requirements.len(),
            parent
        );

        Ok(AllocationPlan { parent, subnets, unplaced })
    }

    /// Find the first aligned start at or after `cursor` for a block of
    /// `size` addresses that ends by `bound` and misses every reserved block.
    fn place(&self, mut cursor: u64, size: u64, bound: u64) -> Option<u64> {
        loop {
            let start = align_up(cursor, size);
            let end = start + size - 1;
            if end > bound {
                return None;
            }
            match self.reserved.iter().find(|r| r.overlaps_range(start, end)) {
                Some(reserved) => cursor = u64::from(reserved.last()) + 1,
                None => return Some(start),
            }
        }
    }
}

/// Allocate with the default policy (largest first, nothing reserved).
pub fn allocate(
    parent: CidrBlock,
    requirements: &[u32],
) -> Result<AllocationPlan, AllocationError> {
    AddressSpaceAllocator::default().allocate(parent, requirements)
}

/// Split `parent` into `2^ceil(log2(count))` equal subnets and return the
/// first `count` of them.
pub fn divide_equal(parent: CidrBlock, count: u32) -> Result<Vec<CidrBlock>, AllocationError> {
    if count == 0 {
        return Err(AllocationError::InvalidRequest(
            "subnet count must be positive".to_string(),
        ));
    }

    let new_prefix = u32::from(parent.prefix()) + ceil_log2(u64::from(count));
    if new_prefix > u32::from(MAX_SUBNET_PREFIX) {
        return Err(AllocationError::InvalidRequest(format!(
            "{} subnets of {} would need a /{} prefix (maximum /{})",
            count, parent, new_prefix, MAX_SUBNET_PREFIX
        )));
    }

    let size = 1u64 << (32 - new_prefix);
    (0..u64::from(count))
        .map(|i| {
            let base = u64::from(parent.base()) + i * size;
            CidrBlock::from_raw(base as u32, new_prefix as u8)
                .map_err(|e| AllocationError::InvalidRequest(e.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(s: &str) -> CidrBlock {
        s.parse().unwrap()
    }

    #[test]
    fn test_host_bits_exact_powers_of_two() {
        // 2 hosts + 2 reserved = 4 slots: exactly a /30, not a /29
        assert_eq!(host_bits_for(2), Some(2));
        assert_eq!(host_bits_for(1), Some(2));
        assert_eq!(host_bits_for(3), Some(3));
        assert_eq!(host_bits_for(126), Some(7));
        assert_eq!(host_bits_for(127), Some(8));
        assert_eq!(host_bits_for(254), Some(8));
        assert_eq!(host_bits_for(u32::MAX - 1), Some(32));
        assert_eq!(host_bits_for(u32::MAX), None);
    }

    #[test]
    fn test_vlsm_largest_first() {
        let plan = allocate(block("10.0.0.0/24"), &[50, 100, 25, 10]).unwrap();
        assert!(plan.is_complete());

        let requested: Vec<u32> = plan.subnets.iter().map(|s| s.requested_hosts).collect();
        assert_eq!(requested, vec![100, 50, 25, 10]);

        let blocks: Vec<String> = plan.subnets.iter().map(|s| s.block.to_string()).collect();
        assert_eq!(
            blocks,
            vec!["10.0.0.0/25", "10.0.0.128/26", "10.0.0.192/27", "10.0.0.224/28"]
        );

        let first = &plan.subnets[0];
        assert_eq!(first.rank, 1);
        assert_eq!(first.usable_hosts, 126);
        assert_eq!(first.first_usable, Ipv4Addr::new(10, 0, 0, 1));
        assert_eq!(first.last_usable, Ipv4Addr::new(10, 0, 0, 126));
        assert_eq!(first.netmask, Ipv4Addr::new(255, 255, 255, 128));
    }

    #[test]
    fn test_parent_too_small() {
        let plan = allocate(block("192.168.1.0/30"), &[50]).unwrap();
        assert!(!plan.is_complete());
        assert!(plan.subnets.is_empty());
        assert_eq!(plan.unplaced, vec![50]);
    }

    #[test]
    fn test_partial_prefix_on_exhaustion() {
        let plan = allocate(block("10.0.0.0/24"), &[100, 10, 100, 100]).unwrap();
        assert_eq!(plan.subnets.len(), 2);
        assert_eq!(plan.subnets[0].block.to_string(), "10.0.0.0/25");
        assert_eq!(plan.subnets[1].block.to_string(), "10.0.0.128/25");
        // the failing requirement and everything after it
        assert_eq!(plan.unplaced, vec![100, 10]);

        match plan.into_result() {
            Err(AllocationError::AddressSpaceExhausted { allocated, unplaced, .. }) => {
                assert_eq!(allocated.len(), 2);
                assert_eq!(unplaced, vec![100, 10]);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_hosts_is_invalid() {
        let result = allocate(block("10.0.0.0/24"), &[10, 0]);
        assert!(matches!(result, Err(AllocationError::InvalidRequest(_))));
    }

    #[test]
    fn test_unsatisfiable_requirement_is_invalid() {
        let result = allocate(block("0.0.0.0/0"), &[u32::MAX]);
        assert!(matches!(result, Err(AllocationError::InvalidRequest(_))));
    }

    #[test]
    fn test_empty_requirements() {
        let plan = allocate(block("10.0.0.0/24"), &[]).unwrap();
        assert!(plan.is_complete());
        assert!(plan.subnets.is_empty());
    }

    #[test]
    fn test_exact_fit_uses_whole_parent() {
        let plan = allocate(block("10.0.0.0/24"), &[126, 126]).unwrap();
        assert!(plan.is_complete());
        assert_eq!(plan.allocated_addresses(), 256);
    }

    #[test]
    fn test_top_of_address_space() {
        let plan = allocate(block("255.255.255.0/24"), &[100, 100, 1]).unwrap();
        assert_eq!(plan.subnets.len(), 2);
        assert_eq!(plan.subnets[1].block.broadcast(), Ipv4Addr::new(255, 255, 255, 255));
        assert_eq!(plan.unplaced, vec![1]);
    }

    #[test]
    fn test_as_requested_order_stays_aligned() {
        let allocator = AddressSpaceAllocator::new(AllocationOrder::AsRequested);
        let plan = allocator.allocate(block("10.0.0.0/24"), &[10, 100]).unwrap();
        assert!(plan.is_complete());
        assert_eq!(plan.subnets[0].block.to_string(), "10.0.0.0/28");
        assert_eq!(plan.subnets[1].block.to_string(), "10.0.0.128/25");
    }

    #[test]
    fn test_reserved_block_is_skipped() {
        let allocator = AddressSpaceAllocator::default().with_reserved(block("192.168.0.0/24"));
        let plan = allocator.allocate(block("192.168.0.0/22"), &[200, 10]).unwrap();
        assert!(plan.is_complete());
        assert_eq!(plan.subnets[0].block.to_string(), "192.168.1.0/24");
        assert_eq!(plan.subnets[1].block.to_string(), "192.168.2.0/28");
        for s in &plan.subnets {
            assert!(!s.block.overlaps(&block("192.168.0.0/24")));
        }
    }

    #[test]
    fn test_reserved_block_can_exhaust_parent() {
        let allocator = AddressSpaceAllocator::default().with_reserved(block("10.0.0.128/25"));
        let plan = allocator.allocate(block("10.0.0.0/24"), &[100, 100]).unwrap();
        assert_eq!(plan.subnets.len(), 1);
        assert_eq!(plan.unplaced, vec![100]);
    }

    #[test]
    fn test_idempotent() {
        let parent = block("172.16.0.0/20");
        let reqs = [300, 12, 60, 60, 2, 1000];
        assert_eq!(allocate(parent, &reqs).unwrap(), allocate(parent, &reqs).unwrap());
    }

    #[test]
    fn test_disjoint_and_contained_when_demand_fits() {
        // deterministic pseudo-random requirement lists
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = || {
            seed ^= seed << 13;
            seed ^= seed >> 7;
            seed ^= seed << 17;
            seed
        };

        let parent = block("10.32.0.0/16");
        for _ in 0..200 {
            let count = (next() % 12 + 1) as usize;
            let reqs: Vec<u32> = (0..count).map(|_| (next() % 5000 + 1) as u32).collect();
            let demand: u64 = reqs.iter().map(|&h| 1u64 << host_bits_for(h).unwrap()).sum();

            let plan = allocate(parent, &reqs).unwrap();
            if demand <= parent.capacity() {
                assert!(plan.is_complete(), "demand {} should fit: {:?}", demand, reqs);
                assert_eq!(plan.subnets.len(), reqs.len());
            } else {
                assert!(!plan.is_complete());
            }

            for (i, a) in plan.subnets.iter().enumerate() {
                assert!(parent.contains_block(&a.block));
                assert!(u64::from(a.requested_hosts) <= a.usable_hosts);
                for b in &plan.subnets[i + 1..] {
                    assert!(!a.block.overlaps(&b.block));
                    assert!(a.requested_hosts >= b.requested_hosts);
                }
            }
        }
    }

    #[test]
    fn test_order_parsing() {
        assert_eq!("largest-first".parse::<AllocationOrder>(), Ok(AllocationOrder::LargestFirst));
        assert_eq!("as_requested".parse::<AllocationOrder>(), Ok(AllocationOrder::AsRequested));
        assert!("random".parse::<AllocationOrder>().is_err());
    }

    #[test]
    fn test_divide_equal() {
        let subnets = divide_equal(block("10.0.0.0/16"), 4).unwrap();
        let text: Vec<String> = subnets.iter().map(|s| s.to_string()).collect();
        assert_eq!(text, vec!["10.0.0.0/18", "10.0.64.0/18", "10.0.128.0/18", "10.0.192.0/18"]);

        let three = divide_equal(block("10.0.0.0/16"), 3).unwrap();
        assert_eq!(three.len(), 3);
        assert_eq!(three[2].to_string(), "10.0.128.0/18");

        assert_eq!(divide_equal(block("10.0.0.0/24"), 1).unwrap(), vec![block("10.0.0.0/24")]);
    }

    #[test]
    fn test_divide_equal_rejects_tiny_subnets() {
        assert!(divide_equal(block("10.0.0.0/29"), 2).is_ok());
        assert!(matches!(
            divide_equal(block("10.0.0.0/29"), 4),
            Err(AllocationError::InvalidRequest(_))
        ));
        assert!(matches!(
            divide_equal(block("10.0.0.0/24"), 0),
            Err(AllocationError::InvalidRequest(_))
        ));
    }
}
