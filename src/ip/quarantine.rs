//! Quarantine address pool.
//!
//! Quarantined devices get an address at offset 10..=100 from the quarantine
//! block's network address. The starting offset is derived from the device
//! id, so a given device lands on the same address on every run, and the
//! pool probes forward past offsets already taken instead of trusting
//! chance to avoid collisions.

use std::collections::BTreeSet;
use std::net::Ipv4Addr;
use std::ops::RangeInclusive;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::cidr::CidrBlock;
use super::registry::DeviceId;
use crate::error::RemediationError;

/// Offsets (from the network address) handed out to quarantined devices
pub const QUARANTINE_OFFSETS: RangeInclusive<u32> = 10..=100;

const OFFSET_SEED_SALT: u64 = 0x5175_6172_616e_7469;

#[derive(Debug, Clone)]
pub struct QuarantinePool {
    block: CidrBlock,
    used: BTreeSet<u32>,
}

impl QuarantinePool {
    pub fn new(block: CidrBlock) -> Result<Self, RemediationError> {
        if block.capacity() <= u64::from(*QUARANTINE_OFFSETS.end()) {
            return Err(RemediationError::QuarantineTooSmall(block));
        }
        Ok(Self { block, used: BTreeSet::new() })
    }

    pub fn block(&self) -> CidrBlock {
        self.block
    }

    /// Number of quarantine addresses currently taken.
    pub fn in_use(&self) -> usize {
        self.used.len()
    }

    pub fn capacity(&self) -> usize {
        QUARANTINE_OFFSETS.count()
    }

    /// Forget every reservation.
    pub fn clear(&mut self) {
        self.used.clear();
    }

    /// Mark `addr` as taken if it is one of the pool's addresses.
    pub fn observe(&mut self, addr: Ipv4Addr) {
        if let Some(offset) = self.block.offset_of(addr) {
            if QUARANTINE_OFFSETS.contains(&offset) {
                self.used.insert(offset);
            }
        }
    }

    /// Offset the device would get in an empty pool.
    pub fn preferred_offset(&self, device: DeviceId) -> u32 {
        let mut rng = StdRng::seed_from_u64(device.0 ^ OFFSET_SEED_SALT);
        rng.gen_range(QUARANTINE_OFFSETS)
    }

    /// Reserve the first free offset at or after the device's preferred one,
    /// wrapping around the range.
    pub fn reserve(&mut self, device: DeviceId) -> Option<Ipv4Addr> {
        let start = *QUARANTINE_OFFSETS.start();
        let span = self.capacity() as u32;
        let preferred = self.preferred_offset(device) - start;

        let offset = (0..span)
            .map(|step| start + (preferred + step) % span)
            .find(|offset| !self.used.contains(offset))?;
        self.used.insert(offset);
        self.block.nth(offset)
    }

    /// Return `addr` to the pool.
    pub fn release(&mut self, addr: Ipv4Addr) {
        if let Some(offset) = self.block.offset_of(addr) {
            self.used.remove(&offset);
        }
    }
}
