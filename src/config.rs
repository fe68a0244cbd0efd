use std::net::Ipv4Addr;
use std::time::Duration;

use ipnet::Ipv4Net;
use serde::{Deserialize, Serialize};

use crate::alert::Thresholds;
use crate::ip::allocator::{AddressSpaceAllocator, AllocationOrder};
use crate::ip::cidr::CidrBlock;
use crate::ip::quarantine::QUARANTINE_OFFSETS;

/// Default quarantine zone
pub const DEFAULT_QUARANTINE_BLOCK: CidrBlock =
    CidrBlock::from_net(Ipv4Net::new_assert(Ipv4Addr::new(192, 168, 255, 0), 24));

/// Default time between scans in `watch` mode
pub const DEFAULT_SCAN_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Top-level configuration structure that mirrors the YAML configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Block that quarantined devices are moved into
    #[serde(default = "default_quarantine_block")]
    pub quarantine_block: CidrBlock,
    /// Blocks a device address must fall in to be authorized (required)
    pub authorized_blocks: Vec<CidrBlock>,
    /// Order in which allocation requirements are carved out
    #[serde(default)]
    pub allocation_order: AllocationOrder,
    /// Utilization alert thresholds, in percent
    #[serde(default)]
    pub thresholds: Thresholds,
    /// Time between scans in `watch` mode (e.g. "15m", "1h")
    #[serde(default = "default_scan_interval", with = "humantime_serde")]
    pub scan_interval: Duration,
}

fn default_quarantine_block() -> CidrBlock {
    DEFAULT_QUARANTINE_BLOCK
}

fn default_scan_interval() -> Duration {
    DEFAULT_SCAN_INTERVAL
}

impl Config {
    /// Configuration with defaults for everything but the authorized blocks
    pub fn new(authorized_blocks: Vec<CidrBlock>) -> Self {
        Self {
            quarantine_block: DEFAULT_QUARANTINE_BLOCK,
            authorized_blocks,
            allocation_order: AllocationOrder::default(),
            thresholds: Thresholds::default(),
            scan_interval: DEFAULT_SCAN_INTERVAL,
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.quarantine_block.capacity() <= u64::from(*QUARANTINE_OFFSETS.end()) {
            return Err(ValidationError::InvalidQuarantine(format!(
                "{} cannot hold offsets {}-{}; use a /25 or larger block",
                self.quarantine_block,
                QUARANTINE_OFFSETS.start(),
                QUARANTINE_OFFSETS.end()
            )));
        }

        if self.authorized_blocks.is_empty() {
            return Err(ValidationError::InvalidAuthorized(
                "authorized_blocks cannot be empty".to_string(),
            ));
        }

        for block in &self.authorized_blocks {
            if block.overlaps(&self.quarantine_block) {
                log::warn!(
                    "Authorized block {} overlaps quarantine block {}",
                    block,
                    self.quarantine_block
                );
            }
        }

        let Thresholds { warning, critical } = self.thresholds;
        if !(0.0..=100.0).contains(&warning) || !(0.0..=100.0).contains(&critical) {
            return Err(ValidationError::InvalidThresholds(format!(
                "thresholds must be within 0-100 (warning {}, critical {})",
                warning, critical
            )));
        }
        if warning >= critical {
            return Err(ValidationError::InvalidThresholds(format!(
                "warning threshold {} must be below critical threshold {}",
                warning, critical
            )));
        }

        if self.scan_interval.is_zero() {
            return Err(ValidationError::InvalidGeneral(
                "scan_interval must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Allocator honoring the configured order, with the quarantine block
    /// held back from ordinary requests
    pub fn allocator(&self) -> AddressSpaceAllocator {
        AddressSpaceAllocator::new(self.allocation_order).with_reserved(self.quarantine_block)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Invalid quarantine configuration: {0}")]
    InvalidQuarantine(String),
    #[error("Invalid authorized blocks: {0}")]
    InvalidAuthorized(String),
    #[error("Invalid thresholds: {0}")]
    InvalidThresholds(String),
    #[error("Invalid general configuration: {0}")]
    InvalidGeneral(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blocks(list: &[&str]) -> Vec<CidrBlock> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn test_defaults() {
        let config = Config::new(blocks(&["192.168.1.0/24"]));
        assert_eq!(config.quarantine_block.to_string(), "192.168.255.0/24");
        assert_eq!(config.allocation_order, AllocationOrder::LargestFirst);
        assert_eq!(config.thresholds, Thresholds { warning: 80.0, critical: 90.0 });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_small_quarantine_block() {
        let mut config = Config::new(blocks(&["192.168.1.0/24"]));
        config.quarantine_block = "192.168.255.0/26".parse().unwrap();
        assert!(matches!(config.validate(), Err(ValidationError::InvalidQuarantine(_))));
    }

    #[test]
    fn test_rejects_empty_authorized_list() {
        let config = Config::new(Vec::new());
        assert!(matches!(config.validate(), Err(ValidationError::InvalidAuthorized(_))));
    }

    #[test]
    fn test_rejects_inverted_thresholds() {
        let mut config = Config::new(blocks(&["10.0.0.0/8"]));
        config.thresholds = Thresholds { warning: 90.0, critical: 80.0 };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidThresholds(_))));

        config.thresholds = Thresholds { warning: 50.0, critical: 120.0 };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidThresholds(_))));
    }

    #[test]
    fn test_allocator_reserves_quarantine_block() {
        let config = Config::new(blocks(&["192.168.0.0/16"]));
        let plan = config
            .allocator()
            .allocate("192.168.254.0/23".parse().unwrap(), &[200, 200])
            .unwrap();
        assert_eq!(plan.subnets.len(), 1);
        assert_eq!(plan.subnets[0].block.to_string(), "192.168.254.0/24");
        assert_eq!(plan.unplaced, vec![200]);
    }
}
