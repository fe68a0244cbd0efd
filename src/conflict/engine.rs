//! Conflict remediation engine.
//!
//! Each remediation is one logical transaction: a conflict record is opened
//! (or an open one from an earlier failed attempt is reused), a quarantine
//! address is reserved, and the device move plus the conflict resolution
//! are committed together through [`DeviceRegistry::commit_remediation`].
//! If the commit fails the reservation is returned and the conflict stays
//! open, so the whole step can simply be retried.
//!
//! Scans against one registry must not overlap; the engine takes `&mut self`
//! for every write and leaves scheduling to the caller.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use super::report::ConflictReport;
use super::scan::{scan_duplicates, scan_unauthorized, DuplicatePair};
use crate::config::Config;
use crate::error::{RegistryError, RemediationError};
use crate::ip::cidr::CidrBlock;
use crate::ip::quarantine::QuarantinePool;
use crate::ip::registry::{
    ConflictId, ConflictKind, ConflictRecord, DeviceRecord, DeviceRegistry, DeviceStatus,
    DeviceUpdate, Remediation,
};

/// Cloneable flag used to stop a running scan between devices
#[derive(Debug, Clone, Default)]
pub struct ScanCancel(Arc<AtomicBool>);

impl ScanCancel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Outcome of one full scan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub duplicates_resolved: usize,
    pub unauthorized_resolved: usize,
    /// The scan stopped early on request; every counted item is fully resolved.
    pub cancelled: bool,
}

impl ScanSummary {
    /// Conflicts processed by the scan.
    pub fn total(&self) -> usize {
        self.duplicates_resolved + self.unauthorized_resolved
    }
}

pub struct ConflictEngine<R> {
    registry: R,
    pool: QuarantinePool,
    pool_synced: bool,
}

impl<R: DeviceRegistry> ConflictEngine<R> {
    pub fn new(registry: R, quarantine_block: CidrBlock) -> Result<Self, RemediationError> {
        info!("Conflict engine initialized (quarantine block {})", quarantine_block);
        Ok(Self {
            registry,
            pool: QuarantinePool::new(quarantine_block)?,
            pool_synced: false,
        })
    }

    pub fn from_config(registry: R, config: &Config) -> Result<Self, RemediationError> {
        Self::new(registry, config.quarantine_block)
    }

    pub fn quarantine_block(&self) -> CidrBlock {
        self.pool.block()
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut R {
        &mut self.registry
    }

    pub fn into_registry(self) -> R {
        self.registry
    }

    /// Duplicate pairs among the registry's active devices.
    pub fn scan_duplicates(&self) -> Result<Vec<DuplicatePair>, RegistryError> {
        Ok(scan_duplicates(&self.registry.list_active_devices()?))
    }

    /// Active devices outside every block of `authorized`.
    pub fn scan_unauthorized(
        &self,
        authorized: &[CidrBlock],
    ) -> Result<Vec<DeviceRecord>, RegistryError> {
        Ok(scan_unauthorized(&self.registry.list_active_devices()?, authorized))
    }

    /// Rebuild the set of taken quarantine addresses from the registry.
    /// Any device inside the pool range holds its address, whatever its status.
    fn sync_quarantine(&mut self) -> Result<(), RegistryError> {
        self.pool.clear();
        for status in [DeviceStatus::Active, DeviceStatus::Quarantined, DeviceStatus::Inactive] {
            for device in self.registry.list_devices(status)? {
                self.pool.observe(device.ip);
            }
        }
        self.pool_synced = true;
        Ok(())
    }

    fn open_conflict(
        &mut self,
        ip: Ipv4Addr,
        subnet: Option<CidrBlock>,
        kind: ConflictKind,
    ) -> Result<ConflictRecord, RegistryError> {
        if let Some(existing) = self.registry.find_open_conflict(ip, kind)? {
            info!("Retrying open {} conflict {} for {}", kind, existing.id, ip);
            return Ok(existing);
        }
        let conflict = self.registry.insert_conflict(ip, subnet, kind)?;
        warn!("Conflict {} logged: {} ({})", conflict.id, ip, kind);
        Ok(conflict)
    }

    /// Move `device` into the quarantine block and resolve `conflict` with
    /// it. Returns the device's new address.
    pub fn quarantine(
        &mut self,
        device: &DeviceRecord,
        conflict: &ConflictRecord,
    ) -> Result<Ipv4Addr, RemediationError> {
        if !self.pool_synced {
            self.sync_quarantine()?;
        }

        let block = self.pool.block();
        let new_ip = self
            .pool
            .reserve(device.id)
            .ok_or(RemediationError::QuarantineExhausted(block))?;

        let remediation = Remediation {
            conflict: conflict.id,
            previous: DeviceUpdate::snapshot(device),
            next: DeviceUpdate {
                id: device.id,
                ip: new_ip,
                status: DeviceStatus::Quarantined,
                subnet: Some(block),
            },
            method: format!("auto-quarantine to {}", new_ip),
        };

        if let Err(e) = self.registry.commit_remediation(&remediation) {
            self.pool.release(new_ip);
            error!(
                "Failed to quarantine '{}' ({}), conflict {} left open: {}",
                device.name, device.ip, conflict.id, e
            );
            return Err(e.into());
        }

        info!("QUARANTINED: '{}' moved from {} to {}", device.name, device.ip, new_ip);
        Ok(new_ip)
    }

    /// The first holder keeps the address; the second is quarantined.
    pub fn auto_remediate_duplicate(
        &mut self,
        pair: &DuplicatePair,
    ) -> Result<Ipv4Addr, RemediationError> {
        info!(
            "Remediating duplicate {}: keeping '{}', quarantining '{}'",
            pair.ip, pair.keeper.name, pair.contender.name
        );
        let conflict = self.open_conflict(pair.ip, pair.keeper.subnet, ConflictKind::Duplicate)?;
        self.quarantine(&pair.contender, &conflict)
    }

    /// Unauthorized devices are always quarantined.
    pub fn auto_remediate_unauthorized(
        &mut self,
        device: &DeviceRecord,
    ) -> Result<Ipv4Addr, RemediationError> {
        info!("Remediating unauthorized device '{}' ({})", device.name, device.ip);
        let conflict = self.open_conflict(device.ip, None, ConflictKind::Unauthorized)?;
        self.quarantine(device, &conflict)
    }

    /// Resolve a conflict by hand. The method must be non-empty.
    pub fn resolve_manually(
        &mut self,
        id: ConflictId,
        method: &str,
    ) -> Result<bool, RemediationError> {
        if method.trim().is_empty() {
            return Err(RemediationError::EmptyResolutionMethod(id));
        }
        let resolved = self.registry.resolve_conflict(id, method)?;
        if resolved {
            info!("Conflict {} resolved manually via {}", id, method);
        }
        Ok(resolved)
    }

    /// Detect and remediate every duplicate, then every unauthorized device.
    ///
    /// Duplicates go first because quarantining one takes it out of the
    /// active set the unauthorized scan reads. A remediation failure stops
    /// the scan and is returned; items already committed stay committed.
    pub fn run_full_scan(
        &mut self,
        authorized: &[CidrBlock],
        cancel: &ScanCancel,
    ) -> Result<ScanSummary, RemediationError> {
        info!("Starting full network scan");
        let mut summary = ScanSummary::default();
        self.sync_quarantine()?;

        let duplicates = self.scan_duplicates()?;
        for pair in &duplicates {
            if cancel.is_cancelled() {
                warn!("Scan cancelled after {} remediations", summary.total());
                summary.cancelled = true;
                return Ok(summary);
            }
            self.auto_remediate_duplicate(pair)?;
            summary.duplicates_resolved += 1;
        }

        let unauthorized = self.scan_unauthorized(authorized)?;
        for device in &unauthorized {
            if cancel.is_cancelled() {
                warn!("Scan cancelled after {} remediations", summary.total());
                summary.cancelled = true;
                return Ok(summary);
            }
            self.auto_remediate_unauthorized(device)?;
            summary.unauthorized_resolved += 1;
        }

        info!("Scan complete: {} conflicts resolved", summary.total());
        Ok(summary)
    }

    pub fn report(&self) -> Result<ConflictReport, RegistryError> {
        Ok(ConflictReport::new(
            self.registry.count_conflicts(false)?,
            self.registry.count_conflicts(true)?,
            self.registry.count_devices(DeviceStatus::Quarantined)?,
        ))
    }
}
