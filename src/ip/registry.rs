//! Device and conflict registry.
//!
//! The conflict engine never touches storage directly. It reads and writes
//! through the narrow [`DeviceRegistry`] trait, so any backend (a database,
//! a remote inventory, the in-memory store below) can sit behind it.
//!
//! Iteration order is part of the contract: `list_devices` returns devices
//! in ascending id order, which is registration order. Duplicate detection
//! relies on it to decide which holder of an address keeps it.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::net::Ipv4Addr;
use std::path::Path;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use log::{debug, error, info};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::cidr::CidrBlock;
use crate::error::RegistryError;

/// Registry-assigned device identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub u64);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Registry-assigned conflict identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConflictId(pub u64);

impl fmt::Display for ConflictId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceStatus {
    #[default]
    Active,
    Quarantined,
    Inactive,
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceStatus::Active => write!(f, "active"),
            DeviceStatus::Quarantined => write!(f, "quarantined"),
            DeviceStatus::Inactive => write!(f, "inactive"),
        }
    }
}

/// A network device as recorded in the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub name: String,
    pub ip: Ipv4Addr,
    /// router, switch, server, ...
    pub class: String,
    pub subnet: Option<CidrBlock>,
    pub mac: String,
    pub status: DeviceStatus,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Two active devices hold the same address
    Duplicate,
    /// An active device holds an address outside every authorized block
    Unauthorized,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictKind::Duplicate => write!(f, "duplicate"),
            ConflictKind::Unauthorized => write!(f, "unauthorized"),
        }
    }
}

/// Audit record of a detected conflict. Records are never deleted and move
/// from open to resolved exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub id: ConflictId,
    pub ip: Ipv4Addr,
    pub subnet: Option<CidrBlock>,
    pub kind: ConflictKind,
    pub detected_at: DateTime<Utc>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_method: Option<String>,
}

/// The mutable part of a device: what remediation is allowed to change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceUpdate {
    pub id: DeviceId,
    pub ip: Ipv4Addr,
    pub status: DeviceStatus,
    pub subnet: Option<CidrBlock>,
}

impl DeviceUpdate {
    /// Current state of `device`, used to revert a failed remediation.
    pub fn snapshot(device: &DeviceRecord) -> Self {
        Self {
            id: device.id,
            ip: device.ip,
            status: device.status,
            subnet: device.subnet,
        }
    }
}

/// A device move paired with the conflict it resolves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remediation {
    pub conflict: ConflictId,
    pub previous: DeviceUpdate,
    pub next: DeviceUpdate,
    pub method: String,
}

/// Narrow repository interface consumed by the conflict engine
pub trait DeviceRegistry {
    /// Devices with `status`, in ascending id order.
    fn list_devices(&self, status: DeviceStatus) -> Result<Vec<DeviceRecord>, RegistryError>;

    fn update_device(&mut self, update: &DeviceUpdate) -> Result<(), RegistryError>;

    /// Record a new open conflict detected now.
    fn insert_conflict(
        &mut self,
        ip: Ipv4Addr,
        subnet: Option<CidrBlock>,
        kind: ConflictKind,
    ) -> Result<ConflictRecord, RegistryError>;

    /// Mark a conflict resolved. `Ok(false)` when the id is unknown or the
    /// conflict was already resolved.
    fn resolve_conflict(&mut self, id: ConflictId, method: &str) -> Result<bool, RegistryError>;

    /// All conflicts, in ascending id order.
    fn list_conflicts(&self) -> Result<Vec<ConflictRecord>, RegistryError>;

    fn list_active_devices(&self) -> Result<Vec<DeviceRecord>, RegistryError> {
        self.list_devices(DeviceStatus::Active)
    }

    fn count_devices(&self, status: DeviceStatus) -> Result<usize, RegistryError> {
        Ok(self.list_devices(status)?.len())
    }

    fn count_conflicts(&self, resolved: bool) -> Result<usize, RegistryError> {
        Ok(self
            .list_conflicts()?
            .iter()
            .filter(|c| c.resolved == resolved)
            .count())
    }

    /// Open conflict of `kind` for `ip`, if one was left behind earlier.
    fn find_open_conflict(
        &self,
        ip: Ipv4Addr,
        kind: ConflictKind,
    ) -> Result<Option<ConflictRecord>, RegistryError> {
        Ok(self
            .list_conflicts()?
            .into_iter()
            .find(|c| !c.resolved && c.ip == ip && c.kind == kind))
    }

    /// Apply the device move and resolve the conflict as one unit.
    ///
    /// Backends with transactions should override this. The default writes
    /// the device first and resolves afterwards; if resolution does not go
    /// through, the device is written back to `previous`.
    fn commit_remediation(&mut self, remediation: &Remediation) -> Result<(), RegistryError> {
        self.update_device(&remediation.next)?;

        let failure = match self.resolve_conflict(remediation.conflict, &remediation.method) {
            Ok(true) => return Ok(()),
            Ok(false) => RegistryError::ConflictClosed(remediation.conflict),
            Err(e) => e,
        };

        if let Err(revert) = self.update_device(&remediation.previous) {
            error!(
                "Failed to revert device {} after unresolved conflict {}: {}",
                remediation.previous.id, remediation.conflict, revert
            );
        }
        Err(failure)
    }
}

/// Inventory entry used to register a device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDevice {
    pub name: String,
    pub ip: Ipv4Addr,
    #[serde(default = "default_device_class")]
    pub class: String,
    #[serde(default)]
    pub subnet: Option<CidrBlock>,
    #[serde(default = "default_mac")]
    pub mac: String,
    #[serde(default)]
    pub status: DeviceStatus,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

fn default_device_class() -> String {
    "unknown".to_string()
}

fn default_mac() -> String {
    "00:00:00:00:00:00".to_string()
}

impl NewDevice {
    pub fn new(name: &str, ip: Ipv4Addr) -> Self {
        Self {
            name: name.to_string(),
            ip,
            class: default_device_class(),
            subnet: None,
            mac: default_mac(),
            status: DeviceStatus::Active,
            last_seen: None,
        }
    }

    pub fn with_class(mut self, class: &str) -> Self {
        self.class = class.to_string();
        self
    }

    pub fn with_subnet(mut self, subnet: CidrBlock) -> Self {
        self.subnet = Some(subnet);
        self
    }

    pub fn with_mac(mut self, mac: &str) -> Self {
        self.mac = mac.to_string();
        self
    }

    pub fn with_status(mut self, status: DeviceStatus) -> Self {
        self.status = status;
        self
    }
}

/// Inventory file layout (YAML or JSON)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inventory {
    pub devices: Vec<NewDevice>,
}

/// Exported registry state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub devices: Vec<DeviceRecord>,
    pub conflicts: Vec<ConflictRecord>,
}

const MAC_PATTERN: &str = r"^[0-9A-Fa-f]{2}(?:[:-][0-9A-Fa-f]{2}){5}$";

fn mac_pattern() -> Option<&'static Regex> {
    static MAC: OnceLock<Option<Regex>> = OnceLock::new();
    MAC.get_or_init(|| match Regex::new(MAC_PATTERN) {
        Ok(re) => Some(re),
        Err(e) => {
            error!("MAC address pattern failed to compile: {}", e);
            None
        }
    })
    .as_ref()
}

/// Check `mac` is six hex octets separated by `:` or `-`. Nothing passes if
/// the pattern is unavailable.
pub fn is_valid_mac(mac: &str) -> bool {
    mac_pattern().is_some_and(|re| re.is_match(mac))
}

/// Registry held in memory; remediation commits are atomic.
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    devices: BTreeMap<DeviceId, DeviceRecord>,
    conflicts: BTreeMap<ConflictId, ConflictRecord>,
    next_device_id: u64,
    next_conflict_id: u64,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every entry of `inventory`, in file order.
    pub fn from_inventory(inventory: Inventory) -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        for device in inventory.devices {
            registry.register_device(device)?;
        }
        Ok(registry)
    }

    /// Load an inventory file. YAML and JSON are both accepted.
    pub fn from_inventory_file(path: &Path) -> Result<Self, RegistryError> {
        info!("Loading device inventory from: {:?}", path);
        let content = fs::read_to_string(path)?;
        let inventory: Inventory = serde_yaml::from_str(&content)
            .map_err(|e| RegistryError::Serialization(e.to_string()))?;
        let registry = Self::from_inventory(inventory)?;
        info!("Registered {} devices", registry.devices.len());
        Ok(registry)
    }

    pub fn register_device(&mut self, device: NewDevice) -> Result<DeviceId, RegistryError> {
        if device.name.trim().is_empty() {
            return Err(RegistryError::InvalidDevice(format!(
                "device with IP {} has an empty name",
                device.ip
            )));
        }
        if !is_valid_mac(&device.mac) {
            return Err(RegistryError::InvalidDevice(format!(
                "device '{}' has invalid MAC address '{}'",
                device.name, device.mac
            )));
        }

        self.next_device_id += 1;
        let id = DeviceId(self.next_device_id);
        debug!("Registered device {} '{}' ({})", id, device.name, device.ip);
        self.devices.insert(
            id,
            DeviceRecord {
                id,
                name: device.name,
                ip: device.ip,
                class: device.class,
                subnet: device.subnet,
                mac: device.mac,
                status: device.status,
                last_seen: device.last_seen.unwrap_or_else(Utc::now),
            },
        );
        Ok(id)
    }

    pub fn device(&self, id: DeviceId) -> Option<&DeviceRecord> {
        self.devices.get(&id)
    }

    pub fn conflict(&self, id: ConflictId) -> Option<&ConflictRecord> {
        self.conflicts.get(&id)
    }

    pub fn devices(&self) -> impl Iterator<Item = &DeviceRecord> {
        self.devices.values()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            devices: self.devices.values().cloned().collect(),
            conflicts: self.conflicts.values().cloned().collect(),
        }
    }

    /// Write devices and conflicts as pretty JSON.
    pub fn export_json(&self, path: &Path) -> Result<(), RegistryError> {
        let json = serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| RegistryError::Serialization(e.to_string()))?;
        fs::write(path, json)?;
        info!("Registry state written to {}", path.display());
        Ok(())
    }

    fn apply_update(&mut self, update: &DeviceUpdate) -> Result<(), RegistryError> {
        let device = self
            .devices
            .get_mut(&update.id)
            .ok_or(RegistryError::DeviceNotFound(update.id))?;
        device.ip = update.ip;
        device.status = update.status;
        device.subnet = update.subnet;
        Ok(())
    }
}

impl DeviceRegistry for InMemoryRegistry {
    fn list_devices(&self, status: DeviceStatus) -> Result<Vec<DeviceRecord>, RegistryError> {
        Ok(self
            .devices
            .values()
            .filter(|d| d.status == status)
            .cloned()
            .collect())
    }

    fn update_device(&mut self, update: &DeviceUpdate) -> Result<(), RegistryError> {
        self.apply_update(update)
    }

    fn insert_conflict(
        &mut self,
        ip: Ipv4Addr,
        subnet: Option<CidrBlock>,
        kind: ConflictKind,
    ) -> Result<ConflictRecord, RegistryError> {
        self.next_conflict_id += 1;
        let record = ConflictRecord {
            id: ConflictId(self.next_conflict_id),
            ip,
            subnet,
            kind,
            detected_at: Utc::now(),
            resolved: false,
            resolved_at: None,
            resolution_method: None,
        };
        self.conflicts.insert(record.id, record.clone());
        Ok(record)
    }

    fn resolve_conflict(&mut self, id: ConflictId, method: &str) -> Result<bool, RegistryError> {
        match self.conflicts.get_mut(&id) {
            Some(conflict) if !conflict.resolved => {
                // never earlier than detection, even if the clock steps back
                let now = Utc::now().max(conflict.detected_at);
                conflict.resolved = true;
                conflict.resolved_at = Some(now);
                conflict.resolution_method = Some(method.to_string());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn list_conflicts(&self) -> Result<Vec<ConflictRecord>, RegistryError> {
        Ok(self.conflicts.values().cloned().collect())
    }

    fn count_devices(&self, status: DeviceStatus) -> Result<usize, RegistryError> {
        Ok(self.devices.values().filter(|d| d.status == status).count())
    }

    fn count_conflicts(&self, resolved: bool) -> Result<usize, RegistryError> {
        Ok(self.conflicts.values().filter(|c| c.resolved == resolved).count())
    }

    fn commit_remediation(&mut self, remediation: &Remediation) -> Result<(), RegistryError> {
        if !self.devices.contains_key(&remediation.next.id) {
            return Err(RegistryError::DeviceNotFound(remediation.next.id));
        }
        match self.conflicts.get(&remediation.conflict) {
            None => return Err(RegistryError::ConflictNotFound(remediation.conflict)),
            Some(c) if c.resolved => {
                return Err(RegistryError::ConflictClosed(remediation.conflict));
            }
            Some(_) => {}
        }

        self.apply_update(&remediation.next)?;
        self.resolve_conflict(remediation.conflict, &remediation.method)?;
        Ok(())
    }
}
