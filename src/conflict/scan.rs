//! Conflict detection.
//!
//! Both scans are pure: they look at a device list and report what they
//! find. Only `active` devices take part.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::ip::cidr::CidrBlock;
use crate::ip::registry::{DeviceRecord, DeviceStatus};

/// Two active devices holding the same address. `keeper` was seen first and
/// keeps the address; `contender` is the one to move.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicatePair {
    pub ip: Ipv4Addr,
    pub keeper: DeviceRecord,
    pub contender: DeviceRecord,
}

/// Find active devices sharing an address.
///
/// The first device seen with an address holds it; each later device with
/// the same address is paired with that first holder. Results follow the
/// order of `devices`.
pub fn scan_duplicates(devices: &[DeviceRecord]) -> Vec<DuplicatePair> {
    let mut first_holder: HashMap<Ipv4Addr, &DeviceRecord> = HashMap::new();
    let mut duplicates = Vec::new();

    for device in devices.iter().filter(|d| d.status == DeviceStatus::Active) {
        match first_holder.get(&device.ip) {
            Some(keeper) => {
                log::warn!(
                    "DUPLICATE: {} assigned to both '{}' and '{}'",
                    device.ip,
                    keeper.name,
                    device.name
                );
                duplicates.push(DuplicatePair {
                    ip: device.ip,
                    keeper: (*keeper).clone(),
                    contender: device.clone(),
                });
            }
            None => {
                first_holder.insert(device.ip, device);
            }
        }
    }

    if duplicates.is_empty() {
        log::info!("No duplicate IPs found among {} devices", devices.len());
    }
    duplicates
}

/// True when `addr` falls inside at least one of `authorized`.
pub fn is_authorized(addr: Ipv4Addr, authorized: &[CidrBlock]) -> bool {
    authorized.iter().any(|block| block.contains(addr))
}

/// Active devices whose address is outside every authorized block, in the
/// order of `devices`.
pub fn scan_unauthorized(devices: &[DeviceRecord], authorized: &[CidrBlock]) -> Vec<DeviceRecord> {
    let unauthorized: Vec<DeviceRecord> = devices
        .par_iter()
        .filter(|d| d.status == DeviceStatus::Active && !is_authorized(d.ip, authorized))
        .cloned()
        .collect();

    for device in &unauthorized {
        log::warn!(
            "UNAUTHORIZED: '{}' ({}) not in any authorized block",
            device.name,
            device.ip
        );
    }
    if unauthorized.is_empty() {
        log::info!("All active IPs within authorized blocks");
    }
    unauthorized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ip::registry::DeviceId;
    use chrono::Utc;

    fn device(id: u64, ip: &str) -> DeviceRecord {
        DeviceRecord {
            id: DeviceId(id),
            name: format!("dev-{}", id),
            ip: ip.parse().unwrap(),
            class: "server".to_string(),
            subnet: None,
            mac: "00:00:00:00:00:00".to_string(),
            status: DeviceStatus::Active,
            last_seen: Utc::now(),
        }
    }

    fn blocks(list: &[&str]) -> Vec<CidrBlock> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn test_no_duplicates() {
        let devices = vec![device(1, "10.0.0.1"), device(2, "10.0.0.2")];
        assert!(scan_duplicates(&devices).is_empty());
        assert!(scan_duplicates(&[]).is_empty());
    }

    #[test]
    fn test_single_duplicate_pair() {
        let devices = vec![
            device(1, "192.168.1.10"),
            device(2, "192.168.1.20"),
            device(3, "192.168.1.10"),
        ];
        let pairs = scan_duplicates(&devices);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].ip, "192.168.1.10".parse::<Ipv4Addr>().unwrap());
        assert_eq!(pairs[0].keeper.id, DeviceId(1));
        assert_eq!(pairs[0].contender.id, DeviceId(3));
    }

    #[test]
    fn test_every_later_holder_pairs_with_first() {
        let devices = vec![
            device(1, "10.0.0.5"),
            device(2, "10.0.0.5"),
            device(3, "10.0.0.5"),
        ];
        let pairs = scan_duplicates(&devices);
        assert_eq!(pairs.len(), 2);
        assert!(pairs.iter().all(|p| p.keeper.id == DeviceId(1)));
        assert_eq!(pairs[0].contender.id, DeviceId(2));
        assert_eq!(pairs[1].contender.id, DeviceId(3));
    }

    #[test]
    fn test_non_active_devices_are_ignored() {
        let mut quarantined = device(1, "10.0.0.5");
        quarantined.status = DeviceStatus::Quarantined;
        let mut inactive = device(3, "10.0.0.5");
        inactive.status = DeviceStatus::Inactive;

        let devices = vec![quarantined, device(2, "10.0.0.5"), inactive];
        assert!(scan_duplicates(&devices).is_empty());
        assert!(scan_unauthorized(&devices, &[]).len() == 1);
    }

    #[test]
    fn test_unauthorized_boundaries_count_as_contained() {
        let authorized = blocks(&["192.168.1.0/24", "10.0.1.0/24"]);
        let devices = vec![
            device(1, "192.168.1.0"),
            device(2, "192.168.1.255"),
            device(3, "10.0.1.0"),
            device(4, "10.0.1.255"),
        ];
        assert!(scan_unauthorized(&devices, &authorized).is_empty());
    }

    #[test]
    fn test_unauthorized_keeps_registry_order() {
        let authorized = blocks(&["192.168.1.0/24"]);
        let devices: Vec<DeviceRecord> = (1..=50)
            .map(|i| {
                if i % 3 == 0 {
                    device(i, &format!("10.99.0.{}", i))
                } else {
                    device(i, &format!("192.168.1.{}", i))
                }
            })
            .collect();

        let found = scan_unauthorized(&devices, &authorized);
        let ids: Vec<u64> = found.iter().map(|d| d.id.0).collect();
        let expected: Vec<u64> = (1..=50).filter(|i| i % 3 == 0).collect();
        assert_eq!(ids, expected);
    }

    #[test]
    fn test_authorized_blocks_tolerate_host_bits() {
        let authorized = blocks(&["172.16.1.99/24"]);
        assert!(is_authorized("172.16.1.1".parse().unwrap(), &authorized));
        assert!(!is_authorized("172.16.2.1".parse().unwrap(), &authorized));
        assert!(!is_authorized("172.16.1.1".parse().unwrap(), &[]));
    }
}
