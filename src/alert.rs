//! Utilization thresholds and alert delivery.
//!
//! Delivery itself is external: anything implementing [`AlertSink`] can
//! receive the formatted alerts. [`LogAlertSink`] routes them to the log.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::RegistryError;
use crate::ip::cidr::CidrBlock;
use crate::ip::registry::{DeviceRecord, DeviceRegistry, DeviceStatus};

/// Utilization percentages at which alerts fire
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub warning: f64,
    pub critical: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            warning: 80.0,
            critical: 90.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtilizationLevel {
    Normal,
    Warning,
    Critical,
}

impl fmt::Display for UtilizationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UtilizationLevel::Normal => write!(f, "NORMAL"),
            UtilizationLevel::Warning => write!(f, "WARNING"),
            UtilizationLevel::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl Thresholds {
    pub fn classify(&self, utilization_percent: f64) -> UtilizationLevel {
        if utilization_percent >= self.critical {
            UtilizationLevel::Critical
        } else if utilization_percent >= self.warning {
            UtilizationLevel::Warning
        } else {
            UtilizationLevel::Normal
        }
    }
}

/// Point-in-time utilization of one subnet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationSample {
    pub subnet: CidrBlock,
    pub utilization_percent: f64,
    pub available: u64,
}

/// Utilization of each block by the active devices addressed inside it.
/// Blocks without usable hosts report 100% once anything is inside.
pub fn sample_utilization(
    blocks: &[CidrBlock],
    devices: &[DeviceRecord],
) -> Vec<UtilizationSample> {
    blocks
        .iter()
        .map(|block| {
            let used = devices
                .iter()
                .filter(|d| d.status == DeviceStatus::Active && block.contains(d.ip))
                .count() as u64;
            let usable = block.usable_hosts();
            let utilization_percent = match (usable, used) {
                (_, 0) => 0.0,
                (0, _) => 100.0,
                _ => (used as f64 / usable as f64 * 100.0).min(100.0),
            };
            UtilizationSample {
                subnet: *block,
                utilization_percent,
                available: usable.saturating_sub(used),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtilizationAlert {
    pub level: UtilizationLevel,
    pub sample: UtilizationSample,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPriority {
    Normal,
    High,
}

impl fmt::Display for AlertPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertPriority::Normal => write!(f, "NORMAL"),
            AlertPriority::High => write!(f, "HIGH"),
        }
    }
}

/// Alert delivery channel
pub trait AlertSink {
    fn send(&mut self, subject: &str, body: &str, priority: AlertPriority);
}

/// Emits alerts through the `log` facade
#[derive(Debug, Default)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn send(&mut self, subject: &str, body: &str, priority: AlertPriority) {
        match priority {
            AlertPriority::High => log::error!("ALERT [{}]: {}\n{}", priority, subject, body),
            AlertPriority::Normal => log::warn!("ALERT [{}]: {}\n{}", priority, subject, body),
        }
    }
}

/// Samples at or above the warning threshold, most severe first.
pub fn check_utilization(
    samples: &[UtilizationSample],
    thresholds: &Thresholds,
) -> Vec<UtilizationAlert> {
    let mut alerts: Vec<UtilizationAlert> = samples
        .iter()
        .filter_map(|sample| match thresholds.classify(sample.utilization_percent) {
            UtilizationLevel::Normal => None,
            level => Some(UtilizationAlert {
                level,
                sample: sample.clone(),
            }),
        })
        .collect();
    // stable: equal levels keep sample order
    alerts.sort_by(|a, b| b.level.cmp(&a.level));
    alerts
}

/// Send one alert summarizing `alerts`. High priority if any is critical.
pub fn send_utilization_alert(alerts: &[UtilizationAlert], sink: &mut dyn AlertSink) {
    if alerts.is_empty() {
        return;
    }
    let priority = if alerts.iter().any(|a| a.level == UtilizationLevel::Critical) {
        AlertPriority::High
    } else {
        AlertPriority::Normal
    };
    let body = alerts
        .iter()
        .map(|a| {
            format!(
                "[{}] {}: {:.1}% utilized, {} addresses available",
                a.level, a.sample.subnet, a.sample.utilization_percent, a.sample.available
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    sink.send(
        &format!("Subnet utilization alert: {} subnets", alerts.len()),
        &body,
        priority,
    );
}

/// Send a high-priority alert listing open conflicts. Returns how many
/// were open.
pub fn check_conflict_alerts<R: DeviceRegistry + ?Sized>(
    registry: &R,
    sink: &mut dyn AlertSink,
) -> Result<usize, RegistryError> {
    let open: Vec<_> = registry
        .list_conflicts()?
        .into_iter()
        .filter(|c| !c.resolved)
        .collect();

    if open.is_empty() {
        log::info!("No active conflicts");
        return Ok(0);
    }

    let body = open
        .iter()
        .map(|c| {
            let subnet = c.subnet.map(|s| s.to_string()).unwrap_or_else(|| "N/A".to_string());
            format!(
                "{} {} in {} detected {}",
                c.kind,
                c.ip,
                subnet,
                c.detected_at.format("%Y-%m-%d %H:%M:%S")
            )
        })
        .collect::<Vec<_>>()
        .join("\n");
    sink.send(
        &format!("{} unresolved IP conflicts", open.len()),
        &body,
        AlertPriority::High,
    );
    Ok(open.len())
}
