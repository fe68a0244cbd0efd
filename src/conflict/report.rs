//! Conflict resolution reporting.

use serde::{Deserialize, Serialize};

/// Summary of the conflict log and quarantine state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub active_conflicts: usize,
    pub resolved_conflicts: usize,
    pub quarantined_devices: usize,
    /// resolved / (active + resolved) * 100, or 0 with no conflicts
    pub resolution_rate: f64,
}

impl ConflictReport {
    pub fn new(
        active_conflicts: usize,
        resolved_conflicts: usize,
        quarantined_devices: usize,
    ) -> Self {
        let total = active_conflicts + resolved_conflicts;
        let resolution_rate = if total == 0 {
            0.0
        } else {
            resolved_conflicts as f64 / total as f64 * 100.0
        };
        Self {
            active_conflicts,
            resolved_conflicts,
            quarantined_devices,
            resolution_rate,
        }
    }

    /// Human-readable summary
    pub fn render_text(&self) -> String {
        let mut lines: Vec<String> = Vec::new();

        lines.push("=".repeat(60));
        lines.push("                CONFLICT RESOLUTION REPORT".to_string());
        lines.push("=".repeat(60));
        lines.push(format!("Active Conflicts:    {}", self.active_conflicts));
        lines.push(format!("Resolved Conflicts:  {}", self.resolved_conflicts));
        lines.push(format!("Quarantined Devices: {}", self.quarantined_devices));
        lines.push(format!("Resolution Rate:     {:.1}%", self.resolution_rate));
        lines.push("=".repeat(60));

        lines.join("\n")
    }
}
