//! IP conflict detection and automatic remediation.
//!
//! Two kinds of conflict are handled: duplicate addresses among active
//! devices and addresses outside the authorized blocks. Both are remediated
//! by moving the offending device into the quarantine block.

pub mod engine;
pub mod report;
pub mod scan;

pub use engine::{ConflictEngine, ScanCancel, ScanSummary};
pub use report::ConflictReport;
pub use scan::{is_authorized, scan_duplicates, scan_unauthorized, DuplicatePair};
