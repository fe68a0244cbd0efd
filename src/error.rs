//! Error taxonomy for allocation, registry access and remediation.
//!
//! Detection never fails; everything that can go wrong is reported through
//! one of the enums below so a scheduled caller always gets a structured
//! failure back instead of a crash.

use crate::ip::allocator::SubnetAllocation;
use crate::ip::cidr::CidrBlock;
use crate::ip::registry::{ConflictId, DeviceId};

/// Errors produced while parsing CIDR text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CidrParseError {
    #[error("Invalid IPv4 address in '{0}'")]
    Address(String),

    #[error("Invalid prefix length in '{0}' (expected 0-32)")]
    Prefix(String),
}

/// Errors returned by the address-space allocator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AllocationError {
    /// Malformed input: non-positive host count, unsatisfiable requirement,
    /// or a division that cannot be expressed as valid subnets.
    #[error("Invalid allocation request: {0}")]
    InvalidRequest(String),

    /// The parent block ran out of room. `allocated` holds the prefix of the
    /// plan that did fit, `unplaced` the host counts that did not.
    #[error(
        "Address space {parent} exhausted: {} subnets allocated, {} requirements unplaced",
        .allocated.len(),
        .unplaced.len()
    )]
    AddressSpaceExhausted {
        parent: CidrBlock,
        allocated: Vec<SubnetAllocation>,
        unplaced: Vec<u32>,
    },
}

/// Errors raised by a device registry implementation
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Device {0} not found")]
    DeviceNotFound(DeviceId),

    #[error("Conflict {0} not found")]
    ConflictNotFound(ConflictId),

    #[error("Conflict {0} is already resolved")]
    ConflictClosed(ConflictId),

    #[error("Invalid device record: {0}")]
    InvalidDevice(String),

    #[error("Registry unavailable: {0}")]
    Unavailable(String),

    #[error("Registry I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Registry serialization error: {0}")]
    Serialization(String),
}

/// Errors raised while remediating a conflict
#[derive(Debug, thiserror::Error)]
pub enum RemediationError {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("No free quarantine address left in {0}")]
    QuarantineExhausted(CidrBlock),

    #[error("Quarantine block {0} is too small to hold offsets 10-100 (need /25 or larger)")]
    QuarantineTooSmall(CidrBlock),

    #[error("Conflict {0} cannot be resolved without a resolution method")]
    EmptyResolutionMethod(ConflictId),
}
