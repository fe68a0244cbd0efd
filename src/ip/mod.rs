//! IPv4 address-space management.
//!
//! This module holds the CIDR block type, the VLSM allocator, the device
//! and conflict registry interface, and the quarantine address pool.

pub mod allocator;
pub mod cidr;
pub mod quarantine;
pub mod registry;

// Re-export commonly used types
pub use allocator::{
    allocate, divide_equal, AddressSpaceAllocator, AllocationOrder, AllocationPlan,
    SubnetAllocation,
};
pub use cidr::CidrBlock;
pub use quarantine::QuarantinePool;
pub use registry::{
    ConflictId, ConflictKind, ConflictRecord, DeviceId, DeviceRecord, DeviceRegistry, DeviceStatus,
    DeviceUpdate, InMemoryRegistry, NewDevice,
};
