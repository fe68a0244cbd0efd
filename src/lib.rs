//! # IPGuard - IPv4 address-space planning and conflict remediation
//!
//! This library carves IPv4 parent blocks into variable-length subnets and
//! keeps a device registry free of duplicate and unauthorized addresses.
//!
//! ## Overview
//!
//! Two engines make up the core:
//!
//! - **Allocation**: given a parent CIDR block and a list of host
//!   requirements, produce aligned, non-overlapping power-of-two subnets
//!   (VLSM), largest first by default.
//! - **Conflict remediation**: scan the active devices of a registry for
//!   duplicate or unauthorized addresses, record each conflict, and move
//!   the offending device into a quarantine block.
//!
//! ## Architecture
//!
//! - `ip`: CIDR blocks, the allocator, the registry interface and the
//!   quarantine pool
//! - `conflict`: detection scans, the remediation engine and reports
//! - `alert`: utilization thresholds and alert delivery
//! - `config` / `config_loader`: YAML configuration and validation
//! - `error`: error types shared across modules
//! - `utils`: address inspection helpers
//!
//! ## Example Usage
//!
//! ```rust
//! use ipguard::ip::{allocate, CidrBlock};
//!
//! let parent: CidrBlock = "192.168.1.0/24".parse()?;
//! let plan = allocate(parent, &[50, 100])?;
//!
//! assert_eq!(plan.subnets[0].block.to_string(), "192.168.1.0/25");
//! assert_eq!(plan.subnets[1].block.to_string(), "192.168.1.128/26");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Configuration Format
//!
//! ```yaml
//! quarantine_block: 192.168.255.0/24
//! authorized_blocks:
//!   - 192.168.1.0/24
//!   - 10.0.0.0/16
//! allocation_order: largest_first   # or as_requested
//! thresholds:
//!   warning: 80
//!   critical: 90
//! scan_interval: 15m
//! ```
//!
//! ## Error Handling
//!
//! Library operations return typed errors from [`error`]; the binary wraps
//! them with `color_eyre` for reporting.

pub mod alert;
pub mod config;
pub mod config_loader;
pub mod conflict;
pub mod error;
pub mod ip;
pub mod utils;
