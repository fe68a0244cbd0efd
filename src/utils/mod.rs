//! Shared utilities: address validation and inspection helpers.

pub mod ip_utils;

pub use ip_utils::{
    count_duplicates, ip_class, is_private, is_valid_ipv4, summarize_ip_list, IpClass,
    IpListSummary,
};
