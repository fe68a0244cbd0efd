//! IP utility functions for validation and inspection

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Check if a string is a valid IPv4 address
pub fn is_valid_ipv4(ip: &str) -> bool {
    ip.parse::<Ipv4Addr>().is_ok()
}

/// Check if an address is private (RFC 1918)
pub fn is_private(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    // 10.0.0.0/8
    octets[0] == 10 ||
    // 172.16.0.0/12
    (octets[0] == 172 && (16..=31).contains(&octets[1])) ||
    // 192.168.0.0/16
    (octets[0] == 192 && octets[1] == 168)
}

/// Classful network class of an address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IpClass {
    A,
    B,
    C,
    /// Multicast
    D,
    /// Reserved (also covers 0.x and 127.x)
    E,
}

impl fmt::Display for IpClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpClass::A => write!(f, "Class A"),
            IpClass::B => write!(f, "Class B"),
            IpClass::C => write!(f, "Class C"),
            IpClass::D => write!(f, "Class D (Multicast)"),
            IpClass::E => write!(f, "Class E (Reserved)"),
        }
    }
}

/// Determine the address class from the first octet
pub fn ip_class(ip: Ipv4Addr) -> IpClass {
    match ip.octets()[0] {
        1..=126 => IpClass::A,
        128..=191 => IpClass::B,
        192..=223 => IpClass::C,
        224..=239 => IpClass::D,
        _ => IpClass::E,
    }
}

/// Statistics over a list of address strings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpListSummary {
    pub total: usize,
    pub valid: usize,
    pub invalid: usize,
    pub private: usize,
    pub public: usize,
    pub invalid_ips: Vec<String>,
}

/// Validate a list of address strings and count private/public ones
pub fn summarize_ip_list(values: &[String]) -> IpListSummary {
    let mut summary = IpListSummary {
        total: values.len(),
        ..Default::default()
    };

    for value in values {
        match value.parse::<Ipv4Addr>() {
            Ok(ip) => {
                summary.valid += 1;
                if is_private(ip) {
                    summary.private += 1;
                } else {
                    summary.public += 1;
                }
            }
            Err(_) => {
                summary.invalid += 1;
                summary.invalid_ips.push(value.clone());
            }
        }
    }

    summary
}

/// Addresses occurring more than once, with their counts, in order of
/// first occurrence
pub fn count_duplicates(ips: &[Ipv4Addr]) -> Vec<(Ipv4Addr, usize)> {
    let mut counts: HashMap<Ipv4Addr, usize> = HashMap::new();
    let mut order = Vec::new();

    for ip in ips {
        let count = counts.entry(*ip).or_insert(0);
        if *count == 0 {
            order.push(*ip);
        }
        *count += 1;
    }

    order
        .into_iter()
        .filter_map(|ip| {
            let count = counts[&ip];
            (count > 1).then_some((ip, count))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[test]
    fn test_is_valid_ipv4() {
        assert!(is_valid_ipv4("192.168.1.1"));
        assert!(!is_valid_ipv4("256.1.1.1"));
        assert!(!is_valid_ipv4("invalid_ip"));
        assert!(!is_valid_ipv4("::1"));
    }

    #[test]
    fn test_is_private() {
        assert!(is_private(ip("10.0.0.1")));
        assert!(is_private(ip("172.16.0.1")));
        assert!(is_private(ip("172.31.255.255")));
        assert!(!is_private(ip("172.32.0.1")));
        assert!(is_private(ip("192.168.1.1")));
        assert!(!is_private(ip("8.8.8.8")));
    }

    #[test]
    fn test_ip_class() {
        assert_eq!(ip_class(ip("10.0.0.1")), IpClass::A);
        assert_eq!(ip_class(ip("172.16.0.1")), IpClass::B);
        assert_eq!(ip_class(ip("192.168.1.1")), IpClass::C);
        assert_eq!(ip_class(ip("224.0.0.5")), IpClass::D);
        assert_eq!(ip_class(ip("250.0.0.1")), IpClass::E);
        assert_eq!(ip_class(ip("127.0.0.1")), IpClass::E);
    }

    #[test]
    fn test_summarize_ip_list() {
        let values: Vec<String> = [
            "192.168.1.1",
            "10.0.0.1",
            "8.8.8.8",
            "256.1.1.1",
            "172.16.0.1",
            "invalid_ip",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let summary = summarize_ip_list(&values);
        assert_eq!(summary.total, 6);
        assert_eq!(summary.valid, 4);
        assert_eq!(summary.invalid, 2);
        assert_eq!(summary.private, 3);
        assert_eq!(summary.public, 1);
        assert_eq!(summary.invalid_ips, vec!["256.1.1.1", "invalid_ip"]);
    }

    #[test]
    fn test_count_duplicates() {
        let ips = vec![
            ip("192.168.1.10"),
            ip("192.168.1.20"),
            ip("192.168.1.10"),
            ip("192.168.1.30"),
            ip("192.168.1.20"),
            ip("192.168.1.10"),
        ];
        assert_eq!(
            count_duplicates(&ips),
            vec![(ip("192.168.1.10"), 3), (ip("192.168.1.20"), 2)]
        );
        assert!(count_duplicates(&[ip("10.0.0.1")]).is_empty());
    }
}
