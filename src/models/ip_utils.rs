// src/models/ip_utils.rs

use std::net::IpAddr;

/// Normalize an IP string taken from a request path.
///
/// Valid IPv4/IPv6 addresses are rewritten to their canonical textual form so
/// that `2001:DB8::1` and `2001:db8:0::1` share a cache entry. Anything else is
/// only trimmed and passed through; upstream providers report their own errors
/// for values they cannot look up.
pub fn normalize_ip(value: &str) -> String {
    let trimmed = value.trim();

    match trimmed.parse::<IpAddr>() {
        Ok(ip) => ip.to_string(),
        Err(_) => trimmed.to_string(),
    }
}

/// Whether the value is an IPv4 or IPv6 address
pub fn is_ip(value: &str) -> bool {
    value.trim().parse::<IpAddr>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_ipv4() {
        assert_eq!(normalize_ip(" 8.8.8.8 "), "8.8.8.8");
    }

    #[test]
    fn test_normalize_ipv6() {
        assert_eq!(normalize_ip("2001:DB8:0:0::1"), "2001:db8::1");
    }

    #[test]
    fn test_normalize_passthrough() {
        assert_eq!(normalize_ip("not-an-ip"), "not-an-ip");
        assert!(!is_ip("not-an-ip"));
        assert!(is_ip("::1"));
    }
}
