//! Client identity resolution.
//!
//! Precedence: first `X-Forwarded-For` entry, then `X-Real-IP`, then the
//! connection's peer address. Header values that are not IP literals are
//! skipped. The forwarded headers are only trustworthy behind a reverse
//! proxy that overwrites them; exposing the service directly lets clients
//! pick their own rate-limit key.

use std::net::IpAddr;

use axum::http::HeaderMap;

pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_REAL_IP: &str = "x-real-ip";

/// Resolve a stable caller identity. Pure; never fails.
pub fn identify(headers: &HeaderMap, remote_addr: &str) -> String {
    if let Some(ip) = forwarded_for(headers) {
        return ip.to_string();
    }

    if let Some(ip) = header_ip(headers, X_REAL_IP) {
        return ip.to_string();
    }

    peer_host(remote_addr).to_string()
}

fn forwarded_for(headers: &HeaderMap) -> Option<IpAddr> {
    let value = headers.get(X_FORWARDED_FOR)?.to_str().ok()?;
    let first = value.split(',').next()?.trim();
    first.parse().ok()
}

fn header_ip(headers: &HeaderMap, name: &str) -> Option<IpAddr> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Host portion of a peer address: `1.2.3.4:80` → `1.2.3.4`,
/// `[::1]:8080` → `::1`. Values without a port are returned as-is
/// (minus IPv6 brackets).
pub fn peer_host(remote_addr: &str) -> &str {
    let addr = remote_addr.trim();

    if let Some(rest) = addr.strip_prefix('[') {
        return match rest.find(']') {
            Some(end) => &rest[..end],
            None => rest,
        };
    }

    // A bare IPv6 literal has several colons and no port.
    if addr.parse::<IpAddr>().is_ok() {
        return addr;
    }

    match addr.rsplit_once(':') {
        Some((host, _port)) => host,
        None => addr,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(*name, HeaderValue::from_static(value));
        }
        map
    }

    #[test]
    fn test_first_forwarded_address_wins() {
        let h = headers(&[
            (X_FORWARDED_FOR, "203.0.113.1, 70.0.0.1"),
            (X_REAL_IP, "198.51.100.7"),
        ]);
        assert_eq!(identify(&h, "10.0.0.1:5555"), "203.0.113.1");
    }

    #[test]
    fn test_forwarded_entry_is_trimmed() {
        let h = headers(&[(X_FORWARDED_FOR, "  2001:db8::1 ,10.0.0.2")]);
        assert_eq!(identify(&h, "10.0.0.1:5555"), "2001:db8::1");
    }

    #[test]
    fn test_malformed_forwarded_falls_back_to_real_ip() {
        let h = headers(&[(X_FORWARDED_FOR, "not-an-ip"), (X_REAL_IP, "198.51.100.7")]);
        assert_eq!(identify(&h, "10.0.0.1:5555"), "198.51.100.7");
    }

    #[test]
    fn test_malformed_headers_fall_back_to_peer() {
        let h = headers(&[(X_FORWARDED_FOR, "not-an-ip"), (X_REAL_IP, "also bad")]);
        assert_eq!(identify(&h, "10.0.0.1:5555"), "10.0.0.1");
        assert_eq!(identify(&h, "[2001:db8::5]:443"), "2001:db8::5");
    }

    #[test]
    fn test_peer_host_forms() {
        assert_eq!(peer_host("192.0.2.1:8080"), "192.0.2.1");
        assert_eq!(peer_host("[::1]:8080"), "::1");
        assert_eq!(peer_host("::1"), "::1");
        assert_eq!(peer_host("192.0.2.1"), "192.0.2.1");
        assert_eq!(peer_host("unknown"), "unknown");
    }
}
