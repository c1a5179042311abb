//! Client address and transport resolution.
//!
//! The IP recorded in request logs doubles as the rate limiting key for
//! anonymous callers, so forwarded headers are only believed when they come
//! from a trusted proxy.
//!
//! # Header Priority
//!
//! 1. `X-Forwarded-For` (first address in the list)
//! 2. `X-Real-IP`
//! 3. The TCP peer address
//!
//! With `TRUSTED_PROXIES` unset every peer is trusted. That is the right
//! setting only behind a reverse proxy that overwrites these headers.

use std::net::IpAddr;

use axum::http::HeaderMap;
use tracing::{debug, warn};

// =============================================================================
// Trusted Proxy CIDR Matching
// =============================================================================

/// Parsed CIDR network range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CidrRange {
    network: IpAddr,
    prefix_len: u8,
}

impl CidrRange {
    /// Parse `10.0.0.0/8`, `::1/128` or a bare address.
    pub fn parse(cidr: &str) -> Option<Self> {
        let (addr, prefix) = match cidr.trim().split_once('/') {
            Some((addr, prefix)) => (addr, Some(prefix)),
            None => (cidr.trim(), None),
        };

        let network: IpAddr = addr.parse().ok()?;
        let max_prefix = match network {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        let prefix_len = match prefix {
            Some(p) => p.parse().ok().filter(|len| *len <= max_prefix)?,
            None => max_prefix,
        };

        Some(Self {
            network,
            prefix_len,
        })
    }

    pub fn contains(&self, ip: &IpAddr) -> bool {
        match (&self.network, ip) {
            (IpAddr::V4(net), IpAddr::V4(addr)) => {
                let mask = u32::MAX.checked_shl(32 - u32::from(self.prefix_len)).unwrap_or(0);
                (u32::from(*net) & mask) == (u32::from(*addr) & mask)
            }
            (IpAddr::V6(net), IpAddr::V6(addr)) => {
                let mask = u128::MAX.checked_shl(128 - u32::from(self.prefix_len)).unwrap_or(0);
                (u128::from(*net) & mask) == (u128::from(*addr) & mask)
            }
            _ => false,
        }
    }
}

/// Proxies whose forwarding headers are believed.
#[derive(Debug, Clone, Default)]
pub struct TrustedProxyConfig {
    ranges: Vec<CidrRange>,
}

impl TrustedProxyConfig {
    /// Invalid CIDR strings are logged and skipped.
    pub fn new(cidrs: &[String]) -> Self {
        let ranges: Vec<CidrRange> = cidrs
            .iter()
            .filter_map(|cidr| {
                let parsed = CidrRange::parse(cidr);
                if parsed.is_none() {
                    warn!(cidr = %cidr, "Invalid CIDR range in TRUSTED_PROXIES, skipping");
                }
                parsed
            })
            .collect();

        if !ranges.is_empty() {
            debug!(count = ranges.len(), "Trusted proxy validation enabled");
        }

        Self { ranges }
    }

    pub fn is_enabled(&self) -> bool {
        !self.ranges.is_empty()
    }

    /// True when `peer` may set forwarding headers. Without configured
    /// ranges every peer is trusted.
    pub fn is_trusted(&self, peer: Option<IpAddr>) -> bool {
        if self.ranges.is_empty() {
            return true;
        }
        peer.is_some_and(|ip| self.ranges.iter().any(|range| range.contains(&ip)))
    }
}

// =============================================================================
// Resolution
// =============================================================================

fn forwarded_ip(headers: &HeaderMap) -> Option<&str> {
    if let Some(forwarded) = headers.get("x-forwarded-for")
        && let Ok(value) = forwarded.to_str()
        && let Some(first) = value.split(',').next().map(str::trim)
        && !first.is_empty()
    {
        return Some(first);
    }

    headers
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Resolve the client address for a request.
pub fn resolve_client_ip(
    headers: &HeaderMap,
    peer: Option<IpAddr>,
    trusted: &TrustedProxyConfig,
) -> Option<String> {
    if trusted.is_trusted(peer)
        && let Some(ip) = forwarded_ip(headers)
    {
        return Some(ip.to_string());
    }

    if trusted.is_enabled() && forwarded_ip(headers).is_some() {
        debug!(peer = ?peer, "Ignoring forwarding headers from untrusted peer");
    }

    peer.map(|ip| ip.to_string())
}

/// Whether the client reached us over HTTPS.
pub fn is_secure(
    headers: &HeaderMap,
    uri_scheme: Option<&str>,
    peer: Option<IpAddr>,
    trusted: &TrustedProxyConfig,
) -> bool {
    if trusted.is_trusted(peer)
        && let Some(proto) = headers.get("x-forwarded-proto").and_then(|v| v.to_str().ok())
    {
        return proto.trim().eq_ignore_ascii_case("https");
    }
    uri_scheme.is_some_and(|s| s.eq_ignore_ascii_case("https"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    fn peer(ip: &str) -> Option<IpAddr> {
        Some(ip.parse().unwrap())
    }

    #[test]
    fn test_cidr_parse() {
        assert!(CidrRange::parse("10.0.0.0/8").is_some());
        assert!(CidrRange::parse("::1/128").is_some());
        assert!(CidrRange::parse("192.168.1.1").is_some());
        assert!(CidrRange::parse("not-an-ip").is_none());
        assert!(CidrRange::parse("10.0.0.0/33").is_none());
    }

    #[test]
    fn test_cidr_contains() {
        let cidr = CidrRange::parse("192.168.1.0/24").unwrap();
        assert!(cidr.contains(&"192.168.1.77".parse().unwrap()));
        assert!(!cidr.contains(&"192.168.2.1".parse().unwrap()));
        assert!(!cidr.contains(&"::1".parse().unwrap()));

        let all = CidrRange::parse("0.0.0.0/0").unwrap();
        assert!(all.contains(&"8.8.8.8".parse().unwrap()));
    }

    #[test]
    fn test_xff_first_address_wins() {
        let h = headers(&[("x-forwarded-for", " 203.0.113.50 , 10.0.0.1"), ("x-real-ip", "1.1.1.1")]);
        let ip = resolve_client_ip(&h, peer("127.0.0.1"), &TrustedProxyConfig::default());
        assert_eq!(ip.as_deref(), Some("203.0.113.50"));
    }

    #[test]
    fn test_real_ip_fallback() {
        let h = headers(&[("x-real-ip", "192.168.1.1")]);
        let ip = resolve_client_ip(&h, None, &TrustedProxyConfig::default());
        assert_eq!(ip.as_deref(), Some("192.168.1.1"));
    }

    #[test]
    fn test_peer_fallback_and_absent() {
        let ip = resolve_client_ip(&HeaderMap::new(), peer("10.1.2.3"), &TrustedProxyConfig::default());
        assert_eq!(ip.as_deref(), Some("10.1.2.3"));
        assert!(resolve_client_ip(&HeaderMap::new(), None, &TrustedProxyConfig::default()).is_none());
    }

    #[test]
    fn test_untrusted_peer_cannot_spoof() {
        let trusted = TrustedProxyConfig::new(&["10.0.0.0/8".to_string()]);
        let h = headers(&[("x-forwarded-for", "1.2.3.4")]);

        let spoofed = resolve_client_ip(&h, peer("203.0.113.9"), &trusted);
        assert_eq!(spoofed.as_deref(), Some("203.0.113.9"));

        let proxied = resolve_client_ip(&h, peer("10.0.0.5"), &trusted);
        assert_eq!(proxied.as_deref(), Some("1.2.3.4"));
    }

    #[test]
    fn test_invalid_cidrs_are_skipped() {
        let trusted = TrustedProxyConfig::new(&["bogus".to_string()]);
        assert!(!trusted.is_enabled());
    }

    #[test]
    fn test_is_secure() {
        let trusted = TrustedProxyConfig::default();
        let h = headers(&[("x-forwarded-proto", "HTTPS")]);
        assert!(is_secure(&h, None, None, &trusted));
        assert!(!is_secure(&HeaderMap::new(), Some("http"), None, &trusted));
        assert!(is_secure(&HeaderMap::new(), Some("https"), None, &trusted));
    }
}
