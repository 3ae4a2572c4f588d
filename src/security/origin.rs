//! Host/Origin cross-check against DNS rebinding.
//!
//! A browser tricked into resolving an attacker's domain to a local address
//! sends a request whose `Host` is private but whose `Origin` is external.
//! Those requests are rejected; everything else passes.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use tracing::{debug, warn};
use url::{Host, Url};

/// Origin policy with an optional allow-list of external origins that may
/// talk to a locally bound server.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    allowed_external: Vec<String>,
}

impl OriginPolicy {
    /// Create a policy with the given allow-listed external origins
    #[must_use]
    pub fn new(allowed_external: Vec<String>) -> Self {
        let allowed_external = allowed_external
            .into_iter()
            .map(|o| o.trim_end_matches('/').to_ascii_lowercase())
            .collect();
        Self { allowed_external }
    }

    /// Decide whether a request with these `Host` and `Origin` headers may proceed.
    #[must_use]
    pub fn allows(&self, host: Option<&str>, origin: Option<&str>) -> bool {
        let Some(host) = host.filter(|h| !h.trim().is_empty()) else {
            warn!("Rejected request without Host header");
            return false;
        };

        let Some(origin) = origin else {
            return true;
        };

        if self.is_potential_rebinding(host, origin) {
            warn!(host = %host, origin = %origin, "Rejected potential DNS rebinding request");
            return false;
        }

        if is_same_origin(host, origin) {
            debug!(origin = %origin, "Same-origin request");
        } else if is_local_origin(origin) {
            debug!(origin = %origin, "Local development origin");
        } else {
            debug!(origin = %origin, "External origin against public host");
        }
        true
    }

    fn is_potential_rebinding(&self, host: &str, origin: &str) -> bool {
        is_local_host(host) && !is_local_origin(origin) && !self.is_allowed_external(origin)
    }

    fn is_allowed_external(&self, origin: &str) -> bool {
        let origin = origin.trim_end_matches('/').to_ascii_lowercase();
        self.allowed_external.iter().any(|o| *o == origin)
    }
}

/// Default-policy check with an empty external allow-list.
#[must_use]
pub fn is_request_allowed(host: Option<&str>, origin: Option<&str>) -> bool {
    OriginPolicy::default().allows(host, origin)
}

/// Classify a `Host` header value (`name[:port]`, `[v6]:port`).
#[must_use]
pub fn is_local_host(host: &str) -> bool {
    let hostname = strip_port(host.trim()).to_ascii_lowercase();
    is_local_hostname(&hostname)
}

/// Classify an `Origin` header value. `file://` origins count as local.
#[must_use]
pub fn is_local_origin(origin: &str) -> bool {
    let Ok(url) = Url::parse(origin.trim()) else {
        return false;
    };
    if url.scheme() == "file" {
        return true;
    }
    match url.host() {
        Some(Host::Domain(name)) => is_local_hostname(&name.to_ascii_lowercase()),
        Some(Host::Ipv4(v4)) => is_private_ipv4(v4),
        Some(Host::Ipv6(v6)) => is_private_ipv6(v6),
        None => false,
    }
}

fn is_same_origin(host: &str, origin: &str) -> bool {
    let Ok(url) = Url::parse(origin.trim()) else {
        return false;
    };
    let Some(origin_host) = url.host_str() else {
        return false;
    };
    let origin_authority = match url.port() {
        Some(port) => format!("{origin_host}:{port}"),
        None => origin_host.to_string(),
    };
    origin_authority.eq_ignore_ascii_case(host.trim())
}

/// Drop a trailing `:port`, handling bracketed IPv6 literals.
fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        return rest.split_once(']').map_or(rest, |(addr, _)| addr);
    }
    // A bare IPv6 literal has more than one colon and no port
    if host.matches(':').count() > 1 {
        return host;
    }
    host.split_once(':').map_or(host, |(name, _)| name)
}

fn is_local_hostname(hostname: &str) -> bool {
    if hostname == "localhost" || hostname.ends_with(".localhost") {
        return true;
    }
    match hostname.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => is_private_ipv4(v4),
        Ok(IpAddr::V6(v6)) => is_private_ipv6(v6),
        Err(_) => false,
    }
}

/// Loopback, RFC1918 or link-local.
fn is_private_ipv4(addr: Ipv4Addr) -> bool {
    addr.is_loopback()          // 127.0.0.0/8
    || addr.is_private()        // 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16
    || addr.is_link_local() // 169.254.0.0/16
}

/// Loopback, unique-local, link-local, or IPv4-mapped private.
fn is_private_ipv6(addr: Ipv6Addr) -> bool {
    if addr.is_loopback() {
        return true;
    }

    let segments = addr.segments();

    // Link-local (fe80::/10)
    if segments[0] & 0xFFC0 == 0xFE80 {
        return true;
    }

    // Unique Local Address (fc00::/7)
    if segments[0] & 0xFE00 == 0xFC00 {
        return true;
    }

    addr.to_ipv4_mapped().is_some_and(is_private_ipv4)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOCAL_HOSTS: &[&str] = &[
        "localhost",
        "localhost:3000",
        "127.0.0.1:3000",
        "[::1]:3000",
        "10.1.2.3",
        "172.16.0.1",
        "172.31.255.255:8080",
        "192.168.1.10:80",
        "169.254.10.10",
        "app.localhost:3000",
    ];

    const LOCAL_ORIGINS: &[&str] = &[
        "http://localhost:5173",
        "http://127.0.0.1:3000",
        "http://[::1]:3000",
        "http://192.168.0.5",
        "https://10.0.0.8:8443",
        "http://172.20.1.1",
        "file://",
    ];

    const EXTERNAL_ORIGINS: &[&str] = &[
        "https://evil.example.com",
        "http://attacker.test:3000",
        "https://172.200.1.1",
        "https://8.8.8.8",
        "null",
    ];

    // ── rule 1: host required ─────────────────────────────────────────

    #[test]
    fn missing_host_is_rejected() {
        assert!(!is_request_allowed(None, None));
        assert!(!is_request_allowed(None, Some("http://localhost")));
        assert!(!is_request_allowed(Some(""), None));
    }

    // ── rule 2: rebinding ─────────────────────────────────────────────

    #[test]
    fn private_host_with_external_origin_is_rejected() {
        for host in LOCAL_HOSTS {
            for origin in EXTERNAL_ORIGINS {
                assert!(
                    !is_request_allowed(Some(host), Some(origin)),
                    "{host} / {origin} should be rejected"
                );
            }
        }
    }

    #[test]
    fn private_host_with_private_origin_is_allowed() {
        for host in LOCAL_HOSTS {
            for origin in LOCAL_ORIGINS {
                assert!(
                    is_request_allowed(Some(host), Some(origin)),
                    "{host} / {origin} should be allowed"
                );
            }
        }
    }

    #[test]
    fn allow_listed_external_origin_passes_rebinding_check() {
        let policy = OriginPolicy::new(vec!["https://app.tokenmetrics.com/".into()]);
        assert!(policy.allows(Some("localhost:3000"), Some("https://app.tokenmetrics.com")));
        assert!(!policy.allows(Some("localhost:3000"), Some("https://evil.example.com")));
    }

    // ── rules 3-6 ─────────────────────────────────────────────────────

    #[test]
    fn origin_absent_is_allowed() {
        assert!(is_request_allowed(Some("localhost:3000"), None));
        assert!(is_request_allowed(Some("mcp.example.com"), None));
    }

    #[test]
    fn same_origin_is_allowed() {
        assert!(is_request_allowed(
            Some("mcp.example.com:8443"),
            Some("https://mcp.example.com:8443")
        ));
        assert!(is_same_origin("mcp.example.com", "https://mcp.example.com"));
        assert!(!is_same_origin("mcp.example.com", "https://other.example.com"));
    }

    #[test]
    fn public_host_accepts_any_origin() {
        assert!(is_request_allowed(
            Some("mcp.example.com"),
            Some("https://somewhere-else.example.org")
        ));
    }

    // ── classification ────────────────────────────────────────────────

    #[test]
    fn second_octet_boundaries_are_numeric() {
        assert!(!is_local_host("172.15.0.1"));
        assert!(is_local_host("172.16.0.1"));
        assert!(is_local_host("172.31.255.255"));
        assert!(!is_local_host("172.32.0.1"));
        assert!(!is_local_host("172.200.0.1"));
        assert!(!is_local_origin("http://172.250.1.1"));
    }

    #[test]
    fn hostnames_are_not_substring_matched() {
        assert!(!is_local_host("10.example.com"));
        assert!(!is_local_host("notlocalhost"));
        assert!(!is_local_origin("https://localhost.evil.com"));
        assert!(!is_local_origin("https://evil.com/?u=127.0.0.1"));
    }

    #[test]
    fn ipv6_classification() {
        assert!(is_local_host("[::1]"));
        assert!(is_local_host("[fe80::1]:3000"));
        assert!(is_local_host("[fd00::1]"));
        assert!(is_local_host("[::ffff:192.168.1.1]:80"));
        assert!(!is_local_host("[::ffff:8.8.8.8]"));
        assert!(!is_local_host("[2001:4860:4860::8888]"));
        assert!(is_local_host("::1"));
    }

    #[test]
    fn ports_are_stripped() {
        assert_eq!(strip_port("localhost:3000"), "localhost");
        assert_eq!(strip_port("[::1]:3000"), "::1");
        assert_eq!(strip_port("::1"), "::1");
        assert_eq!(strip_port("example.com"), "example.com");
    }
}
