//! URL validation for SSRF protection.

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};

use tracing::debug;
use url::{Host, Url};

use crate::error::{SecurityError, SecurityResult};

const DEFAULT_BLOCKED_CIDRS: &[&str] = &[
    "0.0.0.0/8",      // "This" network
    "10.0.0.0/8",     // Private
    "100.64.0.0/10",  // Carrier-grade NAT
    "127.0.0.0/8",    // Loopback
    "169.254.0.0/16", // Link-local / cloud metadata
    "172.16.0.0/12",  // Private
    "192.168.0.0/16", // Private
    "::/128",         // Unspecified
    "::1/128",        // IPv6 loopback
    "fc00::/7",       // IPv6 unique local
    "fe80::/10",      // IPv6 link-local
];

/// URL validator for SSRF protection.
///
/// Validates URLs before fetching to prevent:
/// - Access to internal services (localhost, 127.0.0.1)
/// - Access to private IP ranges (10.x, 172.16.x, 192.168.x)
/// - Access to cloud metadata services (169.254.x)
/// - Non-HTTP(S) schemes (file://, ftp://)
#[derive(Debug, Clone)]
pub struct UrlValidator {
    /// Allowed URL schemes
    allowed_schemes: HashSet<String>,

    /// Blocked hostnames
    blocked_hosts: HashSet<String>,

    /// Blocked CIDR ranges
    blocked_cidrs: Vec<ipnet::IpNet>,

    /// Additional allowed hosts (bypass normal validation)
    allowed_hosts: HashSet<String>,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlValidator {
    /// Create a new URL validator with default security rules.
    pub fn new() -> Self {
        Self {
            allowed_schemes: ["http", "https"].into_iter().map(String::from).collect(),
            blocked_hosts: [
                "localhost",
                "localhost.localdomain",
                "metadata.google.internal",
                "metadata.gke.internal",
                "instance-data",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            blocked_cidrs: DEFAULT_BLOCKED_CIDRS
                .iter()
                .filter_map(|cidr| cidr.parse().ok())
                .collect(),
            allowed_hosts: HashSet::new(),
        }
    }

    /// Add an allowed host (bypasses validation).
    pub fn allow_host(mut self, host: impl Into<String>) -> Self {
        self.allowed_hosts.insert(host.into().to_ascii_lowercase());
        self
    }

    /// Block an additional host.
    pub fn block_host(mut self, host: impl Into<String>) -> Self {
        self.blocked_hosts.insert(host.into().to_ascii_lowercase());
        self
    }

    /// Block an additional CIDR range.
    pub fn block_cidr(mut self, cidr: ipnet::IpNet) -> Self {
        self.blocked_cidrs.push(cidr);
        self
    }

    /// Reject an address inside one of the blocked ranges.
    pub fn check_ip(&self, ip: IpAddr) -> SecurityResult<()> {
        // IPv4-mapped IPv6 (::ffff:10.0.0.1) is checked as IPv4
        let ip = match ip {
            IpAddr::V6(v6) => v6.to_ipv4_mapped().map(IpAddr::V4).unwrap_or(ip),
            v4 => v4,
        };

        if self.blocked_cidrs.iter().any(|cidr| cidr.contains(&ip)) {
            return Err(SecurityError::BlockedCidr(ip.to_string()));
        }
        Ok(())
    }

    fn is_allowed_host(&self, parsed: &Url) -> bool {
        parsed.host_str().is_some_and(|h| self.is_allowed_name(h))
    }

    /// Whether `host` was explicitly allowed with [`allow_host`](Self::allow_host).
    pub fn is_allowed_name(&self, host: &str) -> bool {
        self.allowed_hosts.contains(&host.to_ascii_lowercase())
    }

    /// Screen the addresses `host` resolved to.
    ///
    /// Any blocked address rejects the whole answer, so a rebinding
    /// response that mixes public and private records is refused.
    pub fn check_resolved(
        &self,
        host: &str,
        addrs: Vec<SocketAddr>,
    ) -> SecurityResult<Vec<SocketAddr>> {
        if self.is_allowed_name(host) {
            return Ok(addrs);
        }
        if addrs.is_empty() {
            return Err(SecurityError::DnsResolution(format!(
                "no addresses for {}",
                host
            )));
        }
        for addr in &addrs {
            self.check_ip(addr.ip()).map_err(|_| {
                SecurityError::BlockedCidr(format!(
                    "DNS for {} resolved to blocked IP {}",
                    host,
                    addr.ip()
                ))
            })?;
        }
        Ok(addrs)
    }

    /// Validate a URL for safety without touching the network.
    pub fn validate(&self, url: &str) -> SecurityResult<Url> {
        let parsed = Url::parse(url)?;
        self.validate_url(&parsed)?;
        Ok(parsed)
    }

    /// Validate an already-parsed URL (e.g. the final URL after redirects).
    pub fn validate_url(&self, parsed: &Url) -> SecurityResult<()> {
        if !self.allowed_schemes.contains(parsed.scheme()) {
            return Err(SecurityError::DisallowedScheme(parsed.scheme().to_string()));
        }

        if self.is_allowed_host(parsed) {
            return Ok(());
        }

        match parsed.host().ok_or(SecurityError::NoHost)? {
            Host::Domain(domain) => {
                let domain = domain.trim_end_matches('.').to_ascii_lowercase();
                if self.blocked_hosts.contains(&domain) || domain.ends_with(".localhost") {
                    return Err(SecurityError::BlockedHost(domain));
                }
                Ok(())
            }
            Host::Ipv4(v4) => self.check_ip(IpAddr::V4(v4)),
            Host::Ipv6(v6) => self.check_ip(IpAddr::V6(v6)),
        }
    }

    /// Validate a URL and resolve DNS to check the actual IP.
    ///
    /// This catches hostnames that resolve to internal addresses.
    pub async fn validate_with_dns(&self, url: &str) -> SecurityResult<Url> {
        let parsed = self.validate(url)?;

        if self.is_allowed_host(&parsed) {
            return Ok(parsed);
        }

        let host = match parsed.host() {
            Some(Host::Domain(domain)) => domain.to_string(),
            // IP literals were already checked in validate
            _ => return Ok(parsed),
        };

        let port = parsed.port_or_known_default().unwrap_or(80);

        let addrs = tokio::net::lookup_host((host.as_str(), port))
            .await
            .map_err(|e| SecurityError::DnsResolution(e.to_string()))?
            .collect();
        let resolved = self.check_resolved(&host, addrs)?.len();

        debug!(host = %host, addresses = resolved, "DNS validation passed");
        Ok(parsed)
    }
}
