//! Single host/IP match rules.
//!
//! A [`MatchRule`] is parsed and normalized once. Matching afterwards is a
//! plain string or prefix comparison and never fails:
//!
//! | pattern           | rule                                   |
//! |-------------------|----------------------------------------|
//! | `api.example.com` | [`MatchRule::ExactHost`]               |
//! | `*.example.com`   | [`MatchRule::WildcardDomain`]          |
//! | `10.0.0.0/8`      | [`MatchRule::Cidr`]                    |
//! | `10.1.2.3`        | [`MatchRule::Cidr`] with a `/32` prefix |
//! | `loopback`        | [`MatchRule::Special`]                 |
//! | `private`         | [`MatchRule::Special`]                 |
//! | `external`        | [`MatchRule::Special`]                 |
//! | `*`               | [`MatchRule::Special`] (`All`)         |
//!
//! ## Wildcards
//!
//! `*.example.com` matches strict subdomains only: `a.example.com` and
//! `a.b.example.com`, but not `example.com` itself. List the apex as a
//! separate exact rule when it should match too.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use ipnet::IpNet;

use crate::builtin;
use crate::error::Error;

/// Named address classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpecialClass {
    /// 127.0.0.0/8, ::1 and the unspecified addresses.
    Loopback,
    /// RFC 1918 and IPv6 unique local (fc00::/7) ranges.
    Private,
    /// Everything that is not loopback, private, link-local, CGNAT,
    /// multicast or broadcast.
    External,
    /// Every host and every address.
    All,
}

impl SpecialClass {
    fn matches_ip(self, ip: IpAddr) -> bool {
        match self {
            Self::Loopback => builtin::is_loopback(ip),
            Self::Private => builtin::is_private(ip),
            Self::External => builtin::is_external(ip),
            Self::All => true,
        }
    }

    /// The pattern text for this class.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Loopback => "loopback",
            Self::Private => "private",
            Self::External => "external",
            Self::All => "*",
        }
    }
}

impl fmt::Display for SpecialClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single normalized pattern.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MatchRule {
    /// Case-insensitive host equality. Stored lower-cased.
    ExactHost(String),
    /// Strict subdomains of the stored domain.
    WildcardDomain(String),
    /// Resolved IP containment.
    Cidr(IpNet),
    /// A built-in address class.
    Special(SpecialClass),
}

impl MatchRule {
    /// Parse a pattern.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRule`] for empty patterns, malformed CIDRs
    /// and hostnames with characters outside `[a-z0-9._-]` or misplaced `*`.
    pub fn parse(pattern: &str) -> Result<Self, Error> {
        Self::parse_with_hint("", pattern)
    }

    pub(crate) fn parse_with_hint(setting_key_hint: &str, pattern: &str) -> Result<Self, Error> {
        let invalid = |reason: &str| Error::invalid_rule(setting_key_hint, pattern, reason);

        let normalized = pattern.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(invalid("empty pattern"));
        }

        match normalized.as_str() {
            "loopback" => return Ok(Self::Special(SpecialClass::Loopback)),
            "private" => return Ok(Self::Special(SpecialClass::Private)),
            "external" => return Ok(Self::Special(SpecialClass::External)),
            "*" => return Ok(Self::Special(SpecialClass::All)),
            _ => {}
        }

        if normalized.contains('/') {
            let net: IpNet = normalized
                .parse()
                .map_err(|e: ipnet::AddrParseError| invalid(&format!("bad CIDR: {e}")))?;
            return Ok(Self::Cidr(net.trunc()));
        }

        let bare = normalized
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .unwrap_or(&normalized);
        if let Ok(ip) = bare.parse::<IpAddr>() {
            let prefix_len = if ip.is_ipv4() { 32 } else { 128 };
            let net = IpNet::new(ip, prefix_len).map_err(|e| invalid(&e.to_string()))?;
            return Ok(Self::Cidr(net));
        }

        if let Some(domain) = normalized.strip_prefix("*.") {
            let domain = domain.strip_suffix('.').unwrap_or(domain);
            validate_hostname(domain).map_err(invalid)?;
            return Ok(Self::WildcardDomain(domain.to_string()));
        }

        let host = normalized.strip_suffix('.').unwrap_or(&normalized);
        validate_hostname(host).map_err(invalid)?;
        Ok(Self::ExactHost(host.to_string()))
    }

    /// Test a host and, if known, its resolved IP against this rule.
    pub fn matches(&self, host: &str, ip: Option<IpAddr>) -> bool {
        self.matches_host(host) || ip.is_some_and(|ip| self.matches_ip(ip))
    }

    /// Host-only half of [`matches`](Self::matches).
    pub fn matches_host(&self, host: &str) -> bool {
        match self {
            Self::ExactHost(expected) => normalized_host_eq(host, expected),
            Self::WildcardDomain(domain) => is_strict_subdomain(host, domain),
            Self::Special(SpecialClass::All) => true,
            Self::Cidr(_) | Self::Special(_) => false,
        }
    }

    /// IP-only half of [`matches`](Self::matches).
    pub fn matches_ip(&self, ip: IpAddr) -> bool {
        match self {
            Self::Cidr(net) => net.contains(&ip) || net.contains(&builtin::canonical(ip)),
            Self::Special(class) => class.matches_ip(ip),
            Self::ExactHost(_) | Self::WildcardDomain(_) => false,
        }
    }
}

impl FromStr for MatchRule {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ExactHost(host) => f.write_str(host),
            Self::WildcardDomain(domain) => write!(f, "*.{domain}"),
            Self::Cidr(net) => write!(f, "{net}"),
            Self::Special(class) => write!(f, "{class}"),
        }
    }
}

fn validate_hostname(host: &str) -> Result<(), &'static str> {
    if host.is_empty() {
        return Err("empty hostname");
    }
    if host.contains('*') {
        return Err("'*' is only allowed as a leading '*.' label");
    }
    if host.split('.').any(str::is_empty) {
        return Err("empty label in hostname");
    }
    if !host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err("invalid character in hostname");
    }
    Ok(())
}

/// Compare a candidate host with an already-normalized one, ignoring case
/// and a single trailing dot on the candidate.
fn normalized_host_eq(host: &str, expected: &str) -> bool {
    let host = host.strip_suffix('.').unwrap_or(host);
    host.eq_ignore_ascii_case(expected)
}

fn is_strict_subdomain(host: &str, domain: &str) -> bool {
    let host = host.strip_suffix('.').unwrap_or(host);
    if host.len() <= domain.len() + 1 {
        return false;
    }
    let split = host.len() - domain.len();
    // a multi-byte char ending right before the suffix makes `split` a non-boundary
    if !host.is_char_boundary(split) {
        return false;
    }
    let (prefix, suffix) = host.split_at(split);
    prefix.ends_with('.') && suffix.eq_ignore_ascii_case(domain)
}
