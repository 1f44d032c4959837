//! Error types for dial_jail.

use std::io;
use std::net::IpAddr;
use std::time::Duration;

use thiserror::Error;

/// A connection attempt rejected by the allow/block lists.
///
/// Carries the calling usage, the setting that produced the violated list,
/// and the host/IP pair that was denied. The rule that matched is
/// intentionally absent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PolicyError {
    /// The host or IP matched the block list.
    #[error("{usage} can not call blocked HTTP servers (check your {setting_key_hint} setting), deny '{host}({ip})'")]
    Blocked {
        usage: String,
        setting_key_hint: String,
        host: String,
        ip: IpAddr,
    },

    /// A non-empty allow list did not match the host or IP.
    #[error("{usage} can only call allowed HTTP servers (check your {setting_key_hint} setting), deny '{host}({ip})'")]
    NotAllowed {
        usage: String,
        setting_key_hint: String,
        host: String,
        ip: IpAddr,
    },
}

impl PolicyError {
    pub(crate) fn blocked(usage: &str, setting_key_hint: &str, host: &str, ip: IpAddr) -> Self {
        Self::Blocked {
            usage: usage.to_string(),
            setting_key_hint: setting_key_hint.to_string(),
            host: host.to_string(),
            ip,
        }
    }

    pub(crate) fn not_allowed(usage: &str, setting_key_hint: &str, host: &str, ip: IpAddr) -> Self {
        Self::NotAllowed {
            usage: usage.to_string(),
            setting_key_hint: setting_key_hint.to_string(),
            host: host.to_string(),
            ip,
        }
    }

    /// Replace the reported host, keeping everything else.
    pub(crate) fn with_host(mut self, new_host: &str) -> Self {
        match &mut self {
            Self::Blocked { host, .. } | Self::NotAllowed { host, .. } => *host = new_host.to_string(),
        }
        self
    }

    /// The host that was denied.
    pub fn host(&self) -> &str {
        match self {
            Self::Blocked { host, .. } | Self::NotAllowed { host, .. } => host,
        }
    }

    /// The resolved IP that was denied.
    pub fn ip(&self) -> IpAddr {
        match self {
            Self::Blocked { ip, .. } | Self::NotAllowed { ip, .. } => *ip,
        }
    }

    /// The setting key hint of the list that caused the rejection.
    pub fn setting_key_hint(&self) -> &str {
        match self {
            Self::Blocked {
                setting_key_hint, ..
            }
            | Self::NotAllowed {
                setting_key_hint, ..
            } => setting_key_hint,
        }
    }
}

/// Errors that can occur while building lists or dialing.
#[derive(Debug, Error)]
pub enum Error {
    /// A rule pattern could not be parsed.
    #[error("invalid rule '{pattern}' in {setting_key_hint}: {reason}")]
    InvalidRule {
        setting_key_hint: String,
        pattern: String,
        reason: String,
    },

    /// The dial address could not be split into host and port.
    #[error("invalid address '{addr}': {reason}")]
    InvalidAddress { addr: String, reason: String },

    /// Only TCP dialing is supported.
    #[error("unsupported network '{network}', only tcp, tcp4 and tcp6 are allowed")]
    UnsupportedNetwork { network: String },

    /// DNS resolution failed or returned nothing usable.
    #[error("DNS error for {host}: {message}")]
    Dns { host: String, message: String },

    /// The connection was rejected by policy.
    #[error(transparent)]
    Policy(#[from] PolicyError),

    /// The TCP connect failed.
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// The TCP connect did not finish in time.
    #[error("connect to {addr} timed out after {timeout:?}")]
    Timeout { addr: String, timeout: Duration },

    /// Configuration values are unusable.
    #[error("invalid configuration: {message}")]
    Config { message: String },
}

impl Error {
    pub(crate) fn invalid_rule(
        setting_key_hint: impl Into<String>,
        pattern: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidRule {
            setting_key_hint: setting_key_hint.into(),
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_address(addr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            addr: addr.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn dns_error(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Dns {
            host: host.into(),
            message: message.into(),
        }
    }

    pub(crate) fn connect(addr: impl Into<String>, source: io::Error) -> Self {
        Self::Connect {
            addr: addr.into(),
            source,
        }
    }

    /// Whether this error is an allow/block list rejection.
    pub fn is_policy_rejection(&self) -> bool {
        matches!(self, Self::Policy(_))
    }

    /// The policy rejection, if this is one.
    pub fn as_policy(&self) -> Option<&PolicyError> {
        match self {
            Self::Policy(e) => Some(e),
            _ => None,
        }
    }
}
