//! Dial address splitting and host normalization.

use crate::error::Error;

/// Split `host:port` or `[v6]:port` into a normalized host and a port.
///
/// The host is lower-cased, loses a trailing FQDN dot and, for IPv6
/// literals, its brackets.
///
/// # Errors
///
/// Returns [`Error::InvalidAddress`] when the port is missing or not a
/// number, brackets are unbalanced, or an unbracketed host has extra colons.
pub fn split_host_port(addr: &str) -> Result<(String, u16), Error> {
    let (host, port) = split_raw_host_port(addr)?;
    Ok((normalize_host(host, addr)?, port))
}

/// Like [`split_host_port`] but the host keeps the caller's spelling. Only
/// IPv6 brackets are removed.
pub(crate) fn split_raw_host_port(addr: &str) -> Result<(&str, u16), Error> {
    let (host, port) = if let Some(rest) = addr.strip_prefix('[') {
        let end = rest
            .find(']')
            .ok_or_else(|| Error::invalid_address(addr, "missing ']' in address"))?;
        let host = &rest[..end];
        let port = rest[end + 1..]
            .strip_prefix(':')
            .ok_or_else(|| Error::invalid_address(addr, "missing port in address"))?;
        (host, port)
    } else {
        let i = addr
            .rfind(':')
            .ok_or_else(|| Error::invalid_address(addr, "missing port in address"))?;
        let host = &addr[..i];
        if host.contains(':') {
            return Err(Error::invalid_address(addr, "too many colons in address"));
        }
        (host, &addr[i + 1..])
    };

    let port = port
        .parse::<u16>()
        .map_err(|_| Error::invalid_address(addr, format!("invalid port '{port}'")))?;

    Ok((host, port))
}

/// Normalize a hostname: lowercase, remove trailing dot and IPv6 brackets.
pub(crate) fn normalize_host(host: &str, original: &str) -> Result<String, Error> {
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);

    let mut normalized = host.to_lowercase();

    // Remove trailing dot (FQDN notation)
    if normalized.ends_with('.') {
        normalized.pop();
    }

    if normalized.is_empty() {
        return Err(Error::invalid_address(original, "empty hostname"));
    }

    Ok(normalized)
}
