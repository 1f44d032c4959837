//! Allow/block list precedence.
//!
//! ## Precedence
//!
//! 1. Block list matches → [`PolicyError::Blocked`]. A host on both lists
//!    is blocked.
//! 2. Allow list non-empty and not matched → [`PolicyError::NotAllowed`].
//! 3. Otherwise the connection is accepted.
//!
//! An empty allow list leaves the policy open apart from the block list.
//! Once any allow rule is configured, everything else is denied.

use std::net::IpAddr;

use tracing::{trace, warn};

use crate::error::PolicyError;
use crate::list::HostMatchList;

/// Decide whether `usage` may connect to `host` at the resolved `ip`.
///
/// Pure: the same inputs always give the same verdict.
///
/// # Example
///
/// ```rust
/// use dial_jail::{evaluate, HostMatchList, PolicyError};
///
/// let allow = HostMatchList::parse("allow", ["10.0.0.5"]).unwrap();
/// let block = HostMatchList::parse("block", ["10.0.0.0/8"]).unwrap();
///
/// let verdict = evaluate("webhook", "internal", "10.0.0.5".parse().unwrap(), &allow, &block);
/// assert!(matches!(verdict, Err(PolicyError::Blocked { .. })));
/// ```
pub fn evaluate(
    usage: &str,
    host: &str,
    ip: IpAddr,
    allow: &HostMatchList,
    block: &HostMatchList,
) -> Result<(), PolicyError> {
    if block.match_host_or_ip(host, Some(ip)) {
        warn!(
            usage,
            host,
            %ip,
            setting_key_hint = block.setting_key_hint(),
            "connection blocked"
        );
        return Err(PolicyError::blocked(usage, block.setting_key_hint(), host, ip));
    }

    if !allow.is_empty() && !allow.match_host_or_ip(host, Some(ip)) {
        warn!(
            usage,
            host,
            %ip,
            setting_key_hint = allow.setting_key_hint(),
            "connection not in allow list"
        );
        return Err(PolicyError::not_allowed(usage, allow.setting_key_hint(), host, ip));
    }

    trace!(usage, host, %ip, "connection allowed");
    Ok(())
}
