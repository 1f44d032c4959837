//! Host match lists.

use std::net::IpAddr;

use crate::error::Error;
use crate::rule::MatchRule;

/// An immutable set of [`MatchRule`]s built from one setting.
///
/// The `setting_key_hint` names the configuration field the list came from.
/// It is only used in error messages so operators know which setting to
/// change.
///
/// Rules are independent: a list matches when any rule matches, and the
/// order they were given in does not change the result.
///
/// # Example
///
/// ```rust
/// use dial_jail::HostMatchList;
///
/// let list = HostMatchList::parse("webhook.ALLOWED_HOST_LIST", ["*.example.com", "10.0.0.0/8"]).unwrap();
///
/// assert!(list.match_host_or_ip("api.example.com", None));
/// assert!(list.match_host_or_ip("internal", Some("10.1.2.3".parse().unwrap())));
/// assert!(!list.match_host_or_ip("example.org", Some("8.8.8.8".parse().unwrap())));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostMatchList {
    setting_key_hint: String,
    rules: Vec<MatchRule>,
}

impl HostMatchList {
    /// Create a list from already-parsed rules.
    pub fn new(setting_key_hint: impl Into<String>, rules: Vec<MatchRule>) -> Self {
        Self {
            setting_key_hint: setting_key_hint.into(),
            rules,
        }
    }

    /// A list without rules.
    ///
    /// As an allow list this means "no restriction"; as a block list it
    /// blocks nothing.
    pub fn empty(setting_key_hint: impl Into<String>) -> Self {
        Self::new(setting_key_hint, Vec::new())
    }

    /// Parse every pattern into a rule.
    ///
    /// # Errors
    ///
    /// The first malformed pattern fails the whole list with
    /// [`Error::InvalidRule`], so a half-valid policy is never built.
    pub fn parse<I>(setting_key_hint: impl Into<String>, patterns: I) -> Result<Self, Error>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let setting_key_hint = setting_key_hint.into();
        let rules = patterns
            .into_iter()
            .map(|p| MatchRule::parse_with_hint(&setting_key_hint, p.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(setting_key_hint, rules))
    }

    /// Parse a comma-separated setting value such as
    /// `"loopback, private, *.internal.example.com"`. Blank entries are
    /// skipped.
    pub fn parse_setting(setting_key_hint: impl Into<String>, value: &str) -> Result<Self, Error> {
        Self::parse(
            setting_key_hint,
            value.split(',').map(str::trim).filter(|s| !s.is_empty()),
        )
    }

    /// True iff the list has no rules.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Number of rules.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn setting_key_hint(&self) -> &str {
        &self.setting_key_hint
    }

    pub fn rules(&self) -> &[MatchRule] {
        &self.rules
    }

    /// Whether any host rule matches `host`.
    pub fn match_host_name(&self, host: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches_host(host))
    }

    /// Whether any IP rule matches `ip`.
    pub fn match_ip_addr(&self, ip: IpAddr) -> bool {
        self.rules.iter().any(|rule| rule.matches_ip(ip))
    }

    /// Whether any rule matches either the host or the IP.
    pub fn match_host_or_ip(&self, host: &str, ip: Option<IpAddr>) -> bool {
        self.rules.iter().any(|rule| rule.matches(host, ip))
    }
}
