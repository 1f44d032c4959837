//! Deserializable settings for building lists and interceptors.
//!
//! ```rust
//! use dial_jail::PolicyConfig;
//!
//! let config: PolicyConfig = serde_json::from_str(r#"{
//!     "usage": "webhook",
//!     "allow": { "setting_key_hint": "webhook.ALLOWED_HOST_LIST", "patterns": ["external"] },
//!     "block": { "setting_key_hint": "webhook.BLOCKED_HOST_LIST", "patterns": ["10.0.0.0/8"] },
//!     "dial": { "connect_timeout_secs": 5 }
//! }"#).unwrap();
//!
//! let interceptor = config.into_interceptor().unwrap();
//! assert_eq!(interceptor.usage(), "webhook");
//! ```

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::dial::DialInterceptor;
use crate::error::Error;
use crate::list::HostMatchList;

/// Dialer timeouts. Defaults match a stock HTTP transport: 30s connect
/// timeout, 30s keep-alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialConfig {
    /// Budget for one whole dial: resolution plus every connect attempt.
    /// Attempts split what is left between the remaining candidates.
    #[serde(rename = "connect_timeout_secs", with = "duration_secs")]
    pub connect_timeout: Duration,
    /// Idle time before TCP keep-alive messages start on a connected socket.
    #[serde(rename = "keep_alive_secs", with = "duration_secs")]
    pub keep_alive: Duration,
}

impl Default for DialConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            keep_alive: Duration::from_secs(30),
        }
    }
}

impl DialConfig {
    /// Reject values the dialer cannot use.
    pub fn validate(&self) -> Result<(), Error> {
        if self.connect_timeout.is_zero() {
            return Err(Error::Config {
                message: "connect_timeout_secs must be greater than zero".to_string(),
            });
        }
        if self.keep_alive.is_zero() {
            return Err(Error::Config {
                message: "keep_alive_secs must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}

/// Raw patterns of one list plus the name of the setting they came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostListConfig {
    pub setting_key_hint: String,
    #[serde(default)]
    pub patterns: Vec<String>,
}

impl HostListConfig {
    pub fn build(&self) -> Result<HostMatchList, Error> {
        HostMatchList::parse(self.setting_key_hint.as_str(), &self.patterns)
    }
}

/// Everything needed to build one [`DialInterceptor`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub usage: String,
    #[serde(default)]
    pub allow: HostListConfig,
    #[serde(default)]
    pub block: HostListConfig,
    #[serde(default)]
    pub dial: DialConfig,
}

impl PolicyConfig {
    /// Build both lists and the interceptor. Any malformed pattern or
    /// timeout fails the whole build.
    pub fn into_interceptor(self) -> Result<DialInterceptor, Error> {
        let allow = Arc::new(self.allow.build()?);
        let block = Arc::new(self.block.build()?);
        DialInterceptor::new(self.usage, allow, block).with_config(self.dial)
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}
