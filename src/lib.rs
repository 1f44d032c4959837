//! # dial_jail
//!
//! SSRF-safe dialing for servers that make outbound requests on behalf of
//! untrusted input (webhooks, remote fetches, federation calls).
//!
//! `dial_jail` checks every connection against an allow list and a block
//! list of host/IP rules. The check runs after DNS resolution and right
//! before the TCP connect, against the exact address being connected to, so
//! a hostname that re-resolves to an internal address is still caught.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use dial_jail::{DialInterceptor, HostMatchList, Network};
//!
//! # async fn example() -> Result<(), dial_jail::Error> {
//! let allow = Arc::new(HostMatchList::empty("webhook.ALLOWED_HOST_LIST"));
//! let block = Arc::new(HostMatchList::parse_setting(
//!     "webhook.BLOCKED_HOST_LIST",
//!     "loopback, private, *.internal.example.com",
//! )?);
//!
//! let dial = DialInterceptor::build("webhook", allow, block);
//! let stream = dial(Network::Tcp, "hooks.example.com:443".to_string()).await?;
//! # drop(stream);
//! # Ok(())
//! # }
//! ```
//!
//! ## Precedence
//!
//! Block always wins. An empty allow list means "no restriction"; a
//! non-empty one denies everything it does not match. See [`evaluate`].

mod addr;
mod builtin;
mod config;
mod dial;
mod error;
mod list;
mod policy;
mod resolve;
mod rule;

#[cfg(feature = "hyper")]
mod connector;

pub use addr::split_host_port;
pub use builtin::{is_external, is_loopback, is_private};
pub use config::{DialConfig, HostListConfig, PolicyConfig};
pub use dial::{BoxFuture, DialFunction, DialInterceptor, Network};
pub use error::{Error, PolicyError};
pub use list::HostMatchList;
pub use policy::evaluate;
pub use resolve::{DnsResolver, Resolver};
pub use rule::{MatchRule, SpecialClass};

#[cfg(feature = "hyper")]
pub use connector::GuardedConnector;
