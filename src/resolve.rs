//! DNS resolution for the dial path.

use std::fmt;
use std::net::IpAddr;

use async_trait::async_trait;
use hickory_resolver::TokioResolver;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::error::Error;

/// Turns a hostname into candidate addresses.
///
/// Implementations only resolve. Every address they return is checked
/// against the policy separately before it is connected to.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolve `host` to zero or more addresses, in connection order.
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, Error>;
}

/// [`Resolver`] backed by hickory using the system resolver configuration.
///
/// The hickory resolver is created on first use and reused afterwards.
#[derive(Default)]
pub struct DnsResolver {
    inner: OnceCell<TokioResolver>,
}

impl fmt::Debug for DnsResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DnsResolver")
            .field("initialized", &self.inner.initialized())
            .finish()
    }
}

impl DnsResolver {
    pub fn new() -> Self {
        Self::default()
    }

    async fn resolver(&self, host: &str) -> Result<&TokioResolver, Error> {
        self.inner
            .get_or_try_init(|| async {
                let builder = TokioResolver::builder_tokio()
                    .map_err(|e| Error::dns_error(host, e.to_string()))?;
                Ok::<_, Error>(builder.build())
            })
            .await
    }
}

#[async_trait]
impl Resolver for DnsResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, Error> {
        let response = self
            .resolver(host)
            .await?
            .lookup_ip(host)
            .await
            .map_err(|e| Error::dns_error(host, e.to_string()))?;

        Ok(response.iter().collect())
    }
}

/// Resolve `host`, skipping DNS for IP literals.
///
/// # Errors
///
/// Returns [`Error::Dns`] when the lookup fails or yields no address.
pub(crate) async fn resolve_host(resolver: &dyn Resolver, host: &str) -> Result<Vec<IpAddr>, Error> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![ip]);
    }

    let addrs = resolver.resolve(host).await?;
    debug!(host, addrs = ?addrs, "resolved");

    if addrs.is_empty() {
        return Err(Error::dns_error(host, "no IP addresses found"));
    }
    Ok(addrs)
}
