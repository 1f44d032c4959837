//! Policy-enforcing TCP dialer.
//!
//! [`DialInterceptor`] splits dialing into two steps it controls itself:
//! resolve the host, then connect to each candidate address. Every
//! candidate is checked with [`evaluate`] on the same task, right before its
//! socket is opened. The address that gets checked is the address that gets
//! connected to, so a DNS answer that changes between validation and connect
//! (rebinding) cannot slip through.
//!
//! Nothing is cached. Every dial resolves again and every candidate is
//! evaluated again.

use std::fmt;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use socket2::{SockRef, TcpKeepalive};
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::addr::{normalize_host, split_raw_host_port};
use crate::config::DialConfig;
use crate::error::{Error, PolicyError};
use crate::list::HostMatchList;
use crate::policy::evaluate;
use crate::resolve::{resolve_host, DnsResolver, Resolver};

/// An owned, `Send` future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A dial function for HTTP transports: `(network, "host:port") -> stream`.
///
/// Dropping the returned future cancels the attempt.
pub type DialFunction =
    Arc<dyn Fn(Network, String) -> BoxFuture<'static, Result<TcpStream, Error>> + Send + Sync>;

/// Address family to dial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Network {
    /// IPv4 or IPv6.
    #[default]
    Tcp,
    /// IPv4 only.
    Tcp4,
    /// IPv6 only.
    Tcp6,
}

impl Network {
    fn accepts(self, ip: IpAddr) -> bool {
        match self {
            Self::Tcp => true,
            Self::Tcp4 => ip.is_ipv4(),
            Self::Tcp6 => ip.is_ipv6(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Tcp => "tcp",
            Self::Tcp4 => "tcp4",
            Self::Tcp6 => "tcp6",
        }
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "tcp" => Ok(Self::Tcp),
            "tcp4" => Ok(Self::Tcp4),
            "tcp6" => Ok(Self::Tcp6),
            other => Err(Error::UnsupportedNetwork {
                network: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dials TCP connections for one usage under one allow/block list pair.
///
/// The lists are shared read-only snapshots. To change the policy, build new
/// lists and a new interceptor; dials already running on the old one finish
/// under the old lists.
///
/// # Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use dial_jail::{DialInterceptor, HostMatchList, Network};
///
/// # async fn example() -> Result<(), dial_jail::Error> {
/// let allow = Arc::new(HostMatchList::empty("webhook.ALLOWED_HOST_LIST"));
/// let block = Arc::new(HostMatchList::parse("webhook.BLOCKED_HOST_LIST", ["loopback", "private"])?);
///
/// let dial = DialInterceptor::build("webhook", allow, block);
/// let stream = dial(Network::Tcp, "example.com:80".to_string()).await?;
/// # drop(stream);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct DialInterceptor {
    usage: String,
    allow: Arc<HostMatchList>,
    block: Arc<HostMatchList>,
    config: DialConfig,
    resolver: Arc<dyn Resolver>,
}

impl fmt::Debug for DialInterceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DialInterceptor")
            .field("usage", &self.usage)
            .field("allow", &self.allow)
            .field("block", &self.block)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DialInterceptor {
    /// Create an interceptor with default timeouts and the system DNS
    /// resolver.
    pub fn new(usage: impl Into<String>, allow: Arc<HostMatchList>, block: Arc<HostMatchList>) -> Self {
        Self {
            usage: usage.into(),
            allow,
            block,
            config: DialConfig::default(),
            resolver: Arc::new(DnsResolver::new()),
        }
    }

    /// Build a [`DialFunction`] with default settings.
    pub fn build(usage: impl Into<String>, allow: Arc<HostMatchList>, block: Arc<HostMatchList>) -> DialFunction {
        Self::new(usage, allow, block).into_dial_fn()
    }

    /// Replace the dialer timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` fails [`DialConfig::validate`].
    pub fn with_config(mut self, config: DialConfig) -> Result<Self, Error> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn Resolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn usage(&self) -> &str {
        &self.usage
    }

    pub fn allow_list(&self) -> &HostMatchList {
        &self.allow
    }

    pub fn block_list(&self) -> &HostMatchList {
        &self.block
    }

    pub fn config(&self) -> &DialConfig {
        &self.config
    }

    /// Convert into a [`DialFunction`] closure.
    pub fn into_dial_fn(self) -> DialFunction {
        let this = Arc::new(self);
        Arc::new(
            move |network: Network, addr: String| -> BoxFuture<'static, Result<TcpStream, Error>> {
                let this = Arc::clone(&this);
                Box::pin(async move { this.dial(network, &addr).await })
            },
        )
    }

    /// Run the policy for one resolved candidate.
    pub fn check(&self, host: &str, ip: IpAddr) -> Result<(), PolicyError> {
        evaluate(&self.usage, host, ip, &self.allow, &self.block)
    }

    /// Resolve `addr` and connect to the first candidate the policy accepts.
    ///
    /// Candidates are tried in resolver order. A rejected candidate is never
    /// connected to; the next one gets its own check. If every candidate
    /// fails, the first failure is returned.
    ///
    /// [`DialConfig::connect_timeout`] bounds the whole dial, resolution
    /// included. Each connect attempt gets an even share of what is left,
    /// but at least two seconds when that much remains.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidAddress`] if `addr` is not `host:port`
    /// - [`Error::Dns`] if resolution fails or yields no address of `network`
    /// - [`Error::Policy`] if the policy rejected the first candidate
    /// - [`Error::Connect`] / [`Error::Timeout`] for connect failures
    pub async fn dial(&self, network: Network, addr: &str) -> Result<TcpStream, Error> {
        let now = Instant::now();
        let deadline = now.checked_add(self.config.connect_timeout).unwrap_or(now + FAR_FUTURE);
        let (raw_host, port) = split_raw_host_port(addr)?;
        let host = normalize_host(raw_host, addr)?;

        let resolved = timeout_at(deadline, resolve_host(self.resolver.as_ref(), &host))
            .await
            .map_err(|_| Error::Timeout {
                addr: addr.to_string(),
                timeout: self.config.connect_timeout,
            })??;
        let candidates: Vec<IpAddr> = resolved.into_iter().filter(|ip| network.accepts(*ip)).collect();

        let mut first_err = None;
        for (i, ip) in candidates.iter().enumerate() {
            let attempt = Target {
                raw_host,
                host: &host,
                addr: SocketAddr::new(*ip, port),
                deadline: attempt_deadline(Instant::now(), deadline, candidates.len() - i),
            };
            match self.dial_candidate(attempt).await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    debug!(usage = %self.usage, host = %host, %ip, error = %e, "dial attempt failed");
                    first_err.get_or_insert(e);
                }
            }
        }

        Err(first_err.unwrap_or_else(|| Error::dns_error(&host, format!("no {network} addresses found"))))
    }

    async fn dial_candidate(&self, target: Target<'_>) -> Result<TcpStream, Error> {
        let addr = target.addr;
        self.check(target.host, addr.ip())
            .map_err(|e| e.with_host(target.raw_host))?;

        let socket = match addr {
            SocketAddr::V4(_) => TcpSocket::new_v4(),
            SocketAddr::V6(_) => TcpSocket::new_v6(),
        }
        .map_err(|e| Error::connect(addr.to_string(), e))?;

        let keepalive = TcpKeepalive::new().with_time(self.config.keep_alive);
        SockRef::from(&socket)
            .set_tcp_keepalive(&keepalive)
            .map_err(|e| Error::connect(addr.to_string(), e))?;

        let started = Instant::now();
        match timeout_at(target.deadline, socket.connect(addr)).await {
            Ok(Ok(stream)) => {
                debug!(usage = %self.usage, host = target.host, %addr, "connected");
                Ok(stream)
            }
            Ok(Err(e)) => Err(Error::connect(addr.to_string(), e)),
            Err(_) => Err(Error::Timeout {
                addr: addr.to_string(),
                timeout: target.deadline.saturating_duration_since(started),
            }),
        }
    }
}

/// Stand-in deadline when `connect_timeout` is too large to add to now.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365);

/// Shortest budget a connect attempt gets while the overall deadline allows.
const MIN_ATTEMPT: Duration = Duration::from_secs(2);

/// One resolved candidate of a dial.
struct Target<'a> {
    /// Host as the caller spelled it, for error messages.
    raw_host: &'a str,
    /// Normalized host, for matching.
    host: &'a str,
    addr: SocketAddr,
    deadline: Instant,
}

/// Deadline for one attempt with `remaining` candidates left (including
/// this one).
fn attempt_deadline(now: Instant, deadline: Instant, remaining: usize) -> Instant {
    let left = deadline.saturating_duration_since(now);
    let share = left / u32::try_from(remaining.max(1)).unwrap_or(u32::MAX);
    now + share.max(MIN_ATTEMPT.min(left))
}
