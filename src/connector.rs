//! hyper connector that dials through a [`DialInterceptor`].
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use dial_jail::{DialInterceptor, GuardedConnector, HostMatchList};
//! use hyper_util::client::legacy::Client;
//! use hyper_util::rt::TokioExecutor;
//!
//! # fn example() -> Result<(), dial_jail::Error> {
//! let block = Arc::new(HostMatchList::parse("webhook.BLOCKED_HOST_LIST", ["loopback", "private"])?);
//! let allow = Arc::new(HostMatchList::empty("webhook.ALLOWED_HOST_LIST"));
//! let connector = GuardedConnector::new(DialInterceptor::new("webhook", allow, block));
//!
//! let client: Client<_, String> = Client::builder(TokioExecutor::new()).build(connector);
//! # drop(client);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::task::{Context, Poll};

use http::Uri;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tower_service::Service;

use crate::addr::normalize_host;
use crate::dial::{BoxFuture, DialInterceptor, Network};
use crate::error::Error;

/// A `Service<Uri>` for `hyper_util`'s legacy client.
///
/// Plain TCP only. Wrap it with a TLS connector for `https`.
#[derive(Debug, Clone)]
pub struct GuardedConnector {
    interceptor: Arc<DialInterceptor>,
}

impl GuardedConnector {
    pub fn new(interceptor: DialInterceptor) -> Self {
        Self {
            interceptor: Arc::new(interceptor),
        }
    }

    pub fn interceptor(&self) -> &DialInterceptor {
        &self.interceptor
    }
}

impl From<DialInterceptor> for GuardedConnector {
    fn from(interceptor: DialInterceptor) -> Self {
        Self::new(interceptor)
    }
}

impl Service<Uri> for GuardedConnector {
    type Response = TokioIo<TcpStream>;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        let interceptor = Arc::clone(&self.interceptor);
        Box::pin(async move {
            let addr = dial_addr(&uri)?;
            let stream = interceptor.dial(Network::Tcp, &addr).await?;
            Ok(TokioIo::new(stream))
        })
    }
}

/// `host:port` for a request URI, filling in the scheme's default port.
fn dial_addr(uri: &Uri) -> Result<String, Error> {
    let raw = uri.to_string();
    let host = uri
        .host()
        .ok_or_else(|| Error::invalid_address(&raw, "URI has no host"))?;
    let host = normalize_host(host, &raw)?;

    let port = match uri.port_u16() {
        Some(port) => port,
        None => match uri.scheme_str() {
            Some("https") => 443,
            Some("http") | None => 80,
            Some(other) => {
                return Err(Error::invalid_address(raw, format!("no default port for scheme '{other}'")));
            }
        },
    };

    if host.contains(':') {
        Ok(format!("[{host}]:{port}"))
    } else {
        Ok(format!("{host}:{port}"))
    }
}
