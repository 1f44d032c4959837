//! End-to-end dialing against local listeners with scripted DNS answers.

use std::collections::VecDeque;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dial_jail::{DialConfig, DialInterceptor, Error, HostMatchList, Network, PolicyError, Resolver};
use socket2::SockRef;
use tokio::net::TcpListener;

/// Hands out one prepared answer per lookup, like a DNS server an attacker
/// controls.
struct ScriptedResolver {
    answers: Mutex<VecDeque<Vec<IpAddr>>>,
    calls: AtomicUsize,
}

impl ScriptedResolver {
    fn new(answers: &[&[&str]]) -> Arc<Self> {
        let answers = answers
            .iter()
            .map(|ips| ips.iter().map(|ip| ip.parse().unwrap()).collect())
            .collect();
        Arc::new(Self {
            answers: Mutex::new(answers),
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolver for ScriptedResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| Error::Dns {
                host: host.to_string(),
                message: "script exhausted".to_string(),
            })
    }
}

fn interceptor(allow: &[&str], block: &[&str], resolver: Arc<ScriptedResolver>) -> DialInterceptor {
    DialInterceptor::new(
        "webhook",
        Arc::new(HostMatchList::parse("webhook.ALLOWED_HOST_LIST", allow).unwrap()),
        Arc::new(HostMatchList::parse("webhook.BLOCKED_HOST_LIST", block).unwrap()),
    )
    .with_resolver(resolver)
}

async fn listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

async fn assert_no_connection(listener: &TcpListener) {
    let accepted = tokio::time::timeout(Duration::from_millis(200), listener.accept()).await;
    assert!(accepted.is_err(), "a connection reached the listener");
}

#[tokio::test]
async fn test_allowed_host_connects() {
    let (listener, port) = listener().await;
    let resolver = ScriptedResolver::new(&[&["127.0.0.1"]]);
    let dialer = interceptor(&[], &["10.0.0.0/8"], resolver.clone());

    let stream = dialer.dial(Network::Tcp, &format!("hooks.example.com:{port}")).await.unwrap();
    let (_accepted, peer) = listener.accept().await.unwrap();
    assert_eq!(stream.local_addr().unwrap(), peer);
    assert_eq!(resolver.calls(), 1);
}

#[tokio::test]
async fn test_rebinding_is_checked_on_every_dial() {
    let (listener, port) = listener().await;
    let resolver = ScriptedResolver::new(&[&["127.0.0.1"], &["10.0.0.1"]]);
    let dialer = interceptor(&[], &["10.0.0.0/8"], resolver.clone());
    let addr = format!("rebind.example.com:{port}");

    dialer.dial(Network::Tcp, &addr).await.unwrap();
    listener.accept().await.unwrap();

    let err = dialer.dial(Network::Tcp, &addr).await.unwrap_err();
    assert_eq!(
        err.as_policy(),
        Some(&PolicyError::Blocked {
            usage: "webhook".into(),
            setting_key_hint: "webhook.BLOCKED_HOST_LIST".into(),
            host: "rebind.example.com".into(),
            ip: "10.0.0.1".parse().unwrap(),
        })
    );
    assert_eq!(resolver.calls(), 2);
}

#[tokio::test]
async fn test_blocked_answer_never_reaches_socket() {
    let (listener, port) = listener().await;
    let resolver = ScriptedResolver::new(&[&["127.0.0.1"]]);
    let dialer = interceptor(&[], &["loopback"], resolver);

    let err = dialer.dial(Network::Tcp, &format!("victim.example.com:{port}")).await.unwrap_err();
    assert!(err.is_policy_rejection());
    assert_no_connection(&listener).await;
}

#[tokio::test]
async fn test_each_candidate_checked_independently() {
    let (listener, port) = listener().await;
    let resolver = ScriptedResolver::new(&[&["10.0.0.1", "127.0.0.1"]]);
    let dialer = interceptor(&[], &["10.0.0.0/8"], resolver);

    let stream = dialer.dial(Network::Tcp, &format!("multi.example.com:{port}")).await.unwrap();
    assert_eq!(stream.peer_addr().unwrap().ip(), "127.0.0.1".parse::<IpAddr>().unwrap());
    listener.accept().await.unwrap();
}

#[tokio::test]
async fn test_all_candidates_blocked_returns_first_rejection() {
    let (listener, port) = listener().await;
    let resolver = ScriptedResolver::new(&[&["10.0.0.1", "127.0.0.1"]]);
    let dialer = interceptor(&[], &["10.0.0.0/8", "loopback"], resolver);

    let err = dialer.dial(Network::Tcp, &format!("multi.example.com:{port}")).await.unwrap_err();
    assert_eq!(err.as_policy().map(|p| p.ip()), Some("10.0.0.1".parse().unwrap()));
    assert_no_connection(&listener).await;
}

#[tokio::test]
async fn test_allow_list_is_closed() {
    let (listener, port) = listener().await;
    let resolver = ScriptedResolver::new(&[&["127.0.0.1"]]);
    let dialer = interceptor(&["api.example.com"], &[], resolver);

    let err = dialer.dial(Network::Tcp, &format!("evil.com:{port}")).await.unwrap_err();
    assert!(matches!(err.as_policy(), Some(PolicyError::NotAllowed { .. })));
    assert_no_connection(&listener).await;
}

#[tokio::test]
async fn test_allow_list_by_host_name() {
    let (listener, port) = listener().await;
    let resolver = ScriptedResolver::new(&[&["127.0.0.1"]]);
    let dialer = interceptor(&["*.example.com"], &[], resolver);

    dialer.dial(Network::Tcp, &format!("api.example.com:{port}")).await.unwrap();
    listener.accept().await.unwrap();
}

#[tokio::test]
async fn test_tcp4_skips_ipv6_candidates() {
    let (listener, port) = listener().await;
    let resolver = ScriptedResolver::new(&[&["::1", "127.0.0.1"]]);
    let dialer = interceptor(&[], &[], resolver);

    let stream = dialer.dial(Network::Tcp4, &format!("dual.example.com:{port}")).await.unwrap();
    assert!(stream.peer_addr().unwrap().is_ipv4());
    listener.accept().await.unwrap();
}

#[tokio::test]
async fn test_dns_failure_is_not_a_policy_error() {
    let resolver = ScriptedResolver::new(&[]);
    let dialer = interceptor(&[], &[], resolver);

    let err = dialer.dial(Network::Tcp, "gone.example.com:80").await.unwrap_err();
    assert!(matches!(err, Error::Dns { .. }));
    assert!(!err.is_policy_rejection());
}

#[tokio::test]
async fn test_connect_refused_is_reported() {
    let (listener, port) = listener().await;
    drop(listener);
    let resolver = ScriptedResolver::new(&[&["127.0.0.1"]]);
    let dialer = interceptor(&[], &[], resolver);

    let err = dialer.dial(Network::Tcp, &format!("closed.example.com:{port}")).await.unwrap_err();
    assert!(matches!(err, Error::Connect { .. }));
}

#[tokio::test]
async fn test_concurrent_dials_are_independent() {
    let (listener, port) = listener().await;
    let accept = tokio::spawn(async move {
        let mut accepted = 0;
        while tokio::time::timeout(Duration::from_millis(500), listener.accept())
            .await
            .is_ok()
        {
            accepted += 1;
        }
        accepted
    });

    let allow = Arc::new(HostMatchList::empty("allow"));
    let block = Arc::new(HostMatchList::parse("block", ["*.blocked.example"]).unwrap());
    let answer: &[&str] = &["127.0.0.1"];
    let answers = vec![answer; 16];
    let dial = DialInterceptor::new("webhook", allow, block)
        .with_resolver(ScriptedResolver::new(&answers))
        .into_dial_fn();

    let mut tasks = Vec::new();
    for i in 0..16 {
        let dial = Arc::clone(&dial);
        let host = if i % 2 == 0 { "ok.example" } else { "x.blocked.example" };
        tasks.push(tokio::spawn(async move { dial(Network::Tcp, format!("{host}:{port}")).await }));
    }

    let mut ok = 0;
    let mut rejected = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => ok += 1,
            Err(e) if e.is_policy_rejection() => rejected += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert_eq!((ok, rejected), (8, 8));
    assert_eq!(accept.await.unwrap(), 8);
}

#[tokio::test]
async fn test_error_keeps_caller_spelling_of_host() {
    let (listener, port) = listener().await;
    let resolver = ScriptedResolver::new(&[&["127.0.0.1"]]);
    let dialer = interceptor(&[], &["rebind.example.com"], resolver);

    let err = dialer.dial(Network::Tcp, &format!("Rebind.Example.COM.:{port}")).await.unwrap_err();
    let rejection = err.as_policy().unwrap();
    assert!(matches!(rejection, PolicyError::Blocked { .. }));
    assert_eq!(rejection.host(), "Rebind.Example.COM.");
    assert!(err.to_string().contains("deny 'Rebind.Example.COM.(127.0.0.1)'"));
    assert_no_connection(&listener).await;
}

// ===== Timeouts and keep-alive =====

fn dial_config(connect_timeout: Duration, keep_alive: Duration) -> DialConfig {
    DialConfig {
        connect_timeout,
        keep_alive,
    }
}

#[tokio::test]
async fn test_unreachable_candidate_times_out() {
    // 10.255.255.1 is non-routable in practice: the SYN is never answered
    let resolver = ScriptedResolver::new(&[&["10.255.255.1"]]);
    let dialer = interceptor(&[], &[], resolver)
        .with_config(dial_config(Duration::from_millis(50), Duration::from_secs(30)))
        .unwrap();

    let started = Instant::now();
    let err = dialer.dial(Network::Tcp, "blackhole.example.com:81").await.unwrap_err();
    assert!(matches!(err, Error::Timeout { .. }), "expected timeout, got {err}");
    assert!(started.elapsed() < Duration::from_secs(2));
}

/// Never answers.
struct StalledResolver;

#[async_trait]
impl Resolver for StalledResolver {
    async fn resolve(&self, _host: &str) -> Result<Vec<IpAddr>, Error> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn test_connect_timeout_covers_resolution() {
    let dialer = DialInterceptor::new(
        "webhook",
        Arc::new(HostMatchList::empty("allow")),
        Arc::new(HostMatchList::empty("block")),
    )
    .with_resolver(Arc::new(StalledResolver))
    .with_config(dial_config(Duration::from_millis(50), Duration::from_secs(30)))
    .unwrap();

    let err = dialer.dial(Network::Tcp, "slow-dns.example.com:80").await.unwrap_err();
    assert!(matches!(err, Error::Timeout { ref addr, .. } if addr == "slow-dns.example.com:80"));
}

#[tokio::test]
async fn test_keep_alive_applied_to_connected_socket() {
    let (listener, port) = listener().await;
    let resolver = ScriptedResolver::new(&[&["127.0.0.1"]]);
    let config = dial_config(Duration::from_secs(5), Duration::from_secs(45));
    let dialer = interceptor(&[], &[], resolver).with_config(config).unwrap();

    let stream = dialer.dial(Network::Tcp, &format!("hooks.example.com:{port}")).await.unwrap();
    listener.accept().await.unwrap();

    let sock = SockRef::from(&stream);
    assert!(sock.keepalive().unwrap());
    assert_eq!(sock.keepalive_time().unwrap(), config.keep_alive);
}
