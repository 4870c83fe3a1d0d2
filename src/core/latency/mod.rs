//! Asynchronous latency probing.
//!
//! One probe resolves the server address (skipped when it is already a
//! literal IP), measures a TCP round trip against the first resolved
//! address, and delivers exactly one result over its channel. Resolution or
//! measurement failure collapses to `LATENCY_ERROR`. Probes are not
//! cancellable; a superseded probe still reports and the late result is
//! applied as advisory metadata.

use std::net::{IpAddr, SocketAddr};

use anyhow::{anyhow, Result};
use tokio::net::{lookup_host, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};

use crate::core::profile::LATENCY_ERROR;

/// Upper bound for one connect attempt.
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 3_000;

/// One-shot round-trip tester bound to a resolved address. Constructed per
/// probe and consumed by its single measurement.
pub struct AddressTester {
    addr: SocketAddr,
    timeout_ms: u64,
}

impl AddressTester {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self::with_timeout(ip, port, DEFAULT_PROBE_TIMEOUT_MS)
    }

    pub fn with_timeout(ip: IpAddr, port: u16, timeout_ms: u64) -> Self {
        Self { addr: SocketAddr::new(ip, port), timeout_ms }
    }

    /// Measures one TCP connect round trip in milliseconds.
    pub async fn measure(self) -> Result<u32> {
        let timeout = Duration::from_millis(self.timeout_ms);
        let start = Instant::now();
        let stream = tokio::time::timeout(timeout, TcpStream::connect(self.addr)).await??;
        let elapsed = start.elapsed();
        drop(stream);
        Ok(elapsed.as_millis().min(u128::from(u32::MAX)) as u32)
    }
}

/// Parses a literal IPv4/IPv6 address, accepting bracketed IPv6 forms.
pub fn parse_literal(address: &str) -> Option<IpAddr> {
    let trimmed = address.trim();
    let unbracketed = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(trimmed);
    unbracketed.parse().ok()
}

async fn resolve_first(host: &str, port: u16) -> Result<IpAddr> {
    let mut ips: Vec<IpAddr> = lookup_host((host, port))
        .await?
        .map(|addr| addr.ip())
        .collect();
    ips.sort();
    ips.dedup();
    ips.into_iter()
        .next()
        .ok_or_else(|| anyhow!("no address records for {host}"))
}

/// Resolves (when needed) and measures. Every failure maps to the
/// `LATENCY_ERROR` sentinel; a successful probe returns the round trip in
/// milliseconds.
pub async fn probe(server_address: &str, port: u16, timeout_ms: u64) -> i32 {
    let ip = match parse_literal(server_address) {
        Some(ip) => ip,
        None => match resolve_first(server_address, port).await {
            Ok(ip) => ip,
            Err(err) => {
                tracing::warn!(target = "latency", host = %server_address, error = %err, "resolution failed");
                return LATENCY_ERROR;
            }
        },
    };
    match AddressTester::with_timeout(ip, port, timeout_ms).measure().await {
        Ok(ms) => ms.min(i32::MAX as u32) as i32,
        Err(err) => {
            tracing::warn!(target = "latency", addr = %ip, port, error = %err, "measurement failed");
            LATENCY_ERROR
        }
    }
}

/// Spawns a probe task that sends its single result over `tx`.
pub fn spawn_probe(server_address: String, port: u16, tx: mpsc::Sender<i32>) {
    tokio::spawn(async move {
        let latency = probe(&server_address, port, DEFAULT_PROBE_TIMEOUT_MS).await;
        if tx.send(latency).await.is_err() {
            tracing::debug!(target = "latency", host = %server_address, "probe result dropped, receiver gone");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_literal_addresses() {
        assert_eq!(parse_literal("10.0.0.1"), Some("10.0.0.1".parse().unwrap()));
        assert_eq!(parse_literal("::1"), Some("::1".parse().unwrap()));
        assert_eq!(parse_literal("[2001:db8::1]"), Some("2001:db8::1".parse().unwrap()));
        assert_eq!(parse_literal(" 127.0.0.1 "), Some("127.0.0.1".parse().unwrap()));
        assert_eq!(parse_literal("example.com"), None);
        assert_eq!(parse_literal("10.0.0"), None);
        assert_eq!(parse_literal(""), None);
    }

    #[tokio::test]
    async fn test_measure_against_local_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let tester = AddressTester::new("127.0.0.1".parse().unwrap(), port);
        let latency = tester.measure().await.unwrap();
        assert!(latency < 1_000);
    }

    #[tokio::test]
    async fn test_measure_reports_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let tester = AddressTester::with_timeout("127.0.0.1".parse().unwrap(), port, 500);
        assert!(tester.measure().await.is_err());
    }

    #[tokio::test]
    async fn test_probe_literal_address_succeeds() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let latency = probe("127.0.0.1", port, 1_000).await;
        assert!(latency >= 0);
    }

    #[tokio::test]
    async fn test_probe_unresolvable_host_yields_error_sentinel() {
        let latency = probe("latency.invalid", 443, 500).await;
        assert_eq!(latency, LATENCY_ERROR);
    }

    #[tokio::test]
    async fn test_spawn_probe_delivers_exactly_once() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, mut rx) = mpsc::channel(1);
        spawn_probe("127.0.0.1".to_string(), port, tx);
        let first = rx.recv().await;
        assert!(matches!(first, Some(ms) if ms >= 0));
        // sender side completed, channel closes after its one send
        assert!(rx.recv().await.is_none());
    }
}
