use std::time::Duration;

use tokio::net::TcpStream;

use crate::events::structured::{Event, MemoryEventBus};

/// Default polling interval (ms).
pub const WAIT_INTERVAL_MS: u64 = 50;
/// Default maximum number of attempts.
pub const WAIT_MAX_ATTEMPTS: usize = 120; // 50ms * 120 ~= 6s

#[derive(Debug, thiserror::Error)]
pub enum WaitError { #[error("timeout waiting condition")] Timeout }

/// Generic wait: polls the predicate until it holds or attempts run out.
pub async fn wait_until<F: Fn() -> bool>(predicate: F, interval_ms: u64, max_attempts: usize) -> Result<(), WaitError> {
    for attempt in 0..max_attempts {
        if predicate() { return Ok(()); }
        if attempt + 1 < max_attempts { tokio::time::sleep(Duration::from_millis(interval_ms)).await; }
    }
    Err(WaitError::Timeout)
}

/// Listener wait: until a TCP connect to the address succeeds.
pub async fn wait_for_listener(addr: &str, port: u16, interval_ms: u64, max_attempts: usize) -> Result<(), WaitError> {
    for attempt in 0..max_attempts {
        if TcpStream::connect((addr, port)).await.is_ok() { return Ok(()); }
        if attempt + 1 < max_attempts { tokio::time::sleep(Duration::from_millis(interval_ms)).await; }
    }
    Err(WaitError::Timeout)
}

/// Event wait: polls the bus snapshot until some recorded event matches.
pub async fn wait_for_event<P: Fn(&Event) -> bool>(bus: &MemoryEventBus, predicate: P, interval_ms: u64, max_attempts: usize) -> Result<(), WaitError> {
    for attempt in 0..max_attempts {
        if bus.snapshot().iter().any(|e| predicate(e)) { return Ok(()); }
        if attempt + 1 < max_attempts { tokio::time::sleep(Duration::from_millis(interval_ms)).await; }
    }
    Err(WaitError::Timeout)
}

/// Convenience event wait using the default interval and attempt count.
pub async fn wait_for_event_default<P: Fn(&Event) -> bool>(bus: &MemoryEventBus, predicate: P) -> Result<(), WaitError> {
    wait_for_event(bus, predicate, WAIT_INTERVAL_MS, WAIT_MAX_ATTEMPTS).await
}
