//! Local port availability checks.
//!
//! The check binds the candidate address briefly and reports "in use" only
//! for an address-in-use error. Other bind failures are inconclusive and do
//! not block a start; the tunnel worker reports its own bind failure through
//! the start-failure signal. The gap between this check and the worker's
//! actual bind is accepted.

use std::io::ErrorKind;
use std::net::TcpListener;

/// Returns true when something is already bound at `addr:port`.
pub fn is_in_use(addr: &str, port: u16) -> bool {
    match TcpListener::bind((addr, port)) {
        Ok(listener) => {
            drop(listener);
            false
        }
        Err(err) if err.kind() == ErrorKind::AddrInUse => true,
        Err(err) => {
            tracing::debug!(target = "connection", addr = %addr, port, error = %err, "port probe inconclusive");
            false
        }
    }
}
