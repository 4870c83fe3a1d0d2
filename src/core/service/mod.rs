//! Worker handles owned by the connection for one running episode.
//!
//! Both workers run as spawned tasks: a listener accept loop that relays
//! each accepted connection towards its upstream. Handles are constructed
//! fresh per `start()` and released on stop or failure; cancelling the
//! episode token ends the accept loop.

pub mod forward;
pub mod tunnel;

pub use forward::ForwardService;
pub use tunnel::TunnelService;

use tokio::io::copy_bidirectional;
use tokio::net::TcpStream;

pub(crate) async fn relay(mut inbound: TcpStream, upstream: String, worker: &'static str) {
    match TcpStream::connect(&upstream).await {
        Ok(mut outbound) => {
            if let Err(err) = copy_bidirectional(&mut inbound, &mut outbound).await {
                tracing::debug!(target = "service", worker, error = %err, "relay closed with error");
            }
        }
        Err(err) => {
            tracing::debug!(target = "service", worker, upstream = %upstream, error = %err, "relay connect failed");
        }
    }
}
