//! Local forwarding worker: the dual-mode HTTP bridge.
//!
//! Reads the persisted forwarding configuration on start, binds the
//! dual-mode HTTP port, and relays accepted connections into the primary
//! local port. The bridge is auxiliary: failures are logged and never feed
//! back into the connection state.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::relay;
use crate::core::config::store::ForwardConfig;

pub struct ForwardService {
    id: Uuid,
    config_path: PathBuf,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ForwardService {
    pub fn new(config_path: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            config_path,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Spawns the bridge listener task.
    pub fn start(&mut self) {
        let id = self.id;
        let path = self.config_path.clone();
        let cancel = self.cancel.clone();
        self.task = Some(tokio::spawn(async move {
            let config = match read_config(&path) {
                Ok(config) => config,
                Err(err) => {
                    tracing::error!(target = "forward", worker = %id, error = %err, "config load failed");
                    return;
                }
            };
            let listener = match TcpListener::bind((config.listen_address.as_str(), config.listen_port)).await {
                Ok(listener) => listener,
                Err(err) => {
                    tracing::error!(target = "forward", worker = %id, addr = %config.listen_address, port = config.listen_port, error = %err, "bind failed");
                    return;
                }
            };
            tracing::info!(target = "forward", worker = %id, addr = %config.listen_address, port = config.listen_port, "bridge listening");
            let upstream = format!("{}:{}", config.listen_address, config.upstream_port);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!(target = "forward", worker = %id, "bridge stopped");
                        break;
                    }
                    accepted = listener.accept() => match accepted {
                        Ok((inbound, peer)) => {
                            tracing::debug!(target = "forward", worker = %id, peer = %peer, "accepted");
                            tokio::spawn(relay(inbound, upstream.clone(), "forward"));
                        }
                        Err(err) => {
                            tracing::warn!(target = "forward", worker = %id, error = %err, "accept failed");
                        }
                    }
                }
            }
        }));
    }

    /// Cancels the bridge task. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        self.task.take();
    }
}

impl Drop for ForwardService {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn read_config(path: &Path) -> Result<ForwardConfig> {
    let data = std::fs::read(path)
        .with_context(|| format!("read forward config: {}", path.display()))?;
    serde_json::from_slice(&data).context("parse forward config")
}
