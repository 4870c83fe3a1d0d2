//! Tunnel worker: owns the primary local listener for one running episode.
//!
//! The worker loads the persisted tunnel configuration, binds the primary
//! local port, and relays accepted connections to the remote endpoint. A
//! bind failure is reported once through the payload-free start-failure
//! channel and the task ends; the connection reacts on its own timeline.

use std::path::Path;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::relay;
use crate::core::config::store::TunnelConfig;

pub struct TunnelService {
    id: Uuid,
    config: Option<TunnelConfig>,
    failure_tx: mpsc::Sender<()>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl TunnelService {
    pub fn new(failure_tx: mpsc::Sender<()>) -> Self {
        Self {
            id: Uuid::new_v4(),
            config: None,
            failure_tx,
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Reads the persisted tunnel configuration written by the store.
    pub fn load_config(&mut self, path: &Path) -> Result<()> {
        let data = std::fs::read(path)
            .with_context(|| format!("read tunnel config: {}", path.display()))?;
        let config: TunnelConfig =
            serde_json::from_slice(&data).context("parse tunnel config")?;
        self.config = Some(config);
        Ok(())
    }

    /// Spawns the listener task. Bind failures surface on the start-failure
    /// channel, never here.
    pub fn start(&mut self) {
        let id = self.id;
        let tx = self.failure_tx.clone();
        let Some(config) = self.config.clone() else {
            tokio::spawn(async move {
                tracing::error!(target = "tunnel", worker = %id, "started without loaded config");
                let _ = tx.send(()).await;
            });
            return;
        };
        let cancel = self.cancel.clone();
        self.task = Some(tokio::spawn(async move {
            let listener = match TcpListener::bind((config.local_address.as_str(), config.local_port)).await {
                Ok(listener) => listener,
                Err(err) => {
                    tracing::error!(target = "tunnel", worker = %id, addr = %config.local_address, port = config.local_port, error = %err, "bind failed");
                    let _ = tx.send(()).await;
                    return;
                }
            };
            tracing::info!(target = "tunnel", worker = %id, addr = %config.local_address, port = config.local_port, "tunnel listening");
            let upstream = format!("{}:{}", config.server_address, config.server_port);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!(target = "tunnel", worker = %id, "tunnel stopped");
                        break;
                    }
                    accepted = listener.accept() => match accepted {
                        Ok((inbound, peer)) => {
                            tracing::debug!(target = "tunnel", worker = %id, peer = %peer, "accepted");
                            tokio::spawn(relay(inbound, upstream.clone(), "tunnel"));
                        }
                        Err(err) => {
                            tracing::warn!(target = "tunnel", worker = %id, error = %err, "accept failed");
                        }
                    }
                }
            }
        }));
    }

    /// Cancels the listener task. Safe to call repeatedly.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        self.task.take();
    }
}

impl Drop for TunnelService {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
