//! Filesystem store for worker-consumable configuration.
//!
//! The store derives the tunnel and forwarding configuration files from a
//! profile and persists them under the base directory handed to the
//! connection at construction. Workers read these files back on start.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
};

use super::{loader, model::AppSettings};
use crate::core::profile::TunnelProfile;

/// Tunnel worker configuration, persisted as `tunnel.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelConfig {
    pub local_address: String,
    pub local_port: u16,
    pub server_address: String,
    pub server_port: u16,
    pub password: String,
}

impl TunnelConfig {
    pub fn from_profile(profile: &TunnelProfile) -> Self {
        Self {
            local_address: profile.local_address.clone(),
            local_port: profile.local_port,
            server_address: profile.server_address.clone(),
            server_port: profile.server_port,
            password: profile.password.clone(),
        }
    }
}

/// Local forwarding worker configuration, persisted as `forward.json`. The
/// bridge listens on the dual-mode HTTP port and feeds the primary port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForwardConfig {
    pub listen_address: String,
    pub listen_port: u16,
    pub upstream_port: u16,
}

impl ForwardConfig {
    pub fn from_profile(profile: &TunnelProfile) -> Self {
        Self {
            listen_address: profile.local_address.clone(),
            listen_port: profile.local_http_port,
            upstream_port: profile.local_port,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConfigStore {
    base_dir: PathBuf,
}

impl ConfigStore {
    pub fn new(base_dir: &Path) -> Self {
        Self { base_dir: base_dir.to_path_buf() }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn tunnel_config_path(&self) -> PathBuf {
        self.base_dir.join("tunnel.json")
    }

    pub fn forward_config_path(&self) -> PathBuf {
        self.base_dir.join("forward.json")
    }

    /// Reads the user preferences, initializing defaults on first use.
    pub fn load_settings(&self) -> Result<AppSettings> {
        loader::load_or_init_at(&self.base_dir)
    }

    /// Persists the tunnel worker configuration for `profile` and returns
    /// the file path the worker should load.
    pub fn write_tunnel_config(&self, profile: &TunnelProfile) -> Result<PathBuf> {
        let path = self.tunnel_config_path();
        write_json(&path, &TunnelConfig::from_profile(profile))?;
        Ok(path)
    }

    /// Persists the local forwarding configuration for `profile`.
    pub fn write_forward_config(&self, profile: &TunnelProfile) -> Result<PathBuf> {
        let path = self.forward_config_path();
        write_json(&path, &ForwardConfig::from_profile(profile))?;
        Ok(path)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).ok();
    }
    let json = serde_json::to_string_pretty(value).context("serialize config")?;
    fs::write(path, json).with_context(|| format!("write config: {}", path.display()))?;
    tracing::info!(target = "config", path = %path.display(), "config saved");
    Ok(())
}
