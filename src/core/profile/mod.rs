//! Connection profile model.
//!
//! A `TunnelProfile` describes one tunnel endpoint plus the local listening
//! setup derived from it. The latency field is advisory metadata written by
//! the prober; the sentinels below mark "never measured" and "measurement
//! failed" and are distinct from every real measurement (`>= 0` ms).

pub mod uri;

use serde::{Deserialize, Serialize};

/// Latency has never been measured for this profile.
pub const LATENCY_UNKNOWN: i32 = -1;
/// Resolution or measurement failed.
pub const LATENCY_ERROR: i32 = -2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TunnelProfile {
    #[serde(default)] pub name: String,
    #[serde(default)] pub server_address: String,
    #[serde(default = "default_server_port")] pub server_port: u16,
    #[serde(default)] pub password: String,
    #[serde(default = "default_local_address")] pub local_address: String,
    #[serde(default = "default_local_port")] pub local_port: u16,
    #[serde(default = "default_local_http_port")] pub local_http_port: u16,
    #[serde(default)] pub dual_mode: bool,
    #[serde(default = "default_latency")] pub latency_ms: i32,
    #[serde(default)] pub last_used_at: Option<i64>,
}

fn default_server_port() -> u16 { 443 }
fn default_local_address() -> String { "127.0.0.1".to_string() }
fn default_local_port() -> u16 { 1080 }
fn default_local_http_port() -> u16 { 1081 }
fn default_latency() -> i32 { LATENCY_UNKNOWN }

impl Default for TunnelProfile {
    fn default() -> Self {
        Self {
            name: String::new(),
            server_address: String::new(),
            server_port: default_server_port(),
            password: String::new(),
            local_address: default_local_address(),
            local_port: default_local_port(),
            local_http_port: default_local_http_port(),
            dual_mode: false,
            latency_ms: default_latency(),
            last_used_at: None,
        }
    }
}

impl TunnelProfile {
    /// A profile is usable once the endpoint address, the credential and the
    /// local bind address are all present. Lifecycle calls do not consult
    /// this themselves; callers decide when to check.
    pub fn is_valid(&self) -> bool {
        !self.server_address.is_empty()
            && !self.password.is_empty()
            && !self.local_address.is_empty()
    }

    /// True when the latency field holds a real measurement rather than a
    /// sentinel.
    pub fn has_measured_latency(&self) -> bool {
        self.latency_ms >= 0
    }
}
