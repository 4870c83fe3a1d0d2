//! Profile and settings fixtures for integration tests.

use std::path::Path;

use crate::core::config::{loader, model::AppSettings};
use crate::core::profile::TunnelProfile;

/// Returns two distinct free localhost ports.
pub fn free_port_pair() -> (u16, u16) {
    let a = std::net::TcpListener::bind(("127.0.0.1", 0)).expect("bind probe listener");
    let b = std::net::TcpListener::bind(("127.0.0.1", 0)).expect("bind probe listener");
    let ports = (a.local_addr().unwrap().port(), b.local_addr().unwrap().port());
    drop(a);
    drop(b);
    ports
}

/// Profile bound to localhost with a measured latency, so lifecycle tests
/// do not trigger the automatic probe on start.
pub fn local_profile(local_port: u16, http_port: u16) -> TunnelProfile {
    TunnelProfile {
        name: "it".into(),
        server_address: "192.0.2.10".into(),
        password: "secret".into(),
        local_address: "127.0.0.1".into(),
        local_port,
        local_http_port: http_port,
        latency_ms: 50,
        ..TunnelProfile::default()
    }
}

/// Persists settings with the given proxy toggles under `base_dir`.
pub fn write_settings(base_dir: &Path, pac_mode: bool, auto_set: bool) {
    let mut settings = AppSettings::default();
    settings.proxy.pac_mode_enabled = pac_mode;
    settings.proxy.auto_set_system_proxy = auto_set;
    loader::save_at(&settings, base_dir).expect("write settings fixture");
}
