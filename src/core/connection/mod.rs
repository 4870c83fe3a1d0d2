//! Connection lifecycle orchestration.
//!
//! A connection owns one profile and drives it between stopped and running.
//! Every state transition and event publish happens under one mutex, so
//! observers always see transitions in the order they occurred. Worker
//! failures and probe results arrive on per-episode channels and are folded
//! back into the state by listener tasks.

pub mod port;

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::core::config::store::ConfigStore;
use crate::core::latency;
use crate::core::pac::PacWriter;
use crate::core::profile::{uri, TunnelProfile, LATENCY_UNKNOWN};
use crate::core::service::forward::ForwardService;
use crate::core::service::tunnel::TunnelService;
use crate::core::sysproxy::{DesktopProxySetter, SystemProxyMode, SystemProxySetter};
use crate::events::structured::{ConnectionEvent, Event, EventBus};

struct ConnectionInner {
    profile: TunnelProfile,
    running: bool,
    tunnel: Option<TunnelService>,
    forward: Option<ForwardService>,
}

/// Single-profile connection orchestrator.
///
/// Holds worker handles only while an episode is live: `start` creates
/// fresh workers and channels, `stop` and the failure path release them.
pub struct Connection {
    inner: Arc<Mutex<ConnectionInner>>,
    store: ConfigStore,
    bus: Arc<dyn EventBus>,
    proxy_setter: Arc<dyn SystemProxySetter>,
}

impl Connection {
    pub fn new(profile: TunnelProfile, base_dir: &Path, bus: Arc<dyn EventBus>) -> Self {
        let setter = Arc::new(DesktopProxySetter::new(base_dir.to_path_buf()));
        Self::with_proxy_setter(profile, base_dir, bus, setter)
    }

    /// Constructor with an injected proxy setter, used by tests.
    pub fn with_proxy_setter(
        profile: TunnelProfile,
        base_dir: &Path,
        bus: Arc<dyn EventBus>,
        proxy_setter: Arc<dyn SystemProxySetter>,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ConnectionInner {
                profile,
                running: false,
                tunnel: None,
                forward: None,
            })),
            store: ConfigStore::new(base_dir),
            bus,
            proxy_setter,
        }
    }

    /// Builds a connection from a share link.
    pub fn from_uri(link: &str, base_dir: &Path, bus: Arc<dyn EventBus>) -> Result<Self> {
        let profile = uri::parse(link).context("parse share link")?;
        Ok(Self::new(profile, base_dir, bus))
    }

    pub fn profile(&self) -> TunnelProfile {
        self.inner.lock().unwrap().profile.clone()
    }

    pub fn name(&self) -> String {
        self.inner.lock().unwrap().profile.name.clone()
    }

    pub fn uri(&self) -> String {
        uri::render(&self.inner.lock().unwrap().profile)
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock().unwrap().running
    }

    pub fn is_valid(&self) -> bool {
        self.inner.lock().unwrap().profile.is_valid()
    }

    /// Kicks off a latency probe against the profile's server endpoint.
    /// The result is folded into the profile and published asynchronously.
    pub fn latency_test(&self) {
        let (address, port) = {
            let guard = self.inner.lock().unwrap();
            (guard.profile.server_address.clone(), guard.profile.server_port)
        };
        let (tx, rx) = mpsc::channel(1);
        latency::spawn_probe(address, port, tx);
        self.spawn_latency_listener(rx);
    }

    /// Brings the connection up.
    ///
    /// Persists worker configuration, checks the local ports, starts the
    /// tunnel worker (and the HTTP bridge in dual mode), then publishes the
    /// state change and applies desktop proxy settings when enabled. A local
    /// port conflict aborts the attempt with a `StateChanged(false)` publish;
    /// worker bind errors surface later through the failure channel.
    pub fn start(&self) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        if guard.running {
            tracing::warn!(target = "connection", name = %guard.profile.name, "start ignored: already running");
            return Ok(());
        }

        if guard.profile.latency_ms == LATENCY_UNKNOWN {
            let (tx, rx) = mpsc::channel(1);
            latency::spawn_probe(
                guard.profile.server_address.clone(),
                guard.profile.server_port,
                tx,
            );
            self.spawn_latency_listener(rx);
        }
        guard.profile.last_used_at = Some(epoch_ms());

        let settings = self.store.load_settings()?;

        let (failure_tx, failure_rx) = mpsc::channel(1);
        let mut tunnel = TunnelService::new(failure_tx);
        let mut forward = ForwardService::new(self.store.forward_config_path());
        let pac_writer = PacWriter::new(self.store.base_dir().to_path_buf());

        let tunnel_path = self.store.write_tunnel_config(&guard.profile)?;
        self.store.write_forward_config(&guard.profile)?;
        tunnel.load_config(&tunnel_path)?;

        let local_conflict = port::is_in_use(&guard.profile.local_address, guard.profile.local_port);
        let http_conflict =
            port::is_in_use(&guard.profile.local_address, guard.profile.local_http_port);
        if local_conflict || http_conflict {
            tracing::error!(
                target = "connection",
                name = %guard.profile.name,
                addr = %guard.profile.local_address,
                local_port = guard.profile.local_port,
                http_port = guard.profile.local_http_port,
                "local port already in use"
            );
            self.publish_state(&guard.profile.name, false);
            return Ok(());
        }

        guard.running = true;
        let worker_id = tunnel.id();
        tunnel.start();
        self.spawn_failure_listener(worker_id, failure_rx);
        guard.tunnel = Some(tunnel);
        if guard.profile.dual_mode {
            forward.start();
            guard.forward = Some(forward);
        }

        if settings.proxy.pac_mode_enabled {
            if let Err(err) = pac_writer.regenerate(&guard.profile) {
                tracing::warn!(target = "config", error = %err, "pac regeneration failed");
            }
        }
        tracing::info!(target = "connection", name = %guard.profile.name, worker = %worker_id, "connection started");
        self.publish_state(&guard.profile.name, true);

        if settings.proxy.auto_set_system_proxy {
            let mode = if settings.proxy.pac_mode_enabled {
                SystemProxyMode::Pac
            } else {
                SystemProxyMode::Proxy
            };
            if let Err(err) = self.proxy_setter.apply(&guard.profile, mode) {
                tracing::warn!(target = "sysproxy", error = %err, "failed to apply system proxy");
            }
        }
        Ok(())
    }

    /// Brings the connection down. Calling stop on a stopped connection is
    /// a no-op.
    pub fn stop(&self) -> Result<()> {
        let mut guard = self.inner.lock().unwrap();
        if !guard.running {
            tracing::debug!(target = "connection", name = %guard.profile.name, "stop ignored: not running");
            return Ok(());
        }
        guard.running = false;
        if let Some(mut tunnel) = guard.tunnel.take() {
            tunnel.stop();
        }
        if let Some(mut forward) = guard.forward.take() {
            forward.stop();
        }
        tracing::info!(target = "connection", name = %guard.profile.name, "connection stopped");
        self.publish_state(&guard.profile.name, false);

        let settings = self.store.load_settings()?;
        if settings.proxy.auto_set_system_proxy {
            if let Err(err) = self.proxy_setter.apply(&guard.profile, SystemProxyMode::Off) {
                tracing::warn!(target = "sysproxy", error = %err, "failed to restore system proxy");
            }
        }
        Ok(())
    }

    fn publish_state(&self, name: &str, running: bool) {
        self.bus.publish(Event::Connection(ConnectionEvent::StateChanged {
            name: name.to_string(),
            running,
        }));
    }

    fn spawn_failure_listener(&self, worker_id: Uuid, mut rx: mpsc::Receiver<()>) {
        let inner = Arc::clone(&self.inner);
        let bus = Arc::clone(&self.bus);
        let setter = Arc::clone(&self.proxy_setter);
        let store = self.store.clone();
        tokio::spawn(async move {
            if rx.recv().await.is_some() {
                handle_worker_failure(&inner, &bus, &setter, &store, worker_id);
            }
        });
    }

    fn spawn_latency_listener(&self, mut rx: mpsc::Receiver<i32>) {
        let inner = Arc::clone(&self.inner);
        let bus = Arc::clone(&self.bus);
        tokio::spawn(async move {
            while let Some(latency) = rx.recv().await {
                apply_latency(&inner, &bus, latency);
            }
        });
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

/// Folds an asynchronous worker failure back into the connection state.
///
/// The worker id ties the signal to its episode: a signal from a worker
/// that is no longer the current tunnel (stopped, or replaced by a newer
/// start) is ignored.
fn handle_worker_failure(
    inner: &Mutex<ConnectionInner>,
    bus: &Arc<dyn EventBus>,
    setter: &Arc<dyn SystemProxySetter>,
    store: &ConfigStore,
    worker_id: Uuid,
) {
    let mut guard = inner.lock().unwrap();
    if guard.tunnel.as_ref().map(|t| t.id()) != Some(worker_id) {
        tracing::debug!(target = "connection", worker = %worker_id, "stale failure signal ignored");
        return;
    }
    guard.running = false;
    if let Some(mut tunnel) = guard.tunnel.take() {
        tunnel.stop();
    }
    if let Some(mut forward) = guard.forward.take() {
        forward.stop();
    }
    tracing::error!(target = "connection", name = %guard.profile.name, worker = %worker_id, "tunnel worker failed to start");
    bus.publish(Event::Connection(ConnectionEvent::StateChanged {
        name: guard.profile.name.clone(),
        running: false,
    }));
    bus.publish(Event::Connection(ConnectionEvent::StartFailed {
        name: guard.profile.name.clone(),
    }));
    match store.load_settings() {
        Ok(settings) if settings.proxy.auto_set_system_proxy => {
            if let Err(err) = setter.apply(&guard.profile, SystemProxyMode::Off) {
                tracing::warn!(target = "sysproxy", error = %err, "failed to restore system proxy");
            }
        }
        Ok(_) => {}
        Err(err) => {
            tracing::warn!(target = "connection", error = %err, "settings unavailable during failure cleanup");
        }
    }
}

fn apply_latency(inner: &Mutex<ConnectionInner>, bus: &Arc<dyn EventBus>, latency: i32) {
    let mut guard = inner.lock().unwrap();
    guard.profile.latency_ms = latency;
    tracing::info!(target = "latency", name = %guard.profile.name, latency_ms = latency, "latency updated");
    bus.publish(Event::Connection(ConnectionEvent::LatencyAvailable {
        name: guard.profile.name.clone(),
        latency_ms: latency,
    }));
}

fn epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::structured::MemoryEventBus;
    use crate::tests_support::event_assert::{assert_no_start_failure, assert_state_sequence};

    fn free_port() -> u16 {
        let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        listener.local_addr().unwrap().port()
    }

    fn profile(local_port: u16, http_port: u16) -> TunnelProfile {
        TunnelProfile {
            name: "unit".into(),
            server_address: "192.0.2.10".into(),
            password: "secret".into(),
            local_port,
            local_http_port: http_port,
            latency_ms: 50,
            ..TunnelProfile::default()
        }
    }

    fn current_worker_id(conn: &Connection) -> Option<Uuid> {
        conn.inner.lock().unwrap().tunnel.as_ref().map(|t| t.id())
    }

    #[test]
    fn test_accessors_reflect_profile() {
        let dir = tempfile::TempDir::new().unwrap();
        let bus = Arc::new(MemoryEventBus::new());
        let conn = Connection::new(profile(1080, 1081), dir.path(), bus);
        assert!(!conn.is_running());
        assert!(conn.is_valid());
        assert_eq!(conn.name(), "unit");
        assert!(conn.uri().starts_with("trojan://"));
        assert_eq!(conn.profile().local_port, 1080);
    }

    #[test]
    fn test_from_uri_rejects_other_schemes() {
        let dir = tempfile::TempDir::new().unwrap();
        let bus = Arc::new(MemoryEventBus::new());
        assert!(Connection::from_uri("ss://user@host:443", dir.path(), bus).is_err());
    }

    #[tokio::test]
    async fn test_start_rejected_when_local_port_in_use() {
        let dir = tempfile::TempDir::new().unwrap();
        let bus = Arc::new(MemoryEventBus::new());
        let occupied = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let local_port = occupied.local_addr().unwrap().port();
        let conn = Connection::new(
            profile(local_port, free_port()),
            dir.path(),
            bus.clone(),
        );

        conn.start().unwrap();
        assert!(!conn.is_running());
        let events = bus.snapshot();
        assert_state_sequence(&events, &[false]);
        assert_no_start_failure(&events);
        drop(occupied);
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let dir = tempfile::TempDir::new().unwrap();
        let bus = Arc::new(MemoryEventBus::new());
        let conn = Connection::new(profile(free_port(), free_port()), dir.path(), bus.clone());
        conn.stop().unwrap();
        conn.stop().unwrap();
        assert!(bus.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_failure_signal_from_stopped_worker_is_ignored() {
        let dir = tempfile::TempDir::new().unwrap();
        let bus = Arc::new(MemoryEventBus::new());
        let (local_port, http_port) = crate::tests_support::fixtures::free_port_pair();
        let conn = Connection::new(profile(local_port, http_port), dir.path(), bus.clone());

        conn.start().unwrap();
        let old_id = current_worker_id(&conn).expect("running episode has a tunnel worker");
        conn.stop().unwrap();

        // the old episode's signal lands after its worker is gone
        handle_worker_failure(&conn.inner, &conn.bus, &conn.proxy_setter, &conn.store, old_id);

        assert!(!conn.is_running());
        let events = bus.snapshot();
        assert_state_sequence(&events, &[true, false]);
        assert_no_start_failure(&events);
    }

    #[tokio::test]
    async fn test_failure_signal_from_replaced_worker_keeps_new_episode() {
        let dir = tempfile::TempDir::new().unwrap();
        let bus = Arc::new(MemoryEventBus::new());
        let (local_port, http_port) = crate::tests_support::fixtures::free_port_pair();
        let conn = Connection::new(profile(local_port, http_port), dir.path(), bus.clone());

        conn.start().unwrap();
        let first_id = current_worker_id(&conn).expect("running episode has a tunnel worker");
        conn.stop().unwrap();
        conn.start().unwrap();
        let second_id = current_worker_id(&conn).expect("running episode has a tunnel worker");
        assert_ne!(first_id, second_id);

        handle_worker_failure(&conn.inner, &conn.bus, &conn.proxy_setter, &conn.store, first_id);

        assert!(conn.is_running());
        assert_eq!(current_worker_id(&conn), Some(second_id));
        let events = bus.snapshot();
        assert_state_sequence(&events, &[true, false, true]);
        assert_no_start_failure(&events);
        conn.stop().unwrap();
    }
}
