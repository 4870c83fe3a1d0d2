//! Recording doubles for the event bus and the system proxy setter.

use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::core::profile::TunnelProfile;
use crate::core::sysproxy::{SystemProxyMode, SystemProxySetter};
use crate::events::structured::{Event, EventBus};

/// Interleaved record of externally observable side effects.
#[derive(Debug, Clone)]
pub enum TraceEntry {
    Event(Event),
    ProxyApply(SystemProxyMode),
}

/// Shared append-only log written by [`TraceBus`] and [`TraceSetter`].
///
/// Both doubles write into the same log, so relative ordering of event
/// publishes and proxy applies can be asserted.
#[derive(Debug, Clone, Default)]
pub struct SideEffectLog {
    entries: Arc<Mutex<Vec<TraceEntry>>>,
}

impl SideEffectLog {
    pub fn snapshot(&self) -> Vec<TraceEntry> {
        self.entries.lock().unwrap().clone()
    }

    fn push(&self, entry: TraceEntry) {
        self.entries.lock().unwrap().push(entry);
    }
}

/// Event bus that appends published events to a [`SideEffectLog`].
pub struct TraceBus {
    log: SideEffectLog,
}

impl TraceBus {
    pub fn new(log: SideEffectLog) -> Self {
        Self { log }
    }
}

impl EventBus for TraceBus {
    fn publish(&self, event: Event) {
        self.log.push(TraceEntry::Event(event));
    }
}

/// Proxy setter that records apply calls instead of touching the OS.
pub struct TraceSetter {
    log: SideEffectLog,
}

impl TraceSetter {
    pub fn new(log: SideEffectLog) -> Self {
        Self { log }
    }
}

impl SystemProxySetter for TraceSetter {
    fn apply(&self, _profile: &TunnelProfile, mode: SystemProxyMode) -> Result<()> {
        self.log.push(TraceEntry::ProxyApply(mode));
        Ok(())
    }
}

/// Standalone recording setter for call sequence assertions.
#[derive(Debug, Clone, Default)]
pub struct RecordingProxySetter {
    calls: Arc<Mutex<Vec<SystemProxyMode>>>,
}

impl RecordingProxySetter {
    pub fn calls(&self) -> Vec<SystemProxyMode> {
        self.calls.lock().unwrap().clone()
    }
}

impl SystemProxySetter for RecordingProxySetter {
    fn apply(&self, _profile: &TunnelProfile, mode: SystemProxyMode) -> Result<()> {
        self.calls.lock().unwrap().push(mode);
        Ok(())
    }
}

/// Setter whose apply always fails, for the warn-and-continue path.
#[derive(Debug, Default)]
pub struct FailingProxySetter;

impl SystemProxySetter for FailingProxySetter {
    fn apply(&self, _profile: &TunnelProfile, _mode: SystemProxyMode) -> Result<()> {
        anyhow::bail!("proxy backend unavailable")
    }
}
