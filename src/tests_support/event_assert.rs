//! Event assertion helpers shared by unit and integration tests.
pub use crate::events::structured::{ConnectionEvent, Event};

pub fn collect_connection(events: &[Event]) -> Vec<ConnectionEvent> { events.iter().map(|e| match e { Event::Connection(c) => c.clone() }).collect() }
pub fn state_values(events: &[Event]) -> Vec<bool> { collect_connection(events).into_iter().filter_map(|c| match c { ConnectionEvent::StateChanged { running, .. } => Some(running), _ => None }).collect() }
pub fn latency_values(events: &[Event]) -> Vec<i32> { collect_connection(events).into_iter().filter_map(|c| match c { ConnectionEvent::LatencyAvailable { latency_ms, .. } => Some(latency_ms), _ => None }).collect() }
pub fn count_start_failures(events: &[Event]) -> usize { collect_connection(events).iter().filter(|c| matches!(c, ConnectionEvent::StartFailed { .. })).count() }

pub fn assert_state_sequence(events: &[Event], expected: &[bool]) { let got = state_values(events); assert_eq!(got.as_slice(), expected, "state sequence mismatch got={got:?}"); }
pub fn assert_single_start_failure(events: &[Event], name: &str) {
    let hits: Vec<_> = collect_connection(events).into_iter().filter(|c| matches!(c, ConnectionEvent::StartFailed { name: n } if n == name)).collect();
    assert_eq!(hits.len(), 1, "expected exactly one start failure for {name} got={hits:?}");
}
pub fn assert_no_start_failure(events: &[Event]) { let cnt = count_start_failures(events); assert_eq!(cnt, 0, "unexpected start failure events: {cnt}"); }
#[allow(dead_code)] pub fn debug_dump(events: &[Event]) { for e in events { eprintln!("STRUCTURED_EVENT: {e:?}"); } }
