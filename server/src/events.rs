//! Lease and status change events (§6, §9).
//!
//! Delivered over a broadcast channel rather than a synchronous
//! callback, so a subscriber persisting a snapshot never extends a
//! critical section inside the lease table or the engine.

use tokio::sync::broadcast;

use crate::lease::Lease;

/// Channel depth; a slow subscriber drops the oldest events rather than
/// back-pressuring the engine.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// A lease lifecycle event, carrying a cloned snapshot (§4.3).
#[derive(Debug, Clone)]
pub enum LeaseEvent {
    /// The first time a lease becomes visible (§4.3 `update`/`make_static`).
    Added(Lease),
    /// Any subsequent mutation of a visible lease.
    Changed(Lease),
    /// The lease record was deleted from the table.
    Removed(Lease),
}

/// Why the server stopped, surfaced alongside the `active` flag (§5
/// "Cancellation").
#[derive(Debug, Clone)]
pub struct StatusChange {
    pub active: bool,
    pub reason: Option<String>,
}

/// The sending half of the lease-event broadcast, held by the table.
#[derive(Clone)]
pub struct LeaseEventSender(broadcast::Sender<LeaseEvent>);

impl LeaseEventSender {
    pub fn new() -> (Self, broadcast::Receiver<LeaseEvent>) {
        let (tx, rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        (LeaseEventSender(tx), rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LeaseEvent> {
        self.0.subscribe()
    }

    /// Broadcasting is best-effort: an event with no subscribers is
    /// simply dropped.
    pub fn send(&self, event: LeaseEvent) {
        let _ = self.0.send(event);
    }
}
