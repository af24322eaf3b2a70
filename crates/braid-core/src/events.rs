//! Live event hub for real-time note notifications.
//!
//! The hub keeps two registries of subscriber sinks: a broadcast registry that
//! every subscriber joins, and a per-owner registry for events scoped to one
//! user. Delivery is fire-and-forget over bounded channels; a full sink is
//! skipped, a closed one is pruned on the next send, and a [`Subscription`]
//! deregisters itself on drop. Event publication never fails and never blocks
//! the publishing operation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use tokio::sync::mpsc;

use crate::models::NotePayload;

// ============================================================================
// Events
// ============================================================================

/// Event name constants, as they appear on the wire.
pub mod event_names {
    pub const HELLO: &str = "hello";
    pub const PING: &str = "ping";
    pub const NOTE_CREATED: &str = "note_created";
    pub const NOTE_UPDATED: &str = "note_updated";
    pub const NOTE_DELETED: &str = "note_deleted";
    pub const NOTES_REORDERED: &str = "notes_reordered";
    pub const FEED_CHANGED: &str = "feed_changed";
}

/// A domain event delivered to live subscribers.
#[derive(Debug, Clone)]
pub enum Event {
    /// Sent once to a fresh subscriber, confirming the stream is live.
    Hello,
    /// Periodic keep-alive.
    Ping,
    /// A note was created. Carries the decrypted payload the owner sees.
    NoteCreated(NotePayload),
    /// A note was updated.
    NoteUpdated(NotePayload),
    /// A note was deleted.
    NoteDeleted { id: i64 },
    /// An owner replaced their explicit note order.
    NotesReordered { note_ids: Vec<i64> },
    /// The set or content of public notes changed; feed views should refresh.
    /// `kind` names the mutation that triggered the change.
    FeedChanged { kind: &'static str, id: i64 },
}

impl Event {
    /// Wire-level event name.
    pub fn name(&self) -> &'static str {
        match self {
            Event::Hello => event_names::HELLO,
            Event::Ping => event_names::PING,
            Event::NoteCreated(_) => event_names::NOTE_CREATED,
            Event::NoteUpdated(_) => event_names::NOTE_UPDATED,
            Event::NoteDeleted { .. } => event_names::NOTE_DELETED,
            Event::NotesReordered { .. } => event_names::NOTES_REORDERED,
            Event::FeedChanged { .. } => event_names::FEED_CHANGED,
        }
    }

    /// JSON payload carried in the frame's `data:` line.
    pub fn payload(&self) -> JsonValue {
        match self {
            Event::Hello => json!({ "ok": 1 }),
            Event::Ping => json!({ "at": Utc::now().timestamp() }),
            Event::NoteCreated(note) | Event::NoteUpdated(note) => {
                serde_json::to_value(note).unwrap_or(JsonValue::Null)
            }
            Event::NoteDeleted { id } => json!({ "id": id }),
            Event::NotesReordered { note_ids } => json!({ "order": note_ids }),
            Event::FeedChanged { kind, id } => json!({ "type": kind, "id": id }),
        }
    }

    /// Render the complete wire frame for this event.
    pub fn to_frame(&self) -> String {
        sse_frame(self.name(), &self.payload())
    }
}

/// Format one server-sent-events frame.
pub fn sse_frame(name: &str, data: &JsonValue) -> String {
    format!("event: {name}\ndata: {data}\n\n")
}

// ============================================================================
// Hub
// ============================================================================

/// Default per-subscriber frame buffer. A subscriber this far behind starts
/// missing frames rather than stalling publishers.
pub const DEFAULT_SINK_CAPACITY: usize = 64;

type Sink = mpsc::Sender<String>;

#[derive(Default)]
struct Registries {
    next_id: u64,
    /// Every live sink, keyed by subscription id.
    broadcast: HashMap<u64, Sink>,
    /// Owner-scoped view of the same sinks, for targeted delivery.
    by_owner: HashMap<i64, HashMap<u64, Sink>>,
}

/// In-process publish/subscribe hub.
///
/// Shared as `Arc<EventHub>` and injected into the services that publish;
/// there is no global instance. All registry access goes through one mutex,
/// held only for registry manipulation and the non-blocking sends.
pub struct EventHub {
    registries: Mutex<Registries>,
    sink_capacity: usize,
}

impl Default for EventHub {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_SINK_CAPACITY)
    }
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a hub whose subscriber sinks buffer `capacity` frames.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            registries: Mutex::new(Registries::default()),
            sink_capacity: capacity.max(1),
        }
    }

    /// Register a subscriber.
    ///
    /// Every subscriber joins the broadcast registry; passing an owner id
    /// additionally registers the sink for that owner's scoped events. The
    /// returned subscription has a `hello` frame already queued.
    pub fn subscribe(self: &Arc<Self>, owner_id: Option<i64>) -> Subscription {
        let (tx, rx) = mpsc::channel(self.sink_capacity);
        let _ = tx.try_send(Event::Hello.to_frame());

        let id = {
            let mut reg = self.lock_registries();
            let id = reg.next_id;
            reg.next_id += 1;
            reg.broadcast.insert(id, tx.clone());
            if let Some(owner) = owner_id {
                reg.by_owner.entry(owner).or_default().insert(id, tx);
            }
            id
        };

        tracing::debug!(
            subsystem = "events",
            op = "subscribe",
            subscription_id = id,
            owner_id = owner_id,
            "subscriber registered"
        );

        Subscription {
            id,
            owner_id,
            rx,
            hub: Arc::downgrade(self),
        }
    }

    /// Deliver an event to every live subscriber.
    pub fn broadcast(&self, event: &Event) {
        let frame = event.to_frame();
        let delivered = {
            let mut reg = self.lock_registries();
            Self::fan_out(&mut reg, None, &frame)
        };
        tracing::trace!(
            subsystem = "events",
            event = event.name(),
            sink_count = delivered,
            "broadcast"
        );
    }

    /// Deliver an event to one owner's subscribers only.
    pub fn send_to_owner(&self, owner_id: i64, event: &Event) {
        let frame = event.to_frame();
        let delivered = {
            let mut reg = self.lock_registries();
            Self::fan_out(&mut reg, Some(owner_id), &frame)
        };
        tracing::trace!(
            subsystem = "events",
            event = event.name(),
            owner_id = owner_id,
            sink_count = delivered,
            "owner send"
        );
    }

    /// Number of live subscribers.
    pub fn sink_count(&self) -> usize {
        self.lock_registries().broadcast.len()
    }

    /// Number of live subscribers scoped to one owner.
    pub fn owner_sink_count(&self, owner_id: i64) -> usize {
        self.lock_registries()
            .by_owner
            .get(&owner_id)
            .map_or(0, HashMap::len)
    }

    /// Spawn the periodic keep-alive task. The task exits once the hub is
    /// dropped by everyone else.
    pub fn spawn_keepalive(hub: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let hub = Arc::downgrade(&hub);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match hub.upgrade() {
                    Some(hub) => hub.broadcast(&Event::Ping),
                    None => break,
                }
            }
        })
    }

    fn fan_out(reg: &mut Registries, owner_id: Option<i64>, frame: &str) -> usize {
        use mpsc::error::TrySendError;

        let mut dead: Vec<(u64, Option<i64>)> = Vec::new();
        let mut delivered = 0;

        // A full sink is skipped (the subscriber is behind, not gone); a
        // closed one is pruned.
        match owner_id {
            None => {
                for (&id, sink) in &reg.broadcast {
                    match sink.try_send(frame.to_string()) {
                        Ok(()) => delivered += 1,
                        Err(TrySendError::Full(_)) => {}
                        Err(TrySendError::Closed(_)) => dead.push((id, None)),
                    }
                }
            }
            Some(owner) => {
                if let Some(sinks) = reg.by_owner.get(&owner) {
                    for (&id, sink) in sinks {
                        match sink.try_send(frame.to_string()) {
                            Ok(()) => delivered += 1,
                            Err(TrySendError::Full(_)) => {}
                            Err(TrySendError::Closed(_)) => dead.push((id, Some(owner))),
                        }
                    }
                }
            }
        }

        for (id, owner) in dead {
            // A dead sink found via either registry is dead in both.
            Self::remove(reg, id, owner);
        }

        delivered
    }

    fn remove(reg: &mut Registries, id: u64, owner_id: Option<i64>) {
        reg.broadcast.remove(&id);
        match owner_id {
            Some(owner) => {
                if let Some(sinks) = reg.by_owner.get_mut(&owner) {
                    sinks.remove(&id);
                    if sinks.is_empty() {
                        reg.by_owner.remove(&owner);
                    }
                }
            }
            // Owner unknown when the dead sink surfaced through a broadcast.
            None => {
                reg.by_owner.retain(|_, sinks| {
                    sinks.remove(&id);
                    !sinks.is_empty()
                });
            }
        }
    }

    fn lock_registries(&self) -> std::sync::MutexGuard<'_, Registries> {
        // The mutex only guards registry maps; a poisoned lock would mean a
        // panic inside a non-blocking send, which cannot happen.
        match self.registries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// A live subscriber handle: receive frames, deregister on drop.
pub struct Subscription {
    id: u64,
    owner_id: Option<i64>,
    rx: mpsc::Receiver<String>,
    hub: Weak<EventHub>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Receive the next wire frame. Returns `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    /// Non-blocking receive for draining already-queued frames.
    pub fn try_recv(&mut self) -> Option<String> {
        self.rx.try_recv().ok()
    }

    /// Stop accepting frames without deregistering. Subsequent deliveries to
    /// this sink fail and prune it from the hub's registries.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            let mut reg = hub.lock_registries();
            EventHub::remove(&mut reg, self.id, self.owner_id);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
