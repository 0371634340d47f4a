//! Per-assignment fan-out registry.
//!
//! Each live subscription (an SSE stream or one room joined over a
//! WebSocket) owns a [`Membership`]. Dropping the membership removes the
//! subscriber, and the assignment entry with it once it is empty.
//!
//! Delivery rule: every stream subscriber gets every message. Rooms carry
//! chat events only for members that identify themselves with a client id,
//! and only while that client id has no stream subscription on the same
//! assignment. An anonymous room member receives no chat events, so a
//! client connected both ways sees each message once.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use tutordesk_core::Message;
use uuid::Uuid;

/// Buffered messages per subscriber before deliveries are dropped.
pub const OUTBOX_CAPACITY: usize = 64;

pub type Delivery = Arc<Message>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// Server-sent events.
    Stream,
    /// WebSocket room.
    Room,
}

struct Subscriber {
    key: u64,
    client_id: Option<String>,
    transport: Transport,
    outbox: mpsc::Sender<Delivery>,
}

#[derive(Default)]
pub struct Registry {
    assignments: Mutex<HashMap<Uuid, Vec<Subscriber>>>,
    next_key: AtomicU64,
}

impl Registry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register `outbox` for messages of `assignment_id`.
    pub fn subscribe(
        self: &Arc<Self>,
        assignment_id: Uuid,
        client_id: Option<String>,
        transport: Transport,
        outbox: mpsc::Sender<Delivery>,
    ) -> Membership {
        let key = self.next_key.fetch_add(1, Ordering::Relaxed);
        debug!(assignment = %assignment_id, key, ?client_id, ?transport, "Subscriber added");
        self.assignments
            .lock()
            .entry(assignment_id)
            .or_default()
            .push(Subscriber {
                key,
                client_id,
                transport,
                outbox,
            });
        Membership {
            registry: Arc::downgrade(self),
            assignment_id,
            key,
        }
    }

    fn remove(&self, assignment_id: Uuid, key: u64) {
        let mut assignments = self.assignments.lock();
        if let Some(subscribers) = assignments.get_mut(&assignment_id) {
            subscribers.retain(|s| s.key != key);
            if subscribers.is_empty() {
                assignments.remove(&assignment_id);
            }
        }
        debug!(assignment = %assignment_id, key, "Subscriber removed");
    }

    /// Deliver `message` to the subscribers of its assignment. Returns how
    /// many subscribers it was handed to.
    pub fn publish(&self, message: Delivery) -> usize {
        let assignments = self.assignments.lock();
        let Some(subscribers) = assignments.get(&message.assignment_id) else {
            return 0;
        };

        let streaming: HashSet<&str> = subscribers
            .iter()
            .filter(|s| s.transport == Transport::Stream)
            .filter_map(|s| s.client_id.as_deref())
            .collect();

        let mut delivered = 0;
        for s in subscribers {
            if s.transport == Transport::Room
                && s.client_id
                    .as_deref()
                    .map_or(true, |id| streaming.contains(id))
            {
                continue;
            }
            match s.outbox.try_send(Arc::clone(&message)) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(assignment = %message.assignment_id, key = s.key, "Subscriber lagging, message dropped")
                }
                // Receiver gone; its membership is about to be dropped.
                Err(TrySendError::Closed(_)) => {}
            }
        }
        delivered
    }

    pub fn subscriber_count(&self, assignment_id: Uuid) -> usize {
        self.assignments
            .lock()
            .get(&assignment_id)
            .map_or(0, Vec::len)
    }

    /// Number of assignments with at least one subscriber.
    pub fn assignment_count(&self) -> usize {
        self.assignments.lock().len()
    }
}

/// A live subscription. Unsubscribes on drop.
#[must_use = "dropping a membership unsubscribes immediately"]
pub struct Membership {
    registry: Weak<Registry>,
    assignment_id: Uuid,
    key: u64,
}

impl Membership {
    pub fn assignment_id(&self) -> Uuid {
        self.assignment_id
    }
}

impl Drop for Membership {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.assignment_id, self.key);
        }
    }
}

impl std::fmt::Debug for Membership {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Membership")
            .field("assignment_id", &self.assignment_id)
            .field("key", &self.key)
            .finish()
    }
}
