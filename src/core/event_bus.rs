//! Pub/Sub Event Bus for the project aggregate and its modules.
//!
//! Architecture:
//! - Listeners register under a `(name, domain)` key and get a [`ListenerId`] back
//! - trigger() invokes listeners immediately AND journals the event for poll()
//! - A trigger with a domain reaches the undomained listeners of that name first,
//!   then the listeners registered for exactly that domain
//!
//! Callback order: FIFO (first-registered, first-called) within one key.
//! The listener lists are snapshotted before dispatch, so a handler may
//! listen/unlisten/trigger freely: changes apply to the next trigger.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use log::{trace, warn};

use super::events::{BusEvent, EventName, Payload};

/// Maximum events kept in the journal before oldest are evicted
const MAX_QUEUE_SIZE: usize = 1000;

/// Shared listener callback
pub type Handler = Arc<dyn Fn(&BusEvent) + Send + Sync>;

/// Handle returned by [`EventBus::listen`], used to unlisten one registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    pub(crate) fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// Structured registry key; the domain never mixes into the name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ListenKey {
    name: EventName,
    domain: Option<String>,
}

impl ListenKey {
    /// An empty domain is no domain.
    fn new(name: EventName, domain: Option<&str>) -> Self {
        Self { name, domain: domain.filter(|d| !d.is_empty()).map(str::to_string) }
    }
}

#[derive(Clone)]
struct Listener {
    id: ListenerId,
    handler: Handler,
}

/// Event Bus with immediate dispatch and a bounded journal.
///
/// Cloning shares the registry: every clone sees the same listeners.
#[derive(Clone)]
pub struct EventBus {
    listeners: Arc<RwLock<HashMap<ListenKey, Vec<Listener>>>>,
    journal: Arc<Mutex<VecDeque<BusEvent>>>,
    next_id: Arc<AtomicU64>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("keys", &self.listeners.read().map(|l| l.len()).unwrap_or(0))
            .field("journal_len", &self.journal_len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(RwLock::new(HashMap::new())),
            journal: Arc::new(Mutex::new(VecDeque::new())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    // ========== Pub/Sub (immediate) ==========

    /// Register `handler` for `name`, optionally only for triggers tagged `domain`.
    ///
    /// Registering the same closure twice yields two independent entries.
    ///
    /// # Example
    /// ```ignore
    /// let id = bus.listen(EventName::MediaTimeUpdate, |e| seek(e), Some("timeline"));
    /// bus.unlisten(EventName::MediaTimeUpdate, Some(id), Some("timeline"));
    /// ```
    pub fn listen<F>(&self, name: impl Into<EventName>, handler: F, domain: Option<&str>) -> ListenerId
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let key = ListenKey::new(name.into(), domain);
        trace!("EventBus: listen {:?} -> {:?}", key, id);
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(key)
            .or_default()
            .push(Listener { id, handler: Arc::new(handler) });
        id
    }

    /// Remove one registration, or every registration of the key when `id` is None.
    ///
    /// Returns the number of listeners removed.
    pub fn unlisten(&self, name: impl Into<EventName>, id: Option<ListenerId>, domain: Option<&str>) -> usize {
        let key = ListenKey::new(name.into(), domain);
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let Some(list) = listeners.get_mut(&key) else {
            return 0;
        };
        let removed = match id {
            Some(id) => match list.iter().position(|l| l.id == id) {
                Some(idx) => {
                    list.remove(idx);
                    1
                }
                None => 0,
            },
            None => {
                let n = list.len();
                list.clear();
                n
            }
        };
        if list.is_empty() {
            listeners.remove(&key);
        }
        removed
    }

    /// Trigger an event: invoke listeners immediately AND journal it for poll().
    pub fn trigger(&self, name: impl Into<EventName>, data: Payload, domain: Option<&str>) {
        let domain = domain.filter(|d| !d.is_empty());
        let event = BusEvent::new(name.into(), data, domain);

        // Snapshot both lists before running anything
        let handlers: Vec<Handler> = {
            let listeners = self.listeners.read().unwrap_or_else(|e| e.into_inner());
            let mut out = Vec::new();
            if let Some(list) = listeners.get(&ListenKey::new(event.name.clone(), None)) {
                out.extend(list.iter().map(|l| Arc::clone(&l.handler)));
            }
            if domain.is_some() {
                if let Some(list) = listeners.get(&ListenKey::new(event.name.clone(), domain)) {
                    out.extend(list.iter().map(|l| Arc::clone(&l.handler)));
                }
            }
            out
        };

        trace!("EventBus: trigger {} ({} listeners)", event.name, handlers.len());
        for handler in &handlers {
            handler(&event);
        }

        let mut journal = self.journal.lock().unwrap_or_else(|e| e.into_inner());
        if journal.len() >= MAX_QUEUE_SIZE {
            let evict_count = journal.len() / 2;
            warn!("EventBus journal full ({} events), evicting oldest {}", journal.len(), evict_count);
            journal.drain(0..evict_count);
        }
        journal.push_back(event);
    }

    // ========== Deferred Processing ==========

    /// Drain the journal of events triggered since the last poll.
    pub fn poll(&self) -> Vec<BusEvent> {
        self.journal.lock().unwrap_or_else(|e| e.into_inner()).drain(..).collect()
    }

    pub fn journal_len(&self) -> usize {
        self.journal.lock().map(|j| j.len()).unwrap_or(0)
    }

    // ========== Utilities ==========

    /// Number of listeners registered under exactly `(name, domain)`.
    pub fn listener_count(&self, name: impl Into<EventName>, domain: Option<&str>) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&ListenKey::new(name.into(), domain))
            .map(|v| v.len())
            .unwrap_or(0)
    }

    /// Clear all listeners and the journal
    pub fn clear(&self) {
        self.listeners.write().unwrap_or_else(|e| e.into_inner()).clear();
        self.journal.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}
