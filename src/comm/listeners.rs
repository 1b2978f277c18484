//! Per-endpoint `type -> ordered callbacks` registry.
//!
//! Same contract as the event bus, keyed by message type: insertion order
//! is invocation order, duplicates are independent, dispatch runs over a
//! snapshot.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde_json::Value;

use crate::core::ListenerId;
use crate::error::{ButterError, ButterResult};

pub type MessageHandler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Clone, Default)]
pub struct ListenerRegistry {
    listeners: Arc<RwLock<HashMap<String, Vec<(ListenerId, MessageHandler)>>>>,
    next_id: Arc<AtomicU64>,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let types: Vec<String> = self
            .listeners
            .read()
            .map(|l| l.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("ListenerRegistry").field("types", &types).finish()
    }
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn listen<F>(&self, kind: &str, handler: F) -> ButterResult<ListenerId>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        if kind.is_empty() {
            return Err(ButterError::invalid("listener needs a message type"));
        }
        let id = ListenerId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .entry(kind.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        Ok(id)
    }

    /// Drop one listener, or all listeners of `kind` when `id` is None.
    pub fn forget(&self, kind: &str, id: Option<ListenerId>) -> usize {
        let mut listeners = self.listeners.write().unwrap_or_else(|e| e.into_inner());
        let Some(list) = listeners.get_mut(kind) else {
            return 0;
        };
        let before = list.len();
        match id {
            Some(id) => list.retain(|(lid, _)| *lid != id),
            None => list.clear(),
        }
        let removed = before - list.len();
        if list.is_empty() {
            listeners.remove(kind);
        }
        removed
    }

    /// Invoke every listener of `kind`. Returns how many ran.
    pub fn dispatch(&self, kind: &str, message: &Value) -> usize {
        let handlers: Vec<MessageHandler> = self
            .listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(kind)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();
        for handler in &handlers {
            handler(message);
        }
        handlers.len()
    }

    pub fn count(&self, kind: &str) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(kind)
            .map(Vec::len)
            .unwrap_or(0)
    }
}
