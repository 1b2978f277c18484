//! Browsing-context transport.
//!
//! A [`HostContext`] is the embedding page: every context it opens posts
//! into the host's single inbox, tagged with its [`ContextId`], the way all
//! `message` events land on one window. The host side keeps a
//! [`ContextHandle`] per opened context; the embedded side gets an
//! [`EmbeddedContext`] with the mirror operations.
//!
//! ```text
//! HostContext ──open_context()──► (ContextHandle, EmbeddedContext)
//!     ▲   inbox: HostSignal{source, Loaded|Unloaded|Message}  │
//!     └──────────────────────────────────────────────────────┘
//! ContextHandle::post_message ───────► EmbeddedContext::try_recv
//! ```

use std::fmt;

use crossbeam_channel::{Receiver, Sender, TryRecvError, unbounded};
use uuid::Uuid;

use crate::error::{ButterError, ButterResult};

/// Identity of one browsing context (host page, iframe or popup).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(Uuid);

impl ContextId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // First block is enough to tell contexts apart in logs
        write!(f, "ctx-{}", &self.0.simple().to_string()[..8])
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SignalKind {
    /// Document finished loading.
    Loaded,
    /// Document is going away (window closed, frame navigated or removed).
    Unloaded,
    /// Serialized message posted by the context.
    Message(String),
}

/// Something the host window observed, with its transport-level source.
#[derive(Debug, Clone, PartialEq)]
pub struct HostSignal {
    pub source: ContextId,
    pub kind: SignalKind,
}

/// Message delivered into an embedded context.
#[derive(Debug, Clone, PartialEq)]
pub struct Inbound {
    pub source: ContextId,
    pub data: String,
}

/// The embedding page. Owns the inbox every child context posts into.
pub struct HostContext {
    id: ContextId,
    tx: Sender<HostSignal>,
    rx: Receiver<HostSignal>,
}

impl Default for HostContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostContext")
            .field("id", &self.id)
            .field("pending", &self.rx.len())
            .finish()
    }
}

impl HostContext {
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { id: ContextId::new(), tx, rx }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Create a child context (iframe or popup) connected to this host.
    pub fn open_context(&self) -> (ContextHandle, EmbeddedContext) {
        let id = ContextId::new();
        let (to_child, child_rx) = unbounded();
        let handle = ContextHandle { id, host: self.id, to_child };
        let embedded = EmbeddedContext { id, parent: self.id, to_host: self.tx.clone(), inbox: child_rx };
        log::trace!("HostContext {}: opened {}", self.id, id);
        (handle, embedded)
    }

    /// Next signal in arrival order, if any.
    pub fn try_recv(&self) -> Option<HostSignal> {
        self.rx.try_recv().ok()
    }

    pub fn pending(&self) -> usize {
        self.rx.len()
    }
}

/// Host-side reference to a child context (the `contentWindow`/popup object).
#[derive(Debug, Clone)]
pub struct ContextHandle {
    id: ContextId,
    host: ContextId,
    to_child: Sender<Inbound>,
}

impl ContextHandle {
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Post serialized data into the child; it arrives with the host as source.
    pub fn post_message(&self, data: String) -> ButterResult<()> {
        self.to_child
            .send(Inbound { source: self.host, data })
            .map_err(|_| ButterError::ChannelClosed(self.id.to_string()))
    }
}

/// Child-side endpoint: what the document inside the frame/popup sees.
#[derive(Debug)]
pub struct EmbeddedContext {
    id: ContextId,
    parent: ContextId,
    to_host: Sender<HostSignal>,
    inbox: Receiver<Inbound>,
}

impl EmbeddedContext {
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Context that opened this one.
    pub fn parent(&self) -> ContextId {
        self.parent
    }

    pub fn signal_loaded(&self) -> ButterResult<()> {
        self.signal(SignalKind::Loaded)
    }

    pub fn signal_unloaded(&self) -> ButterResult<()> {
        self.signal(SignalKind::Unloaded)
    }

    pub fn post_message(&self, data: String) -> ButterResult<()> {
        self.signal(SignalKind::Message(data))
    }

    fn signal(&self, kind: SignalKind) -> ButterResult<()> {
        self.to_host
            .send(HostSignal { source: self.id, kind })
            .map_err(|_| ButterError::ChannelClosed(self.parent.to_string()))
    }

    /// Next inbound message; `ChannelClosed` once the host dropped the handle.
    pub fn try_recv(&self) -> ButterResult<Option<Inbound>> {
        match self.inbox.try_recv() {
            Ok(msg) => Ok(Some(msg)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(ButterError::ChannelClosed(self.id.to_string())),
        }
    }
}
