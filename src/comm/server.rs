//! Initiator endpoint: lives in the page that embeds editor frames and popups.
//!
//! Channels are named. `bind_frame`/`bind_window` park a channel until the
//! child reports `Loaded`, then promote it and run `on_ready`;
//! `bind_client_window` binds at once. Every inbound signal is routed by its
//! source context: anything not from a bound (or pending) child is rejected,
//! so a replaced or unbound surface can no longer reach its old listeners.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, trace, warn};
use serde::Serialize;
use serde_json::Value;

use super::client::CatchAll;
use super::context::{ContextHandle, ContextId, HostContext, SignalKind};
use super::envelope::Envelope;
use super::listeners::ListenerRegistry;
use crate::core::ListenerId;
use crate::error::{ButterError, ButterResult};

/// Callbacks supplied at bind time.
#[derive(Default)]
pub struct BindOptions {
    /// Runs once the child has loaded and the channel is usable.
    pub on_ready: Option<Box<dyn FnOnce() + Send>>,
    /// Catch-all for messages no typed listener handled.
    pub on_message: Option<CatchAll>,
    /// Runs when the child unloads on its own.
    pub on_unload: Option<Box<dyn FnOnce() + Send>>,
}

impl BindOptions {
    pub fn on_ready(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_ready = Some(Box::new(f));
        self
    }

    pub fn on_message(mut self, f: impl Fn(&Envelope) + Send + Sync + 'static) -> Self {
        self.on_message = Some(Arc::new(f));
        self
    }

    pub fn on_unload(mut self, f: impl FnOnce() + Send + 'static) -> Self {
        self.on_unload = Some(Box::new(f));
        self
    }
}

/// How the child context is embedded; the handshake is the same for both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Frame,
    Window,
}

struct Channel {
    name: String,
    handle: ContextHandle,
    listeners: ListenerRegistry,
    on_message: Option<CatchAll>,
    on_unload: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

struct Pending {
    binding: Binding,
    handle: ContextHandle,
    options: BindOptions,
}

#[derive(Default)]
struct Channels {
    bound: HashMap<String, Arc<Channel>>,
    pending: HashMap<String, Pending>,
}

pub struct CommServer {
    host: HostContext,
    channels: Mutex<Channels>,
}

impl Default for CommServer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CommServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let channels = self.lock();
        f.debug_struct("CommServer")
            .field("host", &self.host)
            .field("bound", &channels.bound.keys().collect::<Vec<_>>())
            .field("pending", &channels.pending.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CommServer {
    pub fn new() -> Self {
        Self { host: HostContext::new(), channels: Mutex::new(Channels::default()) }
    }

    /// The window this server listens on; open child contexts through it.
    pub fn host(&self) -> &HostContext {
        &self.host
    }

    fn lock(&self) -> MutexGuard<'_, Channels> {
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }

    // ========== Binding ==========

    pub fn bind_frame(&self, name: &str, frame: ContextHandle, options: BindOptions) {
        self.bind(name, Binding::Frame, frame, options)
    }

    pub fn bind_window(&self, name: &str, window: ContextHandle, options: BindOptions) {
        self.bind(name, Binding::Window, window, options)
    }

    /// Wait for the child's `Loaded` signal, then bind `name` to it.
    /// Replaces any channel or pending bind already using `name`.
    pub fn bind(&self, name: &str, binding: Binding, handle: ContextHandle, options: BindOptions) {
        let mut channels = self.lock();
        if channels.bound.remove(name).is_some() {
            debug!("CommServer: channel '{}' replaced", name);
        }
        debug!("CommServer: {:?} bind '{}' pending load of {}", binding, name, handle.id());
        channels.pending.insert(name.to_string(), Pending { binding, handle, options });
    }

    /// Bind `name` to an already-loaded child immediately.
    pub fn bind_client_window(&self, name: &str, client: ContextHandle, on_message: Option<CatchAll>) {
        let mut channels = self.lock();
        channels.pending.remove(name);
        channels.bound.insert(name.to_string(), Arc::new(Self::channel(name, client, on_message, None)));
        debug!("CommServer: channel '{}' bound", name);
    }

    fn channel(
        name: &str,
        handle: ContextHandle,
        on_message: Option<CatchAll>,
        on_unload: Option<Box<dyn FnOnce() + Send>>,
    ) -> Channel {
        Channel {
            name: name.to_string(),
            handle,
            listeners: ListenerRegistry::new(),
            on_message,
            on_unload: Mutex::new(on_unload),
        }
    }

    /// Drop a bound or pending channel. Its listeners are discarded.
    pub fn unbind(&self, name: &str) -> bool {
        let mut channels = self.lock();
        let bound = channels.bound.remove(name).is_some();
        let pending = channels.pending.remove(name).is_some();
        if bound || pending {
            debug!("CommServer: channel '{}' unbound", name);
        }
        bound || pending
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.lock().bound.contains_key(name)
    }

    pub fn is_pending(&self, name: &str) -> bool {
        self.lock().pending.contains_key(name)
    }

    /// Context currently bound under `name`.
    pub fn context_of(&self, name: &str) -> Option<ContextId> {
        self.lock().bound.get(name).map(|c| c.handle.id())
    }

    fn bound(&self, name: &str) -> ButterResult<Arc<Channel>> {
        self.lock()
            .bound
            .get(name)
            .cloned()
            .ok_or_else(|| ButterError::ChannelNotBound(name.to_string()))
    }

    // ========== Listen / send ==========

    pub fn listen<F>(&self, name: &str, kind: &str, handler: F) -> ButterResult<ListenerId>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.bound(name)?.listeners.listen(kind, handler)
    }

    pub fn forget(&self, name: &str, kind: &str, id: Option<ListenerId>) -> ButterResult<usize> {
        Ok(self.bound(name)?.listeners.forget(kind, id))
    }

    /// Serialize and post to the child bound under `name`.
    pub fn send(&self, name: &str, message: impl Serialize, kind: Option<&str>) -> ButterResult<()> {
        let channel = self.bound(name)?;
        let data = Envelope::new(kind, message)?.encode()?;
        trace!("CommServer: send '{}' {:?}", name, kind);
        channel.handle.post_message(data)
    }

    // ========== Delivery ==========

    /// Process every signal queued on the host window. Returns how many
    /// were accepted.
    ///
    /// Callbacks run with no lock held and may bind, unbind, listen or send.
    pub fn pump(&self) -> usize {
        let mut accepted = 0;
        while let Some(signal) = self.host.try_recv() {
            if self.deliver(signal.source, signal.kind) {
                accepted += 1;
            }
        }
        accepted
    }

    fn deliver(&self, source: ContextId, kind: SignalKind) -> bool {
        // Pending bind waiting on this child?
        let pending = {
            let mut channels = self.lock();
            let name = channels
                .pending
                .iter()
                .find(|(_, p)| p.handle.id() == source)
                .map(|(n, _)| n.clone());
            name.and_then(|n| channels.pending.remove(&n).map(|p| (n, p)))
        };
        if let Some((name, pending)) = pending {
            return self.resolve_pending(name, pending, kind);
        }

        let channel = self.lock().bound.values().find(|c| c.handle.id() == source).cloned();
        let Some(channel) = channel else {
            warn!("CommServer: rejected {} from unbound context {}", kind_label(&kind), source);
            return false;
        };

        match kind {
            SignalKind::Message(data) => {
                let envelope = match Envelope::decode(&data) {
                    Ok(env) => env,
                    Err(e) => {
                        warn!("CommServer: '{}' sent undecodable data: {}", channel.name, e);
                        return false;
                    }
                };
                let handled = match &envelope.kind {
                    Some(kind) => channel.listeners.dispatch(kind, &envelope.message),
                    None => 0,
                };
                if handled == 0 {
                    if let Some(cb) = &channel.on_message {
                        cb(&envelope);
                    }
                }
                true
            }
            SignalKind::Unloaded => {
                {
                    let mut channels = self.lock();
                    // Only drop the entry if it still is this channel
                    if channels.bound.get(&channel.name).is_some_and(|c| Arc::ptr_eq(c, &channel)) {
                        channels.bound.remove(&channel.name);
                    }
                }
                debug!("CommServer: '{}' unloaded", channel.name);
                let on_unload = channel.on_unload.lock().unwrap_or_else(|e| e.into_inner()).take();
                if let Some(cb) = on_unload {
                    cb();
                }
                true
            }
            SignalKind::Loaded => {
                trace!("CommServer: '{}' reloaded", channel.name);
                true
            }
        }
    }

    fn resolve_pending(&self, name: String, pending: Pending, kind: SignalKind) -> bool {
        let Pending { binding, handle, options } = pending;
        match kind {
            SignalKind::Loaded => {
                let channel = Arc::new(Self::channel(&name, handle, options.on_message, options.on_unload));
                self.lock().bound.insert(name.clone(), channel);
                debug!("CommServer: {:?} '{}' loaded and bound", binding, name);
                if let Some(on_ready) = options.on_ready {
                    on_ready();
                }
                true
            }
            SignalKind::Unloaded => {
                debug!("CommServer: '{}' unloaded before load", name);
                if let Some(on_unload) = options.on_unload {
                    on_unload();
                }
                true
            }
            SignalKind::Message(_) => {
                warn!("CommServer: '{}' posted before load, dropped", name);
                self.lock().pending.insert(name, Pending { binding, handle, options });
                false
            }
        }
    }
}

fn kind_label(kind: &SignalKind) -> &'static str {
    match kind {
        SignalKind::Loaded => "load",
        SignalKind::Unloaded => "unload",
        SignalKind::Message(_) => "message",
    }
}
