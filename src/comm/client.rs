//! Member endpoint: lives inside the embedded context (editor page).

use std::sync::Arc;

use log::{trace, warn};
use serde::Serialize;
use serde_json::Value;

use super::context::EmbeddedContext;
use super::envelope::Envelope;
use super::listeners::ListenerRegistry;
use crate::core::ListenerId;
use crate::error::ButterResult;

/// Catch-all for messages no typed listener handled.
pub type CatchAll = Arc<dyn Fn(&Envelope) + Send + Sync>;

pub struct CommClient {
    name: String,
    ctx: EmbeddedContext,
    listeners: ListenerRegistry,
    on_message: Option<CatchAll>,
}

impl std::fmt::Debug for CommClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommClient")
            .field("name", &self.name)
            .field("ctx", &self.ctx.id())
            .field("listeners", &self.listeners)
            .finish()
    }
}

impl CommClient {
    pub fn new(name: impl Into<String>, ctx: EmbeddedContext, on_message: Option<CatchAll>) -> Self {
        Self { name: name.into(), ctx, listeners: ListenerRegistry::new(), on_message }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn context(&self) -> &EmbeddedContext {
        &self.ctx
    }

    pub fn listen<F>(&self, kind: &str, handler: F) -> ButterResult<ListenerId>
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.listeners.listen(kind, handler)
    }

    pub fn forget(&self, kind: &str, id: Option<ListenerId>) -> usize {
        self.listeners.forget(kind, id)
    }

    /// Post to the parent context, typed when `kind` is given.
    pub fn send(&self, message: impl Serialize, kind: Option<&str>) -> ButterResult<()> {
        let data = Envelope::new(kind, message)?.encode()?;
        trace!("CommClient {}: send {:?}", self.name, kind);
        self.ctx.post_message(data)
    }

    /// Deliver every queued inbound message. Returns how many were accepted.
    pub fn pump(&self) -> ButterResult<usize> {
        let mut accepted = 0;
        while let Some(inbound) = self.ctx.try_recv()? {
            if inbound.source != self.ctx.parent() {
                warn!("CommClient {}: dropped message from foreign context {}", self.name, inbound.source);
                continue;
            }
            let envelope = match Envelope::decode(&inbound.data) {
                Ok(env) => env,
                Err(e) => {
                    warn!("CommClient {}: {}", self.name, e);
                    continue;
                }
            };
            accepted += 1;
            let handled = match &envelope.kind {
                Some(kind) => self.listeners.dispatch(kind, &envelope.message),
                None => 0,
            };
            if handled == 0 {
                if let Some(cb) = &self.on_message {
                    cb(&envelope);
                }
            }
        }
        Ok(accepted)
    }
}
