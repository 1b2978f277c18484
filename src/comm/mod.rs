//! Cross-context channel between the editor page and embedded frames/popups.
//!
//! - `context` - host/child transport with source identity
//! - `envelope` - `{type, message}` wire codec
//! - `listeners` - per-endpoint typed callback registry
//! - `server` - initiator side ([`CommServer`]), one named channel per child
//! - `client` - member side ([`CommClient`]) inside the child

pub mod client;
pub mod context;
pub mod envelope;
pub mod listeners;
pub mod server;

pub use client::{CatchAll, CommClient};
pub use context::{ContextHandle, ContextId, EmbeddedContext, HostContext, HostSignal, Inbound, SignalKind};
pub use envelope::Envelope;
pub use listeners::{ListenerRegistry, MessageHandler};
pub use server::{BindOptions, Binding, CommServer};
