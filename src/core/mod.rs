//! Core - project aggregate, event bus, module composition, readiness waits.
//!
//! Independent of any embedding surface: editors and previews talk to the
//! core only through the bus and the aggregate's operations.

pub mod butter;
pub mod event_bus;
pub mod events;
pub mod module;
pub mod readiness;

pub use butter::{Butter, WeakButter};
pub use event_bus::{EventBus, Handler, ListenerId};
pub use events::{BusEvent, EDITOR_DOMAIN, EventName, Payload, TIMELINE_DOMAIN};
pub use module::{ButterBuilder, Module};
pub use readiness::{CancelToken, ReadinessWait, RetryPolicy};
