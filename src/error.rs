//! Error taxonomy shared by the project aggregate, channels, editor and previewer.
//!
//! Precondition violations (no media selected, unknown references, bad
//! configuration) are returned synchronously and never swallowed. Transient
//! conditions (a context that has not loaded yet, a runtime not constructed)
//! are retried by [`crate::core::readiness`] and only become errors once the
//! retry budget is spent.

use std::fmt;

pub type ButterResult<T> = Result<T, ButterError>;

/// Entity kinds used in lookup/uniqueness errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Media,
    Track,
    TrackEvent,
    Target,
    Plugin,
    Channel,
    Listener,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntityKind::Media => "media",
            EntityKind::Track => "track",
            EntityKind::TrackEvent => "track event",
            EntityKind::Target => "target",
            EntityKind::Plugin => "plugin",
            EntityKind::Channel => "channel",
            EntityKind::Listener => "listener",
        };
        f.write_str(s)
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ButterError {
    #[error("no media object is selected")]
    NoMediaSelected,

    #[error("{kind} not found: {reference}")]
    NotFound { kind: EntityKind, reference: String },

    #[error("duplicate {kind} name: {name}")]
    DuplicateName { kind: EntityKind, name: String },

    #[error("{kind} {id} is already attached")]
    AlreadyAttached { kind: EntityKind, id: u64 },

    #[error("invalid time range: start {start} is after end {end}")]
    InvalidTimeRange { start: f64, end: f64 },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("channel not bound: {0}")]
    ChannelNotBound(String),

    #[error("channel closed: {0}")]
    ChannelClosed(String),

    #[error("wire format error: {0}")]
    Wire(String),

    #[error("timed out waiting for {what} after {attempts} attempts")]
    Timeout { what: String, attempts: u32 },

    #[error("wait for {0} was cancelled")]
    Cancelled(String),

    #[error("runtime error: {0}")]
    Runtime(String),

    #[error("project aggregate has been dropped")]
    Detached,
}

impl ButterError {
    pub fn not_found(kind: EntityKind, reference: impl fmt::Display) -> Self {
        Self::NotFound { kind, reference: reference.to_string() }
    }

    pub fn duplicate(kind: EntityKind, name: impl Into<String>) -> Self {
        Self::DuplicateName { kind, name: name.into() }
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn wire(msg: impl Into<String>) -> Self {
        Self::Wire(msg.into())
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }
}

impl From<serde_json::Error> for ButterError {
    fn from(e: serde_json::Error) -> Self {
        Self::Wire(e.to_string())
    }
}
