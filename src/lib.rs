//! Butter - event-driven authoring core for time-synchronized web media.
//!
//! Re-exports all modules for use by the binary target.

// Core engine (event bus, project aggregate, modules, readiness)
pub mod core;

// Model and cross-context plumbing
pub mod comm;
pub mod entities;
pub mod error;

// Modules installed into a project
pub mod editor;
pub mod plugins;
pub mod previewer;

// App modules
pub mod cli;
pub mod config;
pub mod paths;
pub mod shell;
pub mod timecode;

pub use core::{Butter, ButterBuilder, EventBus, EventName, Module, Payload, WeakButter};
pub use error::{ButterError, ButterResult};
