//! Event editor module: remote parameter editing over the comm channel.

pub mod config;
pub mod session;
pub mod surface;

pub use config::{EditorConfig, EditorTarget};
pub use session::{EDITOR_CHANNEL, EventEditor, SessionState};
pub use surface::{EditorHost, MemoryEditorHost, SurfaceKind, SurfaceRecord, SurfaceSpec};
