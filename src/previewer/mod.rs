//! Previewer module: layout scraping, preview document generation and
//! mirroring of the project into the embedded media runtime.

pub mod bootstrap;
pub mod config;
pub mod memory;
pub mod runtime;
pub mod sync;

pub use bootstrap::{PlayerKind, export_script};
pub use config::{DEFAULT_POPCORN_URL, PreviewConfig};
pub use memory::{MemoryFrame, MemoryRuntime, RuntimeTrackEvent};
pub use runtime::{ElementRole, LayoutDocument, LayoutElement, PreviewFrame, PreviewRuntime, RuntimeEventId};
pub use sync::{PreviewPhase, Previewer, TickReport};
