//! Entities module - plain data holders of the project model.
//!
//! Media own Tracks, Tracks own TrackEvents; Targets and Plugins are flat
//! registries. Back-references are ids, never pointers: the project
//! aggregate ([`crate::Butter`]) is the single owner of attached entities and
//! hands out snapshots.

pub mod ids;
pub mod media;
pub mod plugin;
pub mod target;
pub mod track;
pub mod track_event;

pub use ids::{
    EntityRef, MediaId, MediaRef, PluginId, TargetId, TargetRef, TrackEventId, TrackEventRef, TrackId,
    TrackRef,
};
pub use media::Media;
pub use plugin::Plugin;
pub use target::Target;
pub use track::Track;
pub use track_event::{PopcornOptions, TrackEvent, TrackEventOptions};
