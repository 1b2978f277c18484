//! Media: one editable timeline plus its playable resource.

use serde::{Deserialize, Serialize};

use super::ids::{MediaId, TrackEventRef, TrackRef};
use super::track::Track;
use super::track_event::TrackEvent;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    id: MediaId,
    name: String,
    /// Opaque media resource handle (usually a URL).
    source: Option<String>,
    tracks: Vec<Track>,
    current_time: f64,
    duration: f64,
}

impl Media {
    /// Unnamed media are called `Media<id>`.
    pub fn new(name: Option<impl Into<String>>, source: Option<impl Into<String>>) -> Self {
        let id = MediaId::next();
        let name = name.map(Into::into).unwrap_or_else(|| format!("Media{}", id.get()));
        Self {
            id,
            name,
            source: source.map(Into::into),
            tracks: Vec::new(),
            current_time: 0.0,
            duration: 0.0,
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::new(Some(name), None::<String>)
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Add a track before the media joins a project.
    pub fn with_track(mut self, mut track: Track) -> Self {
        track.set_media(Some(self.id));
        self.tracks.push(track);
        self
    }

    pub fn id(&self) -> MediaId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn get_track(&self, r: impl Into<TrackRef>) -> Option<&Track> {
        let r = r.into();
        self.tracks.iter().find(|t| r.matches(t.id(), t.name()))
    }

    /// Find an event on any of this media's tracks.
    pub fn find_track_event(&self, r: &TrackEventRef) -> Option<&TrackEvent> {
        self.tracks.iter().find_map(|t| t.get_track_event(r.clone()))
    }

    pub(crate) fn set_source(&mut self, source: Option<String>) {
        self.source = source;
    }

    pub(crate) fn set_current_time(&mut self, time: f64) {
        self.current_time = time;
    }

    pub(crate) fn set_duration(&mut self, duration: f64) {
        self.duration = duration;
    }

    pub(crate) fn tracks_mut(&mut self) -> &mut Vec<Track> {
        &mut self.tracks
    }

    pub(crate) fn track_mut(&mut self, r: &TrackRef) -> Option<&mut Track> {
        self.tracks.iter_mut().find(|t| r.matches(t.id(), t.name()))
    }

    pub(crate) fn track_event_mut(&mut self, r: &TrackEventRef) -> Option<&mut TrackEvent> {
        self.tracks.iter_mut().find_map(|t| t.get_track_event_mut(r))
    }
}
