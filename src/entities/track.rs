//! Track: exclusive owner of an ordered list of TrackEvents within a Media.

use serde::{Deserialize, Serialize};

use super::ids::{MediaId, TrackEventRef, TrackId};
use super::track_event::TrackEvent;
use crate::error::{ButterError, ButterResult, EntityKind};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    id: TrackId,
    name: String,
    events: Vec<TrackEvent>,
    #[serde(skip)]
    media: Option<MediaId>,
}

impl Default for Track {
    fn default() -> Self {
        Self::new(None::<String>)
    }
}

impl Track {
    /// Create a detached track. Unnamed tracks are called `Track<id>`.
    pub fn new(name: Option<impl Into<String>>) -> Self {
        let id = TrackId::next();
        let name = name.map(Into::into).unwrap_or_else(|| format!("Track{}", id.get()));
        Self { id, name, events: Vec::new(), media: None }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::new(Some(name))
    }

    pub fn id(&self) -> TrackId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media(&self) -> Option<MediaId> {
        self.media
    }

    pub fn track_events(&self) -> &[TrackEvent] {
        &self.events
    }

    pub fn get_track_event(&self, r: impl Into<TrackEventRef>) -> Option<&TrackEvent> {
        let r = r.into();
        self.events.iter().find(|e| r.matches(e.id(), e.name()))
    }

    pub(crate) fn get_track_event_mut(&mut self, r: &TrackEventRef) -> Option<&mut TrackEvent> {
        self.events.iter_mut().find(|e| r.matches(e.id(), e.name()))
    }

    /// Append an event. The event must not belong to another track.
    ///
    /// On a track already attached to a project use
    /// [`crate::Butter::add_track_event`] so the addition is announced.
    pub fn add_track_event(&mut self, mut event: TrackEvent) -> ButterResult<&TrackEvent> {
        if event.is_attached() || self.events.iter().any(|e| e.id() == event.id()) {
            return Err(ButterError::AlreadyAttached { kind: EntityKind::TrackEvent, id: event.id().get() });
        }
        event.attach(self.id, self.media);
        self.events.push(event);
        Ok(&self.events[self.events.len() - 1])
    }

    /// Remove an event, detaching it in both directions.
    pub fn remove_track_event(&mut self, r: impl Into<TrackEventRef>) -> ButterResult<TrackEvent> {
        let r = r.into();
        let idx = self
            .events
            .iter()
            .position(|e| r.matches(e.id(), e.name()))
            .ok_or_else(|| ButterError::not_found(EntityKind::TrackEvent, &r))?;
        let mut event = self.events.remove(idx);
        event.detach();
        Ok(event)
    }

    pub(crate) fn set_media(&mut self, media: Option<MediaId>) {
        self.media = media;
        for e in &mut self.events {
            e.set_media(media);
        }
    }
}
