//! Butter - the project aggregate.
//!
//! Owns the media registry, the current-media selection, the target
//! registry and the event bus. Track and TrackEvent operations are routed
//! through the current media; every mutation is announced on the bus.
//!
//! Locking: state sits behind one `RwLock` that is always released before a
//! trigger, so listeners may call back into the aggregate.
//!
//! Cascades are symmetric: adding a media or track that already carries
//! children announces each child (`trackadded`, then `trackeventadded`), and
//! removing one announces `trackeventremoved`/`trackremoved` per child
//! before the parent's own removal event. Removal payloads are the entity as
//! it was while attached; the returned value is detached.

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use indexmap::IndexMap;
use log::{debug, info};

use super::event_bus::{EventBus, ListenerId};
use super::events::{BusEvent, EventName, Payload};
use super::module::{ButterBuilder, ModuleSlot};
use crate::entities::{
    Media, MediaId, MediaRef, PopcornOptions, Target, TargetId, TargetRef, Track, TrackEvent,
    TrackEventId, TrackEventRef, TrackRef,
};
use crate::error::{ButterError, ButterResult, EntityKind};

static BUTTER_COUNT: AtomicU64 = AtomicU64::new(0);

#[derive(Debug, Default)]
struct ProjectState {
    medias: IndexMap<MediaId, Media>,
    current: Option<MediaId>,
    targets: IndexMap<TargetId, Target>,
}

impl ProjectState {
    fn resolve_media(&self, r: &MediaRef) -> Option<MediaId> {
        self.medias.values().find(|m| r.matches(m.id(), m.name())).map(Media::id)
    }

    fn current(&self) -> ButterResult<&Media> {
        self.current
            .and_then(|id| self.medias.get(&id))
            .ok_or(ButterError::NoMediaSelected)
    }

    fn current_mut(&mut self) -> ButterResult<&mut Media> {
        let id = self.current.ok_or(ButterError::NoMediaSelected)?;
        self.medias.get_mut(&id).ok_or(ButterError::NoMediaSelected)
    }

    fn has_track(&self, id: crate::entities::TrackId) -> bool {
        self.medias.values().any(|m| m.tracks().iter().any(|t| t.id() == id))
    }

    fn has_track_event(&self, id: TrackEventId) -> bool {
        self.medias
            .values()
            .any(|m| m.tracks().iter().any(|t| t.track_events().iter().any(|e| e.id() == id)))
    }
}

struct Inner {
    id: String,
    bus: EventBus,
    state: RwLock<ProjectState>,
    modules: RwLock<Vec<ModuleSlot>>,
}

/// Project aggregate handle. Cloning shares the project.
#[derive(Clone)]
pub struct Butter {
    inner: Arc<Inner>,
}

/// Non-owning handle held by modules and by closures registered on the bus.
#[derive(Clone)]
pub struct WeakButter(Weak<Inner>);

impl WeakButter {
    pub fn upgrade(&self) -> Option<Butter> {
        self.0.upgrade().map(|inner| Butter { inner })
    }

    /// Upgrade or fail with [`ButterError::Detached`].
    pub fn get(&self) -> ButterResult<Butter> {
        self.upgrade().ok_or(ButterError::Detached)
    }
}

impl Default for Butter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Butter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        f.debug_struct("Butter")
            .field("id", &self.inner.id)
            .field("medias", &state.medias.len())
            .field("current", &state.current)
            .field("targets", &state.targets.len())
            .field("modules", &self.module_names())
            .finish()
    }
}

impl Butter {
    /// Bare project with no modules. Use [`Butter::builder`] to compose modules.
    pub fn new() -> Self {
        let id = format!("Butter{}", BUTTER_COUNT.fetch_add(1, Ordering::Relaxed));
        info!("{}: created", id);
        Self {
            inner: Arc::new(Inner {
                id,
                bus: EventBus::new(),
                state: RwLock::new(ProjectState::default()),
                modules: RwLock::new(Vec::new()),
            }),
        }
    }

    pub fn builder() -> ButterBuilder {
        ButterBuilder::new()
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn bus(&self) -> &EventBus {
        &self.inner.bus
    }

    pub fn downgrade(&self) -> WeakButter {
        WeakButter(Arc::downgrade(&self.inner))
    }

    fn read(&self) -> RwLockReadGuard<'_, ProjectState> {
        self.inner.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, ProjectState> {
        self.inner.state.write().unwrap_or_else(|e| e.into_inner())
    }

    // ========== Events ==========

    pub fn listen<F>(&self, name: impl Into<EventName>, handler: F, domain: Option<&str>) -> ListenerId
    where
        F: Fn(&BusEvent) + Send + Sync + 'static,
    {
        self.inner.bus.listen(name, handler, domain)
    }

    pub fn unlisten(&self, name: impl Into<EventName>, id: Option<ListenerId>, domain: Option<&str>) -> usize {
        self.inner.bus.unlisten(name, id, domain)
    }

    pub fn trigger(&self, name: impl Into<EventName>, data: Payload, domain: Option<&str>) {
        self.inner.bus.trigger(name, data, domain)
    }

    // ========== Modules ==========

    /// Typed handle to an installed module.
    pub fn module<M: Any + Send + Sync>(&self) -> Option<Arc<M>> {
        let modules = self.inner.modules.read().unwrap_or_else(|e| e.into_inner());
        let slot = modules.iter().find(|s| s.type_id == TypeId::of::<M>())?;
        Arc::clone(&slot.instance).downcast::<M>().ok()
    }

    pub fn module_names(&self) -> Vec<&'static str> {
        self.inner
            .modules
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|s| s.name)
            .collect()
    }

    pub(crate) fn register_module(&self, slot: ModuleSlot) {
        self.inner.modules.write().unwrap_or_else(|e| e.into_inner()).push(slot);
    }

    // ========== Media ==========

    /// Register a media. The first media added becomes current.
    pub fn add_media(&self, mut media: Media) -> ButterResult<Media> {
        {
            let mut state = self.write();
            if state.medias.contains_key(&media.id()) {
                return Err(ButterError::AlreadyAttached { kind: EntityKind::Media, id: media.id().get() });
            }
            if state.medias.values().any(|m| m.name() == media.name()) {
                return Err(ButterError::duplicate(EntityKind::Media, media.name()));
            }
            let mut names: Vec<&str> = media.tracks().iter().map(Track::name).collect();
            names.sort_unstable();
            if let Some(w) = names.windows(2).find(|w| w[0] == w[1]) {
                return Err(ButterError::duplicate(EntityKind::Track, w[0]));
            }
            for track in media.tracks() {
                if state.has_track(track.id()) {
                    return Err(ButterError::AlreadyAttached { kind: EntityKind::Track, id: track.id().get() });
                }
                if let Some(e) = track.track_events().iter().find(|e| state.has_track_event(e.id())) {
                    return Err(ButterError::AlreadyAttached { kind: EntityKind::TrackEvent, id: e.id().get() });
                }
            }
            let id = media.id();
            for track in media.tracks_mut() {
                track.set_media(Some(id));
            }
            state.medias.insert(id, media.clone());
        }
        debug!("{}: media {} '{}' added", self.id(), media.id(), media.name());

        self.trigger(EventName::MediaAdded, Payload::Media(media.clone()), None);
        for track in media.tracks() {
            self.announce_track_added(track);
        }
        if self.read().current.is_none() {
            self.set_media(media.id())?;
        }
        Ok(media)
    }

    /// Remove a media and cascade removal events for its tracks and events.
    ///
    /// Removing the current media leaves no media selected.
    pub fn remove_media(&self, r: impl Into<MediaRef>) -> ButterResult<Media> {
        let r = r.into();
        let mut removed = {
            let mut state = self.write();
            let id = state.resolve_media(&r).ok_or_else(|| ButterError::not_found(EntityKind::Media, &r))?;
            if state.current == Some(id) {
                state.current = None;
            }
            state
                .medias
                .shift_remove(&id)
                .ok_or_else(|| ButterError::not_found(EntityKind::Media, &r))?
        };
        debug!("{}: media {} '{}' removed", self.id(), removed.id(), removed.name());

        for track in removed.tracks() {
            self.announce_track_removed(track);
        }
        self.trigger(EventName::MediaRemoved, Payload::Media(removed.clone()), None);

        for track in removed.tracks_mut() {
            track.set_media(None);
        }
        Ok(removed)
    }

    /// Select the current media.
    pub fn set_media(&self, r: impl Into<MediaRef>) -> ButterResult<Media> {
        let r = r.into();
        let media = {
            let mut state = self.write();
            let id = state.resolve_media(&r).ok_or_else(|| ButterError::not_found(EntityKind::Media, &r))?;
            state.current = Some(id);
            state.medias[&id].clone()
        };
        debug!("{}: current media -> {}", self.id(), media.id());
        self.trigger(EventName::MediaChanged, Payload::Media(media.clone()), None);
        Ok(media)
    }

    pub fn get_media(&self, r: impl Into<MediaRef>) -> Option<Media> {
        let r = r.into();
        let state = self.read();
        state.resolve_media(&r).map(|id| state.medias[&id].clone())
    }

    pub fn get_all_media(&self) -> Vec<Media> {
        self.read().medias.values().cloned().collect()
    }

    pub fn get_current_media(&self) -> Option<Media> {
        self.read().current().ok().cloned()
    }

    /// Replace the media resource; announces `mediacontentchanged`.
    pub fn set_media_source(&self, r: impl Into<MediaRef>, source: Option<String>) -> ButterResult<Media> {
        let r = r.into();
        let media = {
            let mut state = self.write();
            let id = state.resolve_media(&r).ok_or_else(|| ButterError::not_found(EntityKind::Media, &r))?;
            let media = &mut state.medias[&id];
            media.set_source(source);
            media.clone()
        };
        self.trigger(EventName::MediaContentChanged, Payload::Media(media.clone()), None);
        Ok(media)
    }

    // ========== Playback position ==========

    pub fn current_time(&self) -> ButterResult<f64> {
        Ok(self.read().current()?.current_time())
    }

    /// Move the playhead of the current media; announces `mediatimeupdate`
    /// tagged with `domain`.
    pub fn set_current_time(&self, time: f64, domain: Option<&str>) -> ButterResult<f64> {
        if !time.is_finite() || time < 0.0 {
            return Err(ButterError::invalid(format!("current time {} out of range", time)));
        }
        let media = {
            let mut state = self.write();
            let media = state.current_mut()?;
            media.set_current_time(time);
            media.clone()
        };
        self.trigger(EventName::MediaTimeUpdate, Payload::Media(media), domain);
        Ok(time)
    }

    pub fn duration(&self) -> ButterResult<f64> {
        Ok(self.read().current()?.duration())
    }

    pub fn set_duration(&self, duration: f64, domain: Option<&str>) -> ButterResult<f64> {
        if !duration.is_finite() || duration < 0.0 {
            return Err(ButterError::invalid(format!("duration {} out of range", duration)));
        }
        let media = {
            let mut state = self.write();
            let media = state.current_mut()?;
            media.set_duration(duration);
            media.clone()
        };
        self.trigger(EventName::MediaDurationChanged, Payload::Media(media), domain);
        Ok(duration)
    }

    // ========== Tracks ==========

    /// Add a track to the current media. Events already on the track are
    /// announced after `trackadded`.
    pub fn add_track(&self, mut track: Track) -> ButterResult<Track> {
        {
            let mut state = self.write();
            let media_id = state.current()?.id();
            if state.has_track(track.id()) {
                return Err(ButterError::AlreadyAttached { kind: EntityKind::Track, id: track.id().get() });
            }
            if let Some(e) = track.track_events().iter().find(|e| state.has_track_event(e.id())) {
                return Err(ButterError::AlreadyAttached { kind: EntityKind::TrackEvent, id: e.id().get() });
            }
            let media = state.current_mut()?;
            if media.tracks().iter().any(|t| t.name() == track.name()) {
                return Err(ButterError::duplicate(EntityKind::Track, track.name()));
            }
            track.set_media(Some(media_id));
            media.tracks_mut().push(track.clone());
        }
        debug!("{}: track {} '{}' added", self.id(), track.id(), track.name());
        self.announce_track_added(&track);
        Ok(track)
    }

    pub fn get_tracks(&self) -> ButterResult<Vec<Track>> {
        Ok(self.read().current()?.tracks().to_vec())
    }

    pub fn get_track(&self, r: impl Into<TrackRef>) -> ButterResult<Option<Track>> {
        Ok(self.read().current()?.get_track(r).cloned())
    }

    /// Remove a track from the current media, announcing each of its events first.
    pub fn remove_track(&self, r: impl Into<TrackRef>) -> ButterResult<Track> {
        let r = r.into();
        let mut removed = {
            let mut state = self.write();
            let media = state.current_mut()?;
            let idx = media
                .tracks()
                .iter()
                .position(|t| r.matches(t.id(), t.name()))
                .ok_or_else(|| ButterError::not_found(EntityKind::Track, &r))?;
            media.tracks_mut().remove(idx)
        };
        debug!("{}: track {} '{}' removed", self.id(), removed.id(), removed.name());
        self.announce_track_removed(&removed);
        removed.set_media(None);
        Ok(removed)
    }

    fn announce_track_added(&self, track: &Track) {
        self.trigger(EventName::TrackAdded, Payload::Track(track.clone()), None);
        for event in track.track_events() {
            self.trigger(EventName::TrackEventAdded, Payload::TrackEvent(event.clone()), None);
        }
    }

    fn announce_track_removed(&self, track: &Track) {
        for event in track.track_events() {
            self.trigger(EventName::TrackEventRemoved, Payload::TrackEvent(event.clone()), None);
        }
        self.trigger(EventName::TrackRemoved, Payload::Track(track.clone()), None);
    }

    // ========== Track events ==========

    /// Append `event` to a track of the current media.
    pub fn add_track_event(&self, track: impl Into<TrackRef>, event: TrackEvent) -> ButterResult<TrackEvent> {
        let track = track.into();
        let added = {
            let mut state = self.write();
            state.current()?;
            if event.is_attached() || state.has_track_event(event.id()) {
                return Err(ButterError::AlreadyAttached { kind: EntityKind::TrackEvent, id: event.id().get() });
            }
            let media = state.current_mut()?;
            let target = media
                .track_mut(&track)
                .ok_or_else(|| ButterError::not_found(EntityKind::Track, &track))?;
            target.add_track_event(event)?.clone()
        };
        debug!("{}: track event {} '{}' added to {}", self.id(), added.id(), added.name(), track);
        self.trigger(EventName::TrackEventAdded, Payload::TrackEvent(added.clone()), None);
        Ok(added)
    }

    /// Events of the current media grouped by track name.
    pub fn get_track_events(&self) -> ButterResult<IndexMap<String, Vec<TrackEvent>>> {
        let state = self.read();
        Ok(state
            .current()?
            .tracks()
            .iter()
            .map(|t| (t.name().to_string(), t.track_events().to_vec()))
            .collect())
    }

    /// Find an event on any track of the current media.
    pub fn get_track_event(&self, r: impl Into<TrackEventRef>) -> ButterResult<Option<TrackEvent>> {
        Ok(self.read().current()?.find_track_event(&r.into()).cloned())
    }

    pub fn get_track_event_in(
        &self,
        track: impl Into<TrackRef>,
        event: impl Into<TrackEventRef>,
    ) -> ButterResult<Option<TrackEvent>> {
        let state = self.read();
        let media = state.current()?;
        Ok(media.get_track(track).and_then(|t| t.get_track_event(event)).cloned())
    }

    /// Remove an event from whichever track of the current media holds it.
    pub fn remove_track_event(&self, r: impl Into<TrackEventRef>) -> ButterResult<TrackEvent> {
        let r = r.into();
        let (snapshot, detached) = {
            let mut state = self.write();
            let media = state.current_mut()?;
            let track = media
                .tracks_mut()
                .iter_mut()
                .find(|t| t.get_track_event(r.clone()).is_some())
                .ok_or_else(|| ButterError::not_found(EntityKind::TrackEvent, &r))?;
            let snapshot = track
                .get_track_event(r.clone())
                .cloned()
                .ok_or_else(|| ButterError::not_found(EntityKind::TrackEvent, &r))?;
            (snapshot, track.remove_track_event(r.clone())?)
        };
        debug!("{}: track event {} removed", self.id(), snapshot.id());
        self.trigger(EventName::TrackEventRemoved, Payload::TrackEvent(snapshot), None);
        Ok(detached)
    }

    pub fn remove_track_event_in(
        &self,
        track: impl Into<TrackRef>,
        event: impl Into<TrackEventRef>,
    ) -> ButterResult<TrackEvent> {
        let (track, r) = (track.into(), event.into());
        let (snapshot, detached) = {
            let mut state = self.write();
            let media = state.current_mut()?;
            let track = media
                .track_mut(&track)
                .ok_or_else(|| ButterError::not_found(EntityKind::Track, &track))?;
            let snapshot = track
                .get_track_event(r.clone())
                .cloned()
                .ok_or_else(|| ButterError::not_found(EntityKind::TrackEvent, &r))?;
            (snapshot, track.remove_track_event(r)?)
        };
        self.trigger(EventName::TrackEventRemoved, Payload::TrackEvent(snapshot), None);
        Ok(detached)
    }

    /// Replace an event's plugin options and announce `trackeventupdated`
    /// tagged with `domain`. A rejected update leaves the event untouched.
    pub fn update_track_event(
        &self,
        r: impl Into<TrackEventRef>,
        options: PopcornOptions,
        domain: Option<&str>,
    ) -> ButterResult<TrackEvent> {
        self.modify_track_event(r.into(), domain, |e| e.replace_options(options))
    }

    pub fn retime_track_event(
        &self,
        r: impl Into<TrackEventRef>,
        start: f64,
        end: f64,
        domain: Option<&str>,
    ) -> ButterResult<TrackEvent> {
        self.modify_track_event(r.into(), domain, |e| e.retime(start, end))
    }

    fn modify_track_event<F>(&self, r: TrackEventRef, domain: Option<&str>, f: F) -> ButterResult<TrackEvent>
    where
        F: FnOnce(&mut TrackEvent) -> ButterResult<()>,
    {
        let updated = {
            let mut state = self.write();
            let media = state.current_mut()?;
            let event = media
                .track_event_mut(&r)
                .ok_or_else(|| ButterError::not_found(EntityKind::TrackEvent, &r))?;
            f(event)?;
            event.clone()
        };
        debug!("{}: track event {} updated (domain {:?})", self.id(), updated.id(), domain);
        self.trigger(EventName::TrackEventUpdated, Payload::TrackEvent(updated.clone()), domain);
        Ok(updated)
    }

    /// Record the manifest the preview runtime reported for an event.
    /// Searches every media and announces nothing.
    pub fn set_track_event_manifest(&self, id: TrackEventId, manifest: serde_json::Value) -> ButterResult<()> {
        let r = TrackEventRef::ById(id);
        let mut state = self.write();
        let event = state
            .medias
            .values_mut()
            .find_map(|m| m.track_event_mut(&r))
            .ok_or_else(|| ButterError::not_found(EntityKind::TrackEvent, &r))?;
        event.manifest = Some(manifest);
        Ok(())
    }

    // ========== Targets ==========

    pub fn add_target(&self, target: Target) -> ButterResult<Target> {
        {
            let mut state = self.write();
            if state.targets.contains_key(&target.id()) {
                return Err(ButterError::AlreadyAttached { kind: EntityKind::Target, id: target.id().get() });
            }
            if state.targets.values().any(|t| t.name() == target.name()) {
                return Err(ButterError::duplicate(EntityKind::Target, target.name()));
            }
            state.targets.insert(target.id(), target.clone());
        }
        debug!("{}: target {} '{}' added", self.id(), target.id(), target.name());
        self.trigger(EventName::TargetAdded, Payload::Target(target.clone()), None);
        Ok(target)
    }

    pub fn remove_target(&self, r: impl Into<TargetRef>) -> ButterResult<Target> {
        let r = r.into();
        let removed = {
            let mut state = self.write();
            let id = state
                .targets
                .values()
                .find(|t| r.matches(t.id(), t.name()))
                .map(Target::id)
                .ok_or_else(|| ButterError::not_found(EntityKind::Target, &r))?;
            state
                .targets
                .shift_remove(&id)
                .ok_or_else(|| ButterError::not_found(EntityKind::Target, &r))?
        };
        self.trigger(EventName::TargetRemoved, Payload::Target(removed.clone()), None);
        Ok(removed)
    }

    pub fn get_targets(&self) -> Vec<Target> {
        self.read().targets.values().cloned().collect()
    }

    pub fn get_target(&self, r: impl Into<TargetRef>) -> Option<Target> {
        let r = r.into();
        self.read().targets.values().find(|t| r.matches(t.id(), t.name())).cloned()
    }
}
