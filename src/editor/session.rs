//! Event editor: one remote editing session at a time.
//!
//! ```text
//! Idle ──edit_track_event──► Opening ──surface loaded──► Bound ◄──► Applying
//!                                                          │
//!                      okay / delete / cancel / unload ────┴──► Closed
//! ```
//!
//! Each session gets a generation number. Callbacks registered for a session
//! carry it and do nothing once a newer session replaced theirs, so late
//! messages from a torn-down surface cannot touch the project.

use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info, trace, warn};
use once_cell::sync::OnceCell;
use serde_json::{Value, json};

use super::config::{EditorConfig, EditorTarget};
use super::surface::{EditorHost, SurfaceSpec};
use crate::comm::{BindOptions, Binding, CommServer, ContextId};
use crate::core::{
    BusEvent, Butter, EDITOR_DOMAIN, EventName, ListenerId, Module, Payload, WeakButter,
};
use crate::entities::{PopcornOptions, TrackEventId, TrackEventRef};
use crate::error::{ButterError, ButterResult, EntityKind};

/// Channel name the editor document is bound under.
pub const EDITOR_CHANNEL: &str = "editorCommLink";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Opening,
    Bound,
    Applying,
    Closed,
}

/// Commands the editor document sends back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Okay,
    Apply,
    Delete,
    Cancel,
}

impl Command {
    const ALL: [Command; 4] = [Command::Okay, Command::Apply, Command::Delete, Command::Cancel];

    fn wire(self) -> &'static str {
        match self {
            Command::Okay => "okayclicked",
            Command::Apply => "applyclicked",
            Command::Delete => "deleteclicked",
            Command::Cancel => "cancelclicked",
        }
    }
}

struct Session {
    generation: u64,
    event: TrackEventId,
    surface: ContextId,
    state: SessionState,
    bus_listeners: Vec<(EventName, ListenerId)>,
}

struct EditorState {
    config: EditorConfig,
    session: Option<Session>,
    /// Reported while no session is open.
    rest: SessionState,
    generation: u64,
}

pub struct EventEditor {
    host: Arc<dyn EditorHost>,
    comm: CommServer,
    butter: OnceCell<WeakButter>,
    state: Mutex<EditorState>,
}

impl std::fmt::Debug for EventEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEditor")
            .field("state", &self.session_state())
            .field("editing", &self.editing())
            .field("comm", &self.comm)
            .finish()
    }
}

impl Module for EventEditor {
    fn name(&self) -> &'static str {
        "eventeditor"
    }

    fn setup(self: Arc<Self>, butter: &Butter) -> ButterResult<()> {
        self.butter
            .set(butter.downgrade())
            .map_err(|_| ButterError::config("eventeditor: already attached to a project"))?;
        debug!("EventEditor: attached to {}", butter.id());
        Ok(())
    }
}

impl EventEditor {
    pub fn new(host: Arc<dyn EditorHost>, config: EditorConfig) -> ButterResult<Self> {
        config.validate()?;
        Ok(Self {
            host,
            comm: CommServer::new(),
            butter: OnceCell::new(),
            state: Mutex::new(EditorState { config, session: None, rest: SessionState::Idle, generation: 0 }),
        })
    }

    fn lock(&self) -> MutexGuard<'_, EditorState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn butter(&self) -> ButterResult<Butter> {
        self.butter.get().ok_or(ButterError::Detached)?.get()
    }

    pub fn comm(&self) -> &CommServer {
        &self.comm
    }

    /// Deliver pending messages from the editor surface.
    pub fn pump(&self) -> usize {
        self.comm.pump()
    }

    pub fn session_state(&self) -> SessionState {
        let st = self.lock();
        st.session.as_ref().map(|s| s.state).unwrap_or(st.rest)
    }

    /// Event being edited by the open session.
    pub fn editing(&self) -> Option<TrackEventId> {
        self.lock().session.as_ref().map(|s| s.event)
    }

    /// Surface of the open session.
    pub fn surface(&self) -> Option<ContextId> {
        self.lock().session.as_ref().map(|s| s.surface)
    }

    pub fn config(&self) -> EditorConfig {
        self.lock().config.clone()
    }

    // ========== Session lifecycle ==========

    /// Open an editor for `event`, replacing any open session.
    ///
    /// Returns the surface the editor document loads into; the session is
    /// `Opening` until that surface reports it has loaded.
    pub fn edit_track_event(self: &Arc<Self>, event: impl Into<TrackEventRef>) -> ButterResult<ContextId> {
        let butter = self.butter()?;
        let r = event.into();
        let event = butter
            .get_track_event(r.clone())?
            .ok_or_else(|| ButterError::not_found(EntityKind::TrackEvent, &r))?;

        self.teardown(None, EventName::TrackEditClosed);

        let (generation, spec, target) = {
            let mut st = self.lock();
            st.generation += 1;
            let spec = SurfaceSpec {
                url: st.config.editor_url(&event.plugin_type, event.custom_editor()),
                width: st.config.editor_width,
                height: st.config.editor_height,
            };
            (st.generation, spec, st.config.editor_target())
        };

        let (binding, handle) = match &target {
            EditorTarget::Dom(dom) => {
                self.host.clear_target(dom);
                (Binding::Frame, self.host.attach_frame(self.comm.host(), dom, &spec)?)
            }
            EditorTarget::Window(win) => (Binding::Window, self.host.attach_window(self.comm.host(), win, &spec)?),
            EditorTarget::Popup => (Binding::Window, self.host.open_window(self.comm.host(), &spec)?),
        };
        let surface = handle.id();

        self.lock().session = Some(Session {
            generation,
            event: event.id(),
            surface,
            state: SessionState::Opening,
            bus_listeners: Vec::new(),
        });

        let weak = Arc::downgrade(self);
        let ready = weak.clone();
        let options = BindOptions::default()
            .on_ready(move || {
                if let Some(editor) = ready.upgrade() {
                    editor.on_bound(generation);
                }
            })
            .on_unload(move || {
                if let Some(editor) = weak.upgrade() {
                    editor.teardown(Some(generation), EventName::TrackEditForcedClosed);
                }
            });
        self.comm.bind(EDITOR_CHANNEL, binding, handle, options);

        info!("EventEditor: session {} opening '{}' for {} ({:?})", generation, spec.url, event.id(), target);
        butter.trigger(EventName::TrackEditStarted, Payload::TrackEvent(event), None);
        Ok(surface)
    }

    /// Close the open session from the host side. Returns false if none was open.
    pub fn close(&self) -> bool {
        self.teardown(None, EventName::TrackEditClosed)
    }

    fn on_bound(self: &Arc<Self>, generation: u64) {
        if let Err(e) = self.bind_session(generation) {
            warn!("EventEditor: session {} failed to start: {}", generation, e);
            self.teardown(Some(generation), EventName::TrackEditClosed);
        }
    }

    fn bind_session(self: &Arc<Self>, generation: u64) -> ButterResult<()> {
        let butter = self.butter()?;
        let Some(event_id) = self.live_event(generation) else {
            return Ok(());
        };
        let event = butter
            .get_track_event(event_id)?
            .ok_or_else(|| ButterError::not_found(EntityKind::TrackEvent, event_id))?;

        let weak = Arc::downgrade(self);
        for command in Command::ALL {
            let w = weak.clone();
            self.comm.listen(EDITOR_CHANNEL, command.wire(), move |msg| {
                if let Some(editor) = w.upgrade() {
                    editor.on_command(generation, command, msg);
                }
            })?;
        }

        let w = weak.clone();
        let updated = butter.listen(EventName::TrackEventUpdated, move |e| {
            if let Some(editor) = w.upgrade() {
                editor.push_update(generation, e);
            }
        }, None);
        let w = weak.clone();
        let targets = butter.listen(EventName::TargetAdded, move |_| {
            if let Some(editor) = w.upgrade() {
                editor.push_targets(generation);
            }
        }, None);
        let w = weak;
        let removed = butter.listen(EventName::TrackEventRemoved, move |e| {
            if let Some(editor) = w.upgrade() {
                editor.on_event_removed(generation, e);
            }
        }, None);
        let bus_listeners = vec![
            (EventName::TrackEventUpdated, updated),
            (EventName::TargetAdded, targets),
            (EventName::TrackEventRemoved, removed),
        ];

        let stale = {
            let mut st = self.lock();
            match st.session.as_mut() {
                Some(s) if s.generation == generation => {
                    s.state = SessionState::Bound;
                    s.bus_listeners = bus_listeners;
                    None
                }
                _ => Some(bus_listeners),
            }
        };
        if let Some(listeners) = stale {
            for (name, id) in listeners {
                butter.unlisten(name, Some(id), None);
            }
            return Ok(());
        }

        let payload = json!({
            "trackEvent": serde_json::to_value(&event)?,
            "targets": target_pairs(&butter),
        });
        self.comm.send(EDITOR_CHANNEL, payload, Some("edittrackevent"))?;
        info!("EventEditor: session {} bound to {}", generation, event_id);
        Ok(())
    }

    fn live_event(&self, generation: u64) -> Option<TrackEventId> {
        let st = self.lock();
        st.session.as_ref().filter(|s| s.generation == generation).map(|s| s.event)
    }

    fn set_state(&self, generation: u64, state: SessionState) {
        if let Some(s) = self.lock().session.as_mut().filter(|s| s.generation == generation) {
            s.state = state;
        }
    }

    fn on_command(&self, generation: u64, command: Command, msg: &Value) {
        if self.live_event(generation).is_none() {
            trace!("EventEditor: '{}' for closed session {} ignored", command.wire(), generation);
            return;
        }
        if let Err(e) = self.run_command(generation, command, msg) {
            warn!("EventEditor: '{}' failed: {}", command.wire(), e);
        }
    }

    fn run_command(&self, generation: u64, command: Command, msg: &Value) -> ButterResult<()> {
        let butter = self.butter()?;
        let event = self.live_event(generation).ok_or(ButterError::Detached)?;
        debug!("EventEditor: session {} <- {}", generation, command.wire());
        match command {
            Command::Apply => {
                let options = editor_options(msg)?;
                self.set_state(generation, SessionState::Applying);
                let res = butter.update_track_event(event, options, Some(EDITOR_DOMAIN));
                self.set_state(generation, SessionState::Bound);
                res?;
            }
            // Okay and delete close the session before touching the model,
            // so the session ends even when the change is rejected.
            Command::Okay => {
                self.teardown(Some(generation), EventName::TrackEditClosed);
                butter.update_track_event(event, editor_options(msg)?, Some(EDITOR_DOMAIN))?;
            }
            Command::Delete => {
                self.teardown(Some(generation), EventName::TrackEditClosed);
                butter.remove_track_event(event)?;
            }
            Command::Cancel => {
                self.teardown(Some(generation), EventName::TrackEditClosed);
            }
        }
        Ok(())
    }

    /// Push model changes made elsewhere into the open editor.
    fn push_update(&self, generation: u64, e: &BusEvent) {
        if e.is_domain(EDITOR_DOMAIN) {
            return;
        }
        let Some(event) = e.data.as_track_event() else {
            return;
        };
        if self.live_event(generation) != Some(event.id()) {
            return;
        }
        if let Err(err) = self.comm.send(EDITOR_CHANNEL, &event.popcorn_options, Some("updatetrackevent")) {
            warn!("EventEditor: updatetrackevent not delivered: {}", err);
        }
    }

    /// The edited event left the project (directly or with its track or media).
    fn on_event_removed(&self, generation: u64, e: &BusEvent) {
        let Some(event) = e.data.as_track_event() else {
            return;
        };
        if self.live_event(generation) == Some(event.id()) {
            info!("EventEditor: {} removed while open in session {}", event.id(), generation);
            self.teardown(Some(generation), EventName::TrackEditForcedClosed);
        }
    }

    fn push_targets(&self, generation: u64) {
        if self.live_event(generation).is_none() {
            return;
        }
        let res = self
            .butter()
            .and_then(|b| self.comm.send(EDITOR_CHANNEL, target_pairs(&b), Some("updatedomtargets")));
        if let Err(err) = res {
            warn!("EventEditor: updatedomtargets not delivered: {}", err);
        }
    }

    /// Close the session (if `generation` matches, or any session when None),
    /// detach its listeners, tear the surface down and announce `reason`.
    fn teardown(&self, generation: Option<u64>, reason: EventName) -> bool {
        let session = {
            let mut st = self.lock();
            if !st.session.as_ref().is_some_and(|s| generation.is_none_or(|g| g == s.generation)) {
                return false;
            }
            st.rest = SessionState::Closed;
            st.session.take()
        };
        let Some(session) = session else {
            return false;
        };

        let butter = self.butter();
        if let Ok(butter) = &butter {
            for (name, id) in session.bus_listeners {
                butter.unlisten(name, Some(id), None);
            }
        }
        self.comm.unbind(EDITOR_CHANNEL);
        self.host.close(session.surface);
        info!("EventEditor: session {} closed ({})", session.generation, reason);

        if let Ok(butter) = butter {
            butter.trigger(reason, Payload::None, None);
        }
        true
    }

    // ========== Extension API ==========

    /// Use `url` for every event of `plugin_type`.
    pub fn add_custom_editor(&self, plugin_type: &str, url: &str) -> ButterResult<()> {
        if plugin_type.is_empty() || url.is_empty() {
            return Err(ButterError::invalid("custom editor needs a plugin type and a document"));
        }
        self.lock().config.custom_editors.insert(plugin_type.to_string(), url.to_string());
        Ok(())
    }

    /// Returns the document that was registered for `plugin_type`.
    pub fn remove_custom_editor(&self, plugin_type: &str) -> ButterResult<String> {
        self.lock()
            .config
            .custom_editors
            .remove(plugin_type)
            .ok_or_else(|| ButterError::not_found(EntityKind::Plugin, plugin_type))
    }

    /// Takes effect for the next session.
    pub fn change_editor_target(&self, target: EditorTarget) -> ButterResult<()> {
        match &target {
            EditorTarget::Dom(s) | EditorTarget::Window(s) if s.is_empty() => {
                Err(ButterError::invalid("editor target name is empty"))
            }
            _ => {
                self.lock().config.set_editor_target(target);
                Ok(())
            }
        }
    }

    pub fn set_default_editor(&self, url: &str) -> ButterResult<()> {
        if url.is_empty() {
            return Err(ButterError::invalid("default editor is empty"));
        }
        self.lock().config.default_editor = url.to_string();
        Ok(())
    }

    /// Change one or both dimensions; takes effect for the next session.
    pub fn set_editor_dims(&self, width: Option<u32>, height: Option<u32>) -> ButterResult<()> {
        if width.unwrap_or(0) == 0 && height.unwrap_or(0) == 0 {
            return Err(ButterError::invalid("editor dimensions need a width or a height"));
        }
        let mut st = self.lock();
        if let Some(w) = width.filter(|w| *w > 0) {
            st.config.editor_width = w;
        }
        if let Some(h) = height.filter(|h| *h > 0) {
            st.config.editor_height = h;
        }
        Ok(())
    }
}

fn editor_options(msg: &Value) -> ButterResult<PopcornOptions> {
    msg.as_object()
        .cloned()
        .ok_or_else(|| ButterError::invalid(format!("editor options must be an object, got {}", msg)))
}

/// Target registry as `[[name, id], ..]`.
fn target_pairs(butter: &Butter) -> Value {
    Value::from(
        butter
            .get_targets()
            .iter()
            .map(|t| {
                let (name, id) = t.as_pair();
                json!([name, id])
            })
            .collect::<Vec<_>>(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comm::CommClient;
    use crate::editor::surface::{MemoryEditorHost, SurfaceKind};
    use crate::entities::{Media, Target, Track, TrackEvent, TrackEventOptions};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Fixture {
        butter: Butter,
        editor: Arc<EventEditor>,
        host: Arc<MemoryEditorHost>,
        event: TrackEventId,
    }

    fn fixture(config: EditorConfig) -> Fixture {
        let host = Arc::new(MemoryEditorHost::new());
        let butter = Butter::builder()
            .module(EventEditor::new(host.clone(), config).unwrap())
            .build()
            .unwrap();
        let editor = butter.module::<EventEditor>().unwrap();
        butter.add_media(Media::named("m")).unwrap();
        butter.add_track(Track::named("t")).unwrap();
        let ev = TrackEvent::new(TrackEventOptions::new("text", 0.0, 2.0).name("e").option("text", "one")).unwrap();
        let event = butter.add_track_event("t", ev).unwrap().id();
        Fixture { butter, editor, host, event }
    }

    /// Play the editor document: load the surface and connect a client.
    fn load_page(f: &Fixture, surface: ContextId) -> (CommClient, Arc<Mutex<Vec<(String, Value)>>>) {
        let ctx = f.host.take_context(surface).unwrap();
        ctx.signal_loaded().unwrap();
        let inbox = Arc::new(Mutex::new(Vec::new()));
        let i = Arc::clone(&inbox);
        let client = CommClient::new(
            EDITOR_CHANNEL,
            ctx,
            Some(Arc::new(move |env: &crate::comm::Envelope| {
                i.lock().unwrap().push((env.kind.clone().unwrap_or_default(), env.message.clone()));
            })),
        );
        f.editor.pump();
        client.pump().unwrap();
        (client, inbox)
    }

    fn count(butter: &Butter, name: EventName) -> Arc<AtomicUsize> {
        let n = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&n);
        butter.listen(name, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }, None);
        n
    }

    #[test]
    fn test_apply_apply_okay() {
        let f = fixture(EditorConfig::default());
        let updates = count(&f.butter, EventName::TrackEventUpdated);
        let closed = count(&f.butter, EventName::TrackEditClosed);

        let surface = f.editor.edit_track_event(f.event).unwrap();
        assert_eq!(f.editor.session_state(), SessionState::Opening);
        let (client, _) = load_page(&f, surface);
        assert_eq!(f.editor.session_state(), SessionState::Bound);

        client.send(json!({"text": "two"}), Some("applyclicked")).unwrap();
        f.editor.pump();
        assert_eq!(f.editor.session_state(), SessionState::Bound);
        client.send(json!({"text": "three"}), Some("applyclicked")).unwrap();
        f.editor.pump();
        assert_eq!(f.editor.session_state(), SessionState::Bound);
        assert_eq!(closed.load(Ordering::SeqCst), 0);

        client.send(json!({"text": "four"}), Some("okayclicked")).unwrap();
        f.editor.pump();
        assert_eq!(f.editor.session_state(), SessionState::Closed);
        assert_eq!(updates.load(Ordering::SeqCst), 3);
        assert_eq!(closed.load(Ordering::SeqCst), 1);

        let ev = f.butter.get_track_event(f.event).unwrap().unwrap();
        assert_eq!(ev.popcorn_options.get("text"), Some(&json!("four")));
        assert!(f.host.is_closed(surface));
        assert!(!f.editor.comm().is_bound(EDITOR_CHANNEL));
    }

    #[test]
    fn test_initial_payload() {
        let f = fixture(EditorConfig::default());
        let stage = f.butter.add_target(Target::new(Some("stage"), Some("#stage"))).unwrap();
        let surface = f.editor.edit_track_event("e").unwrap();
        let (_client, inbox) = load_page(&f, surface);

        let inbox = inbox.lock().unwrap();
        assert_eq!(inbox.len(), 1);
        let (kind, body) = &inbox[0];
        assert_eq!(kind, "edittrackevent");
        assert_eq!(body["trackEvent"]["name"], json!("e"));
        assert_eq!(body["trackEvent"]["popcornOptions"]["text"], json!("one"));
        assert_eq!(body["targets"], json!([["stage", stage.id().get()]]));
    }

    #[test]
    fn test_external_update_pushed_editor_update_not_echoed() {
        let f = fixture(EditorConfig::default());
        let surface = f.editor.edit_track_event(f.event).unwrap();
        let (client, inbox) = load_page(&f, surface);
        inbox.lock().unwrap().clear();

        // Timeline-side change reaches the editor
        let mut opts = PopcornOptions::new();
        opts.insert("text".into(), json!("from timeline"));
        f.butter.update_track_event(f.event, opts, None).unwrap();
        // Editor-originated change is not echoed back
        client.send(json!({"text": "from editor"}), Some("applyclicked")).unwrap();
        f.editor.pump();
        client.pump().unwrap();

        let inbox = inbox.lock().unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].0, "updatetrackevent");
        assert_eq!(inbox[0].1, json!({"text": "from timeline"}));
    }

    #[test]
    fn test_target_added_pushes_targets() {
        let f = fixture(EditorConfig::default());
        let surface = f.editor.edit_track_event(f.event).unwrap();
        let (client, inbox) = load_page(&f, surface);
        inbox.lock().unwrap().clear();

        f.butter.add_target(Target::named("side")).unwrap();
        client.pump().unwrap();
        let inbox = inbox.lock().unwrap();
        assert_eq!(inbox[0].0, "updatedomtargets");
        assert_eq!(inbox[0].1[0][0], json!("side"));
    }

    #[test]
    fn test_delete_removes_and_closes() {
        let f = fixture(EditorConfig::default());
        let removed = count(&f.butter, EventName::TrackEventRemoved);
        let surface = f.editor.edit_track_event(f.event).unwrap();
        let (client, _) = load_page(&f, surface);

        client.send(Value::Null, Some("deleteclicked")).unwrap();
        f.editor.pump();
        assert_eq!(removed.load(Ordering::SeqCst), 1);
        assert!(f.butter.get_track_event(f.event).unwrap().is_none());
        assert_eq!(f.editor.session_state(), SessionState::Closed);
    }

    #[test]
    fn test_cancel_detaches_listeners() {
        let f = fixture(EditorConfig::default());
        let updates = count(&f.butter, EventName::TrackEventUpdated);
        let surface = f.editor.edit_track_event(f.event).unwrap();
        let (client, _) = load_page(&f, surface);
        assert_eq!(f.butter.bus().listener_count(EventName::TrackEventUpdated, None), 2);

        client.send(Value::Null, Some("cancelclicked")).unwrap();
        f.editor.pump();
        assert_eq!(f.editor.session_state(), SessionState::Closed);
        assert_eq!(updates.load(Ordering::SeqCst), 0);
        assert_eq!(f.butter.bus().listener_count(EventName::TrackEventUpdated, None), 1);
        assert_eq!(f.butter.bus().listener_count(EventName::TargetAdded, None), 0);
    }

    #[test]
    fn test_surface_unload_forces_close() {
        let f = fixture(EditorConfig::default());
        let forced = count(&f.butter, EventName::TrackEditForcedClosed);
        let surface = f.editor.edit_track_event(f.event).unwrap();
        let (client, _) = load_page(&f, surface);

        client.context().signal_unloaded().unwrap();
        f.editor.pump();
        assert_eq!(forced.load(Ordering::SeqCst), 1);
        assert_eq!(f.editor.session_state(), SessionState::Closed);
        assert_eq!(f.editor.editing(), None);
    }

    #[test]
    fn test_reopen_replaces_session() {
        let f = fixture(EditorConfig::default());
        let closed = count(&f.butter, EventName::TrackEditClosed);
        let updates = count(&f.butter, EventName::TrackEventUpdated);

        let first = f.editor.edit_track_event(f.event).unwrap();
        let old_ctx = f.host.take_context(first).unwrap();
        let second = f.editor.edit_track_event(f.event).unwrap();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(f.host.is_closed(first));

        // The old surface finishing its load and sending commands changes nothing
        old_ctx.signal_loaded().unwrap();
        let stale = CommClient::new(EDITOR_CHANNEL, old_ctx, None);
        stale.send(json!({"text": "stale"}), Some("okayclicked")).unwrap();
        assert_eq!(f.editor.pump(), 0);
        assert_eq!(f.editor.session_state(), SessionState::Opening);

        let (client, _) = load_page(&f, second);
        client.send(json!({"text": "fresh"}), Some("applyclicked")).unwrap();
        f.editor.pump();
        assert_eq!(updates.load(Ordering::SeqCst), 1);
        assert_eq!(f.editor.session_state(), SessionState::Bound);
    }

    #[test]
    fn test_bad_apply_keeps_session_bad_okay_closes() {
        let f = fixture(EditorConfig::default());
        let closed = count(&f.butter, EventName::TrackEditClosed);
        let surface = f.editor.edit_track_event(f.event).unwrap();
        let (client, _) = load_page(&f, surface);

        client.send(json!({"start": 3.0, "end": 1.0}), Some("applyclicked")).unwrap();
        client.send(json!("not an object"), Some("applyclicked")).unwrap();
        f.editor.pump();
        assert_eq!(f.editor.session_state(), SessionState::Bound);

        client.send(json!("not an object"), Some("okayclicked")).unwrap();
        f.editor.pump();
        assert_eq!(f.editor.session_state(), SessionState::Closed);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(f.host.is_closed(surface));
        assert_eq!(f.butter.get_track_event(f.event).unwrap().unwrap().end, 2.0);
    }

    #[test]
    fn test_okay_closes_before_update() {
        let f = fixture(EditorConfig::default());
        let surface = f.editor.edit_track_event(f.event).unwrap();
        let (client, _) = load_page(&f, surface);
        f.butter.bus().poll();

        client.send(json!({"text": "done"}), Some("okayclicked")).unwrap();
        f.editor.pump();
        let names: Vec<EventName> = f.butter.bus().poll().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec![EventName::TrackEditClosed, EventName::TrackEventUpdated]);
    }

    #[test]
    fn test_removing_edited_event_forces_close() {
        let f = fixture(EditorConfig::default());
        let forced = count(&f.butter, EventName::TrackEditForcedClosed);
        let surface = f.editor.edit_track_event(f.event).unwrap();
        let (_client, _) = load_page(&f, surface);

        // Another event going away leaves the session alone
        let other = TrackEvent::new(TrackEventOptions::new("text", 3.0, 4.0)).unwrap();
        let other = f.butter.add_track_event("t", other).unwrap();
        f.butter.remove_track_event(other.id()).unwrap();
        assert_eq!(f.editor.session_state(), SessionState::Bound);

        f.butter.remove_track_event(f.event).unwrap();
        assert_eq!(forced.load(Ordering::SeqCst), 1);
        assert_eq!(f.editor.session_state(), SessionState::Closed);
        assert!(f.host.is_closed(surface));
        assert_eq!(f.butter.bus().listener_count(EventName::TrackEventRemoved, None), 0);
    }

    #[test]
    fn test_okay_after_track_removed() {
        let f = fixture(EditorConfig::default());
        let closed = count(&f.butter, EventName::TrackEditClosed);
        let forced = count(&f.butter, EventName::TrackEditForcedClosed);
        let surface = f.editor.edit_track_event(f.event).unwrap();
        let (client, _) = load_page(&f, surface);

        f.butter.remove_track("t").unwrap();
        assert_eq!(f.editor.session_state(), SessionState::Closed);
        assert_eq!(f.editor.editing(), None);
        assert_eq!(forced.load(Ordering::SeqCst), 1);

        // A late OK from the page finds no session and changes nothing
        client.send(json!({"text": "x"}), Some("okayclicked")).unwrap();
        f.editor.pump();
        assert_eq!(f.editor.session_state(), SessionState::Closed);
        assert_eq!(closed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_okay_for_missing_event_still_closes() {
        let f = fixture(EditorConfig::default());
        let surface = f.editor.edit_track_event(f.event).unwrap();
        let (client, _) = load_page(&f, surface);

        // Drop the removal watcher so the session outlives its event
        f.butter.bus().unlisten(EventName::TrackEventRemoved, None, None);
        f.butter.remove_track_event(f.event).unwrap();
        assert_eq!(f.editor.session_state(), SessionState::Bound);

        client.send(json!({"text": "x"}), Some("okayclicked")).unwrap();
        f.editor.pump();
        assert_eq!(f.editor.session_state(), SessionState::Closed);
        assert!(f.host.is_closed(surface));
    }

    #[test]
    fn test_dom_target_and_custom_editors() {
        let config = EditorConfig { target: Some("editor-div".into()), ..Default::default() };
        let f = fixture(config);
        f.editor.add_custom_editor("text", "textEditor.html").unwrap();
        f.editor.set_editor_dims(Some(640), None).unwrap();

        f.editor.edit_track_event(f.event).unwrap();
        let rec = f.host.last_surface().unwrap();
        assert_eq!(rec.kind, SurfaceKind::Frame("editor-div".into()));
        assert_eq!(rec.spec.url, "textEditor.html");
        assert_eq!((rec.spec.width, rec.spec.height), (640, 400));
        assert_eq!(f.host.cleared_targets(), vec!["editor-div".to_string()]);

        assert_eq!(f.editor.remove_custom_editor("text").unwrap(), "textEditor.html");
        assert!(f.editor.remove_custom_editor("text").is_err());
        f.editor.change_editor_target(EditorTarget::Popup).unwrap();
        f.editor.set_default_editor("other.html").unwrap();
        f.editor.edit_track_event(f.event).unwrap();
        let rec = f.host.last_surface().unwrap();
        assert_eq!(rec.kind, SurfaceKind::Popup);
        assert_eq!(rec.spec.url, "other.html");
    }

    #[test]
    fn test_manifest_editor_used() {
        let f = fixture(EditorConfig::default());
        f.butter
            .set_track_event_manifest(f.event, json!({"customEditor": "manifestEditor.html"}))
            .unwrap();
        f.editor.edit_track_event(f.event).unwrap();
        assert_eq!(f.host.last_surface().unwrap().spec.url, "manifestEditor.html");
    }

    #[test]
    fn test_edit_missing_event() {
        let f = fixture(EditorConfig::default());
        assert!(matches!(
            f.editor.edit_track_event("nope"),
            Err(ButterError::NotFound { kind: EntityKind::TrackEvent, .. })
        ));
        assert_eq!(f.editor.session_state(), SessionState::Idle);
        assert!(!f.editor.close());
    }
}
