//! Previewer: keeps the preview frame in step with the project.
//!
//! Lifecycle:
//! ```text
//! Loading ──layout loaded, scraped──► Scraped ──current media──► Building ──media data──► Ready
//!                                                                   ▲                      │
//!                                                                   └──── mediachanged ────┘
//! ```
//!
//! Every rebuild starts a new document generation with its own
//! [`CancelToken`]; waits queued for an older document die with it.
//! Track event changes of the current media are mirrored into its runtime in
//! arrival order. Changes that arrive before the runtime exists are queued
//! and retried from [`Previewer::tick`].

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use log::{debug, info, trace, warn};
use once_cell::sync::OnceCell;

use super::bootstrap::{self, bootstrap_script, document_html, runtime_var};
use super::config::PreviewConfig;
use super::runtime::{ElementRole, HAVE_CURRENT_DATA, LayoutDocument, PreviewFrame, PreviewRuntime, RuntimeEventId};
use crate::core::{
    BusEvent, Butter, CancelToken, EventName, ListenerId, Module, Payload, ReadinessWait, RetryPolicy,
    TIMELINE_DOMAIN, WeakButter,
};
use crate::entities::{Media, MediaId, Target, TrackEvent, TrackEventId};
use crate::error::{ButterError, ButterResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewPhase {
    /// Layout document requested, not yet scraped.
    Loading,
    /// Layout scraped, no document built.
    Scraped,
    /// Document written, waiting for the current media's runtime.
    Building,
    /// Runtime up and media data known.
    Ready,
}

#[derive(Debug, Clone)]
enum MirrorOp {
    Upsert(TrackEvent),
    Remove(TrackEventId),
}

impl fmt::Display for MirrorOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MirrorOp::Upsert(e) => write!(f, "upsert {}", e.id()),
            MirrorOp::Remove(id) => write!(f, "remove {}", id),
        }
    }
}

struct PendingOp {
    media: MediaId,
    op: MirrorOp,
    wait: ReadinessWait,
}

struct Mirrored {
    media: MediaId,
    runtime_id: RuntimeEventId,
}

struct ReadyWait {
    media: MediaId,
    wait: ReadinessWait,
}

type ListenerEntry = (EventName, Option<&'static str>, ListenerId);

struct PreviewState {
    phase: PreviewPhase,
    original: Option<LayoutDocument>,
    layout_wait: Option<ReadinessWait>,
    generation: u64,
    token: CancelToken,
    /// Media the current document was built for.
    built_for: Option<MediaId>,
    ready_wait: Option<ReadyWait>,
    mirrored: HashMap<TrackEventId, Mirrored>,
    pending: VecDeque<PendingOp>,
    reported_time: Option<f64>,
    listeners: Vec<ListenerEntry>,
}

/// Outcome of one [`Previewer::tick`].
#[derive(Debug, Default)]
pub struct TickReport {
    pub applied: usize,
    pub errors: Vec<ButterError>,
}

type ReadyCallback = Box<dyn FnOnce() + Send>;

pub struct Previewer {
    frame: Arc<dyn PreviewFrame>,
    config: PreviewConfig,
    policy: RetryPolicy,
    butter: OnceCell<WeakButter>,
    on_ready: Mutex<Option<ReadyCallback>>,
    state: Mutex<PreviewState>,
}

impl fmt::Debug for Previewer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let st = self.lock();
        f.debug_struct("Previewer")
            .field("phase", &st.phase)
            .field("generation", &st.generation)
            .field("mirrored", &st.mirrored.len())
            .field("pending", &st.pending.len())
            .finish()
    }
}

impl Module for Previewer {
    fn name(&self) -> &'static str {
        "previewer"
    }

    fn setup(self: Arc<Self>, butter: &Butter) -> ButterResult<()> {
        self.butter
            .set(butter.downgrade())
            .map_err(|_| ButterError::config("previewer: already attached to a project"))?;

        // validated in new()
        let layout = self.config.layout.clone().unwrap_or_default();
        self.frame.load_layout(&layout)?;

        let weak = Arc::downgrade(&self);
        let hook = |name: EventName, domain: Option<&'static str>, f: fn(&Previewer, &BusEvent)| -> ListenerEntry {
            let w: Weak<Previewer> = weak.clone();
            let id = butter.listen(
                name.clone(),
                move |e| {
                    if let Some(p) = w.upgrade() {
                        f(&p, e)
                    }
                },
                domain,
            );
            (name, domain, id)
        };
        let listeners = vec![
            hook(EventName::TrackEventAdded, None, Previewer::on_track_event_changed),
            hook(EventName::TrackEventUpdated, None, Previewer::on_track_event_changed),
            hook(EventName::TrackEventRemoved, None, Previewer::on_track_event_removed),
            hook(EventName::MediaChanged, None, Previewer::on_media_changed),
            hook(EventName::MediaContentChanged, None, Previewer::on_media_changed),
            hook(EventName::MediaTimeUpdate, Some(TIMELINE_DOMAIN), Previewer::on_timeline_seek),
        ];

        let mut st = self.lock();
        st.layout_wait = Some(ReadinessWait::new(format!("layout {}", layout), self.policy, st.token.clone()));
        st.listeners = listeners;
        debug!("Previewer: attached to {}, loading layout {}", butter.id(), layout);
        Ok(())
    }
}

impl Previewer {
    pub fn new(frame: Arc<dyn PreviewFrame>, config: PreviewConfig, policy: RetryPolicy) -> ButterResult<Self> {
        config.validate()?;
        Ok(Self {
            frame,
            config,
            policy,
            butter: OnceCell::new(),
            on_ready: Mutex::new(None),
            state: Mutex::new(PreviewState {
                phase: PreviewPhase::Loading,
                original: None,
                layout_wait: None,
                generation: 0,
                token: CancelToken::new(),
                built_for: None,
                ready_wait: None,
                mirrored: HashMap::new(),
                pending: VecDeque::new(),
                reported_time: None,
                listeners: Vec::new(),
            }),
        })
    }

    /// Run `f` once the layout has been scraped.
    pub fn with_ready_callback(self, f: impl FnOnce() + Send + 'static) -> Self {
        *self.on_ready.lock().unwrap_or_else(|e| e.into_inner()) = Some(Box::new(f));
        self
    }

    fn lock(&self) -> MutexGuard<'_, PreviewState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn butter(&self) -> ButterResult<Butter> {
        self.butter.get().ok_or(ButterError::Detached)?.get()
    }

    pub fn config(&self) -> &PreviewConfig {
        &self.config
    }

    pub fn phase(&self) -> PreviewPhase {
        self.lock().phase
    }

    /// Number of documents built so far.
    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    /// Runtime id a track event is mirrored under.
    pub fn runtime_event(&self, id: TrackEventId) -> Option<RuntimeEventId> {
        self.lock().mirrored.get(&id).map(|m| m.runtime_id.clone())
    }

    /// Script text reproducing the current presentation.
    pub fn export_script(&self) -> ButterResult<String> {
        Ok(bootstrap::export_script(&self.butter()?.get_all_media()))
    }

    /// Stop listening to the project and cancel every pending wait.
    pub fn detach(&self) {
        let listeners = {
            let mut st = self.lock();
            st.token.cancel();
            st.pending.clear();
            st.ready_wait = None;
            st.layout_wait = None;
            std::mem::take(&mut st.listeners)
        };
        if let Ok(butter) = self.butter() {
            for (name, domain, id) in listeners {
                butter.unlisten(name, Some(id), domain);
            }
        }
        debug!("Previewer: detached");
    }

    // ========== Tick ==========

    /// Advance readiness waits, flush queued mirror operations and forward
    /// the runtime's playback time to the project.
    pub fn tick(&self) -> TickReport {
        let mut report = TickReport::default();
        self.poll_layout(&mut report);
        self.poll_ready(&mut report);
        self.poll_pending(&mut report);
        self.sync_time(&mut report);
        report
    }

    fn poll_layout(&self, report: &mut TickReport) {
        let doc = {
            let mut st = self.lock();
            let Some(wait) = st.layout_wait.as_mut() else {
                return;
            };
            match wait.poll(|| self.frame.layout()) {
                Ok(Some(doc)) => {
                    st.layout_wait = None;
                    doc
                }
                Ok(None) => return,
                Err(e) => {
                    st.layout_wait = None;
                    report.errors.push(e);
                    return;
                }
            }
        };
        if let Err(e) = self.scrape(doc) {
            report.errors.push(e);
        }
    }

    /// Register tagged layout elements as targets and media, then build.
    fn scrape(&self, doc: LayoutDocument) -> ButterResult<()> {
        let butter = self.butter()?;
        {
            let mut st = self.lock();
            st.original = Some(doc.clone());
            st.phase = PreviewPhase::Scraped;
        }

        let (mut targets, mut medias) = (0usize, 0usize);
        for el in doc.walk() {
            let Some(role) = el.role else {
                continue;
            };
            if el.id.is_empty() {
                warn!("Previewer: <{}> tagged '{}' has no id, skipped", el.tag, role.as_attr());
                continue;
            }
            let added = match role {
                ElementRole::Target => butter
                    .add_target(Target::new(Some(el.id.as_str()), Some(el.id.as_str())))
                    .map(|_| targets += 1),
                ElementRole::Media => butter
                    .add_media(Media::new(Some(el.id.as_str()), self.config.media.as_deref()))
                    .map(|_| medias += 1),
            };
            if let Err(e) = added {
                warn!("Previewer: layout element '{}' skipped: {}", el.id, e);
            }
        }
        info!("Previewer: layout scraped, {} targets, {} media", targets, medias);

        // The first scraped media already triggered a build via mediachanged.
        if self.phase() == PreviewPhase::Scraped && butter.get_current_media().is_some() {
            self.rebuild()?;
        }

        let callback = self.on_ready.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(cb) = callback {
            cb();
        }
        Ok(())
    }

    fn poll_ready(&self, report: &mut TickReport) {
        let (media, duration) = {
            let mut st = self.lock();
            let Some(ready) = st.ready_wait.as_mut() else {
                return;
            };
            let media = ready.media;
            let probe = || {
                self.frame
                    .runtime(media)
                    .filter(|rt| rt.ready_state() >= HAVE_CURRENT_DATA || rt.duration() > 0.0)
                    .map(|rt| rt.duration())
            };
            match ready.wait.poll(probe) {
                Ok(Some(duration)) => {
                    st.ready_wait = None;
                    st.phase = PreviewPhase::Ready;
                    (media, duration)
                }
                Ok(None) => return,
                Err(e) => {
                    st.ready_wait = None;
                    if !matches!(e, ButterError::Cancelled(_)) {
                        report.errors.push(e);
                    }
                    return;
                }
            }
        };

        let butter = match self.butter() {
            Ok(b) => b,
            Err(e) => {
                report.errors.push(e);
                return;
            }
        };
        if let Err(e) = butter.set_duration(duration, None) {
            report.errors.push(e);
        }
        if let Some(m) = butter.get_media(media) {
            info!("Previewer: {} ready, duration {:.3}", runtime_var(media), duration);
            butter.trigger(EventName::MediaReady, Payload::Media(m), None);
        }
    }

    fn poll_pending(&self, report: &mut TickReport) {
        loop {
            let (media, op, runtime) = {
                let mut st = self.lock();
                let Some(front) = st.pending.front_mut() else {
                    return;
                };
                let media = front.media;
                match front.wait.poll(|| self.frame.runtime(media)) {
                    Ok(Some(rt)) => {
                        let Some(p) = st.pending.pop_front() else {
                            return;
                        };
                        (p.media, p.op, rt)
                    }
                    // Later operations stay behind the front one
                    Ok(None) => return,
                    Err(e) => {
                        st.pending.pop_front();
                        if !matches!(e, ButterError::Cancelled(_)) {
                            report.errors.push(e);
                        }
                        continue;
                    }
                }
            };
            match self.apply(runtime.as_ref(), media, op) {
                Ok(()) => report.applied += 1,
                Err(e) => report.errors.push(e),
            }
        }
    }

    fn sync_time(&self, report: &mut TickReport) {
        let time = {
            let mut st = self.lock();
            if st.phase != PreviewPhase::Ready {
                return;
            }
            let Some(runtime) = st.built_for.and_then(|m| self.frame.runtime(m)) else {
                return;
            };
            let t = runtime.current_time();
            if st.reported_time == Some(t) {
                return;
            }
            st.reported_time = Some(t);
            t
        };
        let result = self.butter().and_then(|butter| {
            butter.set_current_time(time, None)?;
            if let Some(current) = butter.get_current_media() {
                butter.trigger(EventName::TimeUpdate, Payload::Media(current), None);
            }
            Ok(())
        });
        if let Err(e) = result {
            report.errors.push(e);
        }
    }

    // ========== Document ==========

    /// Write a fresh document for the current media and queue every one of
    /// its track events for mirroring.
    fn rebuild(&self) -> ButterResult<()> {
        let butter = self.butter()?;
        let Some(current) = butter.get_current_media() else {
            debug!("Previewer: no current media, nothing to build");
            return Ok(());
        };
        let medias = butter.get_all_media();

        let (html, generation) = {
            let mut st = self.lock();
            let html = match st.original.as_ref() {
                Some(original) => document_html(original, &self.config.popcorn_url, &bootstrap_script(&medias)),
                None => {
                    trace!("Previewer: layout not scraped yet, build deferred");
                    return Ok(());
                }
            };
            st.token.cancel();
            st.token = CancelToken::new();
            st.generation += 1;
            st.phase = PreviewPhase::Building;
            st.built_for = Some(current.id());
            st.mirrored.clear();
            st.pending.clear();
            st.reported_time = None;
            let var = runtime_var(current.id());
            st.ready_wait = Some(ReadyWait {
                media: current.id(),
                wait: ReadinessWait::new(format!("{} media data", var), self.policy, st.token.clone()),
            });
            for event in current.tracks().iter().flat_map(|t| t.track_events()) {
                let op = MirrorOp::Upsert(event.clone());
                let wait = ReadinessWait::new(format!("{} for {}", var, op), self.policy, st.token.clone());
                st.pending.push_back(PendingOp { media: current.id(), op, wait });
            }
            (html, st.generation)
        };

        self.frame.write_document(&html)?;
        info!(
            "Previewer: document generation {} built for {} media, current {}",
            generation,
            medias.len(),
            current.id()
        );
        Ok(())
    }

    // ========== Mirroring ==========

    /// Apply now when nothing is queued and the runtime exists, else queue.
    fn mirror(&self, media: MediaId, op: MirrorOp) -> ButterResult<()> {
        let runtime = {
            let mut st = self.lock();
            if st.built_for != Some(media) {
                trace!("Previewer: {} is not previewed, {} skipped", media, op);
                return Ok(());
            }
            let runtime = if st.pending.is_empty() { self.frame.runtime(media) } else { None };
            match runtime {
                Some(rt) => rt,
                None => {
                    trace!("Previewer: {} queued", op);
                    let wait =
                        ReadinessWait::new(format!("{} for {}", runtime_var(media), op), self.policy, st.token.clone());
                    st.pending.push_back(PendingOp { media, op, wait });
                    return Ok(());
                }
            }
        };
        self.apply(runtime.as_ref(), media, op)
    }

    fn apply(&self, runtime: &dyn PreviewRuntime, media: MediaId, op: MirrorOp) -> ButterResult<()> {
        match op {
            MirrorOp::Upsert(event) => {
                let previous = self.lock().mirrored.remove(&event.id());
                if let Some(prev) = previous
                    && let Err(e) = runtime.remove_track_event(&prev.runtime_id)
                {
                    debug!("Previewer: stale runtime event {} not removed: {}", prev.runtime_id, e);
                }
                let runtime_id = runtime.add_track_event(&event.plugin_type, &event.runtime_options())?;
                let manifest = runtime.manifest(&runtime_id);
                trace!("Previewer: {} mirrored as {}", event.id(), runtime_id);
                self.lock().mirrored.insert(event.id(), Mirrored { media, runtime_id });
                if let Some(manifest) = manifest
                    && let Err(e) = self.butter()?.set_track_event_manifest(event.id(), manifest)
                {
                    debug!("Previewer: manifest for {} dropped: {}", event.id(), e);
                }
            }
            MirrorOp::Remove(id) => {
                let previous = self.lock().mirrored.remove(&id);
                if let Some(prev) = previous {
                    runtime.remove_track_event(&prev.runtime_id)?;
                    trace!("Previewer: {} unmirrored", id);
                }
            }
        }
        Ok(())
    }

    // ========== Listeners ==========

    fn on_track_event_changed(&self, e: &BusEvent) {
        let Some(event) = e.data.as_track_event() else {
            return;
        };
        let Some(media) = event.media() else {
            return;
        };
        if let Err(err) = self.mirror(media, MirrorOp::Upsert(event.clone())) {
            warn!("Previewer: mirroring {} failed: {}", event.id(), err);
        }
    }

    fn on_track_event_removed(&self, e: &BusEvent) {
        let Some(event) = e.data.as_track_event() else {
            return;
        };
        let media = {
            let st = self.lock();
            st.mirrored.get(&event.id()).map(|m| m.media)
        };
        let Some(media) = media.or(event.media()) else {
            return;
        };
        if let Err(err) = self.mirror(media, MirrorOp::Remove(event.id())) {
            warn!("Previewer: removing {} from the runtime failed: {}", event.id(), err);
        }
    }

    fn on_media_changed(&self, e: &BusEvent) {
        let Some(media) = e.data.as_media() else {
            return;
        };
        if e.name == EventName::MediaContentChanged {
            let current = self.butter().ok().and_then(|b| b.get_current_media()).map(|m| m.id());
            if current != Some(media.id()) {
                return;
            }
        }
        if let Err(err) = self.rebuild() {
            warn!("Previewer: rebuild for {} failed: {}", media.id(), err);
        }
    }

    /// The timeline scrubbed: seek the runtime, tagged so it is not echoed.
    fn on_timeline_seek(&self, e: &BusEvent) {
        let Some(media) = e.data.as_media() else {
            return;
        };
        let mut st = self.lock();
        if st.built_for != Some(media.id()) {
            return;
        }
        if let Some(runtime) = self.frame.runtime(media.id()) {
            runtime.set_current_time(media.current_time(), Some(TIMELINE_DOMAIN));
            st.reported_time = Some(media.current_time());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{Track, TrackEventOptions};
    use crate::previewer::memory::MemoryFrame;
    use crate::previewer::runtime::LayoutElement;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn layout() -> LayoutDocument {
        LayoutDocument::new(
            "<title>demo</title>",
            vec![
                LayoutElement::new("div", "stage")
                    .child(LayoutElement::new("div", "video").role(ElementRole::Media))
                    .child(LayoutElement::new("div", "captions").role(ElementRole::Target)),
                LayoutElement::new("div", "sidebar").role(ElementRole::Target),
            ],
        )
    }

    fn config() -> PreviewConfig {
        PreviewConfig {
            layout: Some("layout.html".into()),
            target: Some("preview".into()),
            media: Some("http://example.com/clip.webm".into()),
            ..Default::default()
        }
    }

    fn setup(frame: Arc<MemoryFrame>) -> (Butter, Arc<Previewer>) {
        let previewer = Previewer::new(frame, config(), RetryPolicy::new(0, 3)).unwrap();
        let butter = Butter::builder().module(previewer).build().unwrap();
        let previewer = butter.module::<Previewer>().unwrap();
        (butter, previewer)
    }

    fn footnote(text: &str, start: f64, end: f64) -> TrackEvent {
        TrackEvent::new(TrackEventOptions::new("footnote", start, end).option("text", text)).unwrap()
    }

    #[test]
    fn test_scrape_builds_document() {
        let frame = Arc::new(MemoryFrame::new(30.0));
        frame.set_layout(layout());
        let (butter, previewer) = setup(frame.clone());
        assert_eq!(frame.loaded_url().as_deref(), Some("layout.html"));
        assert_eq!(previewer.phase(), PreviewPhase::Loading);

        let report = previewer.tick();
        assert!(report.errors.is_empty(), "{:?}", report.errors);

        let names: Vec<String> = butter.get_targets().iter().map(|t| t.name().to_string()).collect();
        assert_eq!(names, vec!["captions", "sidebar"]);
        let media = butter.get_current_media().unwrap();
        assert_eq!(media.name(), "video");
        assert_eq!(media.source(), Some("http://example.com/clip.webm"));

        assert_eq!(previewer.generation(), 1);
        let doc = frame.last_document().unwrap();
        assert!(doc.contains("<title>demo</title>"));
        assert!(doc.contains(&format!("<script src=\"{}\"></script>", config().popcorn_url)));
        assert!(doc.contains(&runtime_var(media.id())));
        assert!(doc.contains("data-butter=\"media\""));
        assert_eq!(previewer.phase(), PreviewPhase::Ready);
        assert_eq!(butter.duration().unwrap(), 30.0);
    }

    #[test]
    fn test_media_ready_announced_once_data_arrives() {
        let frame = Arc::new(MemoryFrame::deferred(12.5));
        frame.set_layout(layout());
        let (butter, previewer) = setup(frame.clone());
        let ready = Arc::new(AtomicUsize::new(0));
        let r = Arc::clone(&ready);
        butter.listen(EventName::MediaReady, move |_| {
            r.fetch_add(1, Ordering::SeqCst);
        }, None);

        previewer.tick();
        assert_eq!(previewer.phase(), PreviewPhase::Building);
        assert_eq!(ready.load(Ordering::SeqCst), 0);

        frame.run_scripts();
        previewer.tick();
        assert_eq!(previewer.phase(), PreviewPhase::Ready);
        assert_eq!(ready.load(Ordering::SeqCst), 1);
        assert_eq!(butter.duration().unwrap(), 12.5);
    }

    #[test]
    fn test_runtime_never_appears_times_out() {
        let frame = Arc::new(MemoryFrame::deferred(1.0));
        frame.set_layout(layout());
        let (_butter, previewer) = setup(frame);
        let mut errors = Vec::new();
        for _ in 0..5 {
            errors.extend(previewer.tick().errors);
        }
        assert!(errors.iter().any(|e| matches!(e, ButterError::Timeout { attempts: 3, .. })));
        assert_eq!(previewer.phase(), PreviewPhase::Building);
    }

    #[test]
    fn test_events_mirrored_after_runtime_exists() {
        let frame = Arc::new(MemoryFrame::deferred(10.0));
        frame.set_layout(layout());
        let (butter, previewer) = setup(frame.clone());
        previewer.tick();

        butter.add_track(Track::named("notes")).unwrap();
        let a = butter.add_track_event("notes", footnote("a", 0.0, 1.0)).unwrap();
        let b = butter.add_track_event("notes", footnote("b", 1.0, 2.0)).unwrap();
        assert_eq!(previewer.pending(), 2);

        frame.run_scripts();
        let report = previewer.tick();
        assert_eq!(report.applied, 2);
        assert_eq!(previewer.pending(), 0);

        let media = butter.get_current_media().unwrap();
        let runtime = frame.runtime_for(media.id()).unwrap();
        let texts: Vec<String> = runtime.events().iter().map(|(_, e)| e.options["text"].to_string()).collect();
        assert_eq!(texts, vec!["\"a\"", "\"b\""]);
        assert!(previewer.runtime_event(a.id()).is_some());
        assert!(previewer.runtime_event(b.id()).is_some());

        // Manifest reported back onto the model.
        let stored = butter.get_track_event(a.id()).unwrap().unwrap();
        assert!(stored.manifest.is_some());
    }

    #[test]
    fn test_update_replaces_runtime_event() {
        let frame = Arc::new(MemoryFrame::new(10.0));
        frame.set_layout(layout());
        let (butter, previewer) = setup(frame.clone());
        previewer.tick();
        butter.add_track(Track::named("notes")).unwrap();
        let ev = butter.add_track_event("notes", footnote("old", 0.0, 1.0)).unwrap();
        let first = previewer.runtime_event(ev.id()).unwrap();

        let mut opts = ev.popcorn_options.clone();
        opts.insert("text".into(), "new".into());
        butter.update_track_event(ev.id(), opts, None).unwrap();

        let second = previewer.runtime_event(ev.id()).unwrap();
        assert_ne!(first, second);
        let runtime = frame.runtime_for(butter.get_current_media().unwrap().id()).unwrap();
        let events = runtime.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, second);
        assert_eq!(events[0].1.options["text"], "new");
    }

    #[test]
    fn test_remove_unmirrors() {
        let frame = Arc::new(MemoryFrame::new(10.0));
        frame.set_layout(layout());
        let (butter, previewer) = setup(frame.clone());
        previewer.tick();
        butter.add_track(Track::named("notes")).unwrap();
        let ev = butter.add_track_event("notes", footnote("x", 0.0, 1.0)).unwrap();
        butter.remove_track_event(ev.id()).unwrap();

        assert!(previewer.runtime_event(ev.id()).is_none());
        let runtime = frame.runtime_for(butter.get_current_media().unwrap().id()).unwrap();
        assert!(runtime.events().is_empty());
    }

    #[test]
    fn test_media_change_rebuilds_and_remirrors() {
        let frame = Arc::new(MemoryFrame::new(10.0));
        frame.set_layout(layout());
        let (butter, previewer) = setup(frame.clone());
        previewer.tick();
        butter.add_track(Track::named("notes")).unwrap();
        butter.add_track_event("notes", footnote("x", 0.0, 1.0)).unwrap();

        let other = butter.add_media(Media::named("other").with_source("baseplayer")).unwrap();
        butter.set_media(other.id()).unwrap();
        assert_eq!(previewer.generation(), 2);
        previewer.tick();
        assert_eq!(previewer.phase(), PreviewPhase::Ready);

        // Back to the first media: its events are mirrored again.
        let video = butter.get_media("video").unwrap();
        butter.set_media(video.id()).unwrap();
        let report = previewer.tick();
        assert_eq!(report.applied, 1);
        assert_eq!(frame.runtime_for(video.id()).unwrap().events().len(), 1);
        assert_eq!(frame.documents().len(), 3);
    }

    #[test]
    fn test_stale_waits_cancelled_by_rebuild() {
        let frame = Arc::new(MemoryFrame::deferred(10.0));
        frame.set_layout(layout());
        let (butter, previewer) = setup(frame.clone());
        previewer.tick();
        butter.add_track(Track::named("notes")).unwrap();
        butter.add_track_event("notes", footnote("x", 0.0, 1.0)).unwrap();
        assert_eq!(previewer.pending(), 1);

        butter.set_media_source("video", Some("baseplayer".into())).unwrap();
        assert_eq!(previewer.generation(), 2);
        // Rebuilt from the model: still exactly one queued op, no timeouts.
        assert_eq!(previewer.pending(), 1);
        frame.run_scripts();
        let report = previewer.tick();
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        assert_eq!(report.applied, 1);
    }

    #[test]
    fn test_time_sync_both_ways() {
        let frame = Arc::new(MemoryFrame::new(10.0));
        frame.set_layout(layout());
        let (butter, previewer) = setup(frame.clone());
        previewer.tick();
        let media = butter.get_current_media().unwrap();
        let runtime = frame.runtime_for(media.id()).unwrap();

        let updates = Arc::new(AtomicUsize::new(0));
        let u = Arc::clone(&updates);
        butter.listen(EventName::TimeUpdate, move |_| {
            u.fetch_add(1, Ordering::SeqCst);
        }, None);

        runtime.play_to(3.5);
        previewer.tick();
        assert_eq!(butter.current_time().unwrap(), 3.5);
        assert_eq!(updates.load(Ordering::SeqCst), 1);
        // Untagged updates never seek the runtime.
        assert!(runtime.seeks().is_empty());

        butter.set_current_time(7.0, Some(TIMELINE_DOMAIN)).unwrap();
        assert_eq!(runtime.seeks(), vec![(7.0, Some(TIMELINE_DOMAIN.to_string()))]);
        // The seek is not reported back as playback.
        previewer.tick();
        assert_eq!(updates.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_ready_callback_and_export() {
        let frame = Arc::new(MemoryFrame::new(10.0));
        frame.set_layout(layout());
        let called = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&called);
        let previewer = Previewer::new(frame, config(), RetryPolicy::new(0, 3))
            .unwrap()
            .with_ready_callback(move || {
                c.fetch_add(1, Ordering::SeqCst);
            });
        let butter = Butter::builder().module(previewer).build().unwrap();
        let previewer = butter.module::<Previewer>().unwrap();
        previewer.tick();
        previewer.tick();
        assert_eq!(called.load(Ordering::SeqCst), 1);

        butter.add_track(Track::named("notes")).unwrap();
        butter.add_track_event("notes", footnote("hello", 0.0, 1.0)).unwrap();
        let script = previewer.export_script().unwrap();
        assert!(script.contains(".footnote({"));
        assert!(script.contains("text: \"hello\""));
    }

    #[test]
    fn test_detach_stops_mirroring() {
        let frame = Arc::new(MemoryFrame::new(10.0));
        frame.set_layout(layout());
        let (butter, previewer) = setup(frame.clone());
        previewer.tick();
        previewer.detach();
        assert_eq!(butter.bus().listener_count(EventName::TrackEventAdded, None), 0);

        butter.add_track(Track::named("notes")).unwrap();
        butter.add_track_event("notes", footnote("x", 0.0, 1.0)).unwrap();
        let runtime = frame.runtime_for(butter.get_current_media().unwrap().id()).unwrap();
        assert!(runtime.events().is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let frame = Arc::new(MemoryFrame::new(1.0));
        let err = Previewer::new(frame, PreviewConfig::default(), RetryPolicy::default()).unwrap_err();
        assert!(matches!(err, ButterError::Config(_)));
    }
}
