//! In-process preview frame for headless runs and tests.
//!
//! Writing a document "runs" its bootstrap: every `popcorn<id> = Popcorn(`
//! statement constructs a [`MemoryRuntime`] for media `<id>`. A deferred
//! frame holds construction back until [`MemoryFrame::run_scripts`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Map, Value, json};

use super::runtime::{LayoutDocument, PreviewFrame, PreviewRuntime, RuntimeEventId};
use crate::entities::{MediaId, PopcornOptions};
use crate::error::{ButterError, ButterResult};

lazy_static! {
    static ref RUNTIME_CTOR: Regex = Regex::new(r"popcorn(\d+)\s*=\s*Popcorn\(").expect("runtime ctor pattern");
}

/// One live plugin instance in a [`MemoryRuntime`].
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeTrackEvent {
    pub plugin_type: String,
    pub options: PopcornOptions,
}

struct RuntimeState {
    events: IndexMap<RuntimeEventId, RuntimeTrackEvent>,
    next_id: u64,
    current_time: f64,
    duration: f64,
    ready_state: u8,
    seeks: Vec<(f64, Option<String>)>,
    custom_editors: HashMap<String, String>,
}

pub struct MemoryRuntime {
    state: Mutex<RuntimeState>,
}

impl MemoryRuntime {
    pub fn new(duration: f64, ready_state: u8) -> Self {
        Self {
            state: Mutex::new(RuntimeState {
                events: IndexMap::new(),
                next_id: 0,
                current_time: 0.0,
                duration,
                ready_state,
                seeks: Vec::new(),
                custom_editors: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RuntimeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Media metadata arrived.
    pub fn set_media_state(&self, duration: f64, ready_state: u8) {
        let mut st = self.lock();
        st.duration = duration;
        st.ready_state = ready_state;
    }

    /// Playback advanced on its own (not a seek).
    pub fn play_to(&self, time: f64) {
        self.lock().current_time = time;
    }

    /// Report `editor` as the custom editor of `plugin_type` in manifests.
    pub fn register_custom_editor(&self, plugin_type: impl Into<String>, editor: impl Into<String>) {
        self.lock().custom_editors.insert(plugin_type.into(), editor.into());
    }

    pub fn events(&self) -> Vec<(RuntimeEventId, RuntimeTrackEvent)> {
        self.lock().events.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    pub fn seeks(&self) -> Vec<(f64, Option<String>)> {
        self.lock().seeks.clone()
    }
}

impl PreviewRuntime for MemoryRuntime {
    fn add_track_event(&self, plugin_type: &str, options: &PopcornOptions) -> ButterResult<RuntimeEventId> {
        if plugin_type.is_empty() {
            return Err(ButterError::runtime("plugin type is empty"));
        }
        let mut st = self.lock();
        st.next_id += 1;
        let id = RuntimeEventId(format!("{}-{}", plugin_type, st.next_id));
        st.events.insert(
            id.clone(),
            RuntimeTrackEvent { plugin_type: plugin_type.to_string(), options: options.clone() },
        );
        Ok(id)
    }

    fn remove_track_event(&self, id: &RuntimeEventId) -> ButterResult<()> {
        self.lock()
            .events
            .shift_remove(id)
            .map(|_| ())
            .ok_or_else(|| ButterError::runtime(format!("no runtime event {}", id)))
    }

    fn manifest(&self, id: &RuntimeEventId) -> Option<Value> {
        let st = self.lock();
        let ev = st.events.get(id)?;
        let options: Map<String, Value> = ev.options.keys().map(|k| (k.clone(), json!({}))).collect();
        let mut manifest = json!({ "options": options });
        if let Some(editor) = st.custom_editors.get(&ev.plugin_type) {
            manifest["customEditor"] = Value::from(editor.as_str());
        }
        Some(manifest)
    }

    fn set_current_time(&self, time: f64, domain: Option<&str>) {
        let mut st = self.lock();
        st.current_time = time;
        st.seeks.push((time, domain.map(str::to_string)));
    }

    fn current_time(&self) -> f64 {
        self.lock().current_time
    }

    fn duration(&self) -> f64 {
        self.lock().duration
    }

    fn ready_state(&self) -> u8 {
        self.lock().ready_state
    }
}

struct FrameState {
    loaded: Option<String>,
    layout: Option<LayoutDocument>,
    documents: Vec<String>,
    staged: Vec<u64>,
    runtimes: HashMap<u64, Arc<MemoryRuntime>>,
}

pub struct MemoryFrame {
    duration: f64,
    deferred: bool,
    state: Mutex<FrameState>,
}

impl MemoryFrame {
    /// Runtimes start with media of `duration` seconds fully loaded.
    pub fn new(duration: f64) -> Self {
        Self::build(duration, false)
    }

    /// Like [`MemoryFrame::new`], but scripts wait for [`MemoryFrame::run_scripts`].
    pub fn deferred(duration: f64) -> Self {
        Self::build(duration, true)
    }

    fn build(duration: f64, deferred: bool) -> Self {
        Self {
            duration,
            deferred,
            state: Mutex::new(FrameState {
                loaded: None,
                layout: None,
                documents: Vec::new(),
                staged: Vec::new(),
                runtimes: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrameState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Content served for the layout url. Visible once a load was requested.
    pub fn set_layout(&self, doc: LayoutDocument) {
        self.lock().layout = Some(doc);
    }

    pub fn loaded_url(&self) -> Option<String> {
        self.lock().loaded.clone()
    }

    /// Construct the runtimes staged by the last written document.
    pub fn run_scripts(&self) -> usize {
        let mut st = self.lock();
        let staged = std::mem::take(&mut st.staged);
        for id in &staged {
            st.runtimes.insert(*id, Arc::new(MemoryRuntime::new(self.duration, 4)));
        }
        staged.len()
    }

    pub fn documents(&self) -> Vec<String> {
        self.lock().documents.clone()
    }

    pub fn last_document(&self) -> Option<String> {
        self.lock().documents.last().cloned()
    }

    pub fn runtime_for(&self, media: MediaId) -> Option<Arc<MemoryRuntime>> {
        self.lock().runtimes.get(&media.get()).cloned()
    }
}

impl PreviewFrame for MemoryFrame {
    fn load_layout(&self, url: &str) -> ButterResult<()> {
        if url.is_empty() {
            return Err(ButterError::invalid("layout url is empty"));
        }
        self.lock().loaded = Some(url.to_string());
        Ok(())
    }

    fn layout(&self) -> Option<LayoutDocument> {
        let st = self.lock();
        st.loaded.as_ref()?;
        st.layout.clone()
    }

    fn write_document(&self, html: &str) -> ButterResult<()> {
        let ids: Vec<u64> = RUNTIME_CTOR
            .captures_iter(html)
            .filter_map(|c| c.get(1)?.as_str().parse().ok())
            .collect();
        {
            let mut st = self.lock();
            st.documents.push(html.to_string());
            st.runtimes.clear();
            st.staged = ids;
        }
        if !self.deferred {
            self.run_scripts();
        }
        Ok(())
    }

    fn runtime(&self, media: MediaId) -> Option<Arc<dyn PreviewRuntime>> {
        self.runtime_for(media).map(|rt| rt as Arc<dyn PreviewRuntime>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_visible_after_load() {
        let frame = MemoryFrame::new(10.0);
        frame.set_layout(LayoutDocument::default());
        assert!(frame.layout().is_none());
        frame.load_layout("layout.html").unwrap();
        assert!(frame.layout().is_some());
    }

    #[test]
    fn test_document_constructs_runtimes() {
        let frame = MemoryFrame::deferred(10.0);
        let media = MediaId::next();
        let html = format!("popcorn{} = Popcorn( Popcorn.baseplayer( \"v\" ) );", media.get());
        frame.write_document(&html).unwrap();
        assert!(frame.runtime(media).is_none());
        assert_eq!(frame.run_scripts(), 1);
        let rt = frame.runtime(media).unwrap();
        assert_eq!(rt.duration(), 10.0);
        assert!(rt.ready_state() >= 2);

        // A new document tears the old runtimes down.
        frame.write_document("<html></html>").unwrap();
        assert!(frame.runtime(media).is_none());
    }

    #[test]
    fn test_runtime_events_and_manifest() {
        let rt = MemoryRuntime::new(0.0, 0);
        rt.register_custom_editor("footnote", "footnoteEditor.html");
        let mut opts = PopcornOptions::new();
        opts.insert("text".into(), "hi".into());
        let id = rt.add_track_event("footnote", &opts).unwrap();
        let manifest = rt.manifest(&id).unwrap();
        assert_eq!(manifest["customEditor"], "footnoteEditor.html");
        assert!(manifest["options"].get("text").is_some());

        rt.remove_track_event(&id).unwrap();
        assert!(rt.remove_track_event(&id).is_err());
        assert!(rt.manifest(&id).is_none());
    }
}
