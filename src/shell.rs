//! Shared shell for the headless binary.
//!
//! Wires every module against in-memory hosts and plays the parts a browser
//! would: loading the layout, running the preview scripts and driving the
//! editor page over its channel.

use std::sync::{Arc, Mutex};

use log::{debug, info};
use serde_json::Value;

use crate::comm::CommClient;
use crate::config::ButterConfig;
use crate::core::{Butter, CancelToken, ReadinessWait};
use crate::editor::{EDITOR_CHANNEL, EventEditor, MemoryEditorHost};
use crate::entities::{PopcornOptions, TrackEventId};
use crate::error::{ButterError, ButterResult};
use crate::plugins::PluginTray;
use crate::previewer::{
    ElementRole, LayoutDocument, LayoutElement, MemoryFrame, PreviewPhase, Previewer, TickReport,
};

pub const DEMO_LAYOUT_URL: &str = "layout.html";
pub const DEMO_MEDIA: &str = "http://example.com/media/demo.webm";

/// Common shell state for the binary
pub struct Shell {
    pub butter: Butter,
    pub editor: Arc<EventEditor>,
    pub previewer: Arc<Previewer>,
    pub tray: Arc<PluginTray>,
    pub host: Arc<MemoryEditorHost>,
    pub frame: Arc<MemoryFrame>,
    config: ButterConfig,
}

impl Shell {
    /// Build the project with all modules. Preview settings missing from
    /// `config` fall back to the demo layout.
    pub fn new(mut config: ButterConfig, duration: f64) -> ButterResult<Self> {
        config.preview.layout.get_or_insert_with(|| DEMO_LAYOUT_URL.to_string());
        config.preview.target.get_or_insert_with(|| "preview".to_string());
        config.preview.media.get_or_insert_with(|| DEMO_MEDIA.to_string());

        let host = Arc::new(MemoryEditorHost::new());
        let frame = Arc::new(MemoryFrame::new(duration));
        frame.set_layout(demo_layout());

        let butter = Butter::builder()
            .module(PluginTray::new())
            .module(EventEditor::new(host.clone(), config.editor.clone())?)
            .module(Previewer::new(frame.clone(), config.preview.clone(), config.readiness)?)
            .build()?;
        let missing = || ButterError::config("shell: module missing after build");
        let editor = butter.module::<EventEditor>().ok_or_else(missing)?;
        let previewer = butter.module::<Previewer>().ok_or_else(missing)?;
        let tray = butter.module::<PluginTray>().ok_or_else(missing)?;
        info!("Shell: {} ready with modules {:?}", butter.id(), butter.module_names());

        Ok(Self { butter, editor, previewer, tray, host, frame, config })
    }

    /// One host loop iteration.
    pub fn tick(&self) -> TickReport {
        self.editor.pump();
        self.previewer.tick()
    }

    /// Tick until the preview runtime is up.
    pub fn wait_preview_ready(&self) -> ButterResult<()> {
        let mut wait = ReadinessWait::new("preview ready", self.config.readiness, CancelToken::new());
        let mut failure = None;
        wait.block_on(|| {
            let report = self.tick();
            if let Some(e) = report.errors.into_iter().next() {
                failure = Some(e);
                return Some(());
            }
            (self.previewer.phase() == PreviewPhase::Ready).then_some(())
        })?;
        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Play the editor page for one session: open, apply `changes` on top of
    /// the options the page received, then confirm.
    pub fn edit_session(&self, event: TrackEventId, changes: PopcornOptions) -> ButterResult<()> {
        let surface = self.editor.edit_track_event(event)?;
        let ctx = self.host.take_context(surface)?;
        ctx.signal_loaded()?;

        let client = CommClient::new(EDITOR_CHANNEL, ctx, None);
        let received = Arc::new(Mutex::new(None));
        let r = Arc::clone(&received);
        client.listen("edittrackevent", move |msg| {
            *r.lock().unwrap_or_else(|e| e.into_inner()) = Some(msg.clone());
        })?;

        self.editor.pump();
        client.pump()?;
        let initial: Value = received
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or_else(|| ButterError::wire("editor page got no edittrackevent"))?;
        debug!("Shell: editor page opened with {}", initial);

        let mut options = initial["trackEvent"]["popcornOptions"].as_object().cloned().unwrap_or_default();
        options.extend(changes);

        client.send(&options, Some("applyclicked"))?;
        self.editor.pump();
        client.send(&options, Some("okayclicked"))?;
        self.editor.pump();
        Ok(())
    }
}

/// Layout with one media element and two drop targets.
pub fn demo_layout() -> LayoutDocument {
    LayoutDocument::new(
        "<title>Butter demo</title>",
        vec![
            LayoutElement::new("div", "stage")
                .child(LayoutElement::new("div", "video").role(ElementRole::Media))
                .child(LayoutElement::new("div", "captions").role(ElementRole::Target)),
            LayoutElement::new("div", "sidebar").role(ElementRole::Target),
        ],
    )
}

/// Initialize logging: warn by default, raised by `-v` counts, `RUST_LOG` wins.
pub fn init_logger(verbosity: u8) {
    let default_level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EventName, RetryPolicy};
    use crate::editor::SessionState;
    use crate::entities::{Track, TrackEvent, TrackEventOptions};

    fn shell() -> Shell {
        let mut config = ButterConfig::default();
        config.readiness = RetryPolicy::new(0, 20);
        Shell::new(config, 42.0).unwrap()
    }

    #[test]
    fn test_preview_comes_up() {
        let shell = shell();
        shell.wait_preview_ready().unwrap();
        assert_eq!(shell.butter.duration().unwrap(), 42.0);
        assert_eq!(shell.butter.get_targets().len(), 2);
    }

    #[test]
    fn test_full_edit_round() {
        let shell = shell();
        shell.wait_preview_ready().unwrap();
        shell.butter.add_track(Track::named("Track1")).unwrap();
        let ev = TrackEvent::new(TrackEventOptions::new("footnote", 1.0, 3.0).option("text", "draft")).unwrap();
        let ev = shell.butter.add_track_event("Track1", ev).unwrap();
        shell.butter.bus().poll();

        let mut changes = PopcornOptions::new();
        changes.insert("text".into(), "final".into());
        shell.edit_session(ev.id(), changes).unwrap();

        assert_eq!(shell.editor.session_state(), SessionState::Closed);
        let stored = shell.butter.get_track_event(ev.id()).unwrap().unwrap();
        assert_eq!(stored.popcorn_options["text"], "final");

        // Preview runtime follows the edit.
        let media = shell.butter.get_current_media().unwrap();
        let runtime = shell.frame.runtime_for(media.id()).unwrap();
        let events = runtime.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].1.options["text"], "final");

        let names: Vec<EventName> = shell.butter.bus().poll().into_iter().map(|e| e.name).collect();
        assert_eq!(names.first(), Some(&EventName::TrackEditStarted));
        let closed = names.iter().position(|n| *n == EventName::TrackEditClosed).unwrap();
        let updated = names.iter().rposition(|n| *n == EventName::TrackEventUpdated).unwrap();
        assert!(closed < updated);
    }
}
