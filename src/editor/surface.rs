//! Editor surfaces: the popup windows and iframes editor documents load into.
//!
//! The session controller never touches a DOM. It asks an [`EditorHost`] to
//! open or attach a surface and gets back the [`ContextHandle`] to bind a
//! channel to. [`MemoryEditorHost`] keeps the embedded ends so a test or the
//! headless binary can play the editor page.

use std::sync::Mutex;

use crate::comm::{ContextHandle, ContextId, EmbeddedContext, HostContext};
use crate::error::{ButterError, ButterResult, EntityKind};

/// Document and size of a surface to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceSpec {
    pub url: String,
    pub width: u32,
    pub height: u32,
}

pub trait EditorHost: Send + Sync {
    /// Open a new popup window on `spec.url`.
    fn open_window(&self, host: &HostContext, spec: &SurfaceSpec) -> ButterResult<ContextHandle>;

    /// Navigate the existing window `window` to `spec.url`.
    fn attach_window(&self, host: &HostContext, window: &str, spec: &SurfaceSpec) -> ButterResult<ContextHandle>;

    /// Create an iframe under the DOM node `target`.
    fn attach_frame(&self, host: &HostContext, target: &str, spec: &SurfaceSpec) -> ButterResult<ContextHandle>;

    /// Remove every child of the DOM node `target`.
    fn clear_target(&self, target: &str);

    /// Close the window, or detach the frame from the DOM.
    fn close(&self, surface: ContextId);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceKind {
    Popup,
    Window(String),
    Frame(String),
}

/// Bookkeeping for one surface opened by [`MemoryEditorHost`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SurfaceRecord {
    pub id: ContextId,
    pub kind: SurfaceKind,
    pub spec: SurfaceSpec,
    pub closed: bool,
}

#[derive(Debug, Default)]
struct HostState {
    surfaces: Vec<SurfaceRecord>,
    embedded: Vec<EmbeddedContext>,
    cleared: Vec<String>,
}

/// In-process [`EditorHost`].
#[derive(Debug, Default)]
pub struct MemoryEditorHost {
    state: Mutex<HostState>,
}

impl MemoryEditorHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn open(&self, host: &HostContext, kind: SurfaceKind, spec: &SurfaceSpec) -> ContextHandle {
        let (handle, embedded) = host.open_context();
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        log::debug!("MemoryEditorHost: {:?} {} -> {}", kind, spec.url, handle.id());
        state.surfaces.push(SurfaceRecord { id: handle.id(), kind, spec: spec.clone(), closed: false });
        state.embedded.push(embedded);
        handle
    }

    pub fn surfaces(&self) -> Vec<SurfaceRecord> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).surfaces.clone()
    }

    pub fn last_surface(&self) -> Option<SurfaceRecord> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).surfaces.last().cloned()
    }

    /// Hand out the document side of a surface. Each context is taken once.
    pub fn take_context(&self, id: ContextId) -> ButterResult<EmbeddedContext> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        let idx = state
            .embedded
            .iter()
            .position(|c| c.id() == id)
            .ok_or_else(|| ButterError::not_found(EntityKind::Channel, id))?;
        Ok(state.embedded.remove(idx))
    }

    pub fn is_closed(&self, id: ContextId) -> bool {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .surfaces
            .iter()
            .any(|s| s.id == id && s.closed)
    }

    /// DOM targets cleared so far, in order.
    pub fn cleared_targets(&self) -> Vec<String> {
        self.state.lock().unwrap_or_else(|e| e.into_inner()).cleared.clone()
    }
}

impl EditorHost for MemoryEditorHost {
    fn open_window(&self, host: &HostContext, spec: &SurfaceSpec) -> ButterResult<ContextHandle> {
        Ok(self.open(host, SurfaceKind::Popup, spec))
    }

    fn attach_window(&self, host: &HostContext, window: &str, spec: &SurfaceSpec) -> ButterResult<ContextHandle> {
        if window.is_empty() {
            return Err(ButterError::invalid("window name is empty"));
        }
        Ok(self.open(host, SurfaceKind::Window(window.to_string()), spec))
    }

    fn attach_frame(&self, host: &HostContext, target: &str, spec: &SurfaceSpec) -> ButterResult<ContextHandle> {
        if target.is_empty() {
            return Err(ButterError::invalid("frame target is empty"));
        }
        Ok(self.open(host, SurfaceKind::Frame(target.to_string()), spec))
    }

    fn clear_target(&self, target: &str) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        for s in state.surfaces.iter_mut() {
            if s.kind == SurfaceKind::Frame(target.to_string()) {
                s.closed = true;
            }
        }
        state.cleared.push(target.to_string());
    }

    fn close(&self, surface: ContextId) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(s) = state.surfaces.iter_mut().find(|s| s.id == surface) {
            s.closed = true;
        }
        // Closing drops the document; its endpoint goes with it
        state.embedded.retain(|c| c.id() != surface);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> SurfaceSpec {
        SurfaceSpec { url: "defaultEditor.html".into(), width: 400, height: 300 }
    }

    #[test]
    fn test_open_take_close() {
        let host = HostContext::new();
        let editors = MemoryEditorHost::new();
        let handle = editors.attach_frame(&host, "editor-div", &spec()).unwrap();

        let rec = editors.last_surface().unwrap();
        assert_eq!(rec.kind, SurfaceKind::Frame("editor-div".into()));
        assert_eq!(rec.spec.height, 300);

        let ctx = editors.take_context(handle.id()).unwrap();
        assert_eq!(ctx.parent(), host.id());
        assert!(editors.take_context(handle.id()).is_err());

        editors.close(handle.id());
        assert!(editors.is_closed(handle.id()));
    }

    #[test]
    fn test_clear_target_closes_frames() {
        let host = HostContext::new();
        let editors = MemoryEditorHost::new();
        let frame = editors.attach_frame(&host, "div", &spec()).unwrap();
        let popup = editors.open_window(&host, &spec()).unwrap();

        editors.clear_target("div");
        assert!(editors.is_closed(frame.id()));
        assert!(!editors.is_closed(popup.id()));
        assert_eq!(editors.cleared_targets(), vec!["div".to_string()]);
    }
}
