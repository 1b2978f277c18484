//! Boundary to the sandboxed preview frame and the media runtime inside it.
//!
//! [`PreviewFrame`] is the iframe: it loads the layout document, exposes it
//! for scraping, accepts a rebuilt document and hands out the runtime
//! instance the bootstrap script constructed for a media. [`PreviewRuntime`]
//! is that instance (`popcorn<id>` in the page).

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::entities::{MediaId, PopcornOptions};
use crate::error::ButterResult;

/// Runtime-internal id of a mirrored track event.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RuntimeEventId(pub String);

impl fmt::Display for RuntimeEventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Media readiness at which playback data (duration) is known.
pub const HAVE_CURRENT_DATA: u8 = 2;

pub trait PreviewRuntime: Send + Sync {
    /// Run the plugin constructor `plugin_type` with `options`.
    fn add_track_event(&self, plugin_type: &str, options: &PopcornOptions) -> ButterResult<RuntimeEventId>;

    fn remove_track_event(&self, id: &RuntimeEventId) -> ButterResult<()>;

    /// Plugin manifest of a live runtime event.
    fn manifest(&self, id: &RuntimeEventId) -> Option<Value>;

    /// Seek. `domain` tags who asked, so the runtime's own time reports
    /// can be told apart from echoes.
    fn set_current_time(&self, time: f64, domain: Option<&str>);

    fn current_time(&self) -> f64;

    fn duration(&self) -> f64;

    /// HTML media `readyState` (0..=4).
    fn ready_state(&self) -> u8;
}

pub trait PreviewFrame: Send + Sync {
    /// Navigate the frame to the layout document.
    fn load_layout(&self, url: &str) -> ButterResult<()>;

    /// The loaded layout, `None` until loading completed.
    fn layout(&self) -> Option<LayoutDocument>;

    /// Replace the whole document; scripts in it start running.
    fn write_document(&self, html: &str) -> ButterResult<()>;

    /// Runtime instance for `media`, once the bootstrap script built it.
    fn runtime(&self, media: MediaId) -> Option<Arc<dyn PreviewRuntime>>;
}

/// Value of the `data-butter` attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementRole {
    Target,
    Media,
}

impl ElementRole {
    pub fn from_attr(value: &str) -> Option<Self> {
        match value {
            "target" => Some(ElementRole::Target),
            "media" => Some(ElementRole::Media),
            _ => None,
        }
    }

    pub fn as_attr(self) -> &'static str {
        match self {
            ElementRole::Target => "target",
            ElementRole::Media => "media",
        }
    }
}

/// One element of the layout tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayoutElement {
    pub tag: String,
    pub id: String,
    pub role: Option<ElementRole>,
    pub children: Vec<LayoutElement>,
}

impl LayoutElement {
    pub fn new(tag: impl Into<String>, id: impl Into<String>) -> Self {
        Self { tag: tag.into(), id: id.into(), role: None, children: Vec::new() }
    }

    pub fn role(mut self, role: ElementRole) -> Self {
        self.role = Some(role);
        self
    }

    pub fn child(mut self, child: LayoutElement) -> Self {
        self.children.push(child);
        self
    }

    fn render(&self, out: &mut String) {
        out.push('<');
        out.push_str(&self.tag);
        if !self.id.is_empty() {
            out.push_str(&format!(" id=\"{}\"", self.id));
        }
        if let Some(role) = self.role {
            out.push_str(&format!(" data-butter=\"{}\"", role.as_attr()));
        }
        out.push('>');
        for c in &self.children {
            c.render(out);
        }
        out.push_str(&format!("</{}>", self.tag));
    }
}

/// Scraped layout: the original head and body markup plus the element tree.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayoutDocument {
    pub head_html: String,
    pub body_html: String,
    pub elements: Vec<LayoutElement>,
}

impl LayoutDocument {
    /// Build a document whose body is rendered from `elements`.
    pub fn new(head_html: impl Into<String>, elements: Vec<LayoutElement>) -> Self {
        let mut body = String::new();
        for e in &elements {
            e.render(&mut body);
        }
        Self { head_html: head_html.into(), body_html: body, elements }
    }

    /// All elements, depth first in document order.
    pub fn walk(&self) -> Vec<&LayoutElement> {
        fn visit<'a>(e: &'a LayoutElement, out: &mut Vec<&'a LayoutElement>) {
            out.push(e);
            for c in &e.children {
                visit(c, out);
            }
        }
        let mut out = Vec::new();
        for e in &self.elements {
            visit(e, &mut out);
        }
        out
    }
}
