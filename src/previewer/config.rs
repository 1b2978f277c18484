//! Preview settings.

use serde::{Deserialize, Serialize};

use crate::error::{ButterError, ButterResult};

pub const DEFAULT_POPCORN_URL: &str = "http://popcornjs.org/code/dist/popcorn-complete.js";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PreviewConfig {
    pub popcorn_url: String,   // runtime library injected into the rebuilt document
    pub layout: Option<String>, // layout document url, required
    pub target: Option<String>, // element hosting the preview frame, required
    pub media: Option<String>,  // source given to media scraped from the layout
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            popcorn_url: DEFAULT_POPCORN_URL.to_string(),
            layout: None,
            target: None,
            media: None,
        }
    }
}

impl PreviewConfig {
    pub fn validate(&self) -> ButterResult<()> {
        if self.layout.as_deref().is_none_or(str::is_empty) {
            return Err(ButterError::config("previewer: `layout` is required"));
        }
        if self.target.as_deref().is_none_or(str::is_empty) {
            return Err(ButterError::config("previewer: `target` is required"));
        }
        if self.popcorn_url.is_empty() {
            return Err(ButterError::config("previewer: `popcornUrl` is empty"));
        }
        Ok(())
    }
}
