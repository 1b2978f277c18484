//! TrackEvent: a timed, typed unit of plugin content on a track.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::ids::{MediaId, TrackEventId, TrackId};
use crate::error::{ButterError, ButterResult};

/// Opaque plugin parameter bag, forwarded untouched to the preview runtime.
pub type PopcornOptions = Map<String, Value>;

/// Construction options for [`TrackEvent`]; unset fields take defaults.
#[derive(Debug, Clone, Default)]
pub struct TrackEventOptions {
    pub name: Option<String>,
    pub start: f64,
    pub end: f64,
    pub plugin_type: String,
    pub popcorn_options: PopcornOptions,
}

impl TrackEventOptions {
    pub fn new(plugin_type: impl Into<String>, start: f64, end: f64) -> Self {
        Self {
            plugin_type: plugin_type.into(),
            start,
            end,
            ..Default::default()
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.popcorn_options.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackEvent {
    id: TrackEventId,
    name: String,
    pub start: f64,
    pub end: f64,
    #[serde(rename = "type")]
    pub plugin_type: String,
    pub popcorn_options: PopcornOptions,
    /// Plugin manifest reported by the preview runtime once mirrored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest: Option<Value>,
    #[serde(skip)]
    track: Option<TrackId>,
    #[serde(skip)]
    media: Option<MediaId>,
}

impl TrackEvent {
    pub fn new(options: TrackEventOptions) -> ButterResult<Self> {
        validate_range(options.start, options.end)?;
        let id = TrackEventId::next();
        let name = options.name.unwrap_or_else(|| format!("TrackEvent{}", id.get()));
        Ok(Self {
            id,
            name,
            start: options.start,
            end: options.end,
            plugin_type: options.plugin_type,
            popcorn_options: options.popcorn_options,
            manifest: None,
            track: None,
            media: None,
        })
    }

    pub fn id(&self) -> TrackEventId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Owning track, if attached.
    pub fn track(&self) -> Option<TrackId> {
        self.track
    }

    /// Media owning the track this event sits on, if attached to a project.
    pub fn media(&self) -> Option<MediaId> {
        self.media
    }

    pub fn is_attached(&self) -> bool {
        self.track.is_some()
    }

    pub(crate) fn attach(&mut self, track: TrackId, media: Option<MediaId>) {
        self.track = Some(track);
        self.media = media;
    }

    pub(crate) fn set_media(&mut self, media: Option<MediaId>) {
        self.media = media;
    }

    pub(crate) fn detach(&mut self) {
        self.track = None;
        self.media = None;
    }

    /// Move the event to a new time range.
    pub fn retime(&mut self, start: f64, end: f64) -> ButterResult<()> {
        validate_range(start, end)?;
        self.start = start;
        self.end = end;
        Ok(())
    }

    /// Replace the plugin options (full replace, not patch).
    ///
    /// Numeric `start`/`end` entries in the bag also move the event so the
    /// model and the runtime agree on timing.
    pub fn replace_options(&mut self, options: PopcornOptions) -> ButterResult<()> {
        let start = options.get("start").and_then(Value::as_f64).unwrap_or(self.start);
        let end = options.get("end").and_then(Value::as_f64).unwrap_or(self.end);
        validate_range(start, end)?;
        self.start = start;
        self.end = end;
        self.popcorn_options = options;
        Ok(())
    }

    /// Options as handed to the runtime: the bag plus the event's timing.
    pub fn runtime_options(&self) -> PopcornOptions {
        let mut opts = self.popcorn_options.clone();
        opts.entry("start").or_insert_with(|| Value::from(self.start));
        opts.entry("end").or_insert_with(|| Value::from(self.end));
        opts
    }

    /// `manifest.customEditor`, when the runtime reported one.
    pub fn custom_editor(&self) -> Option<&str> {
        self.manifest.as_ref()?.get("customEditor")?.as_str()
    }
}

fn validate_range(start: f64, end: f64) -> ButterResult<()> {
    if !start.is_finite() || !end.is_finite() {
        return Err(ButterError::invalid(format!("non-finite time range {}..{}", start, end)));
    }
    if start < 0.0 {
        return Err(ButterError::invalid(format!("negative start time {}", start)));
    }
    if start > end {
        return Err(ButterError::InvalidTimeRange { start, end });
    }
    Ok(())
}
