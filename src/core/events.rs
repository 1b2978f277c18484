//! Event taxonomy carried by the [`super::event_bus::EventBus`].
//!
//! Names keep their wire spelling (`trackeventadded`, ...) through
//! [`EventName::as_str`] so remote tooling and logs read the same as the
//! editor pages. Payloads are owned snapshots.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::entities::{Media, Plugin, Target, Track, TrackEvent};

/// Domain used by the timeline when it scrubs playback.
pub const TIMELINE_DOMAIN: &str = "timeline";
/// Domain tagging mutations that originate from a remote editor session.
pub const EDITOR_DOMAIN: &str = "editor";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventName {
    MediaAdded,
    MediaRemoved,
    MediaChanged,
    MediaContentChanged,
    MediaReady,
    MediaTimeUpdate,
    MediaDurationChanged,
    TimeUpdate,
    TrackAdded,
    TrackRemoved,
    TrackEventAdded,
    TrackEventRemoved,
    TrackEventUpdated,
    TargetAdded,
    TargetRemoved,
    TrackEditStarted,
    TrackEditClosed,
    TrackEditForcedClosed,
    PluginAdded,
    Custom(String),
}

impl EventName {
    pub fn as_str(&self) -> &str {
        match self {
            EventName::MediaAdded => "mediaadded",
            EventName::MediaRemoved => "mediaremoved",
            EventName::MediaChanged => "mediachanged",
            EventName::MediaContentChanged => "mediacontentchanged",
            EventName::MediaReady => "mediaready",
            EventName::MediaTimeUpdate => "mediatimeupdate",
            EventName::MediaDurationChanged => "mediadurationchanged",
            EventName::TimeUpdate => "timeupdate",
            EventName::TrackAdded => "trackadded",
            EventName::TrackRemoved => "trackremoved",
            EventName::TrackEventAdded => "trackeventadded",
            EventName::TrackEventRemoved => "trackeventremoved",
            EventName::TrackEventUpdated => "trackeventupdated",
            EventName::TargetAdded => "targetadded",
            EventName::TargetRemoved => "targetremoved",
            EventName::TrackEditStarted => "trackeditstarted",
            EventName::TrackEditClosed => "trackeditclosed",
            EventName::TrackEditForcedClosed => "trackeditforcedclosed",
            EventName::PluginAdded => "pluginadded",
            EventName::Custom(s) => s,
        }
    }
}

impl From<&str> for EventName {
    fn from(s: &str) -> Self {
        match s {
            "mediaadded" => EventName::MediaAdded,
            "mediaremoved" => EventName::MediaRemoved,
            "mediachanged" => EventName::MediaChanged,
            "mediacontentchanged" => EventName::MediaContentChanged,
            "mediaready" => EventName::MediaReady,
            "mediatimeupdate" => EventName::MediaTimeUpdate,
            "mediadurationchanged" => EventName::MediaDurationChanged,
            "timeupdate" => EventName::TimeUpdate,
            "trackadded" => EventName::TrackAdded,
            "trackremoved" => EventName::TrackRemoved,
            "trackeventadded" => EventName::TrackEventAdded,
            "trackeventremoved" => EventName::TrackEventRemoved,
            "trackeventupdated" => EventName::TrackEventUpdated,
            "targetadded" => EventName::TargetAdded,
            "targetremoved" => EventName::TargetRemoved,
            "trackeditstarted" => EventName::TrackEditStarted,
            "trackeditclosed" => EventName::TrackEditClosed,
            "trackeditforcedclosed" => EventName::TrackEditForcedClosed,
            "pluginadded" => EventName::PluginAdded,
            other => EventName::Custom(other.to_string()),
        }
    }
}

impl FromStr for EventName {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(EventName::from(s))
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event data. Entities are cloned at trigger time.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    None,
    Media(Media),
    Track(Track),
    TrackEvent(TrackEvent),
    Target(Target),
    Plugin(Plugin),
    Value(Value),
}

impl Payload {
    pub fn as_media(&self) -> Option<&Media> {
        match self {
            Payload::Media(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_track(&self) -> Option<&Track> {
        match self {
            Payload::Track(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_track_event(&self) -> Option<&TrackEvent> {
        match self {
            Payload::TrackEvent(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_target(&self) -> Option<&Target> {
        match self {
            Payload::Target(t) => Some(t),
            _ => None,
        }
    }

    /// Short label for logs and the binary's journal dump.
    pub fn describe(&self) -> String {
        match self {
            Payload::None => "-".to_string(),
            Payload::Media(m) => format!("{} '{}' t={:.3}", m.id(), m.name(), m.current_time()),
            Payload::Track(t) => format!("{} '{}' ({} events)", t.id(), t.name(), t.track_events().len()),
            Payload::TrackEvent(e) => {
                format!("{} '{}' {} [{:.2}..{:.2}]", e.id(), e.name(), e.plugin_type, e.start, e.end)
            }
            Payload::Target(t) => format!("{} '{}'", t.id(), t.name()),
            Payload::Plugin(p) => format!("{} '{}' {}", p.id(), p.name(), p.plugin_type),
            Payload::Value(v) => v.to_string(),
        }
    }
}

/// Object delivered to every listener of a trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct BusEvent {
    pub name: EventName,
    pub domain: Option<String>,
    pub data: Payload,
}

impl BusEvent {
    pub fn new(name: EventName, data: Payload, domain: Option<&str>) -> Self {
        Self { name, domain: domain.map(str::to_string), data }
    }

    pub fn is_domain(&self, domain: &str) -> bool {
        self.domain.as_deref() == Some(domain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_names_round_trip() {
        for name in [
            EventName::MediaTimeUpdate,
            EventName::TrackEventUpdated,
            EventName::TrackEditForcedClosed,
            EventName::PluginAdded,
        ] {
            assert_eq!(EventName::from(name.as_str()), name);
        }
        assert_eq!(EventName::from("test"), EventName::Custom("test".into()));
        assert_eq!("trackadded".parse::<EventName>().unwrap(), EventName::TrackAdded);
    }

    #[test]
    fn test_bus_event_domain() {
        let ev = BusEvent::new(EventName::MediaTimeUpdate, Payload::None, Some(TIMELINE_DOMAIN));
        assert!(ev.is_domain("timeline"));
        assert!(!BusEvent::new(EventName::MediaTimeUpdate, Payload::None, None).is_domain("timeline"));
    }
}
