//! Entity identifiers and by-name-or-id references.
//!
//! Ids are monotonic per entity type for the lifetime of the process.
//! Lookups accept an [`EntityRef`]: either the entity's name or its id,
//! resolved by one function per container.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(u64);

        impl $name {
            /// Allocate the next id for this entity type.
            pub fn next() -> Self {
                static COUNTER: AtomicU64 = AtomicU64::new(0);
                Self(COUNTER.fetch_add(1, Ordering::Relaxed))
            }

            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }

        impl From<$name> for EntityRef<$name> {
            fn from(id: $name) -> Self {
                EntityRef::ById(id)
            }
        }
    };
}

entity_id!(
    /// Identity of a [`super::Media`].
    MediaId,
    "media-"
);
entity_id!(
    /// Identity of a [`super::Track`].
    TrackId,
    "track-"
);
entity_id!(
    /// Identity of a [`super::TrackEvent`].
    TrackEventId,
    "trackevent-"
);
entity_id!(TargetId, "target-");
entity_id!(PluginId, "plugin-");

/// Reference to an entity by name or by identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityRef<I> {
    ByName(String),
    ById(I),
}

impl<I: Copy + PartialEq> EntityRef<I> {
    pub fn matches(&self, id: I, name: &str) -> bool {
        match self {
            EntityRef::ByName(n) => n == name,
            EntityRef::ById(i) => *i == id,
        }
    }
}

impl<I> From<&str> for EntityRef<I> {
    fn from(name: &str) -> Self {
        EntityRef::ByName(name.to_string())
    }
}

impl<I> From<String> for EntityRef<I> {
    fn from(name: String) -> Self {
        EntityRef::ByName(name)
    }
}

impl<I> From<&String> for EntityRef<I> {
    fn from(name: &String) -> Self {
        EntityRef::ByName(name.clone())
    }
}

impl<I: fmt::Display> fmt::Display for EntityRef<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityRef::ByName(n) => write!(f, "'{}'", n),
            EntityRef::ById(i) => write!(f, "{}", i),
        }
    }
}

pub type MediaRef = EntityRef<MediaId>;
pub type TrackRef = EntityRef<TrackId>;
pub type TrackEventRef = EntityRef<TrackEventId>;
pub type TargetRef = EntityRef<TargetId>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_monotonic_per_type() {
        let a = TrackId::next();
        let b = TrackId::next();
        assert!(b > a);
        assert_eq!(format!("{}", TrackEventId(7)), "trackevent-7");
    }

    #[test]
    fn refs_match_by_name_or_id() {
        let id = MediaId(3);
        let by_name: MediaRef = "intro".into();
        let by_id: MediaRef = id.into();
        assert!(by_name.matches(MediaId(99), "intro"));
        assert!(!by_name.matches(id, "outro"));
        assert!(by_id.matches(id, "whatever"));
        assert_eq!(by_name.to_string(), "'intro'");
    }
}
