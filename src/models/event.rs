// Daemon events: transport-neutral raw form and the normalized DockerEvent

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// Event kinds of interest, as Docker names them in the `type` field.
pub const KIND_VOLUME: &str = "volume";
pub const KIND_CONTAINER: &str = "container";

/// One daemon event as delivered by an `EventSource`, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub kind: String,
    pub action: String,
    pub actor_id: String,
    pub attributes: HashMap<String, String>,
    pub time: Option<DateTime<Utc>>,
}

/// Synchronization-relevant event types. Anything else is `Unknown`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    VolumeCreate,
    VolumeRemove,
    ContainerStart,
    ContainerStop,
    ContainerDie,
    ContainerDestroy,
    Unknown(String),
}

impl EventType {
    /// Maps a Docker `(type, action)` pair onto an event type.
    pub fn from_parts(kind: &str, action: &str) -> Self {
        match (kind, action) {
            (KIND_VOLUME, "create") => EventType::VolumeCreate,
            (KIND_VOLUME, "remove") => EventType::VolumeRemove,
            (KIND_CONTAINER, "start") => EventType::ContainerStart,
            (KIND_CONTAINER, "stop") => EventType::ContainerStop,
            (KIND_CONTAINER, "die") => EventType::ContainerDie,
            (KIND_CONTAINER, "destroy") => EventType::ContainerDestroy,
            _ => EventType::Unknown(format!("{}.{}", kind, action)),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EventType::VolumeCreate => "volume.create",
            EventType::VolumeRemove => "volume.remove",
            EventType::ContainerStart => "container.start",
            EventType::ContainerStop => "container.stop",
            EventType::ContainerDie => "container.die",
            EventType::ContainerDestroy => "container.destroy",
            EventType::Unknown(s) => s,
        }
    }

    /// Metrics label; unknown types collapse to one label value.
    pub fn label(&self) -> &'static str {
        match self {
            EventType::VolumeCreate => "volume.create",
            EventType::VolumeRemove => "volume.remove",
            EventType::ContainerStart => "container.start",
            EventType::ContainerStop => "container.stop",
            EventType::ContainerDie => "container.die",
            EventType::ContainerDestroy => "container.destroy",
            EventType::Unknown(_) => "unknown",
        }
    }

    pub fn is_tracked(&self) -> bool {
        !matches!(self, EventType::Unknown(_))
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// A normalized event, consumed once by the processor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DockerEvent {
    pub event_type: EventType,
    pub id: String,
    pub name: String,
    pub action: String,
    pub time: DateTime<Utc>,
    pub attributes: HashMap<String, String>,
}

impl DockerEvent {
    /// Normalizes a raw event; returns None for events the sync does not track.
    pub fn from_raw(raw: RawEvent, received_at: DateTime<Utc>) -> Option<Self> {
        let event_type = EventType::from_parts(&raw.kind, &raw.action);
        if !event_type.is_tracked() || raw.actor_id.is_empty() {
            return None;
        }
        let name = match raw.kind.as_str() {
            KIND_CONTAINER => raw
                .attributes
                .get("name")
                .cloned()
                .unwrap_or_else(|| raw.actor_id.clone()),
            _ => raw.actor_id.clone(),
        };
        Some(DockerEvent {
            event_type,
            id: raw.actor_id,
            name,
            action: raw.action,
            time: raw.time.unwrap_or(received_at),
            attributes: raw.attributes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(kind: &str, action: &str, id: &str) -> RawEvent {
        RawEvent {
            kind: kind.into(),
            action: action.into(),
            actor_id: id.into(),
            attributes: HashMap::new(),
            time: None,
        }
    }

    #[test]
    fn from_parts_maps_tracked_pairs() {
        assert_eq!(
            EventType::from_parts("volume", "create"),
            EventType::VolumeCreate
        );
        assert_eq!(
            EventType::from_parts("container", "die"),
            EventType::ContainerDie
        );
        assert_eq!(
            EventType::from_parts("container", "create"),
            EventType::Unknown("container.create".into())
        );
    }

    #[test]
    fn unknown_label_is_collapsed() {
        let t = EventType::from_parts("network", "connect");
        assert_eq!(t.as_str(), "network.connect");
        assert_eq!(t.label(), "unknown");
        assert!(!t.is_tracked());
    }

    #[test]
    fn from_raw_uses_container_name_attribute() {
        let mut r = raw("container", "start", "c1");
        r.attributes.insert("name".into(), "web".into());
        let ev = DockerEvent::from_raw(r, Utc::now()).unwrap();
        assert_eq!(ev.event_type, EventType::ContainerStart);
        assert_eq!(ev.id, "c1");
        assert_eq!(ev.name, "web");
    }

    #[test]
    fn from_raw_volume_name_is_actor_id() {
        let ev = DockerEvent::from_raw(raw("volume", "remove", "web-data"), Utc::now()).unwrap();
        assert_eq!(ev.id, "web-data");
        assert_eq!(ev.name, "web-data");
    }

    #[test]
    fn from_raw_ignores_untracked_and_anonymous() {
        assert!(DockerEvent::from_raw(raw("image", "pull", "nginx"), Utc::now()).is_none());
        assert!(DockerEvent::from_raw(raw("volume", "create", ""), Utc::now()).is_none());
    }

    #[test]
    fn from_raw_prefers_event_time() {
        let at = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let mut r = raw("volume", "create", "v");
        r.time = Some(at);
        let ev = DockerEvent::from_raw(r, Utc::now()).unwrap();
        assert_eq!(ev.time, at);
    }
}
