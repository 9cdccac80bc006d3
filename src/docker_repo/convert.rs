// bollard models -> domain models. Pure functions, unit-tested without a daemon.

use crate::models::{
    Container, ContainerState, InspectedContainer, InspectedMount, MountKind, RawEvent, Volume,
};
use bollard::models::{
    ContainerInspectResponse, EventMessage, EventMessageTypeEnum, MountPoint,
    Volume as DockerVolume,
};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

pub(crate) fn raw_event(msg: EventMessage) -> Option<RawEvent> {
    let kind = match msg.typ? {
        EventMessageTypeEnum::VOLUME => crate::models::KIND_VOLUME,
        EventMessageTypeEnum::CONTAINER => crate::models::KIND_CONTAINER,
        _ => return None,
    };
    let action = msg.action?;
    let actor = msg.actor.unwrap_or_default();
    let time = msg
        .time_nano
        .map(DateTime::from_timestamp_nanos)
        .or_else(|| msg.time.and_then(|t| DateTime::from_timestamp(t, 0)));
    Some(RawEvent {
        kind: kind.to_string(),
        action,
        actor_id: actor.id.unwrap_or_default(),
        attributes: actor.attributes.unwrap_or_default(),
        time,
    })
}

pub(crate) fn volume(v: DockerVolume) -> Volume {
    Volume {
        volume_id: v.name.clone(),
        name: v.name,
        driver: v.driver,
        mountpoint: v.mountpoint,
        labels: v.labels.into_iter().collect(),
        options: v.options.into_iter().collect(),
        scope: v
            .scope
            .map(|s| s.to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "local".into()),
        status: String::new(),
        is_active: true,
        created_at: v.created_at.as_deref().and_then(parse_docker_time),
        updated_at: None,
    }
    .mark_active()
}

pub(crate) fn container(c: ContainerInspectResponse) -> Option<InspectedContainer> {
    let container_id = c.id.filter(|id| !id.is_empty())?;
    let name = c
        .name
        .map(|n| n.trim_start_matches('/').to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| container_id.clone());
    let config = c.config.unwrap_or_default();
    let state = c.state.unwrap_or_default();
    let status = state.status.map(|s| s.to_string()).unwrap_or_default();
    let labels: BTreeMap<String, String> = config.labels.unwrap_or_default().into_iter().collect();

    let container = Container {
        container_id,
        name,
        image: config.image.unwrap_or_default(),
        state: ContainerState::from_docker(&status),
        status,
        labels,
        started_at: state.started_at.as_deref().and_then(parse_docker_time),
        finished_at: state.finished_at.as_deref().and_then(parse_docker_time),
        is_active: true,
        updated_at: None,
    };
    let mounts = c
        .mounts
        .unwrap_or_default()
        .into_iter()
        .map(mount)
        .collect();
    Some(InspectedContainer { container, mounts })
}

fn mount(m: MountPoint) -> InspectedMount {
    let kind = match m.typ.as_deref() {
        Some("volume") => MountKind::Volume,
        Some("bind") => MountKind::Bind,
        Some("tmpfs") => MountKind::Tmpfs,
        _ => MountKind::Other,
    };
    InspectedMount {
        kind,
        volume_name: m.name,
        destination: m.destination.unwrap_or_default(),
        read_write: m.rw.unwrap_or(true),
    }
}

/// Parses a daemon RFC 3339 timestamp. Docker's zero time ("0001-01-01T00:00:00Z") means unset.
pub(crate) fn parse_docker_time(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() || s.starts_with("0001-01-01") {
        return None;
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}
