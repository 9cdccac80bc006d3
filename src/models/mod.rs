// Domain models: daemon events and the persisted volume/container/mount rows

mod container;
mod event;
mod volume;

pub use container::{
    AccessMode, Container, ContainerState, InspectedContainer, InspectedMount, MountKind,
    VolumeMount,
};
pub use event::{DockerEvent, EventType, KIND_CONTAINER, KIND_VOLUME, RawEvent};
pub use volume::{VOLUME_STATUS_ACTIVE, Volume};
