// Routes each event to its handler. The processing loop calls this one event at a time.

use crate::docker_repo::EventSource;
use crate::error::SyncError;
use crate::handlers::Handlers;
use crate::metrics::MetricsSink;
use crate::models::{ContainerState, DockerEvent, EventType};
use crate::sync_repo::Repository;
use std::sync::Arc;
use std::time::Duration;

pub struct EventProcessor {
    handlers: Handlers,
}

impl EventProcessor {
    pub fn new(
        source: Arc<dyn EventSource>,
        repo: Arc<dyn Repository>,
        metrics: Arc<dyn MetricsSink>,
        inspect_timeout: Duration,
    ) -> Self {
        Self {
            handlers: Handlers::new(source, repo, metrics, inspect_timeout),
        }
    }

    pub async fn process_event(&self, event: &DockerEvent) -> Result<(), SyncError> {
        match &event.event_type {
            EventType::VolumeCreate => self.handlers.volume_create(event).await,
            EventType::VolumeRemove => self.handlers.volume_remove(event).await,
            EventType::ContainerStart => {
                self.handlers
                    .container_state(event, ContainerState::Running)
                    .await
            }
            EventType::ContainerStop => {
                self.handlers
                    .container_state(event, ContainerState::Stopped)
                    .await
            }
            EventType::ContainerDie => {
                self.handlers
                    .container_state(event, ContainerState::Exited)
                    .await
            }
            EventType::ContainerDestroy => self.handlers.container_destroy(event).await,
            EventType::Unknown(t) => Err(SyncError::UnknownEventType(t.clone())),
        }
    }
}
