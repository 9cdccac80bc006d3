// One idempotent sync routine per event type.
// Each re-reads the entity from the daemon instead of trusting the event payload.

use crate::docker_repo::EventSource;
use crate::error::SyncError;
use crate::metrics::{Change, MetricsSink, Resource, SyncSource};
use crate::models::{ContainerState, DockerEvent, InspectedContainer, VolumeMount};
use crate::sync_repo::{Repository, Upserted};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct Handlers {
    source: Arc<dyn EventSource>,
    repo: Arc<dyn Repository>,
    metrics: Arc<dyn MetricsSink>,
    inspect_timeout: Duration,
}

impl Handlers {
    pub fn new(
        source: Arc<dyn EventSource>,
        repo: Arc<dyn Repository>,
        metrics: Arc<dyn MetricsSink>,
        inspect_timeout: Duration,
    ) -> Self {
        Self {
            source,
            repo,
            metrics,
            inspect_timeout,
        }
    }

    pub async fn volume_create(&self, event: &DockerEvent) -> Result<(), SyncError> {
        let volume = self
            .inspect("volume", &event.name, self.source.inspect_volume(&event.name))
            .await?
            .mark_active();
        let upserted = self
            .repo
            .upsert_volume(&volume)
            .await
            .map_err(SyncError::repository("upsert_volume"))?;
        record_upsert(&*self.metrics, Resource::Volume, upserted, SyncSource::Event);
        debug!(volume_id = %volume.volume_id, outcome = ?upserted, "volume synced");
        Ok(())
    }

    pub async fn volume_remove(&self, event: &DockerEvent) -> Result<(), SyncError> {
        let deleted = self
            .repo
            .delete_volume(&event.name)
            .await
            .map_err(SyncError::repository("delete_volume"))?;
        if deleted {
            self.metrics
                .resource_synced(Resource::Volume, Change::Delete, SyncSource::Event);
        }
        debug!(volume_id = %event.name, deleted, "volume removed");
        Ok(())
    }

    /// start/stop/die: refresh the container row with the event's terminal state, then rebuild mounts.
    pub async fn container_state(
        &self,
        event: &DockerEvent,
        state: ContainerState,
    ) -> Result<(), SyncError> {
        let mut inspected = self
            .inspect("container", &event.id, self.source.inspect_container(&event.id))
            .await?;
        inspected.container.state = state;
        inspected.container.is_active = true;
        let upserted =
            apply_container(&*self.repo, &*self.metrics, &inspected, SyncSource::Event).await?;
        debug!(container_id = %event.id, state = state.as_str(), outcome = ?upserted, "container synced");
        Ok(())
    }

    pub async fn container_destroy(&self, event: &DockerEvent) -> Result<(), SyncError> {
        let deactivated = self
            .repo
            .deactivate_volume_mounts(&event.id)
            .await
            .map_err(SyncError::repository("deactivate_volume_mounts"))?;
        let deleted = self
            .repo
            .delete_container(&event.id)
            .await
            .map_err(SyncError::repository("delete_container"))?;
        if deleted {
            self.metrics
                .resource_synced(Resource::Container, Change::Delete, SyncSource::Event);
        }
        debug!(container_id = %event.id, deactivated, deleted, "container destroyed");
        Ok(())
    }

    async fn inspect<T>(
        &self,
        kind: &'static str,
        id: &str,
        fut: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<T, SyncError> {
        inspect_within(self.inspect_timeout, kind, id, fut).await
    }
}

/// Runs a daemon inspect, failing it once `timeout` elapses.
pub(crate) async fn inspect_within<T>(
    timeout: Duration,
    kind: &'static str,
    id: &str,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> Result<T, SyncError> {
    let result = match tokio::time::timeout(timeout, fut).await {
        Ok(r) => r,
        Err(_) => Err(anyhow::anyhow!("timed out after {}ms", timeout.as_millis())),
    };
    result.map_err(|error| SyncError::Inspect {
        kind,
        id: id.to_string(),
        error,
    })
}

/// Upserts the container and rebuilds its mount set (clear-then-rebuild).
/// Returns the outcome of the container row write.
pub(crate) async fn apply_container(
    repo: &dyn Repository,
    metrics: &dyn MetricsSink,
    inspected: &InspectedContainer,
    source: SyncSource,
) -> Result<Upserted, SyncError> {
    let upserted = repo
        .upsert_container(&inspected.container)
        .await
        .map_err(SyncError::repository("upsert_container"))?;
    record_upsert(metrics, Resource::Container, upserted, source);
    rebuild_mounts(
        repo,
        metrics,
        &inspected.container.container_id,
        &inspected.volume_mounts(),
        source,
    )
    .await?;
    Ok(upserted)
}

/// Deactivates every mount of the container, then upserts `mounts` as active.
pub(crate) async fn rebuild_mounts(
    repo: &dyn Repository,
    metrics: &dyn MetricsSink,
    container_id: &str,
    mounts: &[VolumeMount],
    source: SyncSource,
) -> Result<(), SyncError> {
    repo.deactivate_volume_mounts(container_id)
        .await
        .map_err(SyncError::repository("deactivate_volume_mounts"))?;
    for mount in mounts {
        let upserted = repo
            .upsert_volume_mount(mount)
            .await
            .map_err(SyncError::repository("upsert_volume_mount"))?;
        record_upsert(metrics, Resource::Mount, upserted, source);
    }
    Ok(())
}

pub(crate) fn record_upsert(
    metrics: &dyn MetricsSink,
    resource: Resource,
    upserted: Upserted,
    source: SyncSource,
) {
    match upserted {
        Upserted::Created => metrics.resource_synced(resource, Change::Create, source),
        Upserted::Updated => metrics.resource_synced(resource, Change::Update, source),
        Upserted::Unchanged => {}
    }
}

