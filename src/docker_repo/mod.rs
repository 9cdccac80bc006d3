// Docker daemon access via bollard, behind the EventSource trait

mod convert;

use crate::models::{InspectedContainer, KIND_CONTAINER, KIND_VOLUME, RawEvent, Volume};
use anyhow::Context;
use async_trait::async_trait;
use bollard::Docker;
use bollard::query_parameters::{
    EventsOptions, InspectContainerOptions, ListContainersOptions, ListVolumesOptions,
};
use futures_util::StreamExt;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{debug, instrument};

/// Buffer between the daemon connection task and the subscriber.
const SUBSCRIPTION_BUFFER: usize = 64;

/// Live event feed. The sender side closing means the stream ended.
pub type Subscription = mpsc::Receiver<anyhow::Result<RawEvent>>;

/// Event types and actions to subscribe to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFilter {
    pub kinds: Vec<String>,
    pub actions: Vec<String>,
}

impl EventFilter {
    /// The six event types the sync applies.
    pub fn tracked() -> Self {
        Self {
            kinds: vec![KIND_VOLUME.into(), KIND_CONTAINER.into()],
            actions: ["create", "remove", "start", "stop", "die", "destroy"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }

    fn to_docker_filters(&self) -> HashMap<String, Vec<String>> {
        let mut filters = HashMap::new();
        filters.insert("type".to_string(), self.kinds.clone());
        filters.insert("event".to_string(), self.actions.clone());
        filters
    }
}

/// Source of truth for live volume and container state.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Opens an event subscription. An error here means the daemon is unreachable.
    async fn subscribe(&self, filter: &EventFilter) -> anyhow::Result<Subscription>;
    async fn inspect_volume(&self, name: &str) -> anyhow::Result<Volume>;
    async fn inspect_container(&self, id: &str) -> anyhow::Result<InspectedContainer>;
    async fn list_volumes(&self) -> anyhow::Result<Vec<Volume>>;
    /// Ids of all containers, running or not. Callers inspect each for details.
    async fn list_container_ids(&self) -> anyhow::Result<Vec<String>>;
}

pub struct DockerRepo {
    docker: Docker,
}

impl DockerRepo {
    pub fn connect(socket: Option<&str>) -> anyhow::Result<Self> {
        let docker = match socket {
            Some(path) => Docker::connect_with_socket(path, 120, bollard::API_DEFAULT_VERSION)?,
            None => Docker::connect_with_local_defaults()?,
        };
        Ok(Self { docker })
    }
}

#[async_trait]
impl EventSource for DockerRepo {
    #[instrument(skip(self, filter), fields(repo = "docker", operation = "subscribe"))]
    async fn subscribe(&self, filter: &EventFilter) -> anyhow::Result<Subscription> {
        self.docker.ping().await.context("docker ping")?;

        let options = EventsOptions {
            filters: Some(filter.to_docker_filters()),
            ..Default::default()
        };
        let docker = self.docker.clone();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);

        tokio::spawn(async move {
            let mut stream = docker.events(Some(options));
            while let Some(result) = stream.next().await {
                let item = match result {
                    Ok(msg) => match convert::raw_event(msg) {
                        Some(raw) => Ok(raw),
                        None => continue,
                    },
                    Err(e) => Err(anyhow::Error::new(e).context("docker event stream")),
                };
                let failed = item.is_err();
                if tx.send(item).await.is_err() {
                    debug!("event subscriber dropped; closing daemon stream");
                    return;
                }
                if failed {
                    return;
                }
            }
            debug!("daemon event stream ended");
        });
        Ok(rx)
    }

    #[instrument(skip(self), fields(repo = "docker", operation = "inspect_volume"))]
    async fn inspect_volume(&self, name: &str) -> anyhow::Result<Volume> {
        let v = self.docker.inspect_volume(name).await?;
        Ok(convert::volume(v))
    }

    #[instrument(skip(self), fields(repo = "docker", operation = "inspect_container"))]
    async fn inspect_container(&self, id: &str) -> anyhow::Result<InspectedContainer> {
        let c = self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await?;
        convert::container(c).ok_or_else(|| anyhow::anyhow!("container {} has no id", id))
    }

    #[instrument(skip(self), fields(repo = "docker", operation = "list_volumes"))]
    async fn list_volumes(&self) -> anyhow::Result<Vec<Volume>> {
        let resp = self
            .docker
            .list_volumes(None::<ListVolumesOptions>)
            .await?;
        Ok(resp
            .volumes
            .unwrap_or_default()
            .into_iter()
            .map(convert::volume)
            .collect())
    }

    #[instrument(skip(self), fields(repo = "docker", operation = "list_containers"))]
    async fn list_container_ids(&self) -> anyhow::Result<Vec<String>> {
        let options = ListContainersOptions {
            all: true,
            ..Default::default()
        };
        let summaries = self.docker.list_containers(Some(options)).await?;
        Ok(summaries.into_iter().filter_map(|s| s.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracked_filter_covers_six_event_types() {
        let f = EventFilter::tracked();
        assert_eq!(f.kinds, vec!["volume", "container"]);
        assert_eq!(f.actions.len(), 6);
        let docker = f.to_docker_filters();
        assert_eq!(docker.get("type"), Some(&f.kinds));
        assert_eq!(docker.get("event"), Some(&f.actions));
    }
}
