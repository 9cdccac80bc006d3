// Shared test helpers: an in-memory daemon and a throwaway SQLite store
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::Duration;
use volsync::docker_repo::{EventFilter, EventSource, Subscription};
use volsync::models::*;
use volsync::sync_repo::SyncRepo;

#[derive(Default)]
struct FakeState {
    volumes: BTreeMap<String, Volume>,
    containers: BTreeMap<String, InspectedContainer>,
    sender: Option<mpsc::Sender<anyhow::Result<RawEvent>>>,
    failing_subscribes: usize,
    fail_inspect: bool,
    uninspectable: HashSet<String>,
    fail_list: bool,
    inspect_delay: Option<Duration>,
}

/// Stand-in for the Docker daemon. Live state is mutated directly by tests;
/// events are pushed through the most recent subscription.
#[derive(Default)]
pub struct FakeDocker {
    state: Mutex<FakeState>,
    subscribes: AtomicUsize,
}

impl FakeDocker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn add_volume(&self, name: &str) {
        self.add_volume_with_driver(name, "local");
    }

    pub fn add_volume_with_driver(&self, name: &str, driver: &str) {
        let mut volume = Volume::active(name, driver);
        volume.mountpoint = format!("/var/lib/docker/volumes/{name}/_data");
        volume.is_active = false;
        volume.status = String::new();
        self.state().volumes.insert(name.to_string(), volume);
    }

    pub fn remove_volume(&self, name: &str) {
        self.state().volumes.remove(name);
    }

    /// Adds (or replaces) a container. `mounts` are `(volume, destination, rw)` volume mounts.
    pub fn add_container(&self, id: &str, state: ContainerState, mounts: &[(&str, &str, bool)]) {
        let mounts = mounts
            .iter()
            .map(|(volume, destination, rw)| InspectedMount {
                kind: MountKind::Volume,
                volume_name: Some(volume.to_string()),
                destination: destination.to_string(),
                read_write: *rw,
            })
            .collect();
        self.add_inspected(InspectedContainer {
            container: container(id, state),
            mounts,
        });
    }

    pub fn add_inspected(&self, inspected: InspectedContainer) {
        self.state()
            .containers
            .insert(inspected.container.container_id.clone(), inspected);
    }

    pub fn remove_container(&self, id: &str) {
        self.state().containers.remove(id);
    }

    pub fn fail_next_subscribes(&self, n: usize) {
        self.state().failing_subscribes = n;
    }

    pub fn set_fail_inspect(&self, fail: bool) {
        self.state().fail_inspect = fail;
    }

    /// The container stays listed, but inspecting it fails.
    pub fn break_inspect_of(&self, id: &str) {
        self.state().uninspectable.insert(id.to_string());
    }

    /// Slows every inspect down, as a busy daemon would.
    pub fn set_inspect_delay(&self, delay: Duration) {
        self.state().inspect_delay = Some(delay);
    }

    pub fn set_fail_list(&self, fail: bool) {
        self.state().fail_list = fail;
    }

    pub fn subscribe_count(&self) -> usize {
        self.subscribes.load(Ordering::SeqCst)
    }

    /// Sends an event on the live subscription. Returns false when nobody is subscribed.
    pub async fn emit(&self, raw: RawEvent) -> bool {
        let sender = self.state().sender.clone();
        match sender {
            Some(tx) => tx.send(Ok(raw)).await.is_ok(),
            None => false,
        }
    }

    /// Fails the live subscription with a stream error.
    pub async fn break_stream(&self) {
        let sender = self.state().sender.take();
        if let Some(tx) = sender {
            let _ = tx.send(Err(anyhow::anyhow!("connection reset"))).await;
        }
    }

    /// Ends the live subscription cleanly.
    pub fn close_stream(&self) {
        self.state().sender = None;
    }

    async fn delay_inspect(&self) {
        let delay = self.state().inspect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl EventSource for FakeDocker {
    async fn subscribe(&self, _filter: &EventFilter) -> anyhow::Result<Subscription> {
        let mut state = self.state();
        if state.failing_subscribes > 0 {
            state.failing_subscribes -= 1;
            anyhow::bail!("daemon unreachable");
        }
        let (tx, rx) = mpsc::channel(64);
        state.sender = Some(tx);
        self.subscribes.fetch_add(1, Ordering::SeqCst);
        Ok(rx)
    }

    async fn inspect_volume(&self, name: &str) -> anyhow::Result<Volume> {
        self.delay_inspect().await;
        let state = self.state();
        anyhow::ensure!(!state.fail_inspect, "inspect failed");
        state
            .volumes
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such volume: {name}"))
    }

    async fn inspect_container(&self, id: &str) -> anyhow::Result<InspectedContainer> {
        self.delay_inspect().await;
        let state = self.state();
        anyhow::ensure!(!state.fail_inspect, "inspect failed");
        anyhow::ensure!(!state.uninspectable.contains(id), "inspect of {id} failed");
        state
            .containers
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no such container: {id}"))
    }

    async fn list_volumes(&self) -> anyhow::Result<Vec<Volume>> {
        let state = self.state();
        anyhow::ensure!(!state.fail_list, "list failed");
        Ok(state.volumes.values().cloned().collect())
    }

    async fn list_container_ids(&self) -> anyhow::Result<Vec<String>> {
        let state = self.state();
        anyhow::ensure!(!state.fail_list, "list failed");
        Ok(state.containers.keys().cloned().collect())
    }
}

pub fn container(id: &str, state: ContainerState) -> Container {
    Container {
        container_id: id.into(),
        name: format!("{id}-name"),
        image: "alpine:3".into(),
        state,
        status: state.as_str().into(),
        labels: BTreeMap::new(),
        started_at: None,
        finished_at: None,
        is_active: false,
        updated_at: None,
    }
}

pub fn raw_event(kind: &str, action: &str, id: &str) -> RawEvent {
    RawEvent {
        kind: kind.into(),
        action: action.into(),
        actor_id: id.into(),
        attributes: HashMap::new(),
        time: Some(Utc::now()),
    }
}

pub fn event(kind: &str, action: &str, id: &str) -> DockerEvent {
    DockerEvent::from_raw(raw_event(kind, action, id), Utc::now()).unwrap()
}

pub async fn temp_repo() -> (TempDir, Arc<SyncRepo>) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("volsync.db");
    let repo = SyncRepo::connect(path.to_str().unwrap(), 2).await.unwrap();
    repo.init().await.unwrap();
    (dir, Arc::new(repo))
}

/// Polls `cond` every 10ms for up to 3s.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + tokio::time::Duration::from_secs(3);
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
    }
    cond()
}
