//! Full reconciliation: re-derives persisted volumes, containers and mounts from live
//! daemon state. Runs at startup and on a schedule, and heals anything the event
//! stream missed.
//!
//! Passes are single-flight. A call that finds another pass running returns
//! [`ReconcileOutcome::AlreadyRunning`] without waiting.

use crate::docker_repo::EventSource;
use crate::error::SyncError;
use crate::handlers::{apply_container, inspect_within, record_upsert};
use crate::metrics::{Change, MetricsSink, ReconcileKind, Resource, SyncSource};
use crate::sync_repo::{Repository, Upserted};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub created: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub deleted: u64,
    pub deactivated_mounts: u64,
    /// Entities whose inspect or repository write failed; the next pass retries them.
    pub failed: u64,
}

impl ReconcileReport {
    fn count(&mut self, upserted: Upserted) {
        match upserted {
            Upserted::Created => self.created += 1,
            Upserted::Updated => self.updated += 1,
            Upserted::Unchanged => self.unchanged += 1,
        }
    }

    pub fn merge(&mut self, other: &ReconcileReport) {
        self.created += other.created;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.deleted += other.deleted;
        self.deactivated_mounts += other.deactivated_mounts;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReconcileOutcome {
    Completed(ReconcileReport),
    AlreadyRunning,
}

pub struct Reconciler {
    source: Arc<dyn EventSource>,
    repo: Arc<dyn Repository>,
    metrics: Arc<dyn MetricsSink>,
    inspect_timeout: Duration,
    guard: Mutex<()>,
}

impl Reconciler {
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
            guard: Mutex::new(()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.guard.try_lock().is_err()
    }

    pub async fn reconcile_volumes(&self) -> Result<ReconcileOutcome, SyncError> {
        let Ok(_guard) = self.guard.try_lock() else {
            return Ok(ReconcileOutcome::AlreadyRunning);
        };
        let result = self.timed(ReconcileKind::Volumes, self.volumes_pass()).await;
        self.finish(result)
    }

    pub async fn reconcile_containers(&self) -> Result<ReconcileOutcome, SyncError> {
        let Ok(_guard) = self.guard.try_lock() else {
            return Ok(ReconcileOutcome::AlreadyRunning);
        };
        let result = self
            .timed(ReconcileKind::Containers, self.containers_pass())
            .await;
        self.finish(result)
    }

    /// Volumes first, then containers and mounts. A failed kind does not stop the other.
    pub async fn full_reconcile(&self) -> Result<ReconcileOutcome, SyncError> {
        let Ok(_guard) = self.guard.try_lock() else {
            return Ok(ReconcileOutcome::AlreadyRunning);
        };
        let result = self
            .timed(ReconcileKind::Full, async {
                let volumes = self.timed(ReconcileKind::Volumes, self.volumes_pass()).await;
                let containers = self
                    .timed(ReconcileKind::Containers, self.containers_pass())
                    .await;
                let mut report = volumes?;
                report.merge(&containers?);
                Ok(report)
            })
            .await;
        self.finish(result)
    }

    /// Counts one requested pass, however many kinds it ran.
    fn finish(
        &self,
        result: Result<ReconcileReport, SyncError>,
    ) -> Result<ReconcileOutcome, SyncError> {
        self.metrics.reconcile_finished(result.is_err());
        result.map(ReconcileOutcome::Completed)
    }

    async fn timed(
        &self,
        kind: ReconcileKind,
        pass: impl Future<Output = Result<ReconcileReport, SyncError>>,
    ) -> Result<ReconcileReport, SyncError> {
        let started = Instant::now();
        let result = pass.await;
        let elapsed = started.elapsed();
        self.metrics.reconcile_run(kind, elapsed, result.is_err());
        match &result {
            Ok(report) => info!(
                kind = kind.as_str(),
                duration_ms = elapsed.as_millis() as u64,
                created = report.created,
                updated = report.updated,
                unchanged = report.unchanged,
                deleted = report.deleted,
                deactivated_mounts = report.deactivated_mounts,
                failed = report.failed,
                "reconciliation complete"
            ),
            Err(e) => warn!(kind = kind.as_str(), error = %e, "reconciliation failed"),
        }
        result
    }

    #[instrument(skip(self), fields(operation = "reconcile_volumes"))]
    async fn volumes_pass(&self) -> Result<ReconcileReport, SyncError> {
        let live = self
            .source
            .list_volumes()
            .await
            .map_err(|error| SyncError::List {
                kind: "volume",
                error,
            })?;
        let persisted = self
            .repo
            .list_all_volumes()
            .await
            .map_err(SyncError::repository("list_all_volumes"))?;

        let mut report = ReconcileReport::default();
        let mut live_ids = HashSet::with_capacity(live.len());
        for volume in live {
            let volume = volume.mark_active();
            live_ids.insert(volume.volume_id.clone());
            match self.repo.upsert_volume(&volume).await {
                Ok(upserted) => {
                    report.count(upserted);
                    record_upsert(
                        &*self.metrics,
                        Resource::Volume,
                        upserted,
                        SyncSource::Reconciliation,
                    );
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(error = %e, volume_id = %volume.volume_id, "reconcile upsert_volume failed");
                }
            }
        }

        for stale in persisted.iter().filter(|v| !live_ids.contains(&v.volume_id)) {
            match self.repo.delete_volume(&stale.volume_id).await {
                Ok(true) => {
                    report.deleted += 1;
                    self.metrics.resource_synced(
                        Resource::Volume,
                        Change::Delete,
                        SyncSource::Reconciliation,
                    );
                }
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(error = %e, volume_id = %stale.volume_id, "reconcile delete_volume failed");
                }
            }
        }
        Ok(report)
    }

    #[instrument(skip(self), fields(operation = "reconcile_containers"))]
    async fn containers_pass(&self) -> Result<ReconcileReport, SyncError> {
        let live = self
            .source
            .list_container_ids()
            .await
            .map_err(|error| SyncError::List {
                kind: "container",
                error,
            })?;
        let persisted = self
            .repo
            .list_all_containers()
            .await
            .map_err(SyncError::repository("list_all_containers"))?;

        let mut report = ReconcileReport::default();
        // Every listed id is live, inspectable or not; only unlisted rows are deleted.
        let mut live_ids = HashSet::with_capacity(live.len());
        for id in live {
            let inspected = inspect_within(
                self.inspect_timeout,
                "container",
                &id,
                self.source.inspect_container(&id),
            )
            .await;
            live_ids.insert(id.clone());
            let mut inspected = match inspected {
                Ok(c) => c,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        error = %e,
                        container_id = %id,
                        "reconcile inspect failed; keeping persisted row"
                    );
                    continue;
                }
            };
            inspected.container.is_active = true;
            match apply_container(
                &*self.repo,
                &*self.metrics,
                &inspected,
                SyncSource::Reconciliation,
            )
            .await
            {
                Ok(upserted) => report.count(upserted),
                Err(e) => {
                    report.failed += 1;
                    warn!(error = %e, container_id = %id, "reconcile container failed");
                }
            }
        }

        for stale in persisted
            .iter()
            .filter(|c| !live_ids.contains(&c.container_id))
        {
            match self.repo.delete_container(&stale.container_id).await {
                Ok(true) => {
                    report.deleted += 1;
                    self.metrics.resource_synced(
                        Resource::Container,
                        Change::Delete,
                        SyncSource::Reconciliation,
                    );
                }
                Ok(false) => {}
                Err(e) => {
                    report.failed += 1;
                    warn!(error = %e, container_id = %stale.container_id, "reconcile delete_container failed");
                }
            }
        }

        // Mounts whose container is gone but whose rows survived (e.g. a failed delete above).
        let mounts = self
            .repo
            .list_all_volume_mounts()
            .await
            .map_err(SyncError::repository("list_all_volume_mounts"))?;
        let orphaned: HashSet<&str> = mounts
            .iter()
            .filter(|m| m.is_active && !live_ids.contains(&m.container_id))
            .map(|m| m.container_id.as_str())
            .collect();
        for container_id in orphaned {
            match self.repo.deactivate_volume_mounts(container_id).await {
                Ok(n) => report.deactivated_mounts += n,
                Err(e) => {
                    report.failed += 1;
                    warn!(error = %e, container_id = %container_id, "reconcile deactivate_volume_mounts failed");
                }
            }
        }
        Ok(report)
    }
}
