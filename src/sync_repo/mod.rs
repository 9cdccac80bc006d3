// SQLite store for volumes, containers and their mounts.
// Upserts skip rows whose content is unchanged, so replaying an event leaves the store as it was.

mod schema;

use crate::models::{AccessMode, Container, ContainerState, Volume, VolumeMount};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

/// Result of an idempotent upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Created,
    Updated,
    Unchanged,
}

/// Persistence contract the sync core writes through.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn upsert_volume(&self, volume: &Volume) -> anyhow::Result<Upserted>;
    /// Deletes the volume and its mounts. Returns false when no such volume existed.
    async fn delete_volume(&self, volume_id: &str) -> anyhow::Result<bool>;
    async fn upsert_container(&self, container: &Container) -> anyhow::Result<Upserted>;
    /// Deletes the container and its mounts. Returns false when no such container existed.
    async fn delete_container(&self, container_id: &str) -> anyhow::Result<bool>;
    async fn upsert_volume_mount(&self, mount: &VolumeMount) -> anyhow::Result<Upserted>;
    /// Marks every active mount of the container inactive. Returns the number deactivated.
    async fn deactivate_volume_mounts(&self, container_id: &str) -> anyhow::Result<u64>;
    async fn list_all_volumes(&self) -> anyhow::Result<Vec<Volume>>;
    async fn list_all_containers(&self) -> anyhow::Result<Vec<Container>>;
    async fn list_all_volume_mounts(&self) -> anyhow::Result<Vec<VolumeMount>>;
}

pub struct SyncRepo {
    pool: SqlitePool,
}

impl SyncRepo {
    pub async fn connect(path: &str, max_pool_size: u32) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        schema::init(&self.pool).await
    }

    pub async fn get_volume(&self, volume_id: &str) -> anyhow::Result<Option<Volume>> {
        let row = sqlx::query(
            "SELECT volume_id, name, driver, mountpoint, labels, options, scope, status, is_active, created_at, updated_at
             FROM volumes WHERE volume_id = $1",
        )
        .bind(volume_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(parse_volume_row).transpose()
    }

    pub async fn get_container(&self, container_id: &str) -> anyhow::Result<Option<Container>> {
        let row = sqlx::query(
            "SELECT container_id, name, image, state, status, labels, started_at, finished_at, is_active, updated_at
             FROM containers WHERE container_id = $1",
        )
        .bind(container_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(parse_container_row).transpose()
    }

    /// Mounts of one container, active or not, ordered by path.
    pub async fn list_container_mounts(
        &self,
        container_id: &str,
    ) -> anyhow::Result<Vec<VolumeMount>> {
        let rows = sqlx::query(
            "SELECT volume_id, container_id, mount_path, access_mode, is_active
             FROM volume_mounts WHERE container_id = $1 ORDER BY mount_path, volume_id",
        )
        .bind(container_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_mount_row).collect()
    }
}

#[async_trait]
impl Repository for SyncRepo {
    #[instrument(skip(self, volume), fields(repo = "sync", operation = "upsert_volume", volume_id = %volume.volume_id))]
    async fn upsert_volume(&self, volume: &Volume) -> anyhow::Result<Upserted> {
        let mut tx = self.pool.begin().await?;
        let existed = sqlx::query_scalar::<_, i64>("SELECT 1 FROM volumes WHERE volume_id = $1")
            .bind(&volume.volume_id)
            .fetch_optional(&mut *tx)
            .await?
            .is_some();

        let r = sqlx::query(
            r#"
            INSERT INTO volumes
            (volume_id, name, driver, mountpoint, labels, options, scope, status, is_active, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT(volume_id) DO UPDATE SET
                name = excluded.name,
                driver = excluded.driver,
                mountpoint = excluded.mountpoint,
                labels = excluded.labels,
                options = excluded.options,
                scope = excluded.scope,
                status = excluded.status,
                is_active = excluded.is_active,
                created_at = excluded.created_at,
                updated_at = excluded.updated_at
            WHERE volumes.name IS NOT excluded.name
               OR volumes.driver IS NOT excluded.driver
               OR volumes.mountpoint IS NOT excluded.mountpoint
               OR volumes.labels IS NOT excluded.labels
               OR volumes.options IS NOT excluded.options
               OR volumes.scope IS NOT excluded.scope
               OR volumes.status IS NOT excluded.status
               OR volumes.is_active IS NOT excluded.is_active
               OR volumes.created_at IS NOT excluded.created_at
            "#,
        )
        .bind(&volume.volume_id)
        .bind(&volume.name)
        .bind(&volume.driver)
        .bind(&volume.mountpoint)
        .bind(serde_json::to_string(&volume.labels)?)
        .bind(serde_json::to_string(&volume.options)?)
        .bind(&volume.scope)
        .bind(&volume.status)
        .bind(volume.is_active)
        .bind(to_millis(volume.created_at))
        .bind(now_millis())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(outcome(existed, r.rows_affected()))
    }

    #[instrument(skip(self), fields(repo = "sync", operation = "delete_volume"))]
    async fn delete_volume(&self, volume_id: &str) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM volume_mounts WHERE volume_id = $1")
            .bind(volume_id)
            .execute(&mut *tx)
            .await?;
        let r = sqlx::query("DELETE FROM volumes WHERE volume_id = $1")
            .bind(volume_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(r.rows_affected() > 0)
    }

    #[instrument(skip(self, container), fields(repo = "sync", operation = "upsert_container", container_id = %container.container_id))]
    async fn upsert_container(&self, container: &Container) -> anyhow::Result<Upserted> {
        let mut tx = self.pool.begin().await?;
        let existed =
            sqlx::query_scalar::<_, i64>("SELECT 1 FROM containers WHERE container_id = $1")
                .bind(&container.container_id)
                .fetch_optional(&mut *tx)
                .await?
                .is_some();

        let r = sqlx::query(
            r#"
            INSERT INTO containers
            (container_id, name, image, state, status, labels, started_at, finished_at, is_active, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT(container_id) DO UPDATE SET
                name = excluded.name,
                image = excluded.image,
                state = excluded.state,
                status = excluded.status,
                labels = excluded.labels,
                started_at = excluded.started_at,
                finished_at = excluded.finished_at,
                is_active = excluded.is_active,
                updated_at = excluded.updated_at
            WHERE containers.name IS NOT excluded.name
               OR containers.image IS NOT excluded.image
               OR containers.state IS NOT excluded.state
               OR containers.status IS NOT excluded.status
               OR containers.labels IS NOT excluded.labels
               OR containers.started_at IS NOT excluded.started_at
               OR containers.finished_at IS NOT excluded.finished_at
               OR containers.is_active IS NOT excluded.is_active
            "#,
        )
        .bind(&container.container_id)
        .bind(&container.name)
        .bind(&container.image)
        .bind(container.state.as_str())
        .bind(&container.status)
        .bind(serde_json::to_string(&container.labels)?)
        .bind(to_millis(container.started_at))
        .bind(to_millis(container.finished_at))
        .bind(container.is_active)
        .bind(now_millis())
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(outcome(existed, r.rows_affected()))
    }

    #[instrument(skip(self), fields(repo = "sync", operation = "delete_container"))]
    async fn delete_container(&self, container_id: &str) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM volume_mounts WHERE container_id = $1")
            .bind(container_id)
            .execute(&mut *tx)
            .await?;
        let r = sqlx::query("DELETE FROM containers WHERE container_id = $1")
            .bind(container_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(r.rows_affected() > 0)
    }

    #[instrument(skip(self, mount), fields(repo = "sync", operation = "upsert_volume_mount", container_id = %mount.container_id))]
    async fn upsert_volume_mount(&self, mount: &VolumeMount) -> anyhow::Result<Upserted> {
        let mut tx = self.pool.begin().await?;
        let existed = sqlx::query_scalar::<_, i64>(
            "SELECT 1 FROM volume_mounts WHERE volume_id = $1 AND container_id = $2 AND mount_path = $3",
        )
        .bind(&mount.volume_id)
        .bind(&mount.container_id)
        .bind(&mount.mount_path)
        .fetch_optional(&mut *tx)
        .await?
        .is_some();

        let r = sqlx::query(
            r#"
            INSERT INTO volume_mounts (volume_id, container_id, mount_path, access_mode, is_active)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT(volume_id, container_id, mount_path) DO UPDATE SET
                access_mode = excluded.access_mode,
                is_active = excluded.is_active
            WHERE volume_mounts.access_mode IS NOT excluded.access_mode
               OR volume_mounts.is_active IS NOT excluded.is_active
            "#,
        )
        .bind(&mount.volume_id)
        .bind(&mount.container_id)
        .bind(&mount.mount_path)
        .bind(mount.access_mode.as_str())
        .bind(mount.is_active)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(outcome(existed, r.rows_affected()))
    }

    #[instrument(skip(self), fields(repo = "sync", operation = "deactivate_volume_mounts"))]
    async fn deactivate_volume_mounts(&self, container_id: &str) -> anyhow::Result<u64> {
        let r = sqlx::query(
            "UPDATE volume_mounts SET is_active = 0 WHERE container_id = $1 AND is_active = 1",
        )
        .bind(container_id)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected())
    }

    #[instrument(skip(self), fields(repo = "sync", operation = "list_all_volumes"))]
    async fn list_all_volumes(&self) -> anyhow::Result<Vec<Volume>> {
        let rows = sqlx::query(
            "SELECT volume_id, name, driver, mountpoint, labels, options, scope, status, is_active, created_at, updated_at
             FROM volumes ORDER BY volume_id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_volume_row).collect()
    }

    #[instrument(skip(self), fields(repo = "sync", operation = "list_all_containers"))]
    async fn list_all_containers(&self) -> anyhow::Result<Vec<Container>> {
        let rows = sqlx::query(
            "SELECT container_id, name, image, state, status, labels, started_at, finished_at, is_active, updated_at
             FROM containers ORDER BY container_id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_container_row).collect()
    }

    #[instrument(skip(self), fields(repo = "sync", operation = "list_all_volume_mounts"))]
    async fn list_all_volume_mounts(&self) -> anyhow::Result<Vec<VolumeMount>> {
        let rows = sqlx::query(
            "SELECT volume_id, container_id, mount_path, access_mode, is_active
             FROM volume_mounts ORDER BY container_id, mount_path, volume_id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(parse_mount_row).collect()
    }
}

fn outcome(existed: bool, rows_affected: u64) -> Upserted {
    match (existed, rows_affected) {
        (false, _) => Upserted::Created,
        (true, 0) => Upserted::Unchanged,
        (true, _) => Upserted::Updated,
    }
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn to_millis(t: Option<DateTime<Utc>>) -> Option<i64> {
    t.map(|t| t.timestamp_millis())
}

fn from_millis(ms: Option<i64>) -> Option<DateTime<Utc>> {
    ms.and_then(DateTime::from_timestamp_millis)
}

fn parse_map(row: &SqliteRow, column: &str) -> anyhow::Result<BTreeMap<String, String>> {
    let s: String = row.try_get(column)?;
    serde_json::from_str(&s).map_err(|e| anyhow::anyhow!("decode {}: {}", column, e))
}

fn parse_volume_row(row: &SqliteRow) -> anyhow::Result<Volume> {
    Ok(Volume {
        volume_id: row.try_get("volume_id")?,
        name: row.try_get("name")?,
        driver: row.try_get("driver")?,
        mountpoint: row.try_get("mountpoint")?,
        labels: parse_map(row, "labels")?,
        options: parse_map(row, "options")?,
        scope: row.try_get("scope")?,
        status: row.try_get("status")?,
        is_active: row.try_get("is_active")?,
        created_at: from_millis(row.try_get("created_at")?),
        updated_at: from_millis(row.try_get("updated_at")?),
    })
}

fn parse_container_row(row: &SqliteRow) -> anyhow::Result<Container> {
    let state: String = row.try_get("state")?;
    Ok(Container {
        container_id: row.try_get("container_id")?,
        name: row.try_get("name")?,
        image: row.try_get("image")?,
        state: ContainerState::from_docker(&state),
        status: row.try_get("status")?,
        labels: parse_map(row, "labels")?,
        started_at: from_millis(row.try_get("started_at")?),
        finished_at: from_millis(row.try_get("finished_at")?),
        is_active: row.try_get("is_active")?,
        updated_at: from_millis(row.try_get("updated_at")?),
    })
}

fn parse_mount_row(row: &SqliteRow) -> anyhow::Result<VolumeMount> {
    let access_mode: String = row.try_get("access_mode")?;
    Ok(VolumeMount {
        volume_id: row.try_get("volume_id")?,
        container_id: row.try_get("container_id")?,
        mount_path: row.try_get("mount_path")?,
        access_mode: AccessMode::parse(&access_mode),
        is_active: row.try_get("is_active")?,
    })
}
