// Tables for volumes, containers and mounts. Timestamps are unix millis.
// Mount rows carry no foreign keys: a mount may arrive before its volume row.

use sqlx::SqlitePool;

pub async fn init(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS volumes (
            volume_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            driver TEXT NOT NULL,
            mountpoint TEXT NOT NULL,
            labels TEXT NOT NULL,
            options TEXT NOT NULL,
            scope TEXT NOT NULL,
            status TEXT NOT NULL,
            is_active INTEGER NOT NULL,
            created_at INTEGER,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS containers (
            container_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            image TEXT NOT NULL,
            state TEXT NOT NULL,
            status TEXT NOT NULL,
            labels TEXT NOT NULL,
            started_at INTEGER,
            finished_at INTEGER,
            is_active INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS volume_mounts (
            volume_id TEXT NOT NULL,
            container_id TEXT NOT NULL,
            mount_path TEXT NOT NULL,
            access_mode TEXT NOT NULL,
            is_active INTEGER NOT NULL,
            PRIMARY KEY (volume_id, container_id, mount_path)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_volume_mounts_container ON volume_mounts(container_id)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
