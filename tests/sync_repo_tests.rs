// SyncRepo against a temp SQLite file

mod common;

use common::{container, temp_repo};
use std::collections::BTreeMap;
use volsync::models::*;
use volsync::sync_repo::{Repository, SyncRepo, Upserted};

fn mount(volume: &str, container: &str, path: &str) -> VolumeMount {
    VolumeMount {
        volume_id: volume.into(),
        container_id: container.into(),
        mount_path: path.into(),
        access_mode: AccessMode::Rw,
        is_active: true,
    }
}

#[tokio::test]
async fn init_is_idempotent() {
    let (_dir, repo) = temp_repo().await;
    repo.init().await.unwrap();
    repo.init().await.unwrap();
}

#[tokio::test]
async fn connect_creates_missing_parent_dirs() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("nested").join("deeper").join("sync.db");
    let repo = SyncRepo::connect(path.to_str().unwrap(), 1).await.unwrap();
    repo.init().await.unwrap();
    assert!(path.exists());
}

#[tokio::test]
async fn volume_upsert_reports_created_updated_unchanged() {
    let (_dir, repo) = temp_repo().await;
    let mut v = Volume::active("data", "local");
    v.labels = BTreeMap::from([("com.example.app".to_string(), "web".to_string())]);

    assert_eq!(repo.upsert_volume(&v).await.unwrap(), Upserted::Created);
    assert_eq!(repo.upsert_volume(&v).await.unwrap(), Upserted::Unchanged);
    v.driver = "nfs".into();
    assert_eq!(repo.upsert_volume(&v).await.unwrap(), Upserted::Updated);

    let stored = repo.get_volume("data").await.unwrap().unwrap();
    assert_eq!(stored.driver, "nfs");
    assert_eq!(stored.labels.get("com.example.app").map(String::as_str), Some("web"));
    assert!(stored.updated_at.is_some());
}

#[tokio::test]
async fn unchanged_upsert_keeps_updated_at() {
    let (_dir, repo) = temp_repo().await;
    let v = Volume::active("data", "local");
    repo.upsert_volume(&v).await.unwrap();
    let before = repo.get_volume("data").await.unwrap().unwrap().updated_at;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    repo.upsert_volume(&v).await.unwrap();
    let after = repo.get_volume("data").await.unwrap().unwrap().updated_at;
    assert_eq!(before, after);
}

#[tokio::test]
async fn delete_volume_cascades_mounts() {
    let (_dir, repo) = temp_repo().await;
    repo.upsert_volume(&Volume::active("data", "local"))
        .await
        .unwrap();
    repo.upsert_volume_mount(&mount("data", "c1", "/a"))
        .await
        .unwrap();
    repo.upsert_volume_mount(&mount("other", "c1", "/b"))
        .await
        .unwrap();

    assert!(repo.delete_volume("data").await.unwrap());
    assert!(!repo.delete_volume("data").await.unwrap());

    let left = repo.list_all_volume_mounts().await.unwrap();
    assert_eq!(left, vec![mount("other", "c1", "/b")]);
}

#[tokio::test]
async fn container_roundtrip_and_delete_cascades() {
    let (_dir, repo) = temp_repo().await;
    let mut c = container("c1", ContainerState::Running);
    c.is_active = true;
    c.labels = BTreeMap::from([("tier".to_string(), "db".to_string())]);
    c.started_at = chrono::DateTime::from_timestamp_millis(1_700_000_000_123);

    assert_eq!(repo.upsert_container(&c).await.unwrap(), Upserted::Created);
    let stored = repo.get_container("c1").await.unwrap().unwrap();
    assert_eq!(stored.state, ContainerState::Running);
    assert_eq!(stored.started_at, c.started_at);
    assert_eq!(stored.finished_at, None);
    assert_eq!(stored.labels, c.labels);

    repo.upsert_volume_mount(&mount("v1", "c1", "/data"))
        .await
        .unwrap();
    assert!(repo.delete_container("c1").await.unwrap());
    assert!(repo.get_container("c1").await.unwrap().is_none());
    assert!(repo.list_container_mounts("c1").await.unwrap().is_empty());
}

#[tokio::test]
async fn deactivate_only_touches_one_container() {
    let (_dir, repo) = temp_repo().await;
    repo.upsert_volume_mount(&mount("v1", "c1", "/a"))
        .await
        .unwrap();
    repo.upsert_volume_mount(&mount("v2", "c1", "/b"))
        .await
        .unwrap();
    repo.upsert_volume_mount(&mount("v1", "c2", "/a"))
        .await
        .unwrap();

    assert_eq!(repo.deactivate_volume_mounts("c1").await.unwrap(), 2);
    assert_eq!(repo.deactivate_volume_mounts("c1").await.unwrap(), 0);

    let c1 = repo.list_container_mounts("c1").await.unwrap();
    assert!(c1.iter().all(|m| !m.is_active));
    let c2 = repo.list_container_mounts("c2").await.unwrap();
    assert!(c2.iter().all(|m| m.is_active));
}

#[tokio::test]
async fn mount_reactivation_is_an_update() {
    let (_dir, repo) = temp_repo().await;
    let m = mount("v1", "c1", "/a");
    assert_eq!(repo.upsert_volume_mount(&m).await.unwrap(), Upserted::Created);
    repo.deactivate_volume_mounts("c1").await.unwrap();
    assert_eq!(repo.upsert_volume_mount(&m).await.unwrap(), Upserted::Updated);
    assert_eq!(repo.upsert_volume_mount(&m).await.unwrap(), Upserted::Unchanged);
}

#[tokio::test]
async fn same_volume_at_two_paths_is_two_mounts() {
    let (_dir, repo) = temp_repo().await;
    repo.upsert_volume_mount(&mount("v1", "c1", "/a"))
        .await
        .unwrap();
    repo.upsert_volume_mount(&mount("v1", "c1", "/b"))
        .await
        .unwrap();
    assert_eq!(repo.list_container_mounts("c1").await.unwrap().len(), 2);
}
