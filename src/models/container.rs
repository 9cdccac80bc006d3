// Docker container and mount models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Docker container state; serializes to lowercase (e.g. "running").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerState {
    Created,
    Running,
    Paused,
    Restarting,
    Removing,
    Stopped,
    Exited,
    Dead,
    #[serde(other)]
    Unknown,
}

impl ContainerState {
    /// Parse from Docker API state string (e.g. "running", "exited").
    pub fn from_docker(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "created" => ContainerState::Created,
            "running" => ContainerState::Running,
            "paused" => ContainerState::Paused,
            "restarting" => ContainerState::Restarting,
            "removing" => ContainerState::Removing,
            "stopped" => ContainerState::Stopped,
            "exited" => ContainerState::Exited,
            "dead" => ContainerState::Dead,
            _ => ContainerState::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerState::Created => "created",
            ContainerState::Running => "running",
            ContainerState::Paused => "paused",
            ContainerState::Restarting => "restarting",
            ContainerState::Removing => "removing",
            ContainerState::Stopped => "stopped",
            ContainerState::Exited => "exited",
            ContainerState::Dead => "dead",
            ContainerState::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub container_id: String,
    pub name: String,
    pub image: String,
    pub state: ContainerState,
    /// Raw daemon status string.
    pub status: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    Rw,
    Ro,
}

impl AccessMode {
    pub fn from_read_write(rw: bool) -> Self {
        if rw { AccessMode::Rw } else { AccessMode::Ro }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Rw => "rw",
            AccessMode::Ro => "ro",
        }
    }

    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("ro") {
            AccessMode::Ro
        } else {
            AccessMode::Rw
        }
    }
}

/// A volume attached to a container. Identity is (volume_id, container_id, mount_path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeMount {
    pub volume_id: String,
    pub container_id: String,
    pub mount_path: String,
    pub access_mode: AccessMode,
    pub is_active: bool,
}

/// Mount type as reported by container inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MountKind {
    Volume,
    Bind,
    Tmpfs,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectedMount {
    pub kind: MountKind,
    pub volume_name: Option<String>,
    pub destination: String,
    pub read_write: bool,
}

/// Authoritative container state from the daemon, including its mounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectedContainer {
    pub container: Container,
    pub mounts: Vec<InspectedMount>,
}

impl InspectedContainer {
    /// Active volume mounts for this container; bind and other mount kinds are dropped.
    pub fn volume_mounts(&self) -> Vec<VolumeMount> {
        self.mounts
            .iter()
            .filter(|m| m.kind == MountKind::Volume)
            .filter_map(|m| {
                let volume_id = m.volume_name.as_ref().filter(|n| !n.is_empty())?;
                Some(VolumeMount {
                    volume_id: volume_id.clone(),
                    container_id: self.container.container_id.clone(),
                    mount_path: m.destination.clone(),
                    access_mode: AccessMode::from_read_write(m.read_write),
                    is_active: true,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(id: &str) -> Container {
        Container {
            container_id: id.into(),
            name: id.into(),
            image: "alpine".into(),
            state: ContainerState::Running,
            status: "running".into(),
            labels: BTreeMap::new(),
            started_at: None,
            finished_at: None,
            is_active: true,
            updated_at: None,
        }
    }

    #[test]
    fn volume_mounts_keeps_only_named_volumes() {
        let inspected = InspectedContainer {
            container: container("c1"),
            mounts: vec![
                InspectedMount {
                    kind: MountKind::Volume,
                    volume_name: Some("v1".into()),
                    destination: "/data".into(),
                    read_write: true,
                },
                InspectedMount {
                    kind: MountKind::Bind,
                    volume_name: None,
                    destination: "/etc/app".into(),
                    read_write: false,
                },
                InspectedMount {
                    kind: MountKind::Volume,
                    volume_name: Some("v2".into()),
                    destination: "/cache".into(),
                    read_write: false,
                },
                InspectedMount {
                    kind: MountKind::Volume,
                    volume_name: None,
                    destination: "/anon".into(),
                    read_write: true,
                },
            ],
        };
        let mounts = inspected.volume_mounts();
        assert_eq!(mounts.len(), 2);
        assert_eq!(mounts[0].volume_id, "v1");
        assert_eq!(mounts[0].access_mode, AccessMode::Rw);
        assert_eq!(mounts[1].volume_id, "v2");
        assert_eq!(mounts[1].access_mode, AccessMode::Ro);
        assert!(mounts.iter().all(|m| m.container_id == "c1" && m.is_active));
    }

    #[test]
    fn volume_mounts_dedupe_by_identity() {
        let mount = |mode| VolumeMount {
            volume_id: "v1".into(),
            container_id: "c1".into(),
            mount_path: "/data".into(),
            access_mode: mode,
            is_active: true,
        };
        let set: std::collections::HashSet<VolumeMount> =
            [mount(AccessMode::Rw), mount(AccessMode::Rw), mount(AccessMode::Ro)]
                .into_iter()
                .collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn container_state_from_docker_is_case_insensitive() {
        assert_eq!(ContainerState::from_docker("Running"), ContainerState::Running);
        assert_eq!(ContainerState::from_docker("dead"), ContainerState::Dead);
        assert_eq!(ContainerState::from_docker("weird"), ContainerState::Unknown);
    }

    #[test]
    fn container_state_serializes_lowercase() {
        let json = serde_json::to_string(&ContainerState::Exited).unwrap();
        assert_eq!(json, "\"exited\"");
    }
}
