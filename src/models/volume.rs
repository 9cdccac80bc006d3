// Docker volume models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Status written for every volume known to exist on the daemon.
pub const VOLUME_STATUS_ACTIVE: &str = "active";

/// A persisted volume. `volume_id` is the volume name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Volume {
    pub volume_id: String,
    pub name: String,
    pub driver: String,
    pub mountpoint: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
    pub scope: String,
    pub status: String,
    pub is_active: bool,
    pub created_at: Option<DateTime<Utc>>,
    /// Set by the repository when the row last changed.
    pub updated_at: Option<DateTime<Utc>>,
}

impl Volume {
    /// A live, active volume keyed by name.
    pub fn active(name: impl Into<String>, driver: impl Into<String>) -> Self {
        let name = name.into();
        Volume {
            volume_id: name.clone(),
            name,
            driver: driver.into(),
            mountpoint: String::new(),
            labels: BTreeMap::new(),
            options: BTreeMap::new(),
            scope: "local".into(),
            status: VOLUME_STATUS_ACTIVE.into(),
            is_active: true,
            created_at: None,
            updated_at: None,
        }
    }

    /// Marks the volume as present on the daemon.
    pub fn mark_active(mut self) -> Self {
        self.is_active = true;
        self.status = VOLUME_STATUS_ACTIVE.into();
        self
    }
}
