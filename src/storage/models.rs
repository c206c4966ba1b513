use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Where a recording lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    Local,
    Drive,
}

impl StorageType {
    pub fn id_prefix(self) -> &'static str {
        match self {
            StorageType::Local => "local",
            StorageType::Drive => "drive",
        }
    }
}

impl std::fmt::Display for StorageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.id_prefix())
    }
}

impl FromStr for StorageType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(StorageType::Local),
            "drive" => Ok(StorageType::Drive),
            other => Err(format!("unknown storage type '{}', expected local or drive", other)),
        }
    }
}

/// Reference to the saved media, matching the record's storage type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Location {
    Local {
        path: PathBuf,
    },
    Drive {
        #[serde(rename = "driveFileId")]
        drive_file_id: String,
    },
}

impl Location {
    pub fn storage_type(&self) -> StorageType {
        match self {
            Location::Local { .. } => StorageType::Local,
            Location::Drive { .. } => StorageType::Drive,
        }
    }
}

/// Persisted recording metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredRecording {
    pub id: String,
    pub name: String,
    pub created_at: u64,
    pub location: Location,
    pub storage_type: StorageType,
    #[serde(default)]
    pub size_bytes: u64,
}

impl StoredRecording {
    /// Builds a record whose id and storage type are derived from `location`.
    pub fn new(name: impl Into<String>, created_at: u64, location: Location, size_bytes: u64) -> Self {
        let storage_type = location.storage_type();
        Self {
            id: format!("{}-{}", storage_type.id_prefix(), created_at),
            name: name.into(),
            created_at,
            location,
            storage_type,
            size_bytes,
        }
    }

    pub fn drive_file_id(&self) -> Option<&str> {
        match &self.location {
            Location::Drive { drive_file_id } => Some(drive_file_id),
            Location::Local { .. } => None,
        }
    }

    pub fn local_path(&self) -> Option<&PathBuf> {
        match &self.location {
            Location::Local { path } => Some(path),
            Location::Drive { .. } => None,
        }
    }

    /// `storageType` agrees with the kind of `location`
    pub fn is_consistent(&self) -> bool {
        self.storage_type == self.location.storage_type()
    }
}
