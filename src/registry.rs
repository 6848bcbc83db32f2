//! Dataset registry persisted as a JSON flat file.
//!
//! The registry records what each dataset is and where its source files live. It does
//! not hold tables; see [`crate::store::DatasetStore`] for that.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;
use uuid::Uuid;

use crate::error::RegistryError;

/// Length of generated dataset ids, in hex characters
const ID_LEN: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetStatus {
    Processing,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub id: String,
    pub name: String,
    pub author: String,
    #[serde(default)]
    pub description: String,
    pub csv_meta_dir: PathBuf,
    pub video_clip_dir: PathBuf,
    pub status: DatasetStatus,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied by the caller when registering a dataset.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct NewDataset {
    pub name: String,
    pub author: String,
    #[serde(default)]
    pub description: String,
    pub csv_meta_dir: PathBuf,
    pub video_clip_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DatasetRegistry {
    path: PathBuf,
    datasets: Vec<DatasetInfo>,
}

impl DatasetRegistry {
    /// Open the registry at `path`. A missing file is an empty registry.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let datasets = read_entries(&path)?;
        debug!(path = %path.display(), datasets = datasets.len(), "opened registry");
        Ok(Self { path, datasets })
    }

    /// A registry that starts empty regardless of what is on disk.
    pub fn empty(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            datasets: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the flat file, discarding in-memory changes.
    pub fn reload(&mut self) -> Result<(), RegistryError> {
        self.datasets = read_entries(&self.path)?;
        Ok(())
    }

    pub fn list(&self) -> &[DatasetInfo] {
        &self.datasets
    }

    pub fn get(&self, id: &str) -> Option<&DatasetInfo> {
        self.datasets.iter().find(|d| d.id == id)
    }

    /// Add a dataset in the `processing` state and return its record.
    pub fn insert(&mut self, new: NewDataset) -> DatasetInfo {
        let info = DatasetInfo {
            id: self.fresh_id(),
            name: new.name,
            author: new.author,
            description: new.description,
            csv_meta_dir: new.csv_meta_dir,
            video_clip_dir: new.video_clip_dir,
            status: DatasetStatus::Processing,
            created_at: Utc::now(),
        };
        self.datasets.push(info.clone());
        info
    }

    pub fn remove(&mut self, id: &str) -> Option<DatasetInfo> {
        let index = self.datasets.iter().position(|d| d.id == id)?;
        Some(self.datasets.remove(index))
    }

    /// Returns false if no dataset has this id.
    pub fn set_status(&mut self, id: &str, status: DatasetStatus) -> bool {
        match self.datasets.iter_mut().find(|d| d.id == id) {
            Some(info) => {
                info.status = status;
                true
            }
            None => false,
        }
    }

    /// Write the registry atomically: a temp file in the same directory replaces the old one
    /// while an exclusive lock on `<path>.lock` is held.
    pub fn save(&self) -> Result<(), RegistryError> {
        let io_err = |source| RegistryError::Io {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(io_err)?;

        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(lock_path(&self.path))
            .map_err(io_err)?;
        lock_file.lock_exclusive().map_err(io_err)?;

        let json = serde_json::to_vec_pretty(&self.datasets).map_err(|source| {
            RegistryError::Format {
                path: self.path.clone(),
                source,
            }
        })?;
        let mut tmp = NamedTempFile::new_in(&dir).map_err(io_err)?;
        tmp.write_all(&json).map_err(io_err)?;
        tmp.flush().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;

        // Dropping the handle releases the lock as well; unlock explicitly to surface errors
        FileExt::unlock(&lock_file).map_err(io_err)?;
        debug!(path = %self.path.display(), datasets = self.datasets.len(), "saved registry");
        Ok(())
    }

    fn fresh_id(&self) -> String {
        loop {
            let id: String = Uuid::new_v4().simple().to_string()[..ID_LEN].to_string();
            if self.get(&id).is_none() {
                return id;
            }
        }
    }
}

fn lock_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

fn read_entries(path: &Path) -> Result<Vec<DatasetInfo>, RegistryError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(RegistryError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    if contents.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&contents).map_err(|source| RegistryError::Format {
        path: path.to_path_buf(),
        source,
    })
}
