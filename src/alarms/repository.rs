use anyhow::{Context, Result};
use log::warn;
use std::{fs, path::PathBuf, sync::Mutex, time::SystemTime};

use super::model::Alarm;

/// Change marker for a stored alarm set. Two equal revisions mean the store
/// has not been written in between.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Revision {
    modified: SystemTime,
    len: u64,
}

/// Persistence collaborator for the alarm book.
///
/// Loading never fails: a missing or unreadable file is an empty set.
pub trait AlarmRepository: Send + Sync {
    fn load_all(&self) -> Vec<Alarm>;
    fn save_all(&self, alarms: &[Alarm]) -> Result<()>;

    /// `None` when the store cannot tell; callers then reload every time.
    fn revision(&self) -> Option<Revision> {
        None
    }
}

/// Alarms stored as a pretty-printed JSON array.
pub struct JsonFileRepository {
    path: PathBuf,
}

impl JsonFileRepository {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}

impl AlarmRepository for JsonFileRepository {
    fn load_all(&self) -> Vec<Alarm> {
        if !self.path.exists() {
            return Vec::new();
        }

        let contents = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) => {
                warn!("Failed to read alarms from {}: {}", self.path.display(), err);
                return Vec::new();
            }
        };

        serde_json::from_str(&contents).unwrap_or_else(|err| {
            warn!(
                "Ignoring malformed alarms file {}: {}",
                self.path.display(),
                err
            );
            Vec::new()
        })
    }

    fn save_all(&self, alarms: &[Alarm]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(alarms)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write alarms to {}", self.path.display()))
    }

    fn revision(&self) -> Option<Revision> {
        let metadata = fs::metadata(&self.path).ok()?;
        Some(Revision {
            modified: metadata.modified().ok()?,
            len: metadata.len(),
        })
    }
}

/// Process-local repository, used where nothing should touch the disk.
#[derive(Default)]
pub struct MemoryRepository {
    alarms: Mutex<Vec<Alarm>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alarms(alarms: Vec<Alarm>) -> Self {
        Self {
            alarms: Mutex::new(alarms),
        }
    }
}

impl AlarmRepository for MemoryRepository {
    fn load_all(&self) -> Vec<Alarm> {
        self.alarms.lock().map(|g| g.clone()).unwrap_or_default()
    }

    fn save_all(&self, alarms: &[Alarm]) -> Result<()> {
        let mut guard = self
            .alarms
            .lock()
            .map_err(|_| anyhow::anyhow!("memory repository poisoned"))?;
        *guard = alarms.to_vec();
        Ok(())
    }
}
