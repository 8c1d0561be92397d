use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::RwLock,
    time::Duration,
};
use uuid::Uuid;

pub const SETTINGS_FILE: &str = "settings.json";
pub const ALARMS_FILE: &str = "alarms.json";

/// Resolve the data directory: `SOFTWAKE_DATA_DIR`, else the platform data
/// dir plus `softwake`.
pub fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("SOFTWAKE_DATA_DIR") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    dirs::data_dir()
        .map(|dir| dir.join("softwake"))
        .ok_or_else(|| anyhow!("could not determine a data directory; set SOFTWAKE_DATA_DIR"))
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineSettings {
    pub tick_interval_ms: u64,
    pub due_check_interval_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            tick_interval_ms: 60,
            due_check_interval_ms: 1000,
        }
    }
}

impl EngineSettings {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn due_check_interval(&self) -> Duration {
        Duration::from_millis(self.due_check_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushKeys {
    pub p256dh: String,
    pub auth: String,
}

/// Web push subscription as handed out by the push service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PushSubscription {
    pub endpoint: String,
    pub keys: PushKeys,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncSettings {
    /// Subscribe route of the push registry.
    pub endpoint: Option<String>,
    pub subscription: Option<PushSubscription>,
    pub device_id: String,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            subscription: None,
            device_id: Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
struct UserSettings {
    engine: EngineSettings,
    sync: SyncSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    /// Load settings, falling back to defaults when the file is missing or
    /// malformed. Defaults are written out, including a freshly generated
    /// device id, so the id stays stable across runs. A malformed file is
    /// moved aside first and its `deviceId` kept when it can still be read.
    pub fn new(path: PathBuf) -> Result<Self> {
        let (data, write_defaults) = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(data) => (data, false),
                Err(err) => {
                    log::warn!(
                        "Ignoring malformed settings file {}: {}",
                        path.display(),
                        err
                    );
                    (Self::recover(&path, &contents), true)
                }
            }
        } else {
            (UserSettings::default(), true)
        };

        let store = Self {
            path,
            data: RwLock::new(data),
        };
        if write_defaults {
            if let Err(err) = store.persist(&store.snapshot()) {
                log::warn!("Could not write default settings: {err:#}");
            }
        }
        Ok(store)
    }

    fn recover(path: &Path, contents: &str) -> UserSettings {
        let mut data = UserSettings::default();
        let device_id = serde_json::from_str::<serde_json::Value>(contents)
            .ok()
            .and_then(|value| value["sync"]["deviceId"].as_str().map(str::to_owned));
        if let Some(device_id) = device_id {
            data.sync.device_id = device_id;
        }

        let backup = path.with_extension("json.bak");
        if let Err(err) = fs::copy(path, &backup) {
            log::warn!("Could not back up {}: {}", path.display(), err);
        }
        data
    }

    pub fn engine(&self) -> EngineSettings {
        self.snapshot().engine
    }

    pub fn sync(&self) -> SyncSettings {
        self.snapshot().sync
    }

    pub fn update_sync(&self, settings: SyncSettings) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        guard.sync = settings;
        self.persist(&guard)
    }

    fn snapshot(&self) -> UserSettings {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_written_and_device_id_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);

        let first = SettingsStore::new(path.clone()).unwrap();
        assert!(path.exists());
        assert_eq!(first.engine(), EngineSettings::default());

        let second = SettingsStore::new(path).unwrap();
        assert_eq!(first.sync().device_id, second.sync().device_id);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(
            &path,
            r#"{"engine":{"tickIntervalMs":100},"sync":{"endpoint":"https://example.com/api/subscribe","deviceId":"d"}}"#,
        )
        .unwrap();

        let store = SettingsStore::new(path).unwrap();
        assert_eq!(store.engine().tick_interval(), Duration::from_millis(100));
        assert_eq!(store.engine().due_check_interval(), Duration::from_secs(1));
        assert_eq!(
            store.sync().endpoint.as_deref(),
            Some("https://example.com/api/subscribe")
        );
        assert_eq!(store.sync().device_id, "d");
    }

    #[test]
    fn malformed_file_uses_defaults_with_a_stable_device_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, "not json").unwrap();

        let store = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(store.engine(), EngineSettings::default());
        assert!(store.sync().subscription.is_none());

        let again = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(again.sync().device_id, store.sync().device_id);
        assert_eq!(
            fs::read_to_string(path.with_extension("json.bak")).unwrap(),
            "not json"
        );
    }

    #[test]
    fn malformed_file_keeps_readable_device_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, r#"{"engine":5,"sync":{"deviceId":"d-7"}}"#).unwrap();

        let store = SettingsStore::new(path.clone()).unwrap();
        assert_eq!(store.sync().device_id, "d-7");
        assert_eq!(store.engine(), EngineSettings::default());
        assert_eq!(SettingsStore::new(path).unwrap().sync().device_id, "d-7");
    }

    #[test]
    fn sync_updates_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        let store = SettingsStore::new(path.clone()).unwrap();

        let mut sync = store.sync();
        sync.endpoint = Some("https://example.com/api/subscribe".into());
        store.update_sync(sync.clone()).unwrap();

        assert_eq!(SettingsStore::new(path).unwrap().sync(), sync);
    }
}
