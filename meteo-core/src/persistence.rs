//! Durable favorites: one text blob under a fixed key of a key-value store.

use std::{
    collections::{BTreeMap, HashMap},
    fmt::Debug,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::{
    error::{MeteoError, Result},
    model::FavoriteEntry,
};

/// Namespace of the favorites slot.
pub const FAVORITES_NAMESPACE: &str = "FavoriteCities";
/// Key holding the serialized favorites list.
pub const FAVORITES_KEY: &str = "favorites";

/// Minimal string key-value store.
pub trait KeyValueStore: Send + Sync + Debug {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Process-local store, lost on exit.
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.values.lock().remove(key);
        Ok(())
    }
}

/// One JSON object file per namespace, `<dir>/<namespace>.json`.
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// reader sees either the old or the new contents, never a partial file.
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileKeyValueStore {
    pub fn new(dir: &Path, namespace: &str) -> Self {
        Self { path: dir.join(format!("{namespace}.json")), write_lock: Mutex::new(()) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let contents = fs::read_to_string(&self.path).map_err(|e| {
            MeteoError::Storage(format!("Failed to read {}: {e}", self.path.display()))
        })?;

        serde_json::from_str(&contents).map_err(|e| {
            MeteoError::Storage(format!("Failed to parse {}: {e}", self.path.display()))
        })
    }

    fn write_all(&self, values: &BTreeMap<String, String>) -> Result<()> {
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(|e| {
            MeteoError::Storage(format!("Failed to create {}: {e}", parent.display()))
        })?;

        let json = serde_json::to_string_pretty(values)
            .map_err(|e| MeteoError::Storage(format!("Failed to serialize store: {e}")))?;

        let write_err = |e: std::io::Error| {
            MeteoError::Storage(format!("Failed to write {}: {e}", self.path.display()))
        };

        let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(write_err)?;
        tmp.write_all(json.as_bytes()).map_err(write_err)?;
        tmp.as_file().sync_all().map_err(write_err)?;
        tmp.persist(&self.path).map_err(|e| write_err(e.error))?;
        Ok(())
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values)
    }

    fn remove(&self, key: &str) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut values = self.read_all()?;
        if values.remove(key).is_some() {
            self.write_all(&values)?;
        }
        Ok(())
    }
}

/// Current-location entry first, everything else in its original order.
fn pin_current_location(entries: &mut [FavoriteEntry]) {
    entries.sort_by_key(|e| !e.is_current_location);
}

/// Reads and writes the favorites list under [`FAVORITES_KEY`].
#[derive(Debug, Clone)]
pub struct FavoritesCodec {
    store: Arc<dyn KeyValueStore>,
}

impl FavoritesCodec {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryKeyValueStore::new()))
    }

    pub fn save(&self, entries: &[FavoriteEntry]) -> Result<()> {
        let mut sorted = entries.to_vec();
        pin_current_location(&mut sorted);

        let blob = serde_json::to_string(&sorted)
            .map_err(|e| MeteoError::Storage(format!("Failed to serialize favorites: {e}")))?;

        self.store.put(FAVORITES_KEY, &blob)?;
        info!(count = sorted.len(), "Saved favorites");
        Ok(())
    }

    /// Strict read: a missing key is an empty list, an unparseable blob is
    /// [`MeteoError::PersistenceCorrupt`].
    pub fn try_load(&self) -> Result<Vec<FavoriteEntry>> {
        let Some(blob) = self.store.get(FAVORITES_KEY)? else {
            return Ok(Vec::new());
        };

        let mut entries: Vec<FavoriteEntry> = serde_json::from_str(&blob)
            .map_err(|e| MeteoError::PersistenceCorrupt(e.to_string()))?;

        pin_current_location(&mut entries);
        Ok(entries)
    }

    /// Like [`try_load`](Self::try_load) but any failure yields an empty list.
    pub fn load(&self) -> Vec<FavoriteEntry> {
        match self.try_load() {
            Ok(entries) => entries,
            Err(err) => {
                warn!(error = %err, "Ignoring unreadable favorites");
                Vec::new()
            }
        }
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.try_load()?.iter().any(|e| e.name == name))
    }

    /// Persist `entry` unless its name is already stored.
    ///
    /// A current-location entry replaces any previous one at the front;
    /// other entries go right after the current location, or last. Nothing
    /// is written when the stored list cannot be read.
    pub fn add(&self, entry: FavoriteEntry) -> Result<bool> {
        let mut entries = self.try_load()?;
        if entries.iter().any(|e| e.name == entry.name) {
            debug!(name = %entry.name, "Favorite already stored");
            return Ok(false);
        }

        if entry.is_current_location {
            entries.retain(|e| !e.is_current_location);
            entries.insert(0, entry);
        } else {
            match entries.iter().position(|e| e.is_current_location) {
                Some(idx) => entries.insert(idx + 1, entry),
                None => entries.push(entry),
            }
        }

        self.save(&entries)?;
        Ok(true)
    }

    /// Remove `name` unless it is the stored current location.
    pub fn remove(&self, name: &str) -> Result<bool> {
        let mut entries = self.try_load()?;
        if entries.iter().any(|e| e.name == name && e.is_current_location) {
            debug!(name, "Refusing to remove current location");
            return Ok(false);
        }

        let before = entries.len();
        entries.retain(|e| e.name != name);
        if entries.len() == before {
            return Ok(false);
        }

        self.save(&entries)?;
        Ok(true)
    }

    /// Add when absent, remove when present. Returns whether `entry` is a
    /// favorite afterwards.
    pub fn toggle(&self, entry: FavoriteEntry) -> Result<bool> {
        if self.contains(&entry.name)? {
            self.remove(&entry.name)?;
            self.contains(&entry.name)
        } else {
            self.add(entry)
        }
    }

    /// Drop everything, as an app data reset would.
    pub fn clear(&self) -> Result<()> {
        self.store.remove(FAVORITES_KEY)
    }
}
