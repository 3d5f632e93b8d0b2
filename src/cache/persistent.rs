//! Durable on-disk tier.
//!
//! Holds an ordered sequence of items per key and mirrors it to a single
//! store file. The whole map is rewritten on every save, so callers batch
//! their writes. Loading never fails: a missing or corrupt file yields an
//! empty store.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use serde_json::Value;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::cache::codec::{Codec, CodecError};
use crate::cache::item::{Item, Key};
use crate::cache::lock::mutex_lock;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Store encoding error: {0}")]
    Codec(#[from] CodecError),
}

/// Save counters for monitoring.
#[derive(Debug, Default)]
pub struct StoreStats {
    pub saves: AtomicU64,
    pub failed_saves: AtomicU64,
    pub bytes_written: AtomicU64,
}

/// The persistent tier.
pub struct PersistentTier {
    /// Store file location.
    path: PathBuf,

    /// Encoding selected from the file name.
    codec: Codec,

    /// Maximum items kept per key.
    capacity: usize,

    /// In-process view of the store.
    entries: Mutex<HashMap<Key, VecDeque<Item>>>,

    /// Serializes file rewrites so a stale snapshot never lands last.
    save_lock: tokio::sync::Mutex<()>,

    stats: StoreStats,
}

impl PersistentTier {
    /// Open the store at `path`, loading whatever it currently holds.
    pub fn open(path: impl Into<PathBuf>, capacity: usize, zstd_level: i32) -> Self {
        let path = path.into();
        let codec = Codec::for_path(&path, zstd_level);
        let capacity = capacity.max(1);

        let entries = load_store(&path, &codec)
            .into_iter()
            .map(|(key, items)| {
                let mut queue: VecDeque<Item> = items.into();
                while queue.len() > capacity {
                    queue.pop_front();
                }
                (key, queue)
            })
            .collect::<HashMap<_, _>>();

        info!(
            path = %path.display(),
            encoding = %codec.encoding(),
            keys = entries.len(),
            items = entries.values().map(VecDeque::len).sum::<usize>(),
            "Persistent tier opened"
        );

        Self {
            path,
            codec,
            capacity,
            entries: Mutex::new(entries),
            save_lock: tokio::sync::Mutex::new(()),
            stats: StoreStats::default(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Re-read the store file. Missing or unparsable files give an empty map.
    pub fn load(&self) -> HashMap<Key, Vec<Item>> {
        load_store(&self.path, &self.codec)
    }

    /// Append an item to the tail of `key`'s sequence, keeping only the most
    /// recent `capacity` items. Returns the sequence length afterwards.
    pub fn append(&self, key: &Key, item: Item) -> usize {
        let mut entries = mutex_lock(&self.entries, "persistent");
        let queue = entries.entry(key.clone()).or_default();
        queue.push_back(item);

        let mut trimmed = 0;
        while queue.len() > self.capacity {
            queue.pop_front();
            trimmed += 1;
        }
        if trimmed > 0 {
            debug!(key = %key, trimmed, "Trimmed persistent tier");
        }
        queue.len()
    }

    /// Remove and return the head of `key`'s sequence.
    pub fn pop_oldest(&self, key: &Key) -> Option<Item> {
        let mut entries = mutex_lock(&self.entries, "persistent");
        entries.get_mut(key).and_then(VecDeque::pop_front)
    }

    /// Number of items stored for `key`.
    pub fn len(&self, key: &Key) -> usize {
        let entries = mutex_lock(&self.entries, "persistent");
        entries.get(key).map(VecDeque::len).unwrap_or(0)
    }

    pub fn is_empty(&self, key: &Key) -> bool {
        self.len(key) == 0
    }

    /// Item counts per key.
    pub fn counts(&self) -> HashMap<Key, usize> {
        let entries = mutex_lock(&self.entries, "persistent");
        entries.iter().map(|(k, q)| (k.clone(), q.len())).collect()
    }

    /// Copy of the full in-process view.
    pub fn snapshot(&self) -> HashMap<Key, Vec<Item>> {
        let entries = mutex_lock(&self.entries, "persistent");
        entries
            .iter()
            .map(|(k, q)| (k.clone(), q.iter().cloned().collect()))
            .collect()
    }

    /// Rewrite the store file with the current contents.
    ///
    /// The file is written to a sibling temporary path and renamed into
    /// place, so readers never observe a half-written store.
    pub async fn save(&self) -> Result<(), StoreError> {
        let _guard = self.save_lock.lock().await;

        // Copy out under the lock; encoding and compression run without it.
        let ordered: BTreeMap<String, Vec<Item>> = self
            .snapshot()
            .into_iter()
            .map(|(k, items)| (k.to_string(), items))
            .collect();
        let data = match self.codec.encode(&ordered) {
            Ok(data) => data,
            Err(e) => {
                self.stats.failed_saves.fetch_add(1, Ordering::Relaxed);
                return Err(e.into());
            }
        };

        if let Err(e) = self.write_atomically(&data).await {
            self.stats.failed_saves.fetch_add(1, Ordering::Relaxed);
            return Err(e);
        }

        self.stats.saves.fetch_add(1, Ordering::Relaxed);
        self.stats
            .bytes_written
            .fetch_add(data.len() as u64, Ordering::Relaxed);
        debug!(path = %self.path.display(), size = data.len(), "Saved persistent tier");
        Ok(())
    }

    /// Save, logging instead of returning a failure.
    pub async fn save_logged(&self) -> bool {
        match self.save().await {
            Ok(()) => true,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Failed to save persistent tier");
                false
            }
        }
    }

    pub fn stats(&self) -> &StoreStats {
        &self.stats
    }

    async fn write_atomically(&self, data: &[u8]) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await.map_err(io_err(parent))?;
            }
        }

        let tmp = temp_path(&self.path);
        fs::write(&tmp, data).await.map_err(io_err(&tmp))?;
        fs::rename(&tmp, &self.path).await.map_err(io_err(&self.path))?;
        Ok(())
    }
}

fn io_err(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError {
    let path = path.to_path_buf();
    move |source| StoreError::Io { path, source }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Read and validate the store file.
///
/// Records that fail validation and keys that don't parse are skipped
/// individually; a file that can't be read or decoded at all is treated as
/// an empty store.
fn load_store(path: &Path, codec: &Codec) -> HashMap<Key, Vec<Item>> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No persistent store yet, starting empty");
            return HashMap::new();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Unreadable persistent store, starting empty");
            return HashMap::new();
        }
    };

    let raw: HashMap<String, Vec<Value>> = match codec.decode(&data) {
        Ok(raw) => raw,
        Err(e) => {
            warn!(
                path = %path.display(),
                encoding = %codec.encoding(),
                error = %e,
                "Corrupt persistent store, starting empty"
            );
            return HashMap::new();
        }
    };

    let mut store = HashMap::with_capacity(raw.len());
    let mut skipped = 0usize;
    for (key_str, records) in raw {
        let key = match key_str.parse::<Key>() {
            Ok(key) => key,
            Err(e) => {
                warn!(key = key_str, error = %e, "Skipping unknown key in persistent store");
                skipped += records.len();
                continue;
            }
        };

        let mut items = Vec::with_capacity(records.len());
        for record in records {
            match serde_json::from_value::<Item>(record) {
                Ok(item) => items.push(item),
                Err(e) => {
                    debug!(key = %key, error = %e, "Skipping malformed record");
                    skipped += 1;
                }
            }
        }
        if !items.is_empty() {
            store.insert(key, items);
        }
    }

    if skipped > 0 {
        warn!(path = %path.display(), skipped, "Dropped invalid records from persistent store");
    }
    store
}
