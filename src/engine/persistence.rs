use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use crate::{BackendResult, BackendError};
use log::warn;

#[allow(unused_imports)]
use crate::engine::MemStore;

/// Partition for keys without a namespace before the first `:`.
pub const ROOT_PARTITION: &str = "_root";

/// Returns the partition a key is persisted in: the text before its first `:`.
pub fn partition_of(key: &str) -> &str {
    match key.split_once(':') {
        Some((ns, _)) if !ns.is_empty() => ns,
        _ => ROOT_PARTITION,
    }
}

/// Handles disk I/O for the [`MemStore`].
///
/// Persistence uses an atomic "write-then-rename" strategy to ensure data integrity.
/// Each partition is stored in its own `.json` file named after the hex-encoded
/// partition, mapping full keys to hex-encoded values.
pub struct Persistence {
    data_dir: PathBuf,
    /// Last generation written per partition. Each partition has its own lock so writes
    /// to different partitions do not wait on each other.
    written: Mutex<HashMap<String, Arc<Mutex<Option<u64>>>>>,
}

fn poisoned<E: std::fmt::Display>(e: E) -> BackendError {
    BackendError::Protocol(format!("lock poisoned: {e}"))
}

impl Persistence {
    /// Initializes a new `Persistence` handler in the specified directory.
    ///
    /// If the directory does not exist, it will be created.
    pub fn new<P: AsRef<Path>>(dir: P) -> BackendResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
        Ok(Self {
            data_dir: dir,
            written: Mutex::new(HashMap::new()),
        })
    }

    fn partition_path(&self, partition: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", hex::encode(partition)))
    }

    /// Writes a single partition to its JSON file atomically.
    ///
    /// An empty partition removes the file instead.
    pub fn save_partition(
        &self,
        partition: &str,
        entries: &BTreeMap<String, Vec<u8>>,
    ) -> BackendResult<()> {
        let file_path = self.partition_path(partition);

        if entries.is_empty() {
            return match fs::remove_file(&file_path) {
                Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
                _ => Ok(()),
            };
        }

        let temp_path = file_path.with_extension("json.tmp");
        let encoded: BTreeMap<&str, String> = entries
            .iter()
            .map(|(k, v)| (k.as_str(), hex::encode(v)))
            .collect();
        let bytes = serde_json::to_vec_pretty(&encoded)?;

        fs::write(&temp_path, bytes)?;
        fs::rename(&temp_path, &file_path)?;

        Ok(())
    }

    /// Writes a partition snapshot taken at `generation`, unless a newer one already landed.
    ///
    /// Background writes may finish out of order; this keeps the file monotonic.
    /// Returns whether the snapshot was written.
    pub fn save_partition_at(
        &self,
        partition: &str,
        generation: u64,
        entries: &BTreeMap<String, Vec<u8>>,
    ) -> BackendResult<bool> {
        let lock = self.partition_lock(partition)?;
        let mut last = lock.lock().map_err(poisoned)?;
        if last.is_some_and(|g| g >= generation) {
            return Ok(false);
        }
        self.save_partition(partition, entries)?;
        *last = Some(generation);
        Ok(true)
    }

    fn partition_lock(&self, partition: &str) -> BackendResult<Arc<Mutex<Option<u64>>>> {
        let mut locks = self.written.lock().map_err(poisoned)?;
        Ok(locks.entry(partition.to_string()).or_default().clone())
    }

    /// Loads every partition found in the data directory into one key space.
    ///
    /// Files that cannot be read or parsed are skipped with a warning.
    pub fn load_all(&self) -> BackendResult<BTreeMap<String, Vec<u8>>> {
        let mut all_data = BTreeMap::new();

        if !self.data_dir.exists() {
            return Ok(all_data);
        }

        for entry in fs::read_dir(&self.data_dir)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }

            let content = match fs::read(&path) {
                Ok(c) => c,
                Err(e) => {
                    warn!("Could not read partition file {:?}: {}", path, e);
                    continue;
                }
            };

            match decode_partition(&content) {
                Ok(entries) => all_data.extend(entries),
                Err(e) => warn!("Could not unmarshal partition data from {:?}: {}", path, e),
            }
        }

        Ok(all_data)
    }
}

fn decode_partition(content: &[u8]) -> BackendResult<BTreeMap<String, Vec<u8>>> {
    let raw: BTreeMap<String, String> = serde_json::from_slice(content)?;
    raw.into_iter()
        .map(|(k, v)| {
            let bytes = hex::decode(&v)
                .map_err(|e| BackendError::Protocol(format!("bad value for key '{}': {}", k, e)))?;
            Ok((k, bytes))
        })
        .collect()
}
