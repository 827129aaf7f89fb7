use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use async_trait::async_trait;
use futures::stream::BoxStream;
use crate::{BackendError, BackendResult, KvBackend};
use crate::engine::{scan, Persistence};
use crate::engine::persistence::partition_of;
use crate::engine::scan::{ScanPage, SCAN_PAGE_SIZE};

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

type StoreData = BTreeMap<String, Vec<u8>>;

/// Ordered in-memory key-value engine with optional write-behind persistence.
pub struct MemStore {
    data: RwLock<StoreData>,
    persistence: Option<Arc<Persistence>>,
    pending_tasks: Arc<AtomicUsize>,
    generation: AtomicU64,
}

impl MemStore {
    pub fn new(initial_data: StoreData, persistence: Option<Arc<Persistence>>) -> Self {
        Self {
            data: RwLock::new(initial_data),
            persistence,
            pending_tasks: Arc::new(AtomicUsize::new(0)),
            generation: AtomicU64::new(0),
        }
    }

    /// An empty, memory-only store.
    pub fn in_memory() -> Self {
        Self::new(StoreData::new(), None)
    }

    /// Waits until every background partition write has finished.
    pub async fn wait(&self) {
        while self.pending_tasks.load(Ordering::SeqCst) > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    }

    pub fn len(&self) -> BackendResult<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> BackendResult<bool> {
        Ok(self.read()?.is_empty())
    }

    fn read(&self) -> BackendResult<RwLockReadGuard<'_, StoreData>> {
        self.data.read().map_err(|e| BackendError::Protocol(format!("lock poisoned: {e}")))
    }

    fn write(&self) -> BackendResult<RwLockWriteGuard<'_, StoreData>> {
        self.data.write().map_err(|e| BackendError::Protocol(format!("lock poisoned: {e}")))
    }

    /// Returns up to `count` keys with `prefix` that sort strictly after `after`.
    pub fn scan_page(
        &self,
        prefix: &str,
        after: Option<&str>,
        count: usize,
    ) -> BackendResult<ScanPage> {
        let prefix = scan::normalize_prefix(prefix);
        let start = match after {
            Some(after) => Bound::Excluded(after),
            None => Bound::Included(prefix),
        };

        let data = self.read()?;
        let keys: Vec<String> = data
            .range::<str, _>((start, Bound::Unbounded))
            .map(|(k, _)| k)
            .take_while(|k| k.starts_with(prefix))
            .take(count)
            .cloned()
            .collect();

        let next = if count > 0 && keys.len() == count {
            keys.last().cloned()
        } else {
            None
        };
        Ok(ScanPage { keys, next })
    }

    /// Copies one partition together with the generation it was taken at.
    fn copy_partition(&self, partition: &str) -> BackendResult<(u64, StoreData)> {
        let data = self.read()?;
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let entries = data
            .iter()
            .filter(|(k, _)| partition_of(k) == partition)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Ok((generation, entries))
    }

    async fn persist(&self, key: &str) -> BackendResult<()> {
        if let Some(p) = &self.persistence {
            let partition = partition_of(key).to_string();
            let (generation, entries) = self.copy_partition(&partition)?;
            let p = p.clone();
            let pending = self.pending_tasks.clone();
            pending.fetch_add(1, Ordering::SeqCst);
            tokio::task::spawn_blocking(move || {
                if let Err(e) = p.save_partition_at(&partition, generation, &entries) {
                    log::error!("Failed to persist partition {}: {}", partition, e);
                }
                pending.fetch_sub(1, Ordering::SeqCst);
            });
        }
        Ok(())
    }
}

impl Default for MemStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[async_trait]
impl KvBackend for MemStore {
    async fn set(&self, key: &str, value: Vec<u8>) -> BackendResult<()> {
        {
            let mut data = self.write()?;
            data.insert(key.to_string(), value);
        }
        self.persist(key).await
    }

    async fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
        let data = self.read()?;
        Ok(data.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> BackendResult<()> {
        let removed = {
            let mut data = self.write()?;
            data.remove(key).is_some()
        };
        if removed {
            self.persist(key).await?;
        }
        Ok(())
    }

    fn scan_prefix<'a>(&'a self, prefix: &str) -> BoxStream<'a, BackendResult<String>> {
        scan::paged(prefix, move |prefix, after| {
            let page = self.scan_page(&prefix, after.as_deref(), SCAN_PAGE_SIZE);
            async move { page }
        })
    }

    async fn flush(&self) -> BackendResult<()> {
        self.wait().await;
        Ok(())
    }
}
