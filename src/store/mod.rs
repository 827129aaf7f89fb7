//! The [`ObjectStore`]: polymorphic persistence over any [`KvBackend`].
//!
//! Lookups by id or name scan the whole key space and decode every record until one
//! matches, because the caller supplies no kind and the key cannot be targeted without
//! it. Callers that know the kind can use [`ObjectStore::get`], a direct point read.

pub mod options;

pub use options::{DecodePolicy, StoreOptions};

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, warn};

use crate::model::{decode_key, encode_key, kind_prefix, KindRegistry, Object, Variant};
use crate::{BackendError, Error, KvBackend, ObjectDb, Result};

/// Scan prefix selecting every key.
const SCAN_ALL: &str = "";

#[derive(Debug, Clone, Copy)]
enum Field {
    Id,
    Name,
}

impl Field {
    fn label(self) -> &'static str {
        match self {
            Field::Id => "id",
            Field::Name => "name",
        }
    }

    fn value_of(self, object: &dyn Object) -> &str {
        match self {
            Field::Id => object.id(),
            Field::Name => object.name(),
        }
    }
}

fn backend_err<'a>(op: &'static str, key: &'a str) -> impl FnOnce(BackendError) -> Error + 'a {
    move |source| Error::Backend {
        op,
        key: if key.is_empty() { "*".to_string() } else { key.to_string() },
        source,
    }
}

fn is_record_error(e: &Error) -> bool {
    matches!(e, Error::Malformed { .. } | Error::NotRegistered { .. } | Error::Decode { .. })
}

/// Stores heterogeneous objects in one key-value namespace.
///
/// Holds no per-object state and takes no locks: consistency is whatever the backend gives
/// single-key operations. Nothing is retried.
pub struct ObjectStore {
    backend: Arc<dyn KvBackend>,
    registry: Arc<KindRegistry>,
    options: StoreOptions,
}

impl ObjectStore {
    pub fn new(backend: Arc<dyn KvBackend>, registry: Arc<KindRegistry>) -> Self {
        Self::with_options(backend, registry, StoreOptions::default())
    }

    pub fn with_options(
        backend: Arc<dyn KvBackend>,
        registry: Arc<KindRegistry>,
        options: StoreOptions,
    ) -> Self {
        Self {
            backend,
            registry,
            options,
        }
    }

    pub fn registry(&self) -> &KindRegistry {
        &self.registry
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Reads `"<kind>:<id>"` directly, without scanning.
    pub async fn get(&self, kind: &str, id: &str) -> Result<Box<dyn Object>> {
        let key = encode_key(kind, id);
        self.bounded("get", &key, async {
            debug!("get {}", key);
            if !self.registry.contains(kind) {
                return Err(Error::NotRegistered { kind: kind.to_string() });
            }
            let bytes = self
                .backend
                .get(&key)
                .await
                .map_err(backend_err("get", &key))?
                .ok_or_else(|| Error::NotFound {
                    field: "id",
                    value: id.to_string(),
                })?;
            self.registry.decode(kind, &key, &bytes)
        })
        .await
    }

    /// Waits until the backend has made every accepted write durable.
    pub async fn flush(&self) -> Result<()> {
        self.backend.flush().await.map_err(backend_err("flush", SCAN_ALL))
    }

    /// Typed point read of a `T` by id.
    pub async fn get_as<T: Variant>(&self, id: &str) -> Result<T> {
        let object = self.get(T::KIND, id).await?;
        object
            .downcast::<T>()
            .map(|concrete| *concrete)
            .map_err(|_| {
                Error::InvalidObject(format!(
                    "{} is not decoded as {}",
                    encode_key(T::KIND, id),
                    std::any::type_name::<T>()
                ))
            })
    }

    /// Typed listing of every `T`.
    pub async fn list_as<T: Variant>(&self) -> Result<Vec<T>> {
        let objects = self.list_objects(T::KIND).await?;
        Ok(objects
            .into_iter()
            .filter_map(|object| object.downcast::<T>().ok().map(|concrete| *concrete))
            .collect())
    }

    async fn bounded<T, F>(&self, op: &'static str, target: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match self.options.op_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| Error::Cancelled {
                op,
                target: target.to_string(),
            })?,
            None => fut.await,
        }
    }

    /// Fetches and decodes one scanned key. `Ok(None)` if the record must be passed over.
    async fn load(&self, op: &'static str, key: &str) -> Result<Option<Box<dyn Object>>> {
        match self.try_load(op, key).await {
            Err(e) if self.options.decode_policy == DecodePolicy::Skip && is_record_error(&e) => {
                warn!("{}: skipping record '{}': {}", op, key, e);
                Ok(None)
            }
            other => other,
        }
    }

    async fn try_load(&self, op: &'static str, key: &str) -> Result<Option<Box<dyn Object>>> {
        let (kind, _) = decode_key(key)?;
        if !self.registry.contains(kind) {
            return Err(Error::NotRegistered { kind: kind.to_string() });
        }
        match self.backend.get(key).await.map_err(backend_err(op, key))? {
            Some(bytes) => self.registry.decode(kind, key, &bytes).map(Some),
            None => {
                debug!("{}: '{}' disappeared during scan", op, key);
                Ok(None)
            }
        }
    }

    async fn find_first(
        &self,
        op: &'static str,
        field: Field,
        value: &str,
    ) -> Result<Box<dyn Object>> {
        let mut keys = self.backend.scan_prefix(SCAN_ALL);
        while let Some(key) = keys.next().await {
            let key = key.map_err(backend_err(op, SCAN_ALL))?;
            if let Some(object) = self.load(op, &key).await? {
                if field.value_of(object.as_ref()) == value {
                    return Ok(object);
                }
            }
        }
        Err(Error::NotFound {
            field: field.label(),
            value: value.to_string(),
        })
    }
}

#[async_trait]
impl ObjectDb for ObjectStore {
    async fn store(&self, object: &dyn Object) -> Result<()> {
        let key = encode_key(object.kind(), object.id());
        self.bounded("store", &key, async {
            debug!("store {}", key);
            if object.id().is_empty() {
                return Err(Error::InvalidObject(format!("{} has an empty id", object.kind())));
            }
            if !self.registry.contains(object.kind()) {
                return Err(Error::NotRegistered { kind: object.kind().to_string() });
            }
            let bytes = object.encode()?;
            self.backend.set(&key, bytes).await.map_err(backend_err("store", &key))
        })
        .await
    }

    async fn get_by_id(&self, id: &str) -> Result<Box<dyn Object>> {
        debug!("get_by_id {}", id);
        self.bounded("get_by_id", id, self.find_first("get_by_id", Field::Id, id))
            .await
    }

    async fn get_by_name(&self, name: &str) -> Result<Box<dyn Object>> {
        debug!("get_by_name {}", name);
        self.bounded("get_by_name", name, self.find_first("get_by_name", Field::Name, name))
            .await
    }

    async fn list_objects(&self, kind: &str) -> Result<Vec<Box<dyn Object>>> {
        let prefix = kind_prefix(kind);
        self.bounded("list_objects", kind, async {
            debug!("list_objects {}", kind);
            let mut keys = self.backend.scan_prefix(&prefix);
            let mut objects = Vec::new();
            while let Some(key) = keys.next().await {
                let key = key.map_err(backend_err("list_objects", &prefix))?;
                if let Some(object) = self.load("list_objects", &key).await? {
                    objects.push(object);
                }
            }
            Ok(objects)
        })
        .await
    }

    async fn delete_object(&self, id: &str) -> Result<()> {
        self.bounded("delete_object", id, async {
            debug!("delete_object {}", id);
            let object = self.find_first("delete_object", Field::Id, id).await?;
            let key = encode_key(object.kind(), object.id());
            self.backend.delete(&key).await.map_err(backend_err("delete_object", &key))
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemStore;
    use crate::model::{Animal, Person};
    use crate::BackendResult;
    use chrono::{TimeZone, Utc};
    use futures::stream::{self, BoxStream};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn person(id: &str, name: &str) -> Person {
        Person {
            name: name.to_string(),
            id: id.to_string(),
            last_name: "Doe".to_string(),
            birthday: "01-01-1990".to_string(),
            birth_date: Utc.with_ymd_and_hms(1990, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    fn animal(id: &str, name: &str, owner: &str) -> Animal {
        Animal {
            name: name.to_string(),
            id: id.to_string(),
            species: "Dog".to_string(),
            owner_id: owner.to_string(),
        }
    }

    fn setup(options: StoreOptions) -> (Arc<MemStore>, ObjectStore) {
        let backend = Arc::new(MemStore::in_memory());
        let registry = Arc::new(KindRegistry::with_defaults());
        let store = ObjectStore::with_options(backend.clone(), registry, options);
        (backend, store)
    }

    #[tokio::test]
    async fn test_round_trip() {
        let (_, store) = setup(StoreOptions::default());
        let original = person("123", "John Doe");
        store.store(&original).await.unwrap();

        let got = store.get_by_id("123").await.unwrap();
        assert_eq!(got.downcast_ref::<Person>(), Some(&original));
    }

    #[tokio::test]
    async fn test_reference_scenario() {
        let (_, store) = setup(StoreOptions::default());
        let john = Person {
            id: "123".to_string(),
            name: "John Doe".to_string(),
            last_name: "Doe".to_string(),
            ..Default::default()
        };
        store.store(&john).await.unwrap();

        let got = store.get_by_id("123").await.unwrap();
        assert_eq!(got.kind(), "Person");
        assert_eq!(got.downcast_ref::<Person>().unwrap().last_name, "Doe");

        store.store(&animal("456", "Rex", "123")).await.unwrap();
        let rex = store.get_by_name("Rex").await.unwrap();
        assert_eq!(rex.downcast_ref::<Animal>().unwrap().owner_id, "123");

        let people = store.list_objects("Person").await.unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].downcast_ref::<Person>(), Some(&john));

        store.delete_object("123").await.unwrap();
        assert!(store.get_by_id("123").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_kind_isolation() {
        let (_, store) = setup(StoreOptions::default());
        for i in 0..5 {
            store.store(&person(&format!("p{i}"), "someone")).await.unwrap();
        }
        for i in 0..3 {
            store.store(&animal(&format!("a{i}"), "something", "p0")).await.unwrap();
        }
        store.store(&person("p0", "overwritten")).await.unwrap();

        let people = store.list_objects("Person").await.unwrap();
        assert_eq!(people.len(), 5);
        assert!(people.iter().all(|o| o.kind() == "Person" && o.is::<Person>()));

        let animals = store.list_as::<Animal>().await.unwrap();
        assert_eq!(animals.len(), 3);

        assert!(store.list_objects("Plant").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_overwrite_keeps_one_record() {
        let (backend, store) = setup(StoreOptions::default());
        store.store(&person("1", "first")).await.unwrap();
        let second = person("1", "second");
        store.store(&second).await.unwrap();

        assert_eq!(backend.len().unwrap(), 1);
        let got = store.get_by_id("1").await.unwrap();
        assert_eq!(got.downcast_ref::<Person>(), Some(&second));
    }

    #[tokio::test]
    async fn test_same_id_different_kinds() {
        let (_, store) = setup(StoreOptions::default());
        store.store(&person("7", "Ann")).await.unwrap();
        store.store(&animal("7", "Fido", "")).await.unwrap();

        assert_eq!(store.list_objects("Person").await.unwrap().len(), 1);
        assert_eq!(store.list_objects("Animal").await.unwrap().len(), 1);
        assert!(store.get("Animal", "7").await.unwrap().is::<Animal>());
        assert_eq!(store.get_as::<Person>("7").await.unwrap().name, "Ann");
    }

    #[tokio::test]
    async fn test_name_ambiguity() {
        let (_, store) = setup(StoreOptions::default());
        store.store(&person("1", "Max")).await.unwrap();
        store.store(&animal("2", "Max", "1")).await.unwrap();

        let got = store.get_by_name("Max").await.unwrap();
        assert_eq!(got.name(), "Max");
        assert!(["1", "2"].contains(&got.id()));
    }

    #[tokio::test]
    async fn test_not_found() {
        let (_, store) = setup(StoreOptions::default());
        let err = store.get_by_id("nonexistent").await.unwrap_err();
        assert!(matches!(
            err,
            Error::NotFound { field: "id", ref value } if value == "nonexistent"
        ));

        let err = store.get_by_name("nobody").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { field: "name", .. }));

        assert!(store.delete_object("nonexistent").await.unwrap_err().is_not_found());
        assert!(store.get("Person", "nonexistent").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_store_rejects_unreadable_objects() {
        let (backend, store) = setup(StoreOptions::default());
        let err = store.store(&person("", "nameless")).await.unwrap_err();
        assert!(matches!(err, Error::InvalidObject(_)));

        let narrow = ObjectStore::new(backend.clone(), Arc::new(KindRegistry::new()));
        let err = narrow.store(&person("1", "x")).await.unwrap_err();
        assert!(matches!(err, Error::NotRegistered { ref kind } if kind == "Person"));
        assert!(backend.is_empty().unwrap());
    }

    fn skip_bad_records() -> StoreOptions {
        StoreOptions::default().with_decode_policy(DecodePolicy::Skip)
    }

    async fn seed_with_bad_records(backend: &MemStore, store: &ObjectStore) {
        store.store(&person("1", "good")).await.unwrap();
        backend.set("orphan", b"{}".to_vec()).await.unwrap();
        backend.set("Plant:9", b"{}".to_vec()).await.unwrap();
        backend
            .set("Person:2", br#"{"name":"Rex","id":"2","type":"Dog","owner_id":"1"}"#.to_vec())
            .await
            .unwrap();
        store.store(&person("3", "late")).await.unwrap();
    }

    #[tokio::test]
    async fn test_fail_fast_policy_aborts_scan() {
        let (backend, store) = setup(StoreOptions::default());
        seed_with_bad_records(&backend, &store).await;

        // Scan order is "Person:1", "Person:2", "Person:3", "Plant:9", "orphan".
        let err = store.get_by_id("3").await.unwrap_err();
        assert!(matches!(err, Error::Decode { ref key, .. } if key == "Person:2"));
        assert!(store.list_objects("Person").await.is_err());
        assert!(matches!(
            store.get_by_id("missing").await.unwrap_err(),
            Error::Decode { .. }
        ));

        backend.delete("Person:2").await.unwrap();
        let err = store.get_by_name("missing").await.unwrap_err();
        assert!(matches!(err, Error::NotRegistered { ref kind } if kind == "Plant"));

        backend.delete("Plant:9").await.unwrap();
        let err = store.get_by_id("missing").await.unwrap_err();
        assert!(matches!(err, Error::Malformed { ref key } if key == "orphan"));
    }

    #[tokio::test]
    async fn test_skip_policy_continues_scan() {
        let (backend, store) = setup(skip_bad_records());
        seed_with_bad_records(&backend, &store).await;

        assert_eq!(store.get_by_id("3").await.unwrap().name(), "late");
        assert_eq!(store.list_objects("Person").await.unwrap().len(), 2);
        assert!(store.get_by_id("missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_direct_get_surfaces_decode_errors() {
        let (backend, store) = setup(skip_bad_records());
        backend.set("Person:2", b"not json".to_vec()).await.unwrap();
        assert!(matches!(store.get("Person", "2").await.unwrap_err(), Error::Decode { .. }));
        assert!(matches!(store.get("Plant", "2").await.unwrap_err(), Error::NotRegistered { .. }));
    }

    /// Wraps a [`MemStore`] and injects failures or latency.
    #[derive(Default)]
    struct FaultyBackend {
        inner: MemStore,
        fail_delete: bool,
        fail_scan: bool,
        delay: Option<Duration>,
        slow: AtomicBool,
    }

    impl FaultyBackend {
        async fn lag(&self) {
            if let Some(delay) = self.delay.filter(|_| self.slow.load(Ordering::SeqCst)) {
                tokio::time::sleep(delay).await;
            }
        }
    }

    #[async_trait]
    impl KvBackend for FaultyBackend {
        async fn set(&self, key: &str, value: Vec<u8>) -> BackendResult<()> {
            self.lag().await;
            self.inner.set(key, value).await
        }

        async fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>> {
            self.lag().await;
            self.inner.get(key).await
        }

        async fn delete(&self, key: &str) -> BackendResult<()> {
            self.lag().await;
            if self.fail_delete {
                return Err(BackendError::Closed);
            }
            self.inner.delete(key).await
        }

        fn scan_prefix<'a>(&'a self, prefix: &str) -> BoxStream<'a, BackendResult<String>> {
            if self.fail_scan {
                return stream::once(async { Err(BackendError::Closed) }).boxed();
            }
            self.inner.scan_prefix(prefix)
        }
    }

    fn faulty_store(backend: FaultyBackend, options: StoreOptions) -> ObjectStore {
        shared_faulty_store(Arc::new(backend), options)
    }

    fn shared_faulty_store(backend: Arc<FaultyBackend>, options: StoreOptions) -> ObjectStore {
        ObjectStore::with_options(backend, Arc::new(KindRegistry::with_defaults()), options)
    }

    #[tokio::test]
    async fn test_backend_errors_are_annotated() {
        let backend = FaultyBackend { fail_scan: true, ..Default::default() };
        let store = faulty_store(backend, StoreOptions::default());
        let err = store.get_by_id("1").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Backend { op: "get_by_id", ref key, source: BackendError::Closed } if key == "*"
        ));

        let err = store.list_objects("Animal").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Backend { op: "list_objects", ref key, .. } if key == "Animal:"
        ));
    }

    #[tokio::test]
    async fn test_failed_delete_leaves_object() {
        let backend = FaultyBackend { fail_delete: true, ..Default::default() };
        let store = faulty_store(backend, StoreOptions::default());
        store.store(&person("1", "kept")).await.unwrap();

        let err = store.delete_object("1").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Backend { op: "delete_object", ref key, .. } if key == "Person:1"
        ));
        assert_eq!(store.get_by_id("1").await.unwrap().name(), "kept");
    }

    fn slow_backend() -> Arc<FaultyBackend> {
        Arc::new(FaultyBackend {
            delay: Some(Duration::from_millis(200)),
            ..Default::default()
        })
    }

    fn deadline() -> StoreOptions {
        StoreOptions::default().with_timeout(Duration::from_millis(20))
    }

    #[tokio::test]
    async fn test_deadline_cancels_operation() {
        let backend = slow_backend();
        let store = shared_faulty_store(backend.clone(), deadline());
        store.store(&person("1", "slow")).await.unwrap();
        backend.slow.store(true, Ordering::SeqCst);

        let err = store.get_by_id("1").await.unwrap_err();
        assert!(matches!(err, Error::Cancelled { op: "get_by_id", ref target } if target == "1"));
    }

    #[tokio::test]
    async fn test_cancelled_operations_leave_store_usable() {
        let backend = slow_backend();
        let store = shared_faulty_store(backend.clone(), deadline());
        store.store(&person("1", "first")).await.unwrap();
        store.store(&animal("2", "Rex", "1")).await.unwrap();

        backend.slow.store(true, Ordering::SeqCst);
        let err = store.store(&person("3", "late")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Cancelled { op: "store", ref target } if target == "Person:3"
        ));
        let err = store.list_objects("Person").await.unwrap_err();
        assert!(matches!(
            err,
            Error::Cancelled { op: "list_objects", ref target } if target == "Person"
        ));
        let err = store.delete_object("1").await.unwrap_err();
        assert!(matches!(err, Error::Cancelled { op: "delete_object", .. }));
        let err = store.get("Animal", "2").await.unwrap_err();
        assert!(matches!(err, Error::Cancelled { op: "get", .. }));

        backend.slow.store(false, Ordering::SeqCst);
        assert!(store.get("Person", "3").await.unwrap_err().is_not_found());
        assert_eq!(store.get_by_id("1").await.unwrap().name(), "first");
        assert_eq!(store.get_as::<Animal>("2").await.unwrap().name, "Rex");

        store.store(&person("3", "late")).await.unwrap();
        assert_eq!(store.list_objects("Person").await.unwrap().len(), 2);
        store.delete_object("1").await.unwrap();
        assert!(store.get_by_id("1").await.unwrap_err().is_not_found());
    }
}
