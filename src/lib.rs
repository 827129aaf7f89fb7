//! Celerix Objects is a schema-light polymorphic object store.
//!
//! Heterogeneous domain objects (see [`model`]) share a single key-value namespace.
//! Every record lives under `"<kind>:<id>"` and holds the variant's JSON payload; the
//! kind is recovered from the key alone, so the payload never carries a type envelope.
//!
//! ## Core Components
//! - [`model`]: The object contract, the built-in variants, the kind registry and the key codec.
//! - [`store`]: The [`ObjectStore`](store::ObjectStore) that runs store/get/list/delete
//!   over any backend.
//! - [`engine`]: The embedded key-value backend (in-memory with persistence).
//! - [`sdk`]: The remote key-value client and backend discovery.
//! - [`server`]: TCP daemon exposing the key-value contract.

pub mod engine;
pub mod model;
pub mod sdk;
pub mod server;
pub mod store;

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

use crate::model::Object;

/// Errors returned by the key-value layer.
#[derive(Error, Debug)]
pub enum BackendError {
    /// An I/O error occurred during persistence or network communication.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Error during JSON serialization or deserialization.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The peer or the local engine violated the expected protocol.
    #[error("protocol error: {0}")]
    Protocol(String),
    /// The remote daemon answered with an error.
    #[error("remote error: {0}")]
    Remote(String),
    /// The connection was closed by the peer.
    #[error("connection closed")]
    Closed,
}

/// A specialized Result type for key-value operations.
pub type BackendResult<T> = std::result::Result<T, BackendError>;

/// Errors returned by the object store.
#[derive(Error, Debug)]
pub enum Error {
    /// No object matches the requested id or name.
    #[error("object with {field} '{value}' not found")]
    NotFound { field: &'static str, value: String },
    /// A key does not parse as `<kind>:<id>`.
    #[error("malformed key '{key}'")]
    Malformed { key: String },
    /// A kind has no registered factory.
    #[error("kind '{kind}' is not registered")]
    NotRegistered { kind: String },
    /// A kind tag was rejected at registration.
    #[error("invalid kind '{kind}': {reason}")]
    InvalidKind { kind: String, reason: &'static str },
    /// The object cannot be persisted as given.
    #[error("invalid object: {0}")]
    InvalidObject(String),
    /// Serializing an object failed.
    #[error("failed to encode {kind} '{id}': {source}")]
    Encode {
        kind: String,
        id: String,
        #[source]
        source: serde_json::Error,
    },
    /// A stored payload does not match its kind's shape.
    #[error("failed to decode '{key}': {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    /// The underlying key-value operation failed.
    #[error("backend {op} failed for '{key}': {source}")]
    Backend {
        op: &'static str,
        key: String,
        #[source]
        source: BackendError,
    },
    /// The operation ran past its deadline and was abandoned.
    #[error("{op} on '{target}' cancelled: deadline exceeded")]
    Cancelled { op: &'static str, target: String },
}

impl Error {
    /// Returns `true` for the expected "nothing matched" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

/// A specialized Result type for object store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The minimal key-value contract every backend provides.
///
/// Each single-key operation is expected to be atomic; nothing spans keys.
#[async_trait]
pub trait KvBackend: Send + Sync {
    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Vec<u8>) -> BackendResult<()>;
    /// Reads the value under `key`. `Ok(None)` means the key does not exist.
    async fn get(&self, key: &str) -> BackendResult<Option<Vec<u8>>>;
    /// Removes `key`. Removing an absent key succeeds.
    async fn delete(&self, key: &str) -> BackendResult<()>;
    /// Lazily yields every key starting with `prefix` (`""` or `"*"` for all keys).
    ///
    /// The stream is finite and not a snapshot: keys written or deleted while it is
    /// being consumed may or may not show up. It ends after the first error.
    fn scan_prefix<'a>(&'a self, prefix: &str) -> BoxStream<'a, BackendResult<String>>;
    /// Waits until every write accepted so far is durable. A no-op by default.
    async fn flush(&self) -> BackendResult<()> {
        Ok(())
    }
}

/// Polymorphic object persistence.
#[async_trait]
pub trait ObjectDb: Send + Sync {
    /// Writes the object under `"<kind>:<id>"`, overwriting any previous record.
    async fn store(&self, object: &dyn Object) -> Result<()>;
    /// Scans the whole store and returns the first object with this id.
    async fn get_by_id(&self, id: &str) -> Result<Box<dyn Object>>;
    /// Scans the whole store and returns the first object with this name.
    ///
    /// Which one is returned when several share the name is unspecified.
    async fn get_by_name(&self, name: &str) -> Result<Box<dyn Object>>;
    /// Returns every object of `kind`, in backend scan order.
    async fn list_objects(&self, kind: &str) -> Result<Vec<Box<dyn Object>>>;
    /// Resolves the object by id and removes its record.
    async fn delete_object(&self, id: &str) -> Result<()>;
}
