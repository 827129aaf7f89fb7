use std::env;
use std::sync::Arc;
use crate::{BackendResult, KvBackend};
use crate::engine::{MemStore, Persistence};
use crate::model::KindRegistry;
use crate::sdk::Client;
use crate::store::{ObjectStore, StoreOptions};

/// Address of a running daemon. When set, [`new`] uses it instead of the embedded engine.
pub const ADDR_ENV: &str = "CELERIX_OBJECTS_ADDR";

/// Initializes a [`KvBackend`] based on the environment.
///
/// `new` automatically detects whether to connect to a remote server or
/// initialize a local embedded engine:
///
/// 1. If `CELERIX_OBJECTS_ADDR` environment variable is set, it attempts to
///    connect to that address in **Remote Mode**.
/// 2. Otherwise, or if the daemon is unreachable, it initializes a [`MemStore`]
///    with [`Persistence`] in the specified `data_dir` in **Embedded Mode**.
///
/// # Examples
///
/// ```no_run
/// use celerix_objects::sdk;
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let backend = sdk::new("./data").await?;
///     Ok(())
/// }
/// ```
pub async fn new(data_dir: &str) -> BackendResult<Arc<dyn KvBackend>> {
    if let Ok(addr) = env::var(ADDR_ENV) {
        if !addr.is_empty() {
            match Client::connect(&addr).await {
                Ok(client) => return Ok(Arc::new(client)),
                Err(e) => {
                    log::warn!("Could not reach {} ({}), falling back to embedded mode", addr, e)
                }
            }
        }
    }

    let persistence = Arc::new(Persistence::new(data_dir)?);
    let initial_data = persistence.load_all()?;
    let store = MemStore::new(initial_data, Some(persistence));
    Ok(Arc::new(store))
}

/// Opens an [`ObjectStore`] with the built-in kinds on top of [`new`].
pub async fn open(data_dir: &str, options: StoreOptions) -> BackendResult<ObjectStore> {
    let backend = new(data_dir).await?;
    let registry = Arc::new(KindRegistry::with_defaults());
    Ok(ObjectStore::with_options(backend, registry, options))
}
