pub mod memstore;
pub mod persistence;
pub mod scan;

pub use memstore::MemStore;
pub use persistence::Persistence;
pub use scan::ScanPage;
