/// Software Development Kit (SDK) for Celerix Objects.
///
/// This module provides the remote TCP backend and automatic backend discovery.
pub mod client;
/// Automatic mode discovery and backend initialization.
pub mod discovery;

pub use client::Client;
pub use discovery::{new, open, ADDR_ENV};
