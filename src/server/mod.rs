/// TCP server implementation for the Celerix Objects daemon.
///
/// This module provides the [`Router`] which handles incoming TCP connections
/// and serves the key-value contract of the underlying backend.
pub mod router;

pub use router::Router;

/// Placeholder for an empty argument on the wire.
pub(crate) const EMPTY_ARG: &str = "-";

/// Hex-encodes a key, prefix or value so it survives whitespace splitting.
pub(crate) fn encode_arg(raw: &[u8]) -> String {
    if raw.is_empty() {
        EMPTY_ARG.to_string()
    } else {
        hex::encode(raw)
    }
}

pub(crate) fn decode_arg(arg: &str) -> Option<Vec<u8>> {
    if arg == EMPTY_ARG {
        Some(Vec::new())
    } else {
        hex::decode(arg).ok()
    }
}

pub(crate) fn decode_text_arg(arg: &str) -> Option<String> {
    decode_arg(arg).and_then(|bytes| String::from_utf8(bytes).ok())
}
