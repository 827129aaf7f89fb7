//! Storage key layout: `"<kind>:<id>"`.

use crate::{Error, Result};

/// Separates the kind tag from the id. Kind tags never contain it; ids may.
pub const KEY_SEPARATOR: char = ':';

/// Builds the storage key for an object.
pub fn encode_key(kind: &str, id: &str) -> String {
    format!("{}{}{}", kind, KEY_SEPARATOR, id)
}

/// Splits a storage key on its first separator into `(kind, id)`.
pub fn decode_key(key: &str) -> Result<(&str, &str)> {
    key.split_once(KEY_SEPARATOR).ok_or_else(|| Error::Malformed {
        key: key.to_string(),
    })
}

/// The scan prefix that selects every key of `kind`.
pub fn kind_prefix(kind: &str) -> String {
    format!("{}{}", kind, KEY_SEPARATOR)
}
