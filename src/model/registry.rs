use std::collections::BTreeMap;

use crate::model::{Animal, Object, Person, Variant, KEY_SEPARATOR};
use crate::{Error, Result};

type Factory = fn() -> Box<dyn Object>;
type Decoder = fn(&str, &[u8]) -> Result<Box<dyn Object>>;

struct KindEntry {
    factory: Factory,
    decoder: Decoder,
}

impl KindEntry {
    fn of<T: Variant>() -> Self {
        Self { factory: empty::<T>, decoder: decode_boxed::<T> }
    }
}

fn empty<T: Variant>() -> Box<dyn Object> {
    Box::new(T::default())
}

fn decode_boxed<T: Variant>(key: &str, bytes: &[u8]) -> Result<Box<dyn Object>> {
    Ok(Box::new(T::decode(key, bytes)?))
}

/// Maps kind tags to the concrete variants that own them.
///
/// The backend only hands back a key and some bytes. The key carries the kind, and the
/// registry turns that kind into a concrete type to decode the bytes into. Build it once at
/// startup and share it behind an `Arc`; it is read-only afterwards.
#[derive(Default)]
pub struct KindRegistry {
    kinds: BTreeMap<&'static str, KindEntry>,
}

impl KindRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in variants, [`Person`] and [`Animal`].
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.kinds.insert(Person::KIND, KindEntry::of::<Person>());
        registry.kinds.insert(Animal::KIND, KindEntry::of::<Animal>());
        registry
    }

    /// Registers `T` under [`Variant::KIND`].
    ///
    /// Fails if the tag is empty, contains the key separator, or is already taken.
    pub fn register<T: Variant>(&mut self) -> Result<()> {
        let kind = T::KIND;
        let reason = if kind.is_empty() {
            Some("kind tag is empty")
        } else if kind.contains(KEY_SEPARATOR) {
            Some("kind tag contains the key separator")
        } else if self.kinds.contains_key(kind) {
            Some("kind tag is already registered")
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(Error::InvalidKind { kind: kind.to_string(), reason });
        }

        self.kinds.insert(kind, KindEntry::of::<T>());
        Ok(())
    }

    /// Produces an empty instance of the variant registered under `kind`.
    pub fn instantiate(&self, kind: &str) -> Result<Box<dyn Object>> {
        Ok((self.entry(kind)?.factory)())
    }

    /// Decodes `bytes` as the variant registered under `kind`.
    pub fn decode(&self, kind: &str, key: &str, bytes: &[u8]) -> Result<Box<dyn Object>> {
        (self.entry(kind)?.decoder)(key, bytes)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// Registered kind tags, sorted.
    pub fn kinds(&self) -> Vec<&'static str> {
        self.kinds.keys().copied().collect()
    }

    fn entry(&self, kind: &str) -> Result<&KindEntry> {
        self.kinds.get(kind).ok_or_else(|| Error::NotRegistered {
            kind: kind.to_string(),
        })
    }
}

impl std::fmt::Debug for KindRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KindRegistry").field("kinds", &self.kinds()).finish()
    }
}
