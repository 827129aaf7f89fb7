//! Storable objects and the machinery that maps them onto keys.
//!
//! An [`Object`] is anything with a kind tag, an id and a name that can serialize itself.
//! Concrete variants also implement [`Variant`], which ties a type to its stable kind tag
//! and gives the [`KindRegistry`] a way to build and decode it.

pub mod animal;
pub mod key;
pub mod person;
pub mod registry;

pub use animal::Animal;
pub use key::{decode_key, encode_key, kind_prefix, KEY_SEPARATOR};
pub use person::Person;
pub use registry::KindRegistry;

use std::any::Any;
use std::fmt::Debug;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::{Error, Result};

/// The capability set every storable entity satisfies.
pub trait Object: Debug + Send + Sync + 'static {
    /// The variant's kind tag. Stable per type, never derived from data.
    fn kind(&self) -> &'static str;
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn set_id(&mut self, id: String);
    fn set_name(&mut self, name: String);
    /// Serializes the variant's own fields. The kind is not part of the payload.
    fn encode(&self) -> Result<Vec<u8>>;
    /// Renders the payload as a JSON value, for display.
    fn to_json(&self) -> Result<serde_json::Value>;
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl dyn Object {
    /// Borrows the concrete variant, if this object is a `T`.
    pub fn downcast_ref<T: Object>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Takes the concrete variant out of the box, handing the box back on mismatch.
    pub fn downcast<T: Object>(self: Box<Self>) -> std::result::Result<Box<T>, Box<dyn Object>> {
        if self.as_any().is::<T>() {
            match self.into_any().downcast::<T>() {
                Ok(concrete) => Ok(concrete),
                Err(_) => unreachable!("type checked above"),
            }
        } else {
            Err(self)
        }
    }

    /// Returns `true` if this object is a `T`.
    pub fn is<T: Object>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// A concrete object type that can be registered by kind.
pub trait Variant: Object + Default + Serialize + DeserializeOwned + Sized {
    /// Kind tag used as the key namespace. Must not contain [`KEY_SEPARATOR`].
    const KIND: &'static str;

    /// Parses a payload produced by [`Object::encode`]. `key` is only used for error context.
    fn decode(key: &str, bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|source| Error::Decode {
            key: key.to_string(),
            source,
        })
    }
}

pub(crate) fn encode_json<T: Variant>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|source| Error::Encode {
        kind: T::KIND.to_string(),
        id: value.id().to_string(),
        source,
    })
}

pub(crate) fn json_value<T: Variant>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(|source| Error::Encode {
        kind: T::KIND.to_string(),
        id: value.id().to_string(),
        source,
    })
}

/// Implements [`Object`] for a [`Variant`] with `id` and `name` string fields.
macro_rules! impl_object {
    ($ty:ty) => {
        impl $crate::model::Object for $ty {
            fn kind(&self) -> &'static str {
                <$ty as $crate::model::Variant>::KIND
            }

            fn id(&self) -> &str {
                &self.id
            }

            fn name(&self) -> &str {
                &self.name
            }

            fn set_id(&mut self, id: String) {
                self.id = id;
            }

            fn set_name(&mut self, name: String) {
                self.name = name;
            }

            fn encode(&self) -> $crate::Result<Vec<u8>> {
                $crate::model::encode_json(self)
            }

            fn to_json(&self) -> $crate::Result<serde_json::Value> {
                $crate::model::json_value(self)
            }

            fn as_any(&self) -> &dyn std::any::Any {
                self
            }

            fn into_any(self: Box<Self>) -> Box<dyn std::any::Any> {
                self
            }
        }
    };
}

pub(crate) use impl_object;
