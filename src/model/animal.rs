use serde::{Deserialize, Serialize};

use crate::model::{impl_object, Variant};

/// An animal record.
///
/// `owner_id` points at a [`Person`](crate::model::Person) id. It is a plain value:
/// nothing checks that the owner exists or keeps the two in sync.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Animal {
    pub name: String,
    pub id: String,
    #[serde(rename = "type")]
    pub species: String,
    pub owner_id: String,
}

impl Variant for Animal {
    const KIND: &'static str = "Animal";
}

impl_object!(Animal);
