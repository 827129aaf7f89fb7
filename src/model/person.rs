use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{impl_object, Variant};

/// A person record.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct Person {
    pub name: String,
    pub id: String,
    pub last_name: String,
    /// Free-form birthday text, e.g. `01-01-1990`.
    pub birthday: String,
    pub birth_date: DateTime<Utc>,
}

impl Variant for Person {
    const KIND: &'static str = "Person";
}

impl_object!(Person);
