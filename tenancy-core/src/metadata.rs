//! Metadata structs used in traits, lists, and stored objects.
pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ListMeta, ObjectMeta};
use serde::{Deserialize, Serialize};

use crate::Resource;

/// Type information that is flattened into every stored object
#[derive(Deserialize, Serialize, Clone, Default, Debug, Eq, PartialEq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct TypeMeta {
    /// The version of the API
    pub api_version: String,

    /// The name of the API
    pub kind: String,
}

impl TypeMeta {
    /// The type information of `K`
    pub fn resource<K: Resource>() -> Self {
        Self {
            api_version: K::api_version(),
            kind: K::KIND.into(),
        }
    }

    /// The type information of a list of `K`
    pub fn list<K: Resource>() -> Self {
        Self {
            api_version: K::api_version(),
            kind: format!("{}List", K::KIND),
        }
    }
}
