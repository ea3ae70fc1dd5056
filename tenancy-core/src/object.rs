//! Object list wrapper and accessor traits for the spec/status/tenant convention.
use crate::metadata::{ListMeta, TypeMeta};
use serde::{Deserialize, Serialize};

/// A generic object list
///
/// This is used instead of a full struct for `CronHPAList`, `TappControllerList`, etc.
/// It is produced from list and delete collection calls on a store.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ObjectList<T> {
    /// The type fields, not always present
    #[serde(flatten, default)]
    pub types: Option<TypeMeta>,

    /// ListMeta - carries the `resourceVersion` of the snapshot and the `continue` token
    #[serde(default)]
    pub metadata: ListMeta,

    /// The items we are actually interested in.
    #[serde(bound(deserialize = "Vec<T>: Deserialize<'de>"))]
    pub items: Vec<T>,
}

impl<T> ObjectList<T> {
    /// `iter` returns an Iterator over the elements of this ObjectList
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// `iter_mut` returns an Iterator of mutable references to the elements of this ObjectList
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.iter_mut()
    }

    /// Number of items in this page
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether this page is empty
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The resource version of the snapshot this list was taken at
    pub fn resource_version(&self) -> Option<&str> {
        self.metadata.resource_version.as_deref()
    }

    /// The token to fetch the next page with, if the list was truncated
    pub fn continue_token(&self) -> Option<&str> {
        self.metadata.continue_.as_deref()
    }
}

impl<T> IntoIterator for ObjectList<T> {
    type IntoIter = ::std::vec::IntoIter<Self::Item>;
    type Item = T;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a, T> IntoIterator for &'a ObjectList<T> {
    type IntoIter = ::std::slice::Iter<'a, T>;
    type Item = &'a T;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// A trait to access the `spec` of a resource.
///
/// The spec is the desired state, writable by users through the main resource.
pub trait HasSpec {
    /// The type of the `spec` of this resource
    type Spec;

    /// Returns a reference to the `spec` of the object
    fn spec(&self) -> &Self::Spec;

    /// Returns a mutable reference to the `spec` of the object
    fn spec_mut(&mut self) -> &mut Self::Spec;
}

/// A trait to access the `status` of a resource.
///
/// The status is the observed state, writable only through the status subresource.
pub trait HasStatus {
    /// The type of the `status` object
    type Status;

    /// Returns an optional reference to the `status` of the object
    fn status(&self) -> Option<&Self::Status>;

    /// Returns an optional mutable reference to the `status` of the object
    fn status_mut(&mut self) -> &mut Option<Self::Status>;
}

/// A trait to access the owning tenant of a resource.
///
/// Every tenant-scoped kind records its owner in `spec.tenantID`.
pub trait HasTenant {
    /// The owning tenant, empty when unassigned
    fn tenant_id(&self) -> &str;

    /// Assign the owning tenant
    fn set_tenant_id(&mut self, tenant: &str);
}
