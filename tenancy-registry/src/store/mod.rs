//! The generic object store the REST adapters delegate to
//!
//! [`Storage`] is the seam between the tenant-aware adapters and whatever keeps the objects.
//! [`MemoryStore`] is the in-process implementation.
use crate::core::{
    params::{DeleteParams, GetParams, ListParams, Patch, PostParams, WatchParams},
    Context, Error, GroupResource, ObjectList, Resource, ResourceExt, Result,
};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

mod memory;
pub use memory::{MemoryStore, StoreBuilder};

mod watch;
pub use watch::WatchStream;

/// Errors raised while wiring up a store
///
/// These happen once at startup and leave the process unable to serve the kind.
#[derive(thiserror::Error, Debug)]
pub enum BootstrapError {
    /// The store was not given a resource to serve
    #[error("store for {kind} has no resource name")]
    MissingResource {
        /// Kind the store was built for
        kind: &'static str,
    },

    /// A size or capacity setting was zero
    #[error("store for {resource}: {setting} must be positive")]
    ZeroSetting {
        /// Resource the store serves
        resource: GroupResource,
        /// The offending setting
        setting: &'static str,
    },
}

/// The object an update should store, resolved against the current object at write time
#[derive(Debug, Clone)]
pub enum UpdatedObject<K> {
    /// Store this object in place of the current one
    Replace(K),
    /// Apply an RFC 7386 merge patch to the current object
    Merge(serde_json::Value),
    /// Apply an RFC 6902 JSON patch to the current object
    Json(json_patch::Patch),
}

impl<K> UpdatedObject<K>
where
    K: Resource + Clone + Serialize + DeserializeOwned,
{
    /// Convert a client patch into an update
    pub fn from_patch<P: Serialize>(patch: &Patch<P>) -> Result<Self> {
        match patch {
            Patch::Json(p) => Ok(Self::Json(p.clone())),
            Patch::Merge(p) => serde_json::to_value(p)
                .map(Self::Merge)
                .map_err(|e| Error::BadRequest(format!("unserializable merge patch: {e}"))),
            _ => Err(Error::BadRequest("unsupported patch type".into())),
        }
    }

    /// The object to store given the currently stored `current`
    ///
    /// A replacement without a name takes `name`; one naming another object is rejected.
    pub fn resolve(self, name: &str, current: Option<&K>) -> Result<K> {
        let obj = match self {
            Self::Replace(mut obj) => {
                if obj.meta().name.as_deref().unwrap_or_default().is_empty() {
                    obj.meta_mut().name = Some(name.into());
                }
                obj
            }
            Self::Merge(patch) => {
                let mut doc = current_document(name, current)?;
                json_patch::merge(&mut doc, &patch);
                from_document(doc)?
            }
            Self::Json(patch) => {
                let mut doc = current_document(name, current)?;
                json_patch::patch(&mut doc, &patch)
                    .map_err(|e| Error::BadRequest(format!("unable to apply json patch: {e}")))?;
                from_document(doc)?
            }
        };
        if obj.name_any() != name {
            return Err(Error::BadRequest(format!(
                "the name of the object ({}) does not match the name on the URL ({name})",
                obj.name_any()
            )));
        }
        Ok(obj)
    }
}

fn current_document<K: Resource + Serialize>(name: &str, current: Option<&K>) -> Result<serde_json::Value> {
    let current = current.ok_or_else(|| Error::not_found(&K::group_resource(), name))?;
    serde_json::to_value(current).map_err(Error::internal)
}

fn from_document<K: DeserializeOwned>(doc: serde_json::Value) -> Result<K> {
    serde_json::from_value(doc).map_err(|e| Error::BadRequest(format!("patched object is malformed: {e}")))
}

/// A watchable store of objects of one kind
///
/// Implementations own create/update strategy handling, optimistic concurrency via
/// resource versions, and the error taxonomy of [`Error`]. Callers above this trait
/// never rewrite store errors.
#[async_trait]
pub trait Storage<K>: Send + Sync
where
    K: Send + Sync + 'static,
{
    /// The resource this store serves
    fn resource(&self) -> &GroupResource;

    /// An empty instance of the kind
    fn new_object(&self) -> K;

    /// Persist a new object
    async fn create(&self, ctx: &Context, obj: K, pp: &PostParams) -> Result<K>;

    /// Fetch an object by name
    async fn get(&self, ctx: &Context, name: &str, gp: &GetParams) -> Result<K>;

    /// List objects matching the selectors in `lp`
    async fn list(&self, ctx: &Context, lp: &ListParams) -> Result<ObjectList<K>>;

    /// Stream changes to objects matching the selectors in `wp`
    ///
    /// An empty or `"0"` version starts from the current state. Any other version
    /// replays the retained changes after it first.
    async fn watch(&self, ctx: &Context, wp: &WatchParams, version: &str) -> Result<WatchStream<K>>;

    /// Replace an object, returning it and whether it was created
    ///
    /// A missing object is only created when `force_allow_create` is set or the update
    /// strategy allows it.
    async fn update(
        &self,
        ctx: &Context,
        name: &str,
        obj: UpdatedObject<K>,
        force_allow_create: bool,
        pp: &PostParams,
    ) -> Result<(K, bool)>;

    /// Delete an object, returning its final state and whether it is already gone
    async fn delete(&self, ctx: &Context, name: &str, dp: &DeleteParams) -> Result<(K, bool)>;

    /// Delete every object matching the selectors in `lp`, returning what was deleted
    async fn delete_collection(
        &self,
        ctx: &Context,
        dp: &DeleteParams,
        lp: &ListParams,
    ) -> Result<ObjectList<K>>;
}
