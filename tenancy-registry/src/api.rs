//! A typed handle over the adapters of one kind, bound to a caller
use crate::{
    core::{
        params::{DeleteParams, GetParams, ListParams, Patch, PatchParams, PostParams, WatchParams},
        response::{Status, StatusDetails},
        Context, Error, HasTenant, ObjectList, Resource, ResourceExt, Result,
    },
    rest::{ResourceStorage, StatusRest},
    store::{UpdatedObject, WatchStream},
};
use either::Either;
use serde::{de::DeserializeOwned, Serialize};
use std::{fmt::Debug, sync::Arc};

/// The generic Api abstraction
///
/// Every call is made in the [`Context`] the handle was created with, so the tenant
/// rules of that caller apply throughout.
pub struct Api<K> {
    storage: Arc<ResourceStorage<K>>,
    ctx: Context,
}

impl<K> Clone for Api<K> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            ctx: self.ctx.clone(),
        }
    }
}

impl<K> Api<K>
where
    K: Resource + HasTenant + Clone + Serialize + DeserializeOwned + Debug + Send + Sync + 'static,
{
    /// Act as `ctx` on `storage`
    pub fn new(storage: Arc<ResourceStorage<K>>, ctx: Context) -> Self {
        Self { storage, ctx }
    }

    /// The same resource, acting as another caller
    #[must_use]
    pub fn with_context(&self, ctx: Context) -> Self {
        Self {
            storage: self.storage.clone(),
            ctx,
        }
    }

    /// The context calls are made in
    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Get a named resource
    ///
    /// # Errors
    ///
    /// This function assumes that the object is expected to always exist, and returns [`Error`] if it does not.
    /// Consider using [`Api::get_opt`] if you need to handle missing objects.
    pub async fn get(&self, name: &str) -> Result<K> {
        self.get_with(name, &GetParams::default()).await
    }

    /// [Get](`Api::get`) a named resource with an explicit resourceVersion
    pub async fn get_with(&self, name: &str, gp: &GetParams) -> Result<K> {
        self.storage.rest.get(&self.ctx, name, gp).await
    }

    /// [Get](`Api::get`) a named resource if it exists, returns [`None`] if it doesn't exist
    ///
    /// Objects of other tenants count as not existing.
    pub async fn get_opt(&self, name: &str) -> Result<Option<K>> {
        match self.get(name).await {
            Ok(obj) => Ok(Some(obj)),
            Err(Error::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Get a list of resources
    ///
    /// You use this to get everything, or a subset matching fields/labels, say:
    ///
    /// ```no_run
    /// # use tenancy_registry::{Api, core::params::ListParams};
    /// # use tenancy_registry::core::{HasTenant, Resource, ResourceExt};
    /// # async fn wrapper<K>(api: Api<K>) -> Result<(), Box<dyn std::error::Error>>
    /// # where K: Resource + HasTenant + Clone + serde::Serialize + serde::de::DeserializeOwned
    /// #     + std::fmt::Debug + Send + Sync + 'static {
    /// let lp = ListParams::default().fields("status.phase=Running");
    /// for obj in api.list(&lp).await? {
    ///     println!("Found {}", obj.name_any());
    /// }
    /// # Ok(())
    /// # }
    /// ```
    pub async fn list(&self, lp: &ListParams) -> Result<ObjectList<K>> {
        self.storage.rest.list(&self.ctx, lp).await
    }

    /// Create a resource
    pub async fn create(&self, pp: &PostParams, data: &K) -> Result<K> {
        self.storage.rest.create(&self.ctx, data.clone(), pp).await
    }

    /// Replace a resource entirely with a new one
    ///
    /// Set `metadata.resourceVersion` to the version you read to guard against lost updates.
    pub async fn replace(&self, name: &str, pp: &PostParams, data: &K) -> Result<K> {
        let (obj, _) = self
            .storage
            .rest
            .update(&self.ctx, name, UpdatedObject::Replace(data.clone()), pp)
            .await?;
        Ok(obj)
    }

    /// Patch a subset of a resource's properties
    pub async fn patch<P: Serialize + Debug>(
        &self,
        name: &str,
        pp: &PatchParams,
        patch: &Patch<P>,
    ) -> Result<K> {
        self.storage.rest.patch(&self.ctx, name, pp, patch).await
    }

    /// Delete a named resource
    ///
    /// When you get a `K` via `Left`, your delete has started.
    /// When you get a `Status` via `Right`, the object is already gone.
    pub async fn delete(&self, name: &str, dp: &DeleteParams) -> Result<Either<K, Status>> {
        let (obj, immediate) = self.storage.rest.delete(&self.ctx, name, dp).await?;
        Ok(if immediate {
            Either::Right(Status::success().with_details(StatusDetails {
                name: obj.name_any(),
                group: K::GROUP.into(),
                kind: K::PLURAL.into(),
                uid: obj.uid().unwrap_or_default(),
                ..StatusDetails::default()
            }))
        } else {
            Either::Left(obj)
        })
    }

    /// Delete a collection of resources
    ///
    /// The deleted objects are returned via `Left`.
    pub async fn delete_collection(
        &self,
        dp: &DeleteParams,
        lp: &ListParams,
    ) -> Result<Either<ObjectList<K>, Status>> {
        let deleted = self.storage.rest.delete_collection(&self.ctx, dp, lp).await?;
        Ok(Either::Left(deleted))
    }

    /// Watch a list of resources
    ///
    /// Pass `"0"` or `""` to start from now, or the resourceVersion of a previous list
    /// or event to resume from there.
    pub async fn watch(&self, wp: &WatchParams, version: &str) -> Result<WatchStream<K>> {
        self.storage.rest.watch(&self.ctx, wp, version).await
    }

    fn status(&self) -> Result<&StatusRest<K>> {
        self.storage.status.as_ref().ok_or_else(|| {
            Error::BadRequest(format!("{} has no status subresource", self.storage.rest.resource()))
        })
    }

    /// Get the named resource through its status subresource
    pub async fn get_status(&self, name: &str) -> Result<K> {
        self.status()?.get(&self.ctx, name, &GetParams::default()).await
    }

    /// Replace the status of a resource; changes outside of the status are discarded
    pub async fn replace_status(&self, name: &str, pp: &PostParams, data: &K) -> Result<K> {
        let (obj, _) = self
            .status()?
            .update(&self.ctx, name, UpdatedObject::Replace(data.clone()), pp)
            .await?;
        Ok(obj)
    }

    /// Patch the status of a resource
    pub async fn patch_status<P: Serialize + Debug>(
        &self,
        name: &str,
        pp: &PatchParams,
        patch: &Patch<P>,
    ) -> Result<K> {
        self.status()?.patch(&self.ctx, name, pp, patch).await
    }
}
