//! Tenant-scoped REST adapters over a [`Storage`]
//!
//! Every verb is delegated to the store. The adapters only add tenant visibility:
//! single-object verbs fetch and check the object first, collection verbs get a
//! structured `spec.tenantID` requirement ANDed with whatever the caller selects.
//! Store errors are returned unchanged.
use crate::{
    core::{
        params::{DeleteParams, GetParams, ListParams, Patch, PatchParams, PostParams, WatchParams},
        Context, GroupResource, HasSpec, HasStatus, HasTenant, ObjectList, Resource, Result,
    },
    store::{BootstrapError, MemoryStore, Storage, StoreBuilder, UpdatedObject, WatchStream},
    strategy::Strategy,
    tenant::TenantFilter,
};
use serde::{de::DeserializeOwned, Serialize};
use std::{fmt::Debug, sync::Arc};
use tracing::instrument;

/// Fetch `name` from `store`, failing with NotFound unless `ctx` may see it
///
/// Shared by the main resource and the status subresource so both make the same decision.
pub async fn authorize_and_fetch<K>(
    store: &dyn Storage<K>,
    filter: &TenantFilter,
    ctx: &Context,
    name: &str,
    gp: &GetParams,
) -> Result<K>
where
    K: Resource + HasTenant + Send + Sync + 'static,
{
    let obj = store.get(ctx, name, gp).await?;
    filter.check(ctx, &obj)?;
    Ok(obj)
}

/// The main resource of a tenant-scoped kind
pub struct TenantRest<K> {
    store: Arc<dyn Storage<K>>,
    filter: TenantFilter,
}

impl<K> Clone for TenantRest<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            filter: self.filter.clone(),
        }
    }
}

impl<K> TenantRest<K>
where
    K: Resource + HasTenant + Clone + Send + Sync + 'static,
{
    /// Serve `store`, exempting `privileged_username` from tenant scoping
    pub fn new(store: Arc<dyn Storage<K>>, privileged_username: &str) -> Self {
        Self {
            store,
            filter: TenantFilter::new(privileged_username),
        }
    }

    /// The resource served
    pub fn resource(&self) -> &GroupResource {
        self.store.resource()
    }

    /// Abbreviations for interactive lookup of the kind
    pub fn short_names(&self) -> &'static [&'static str] {
        K::short_names()
    }

    /// An empty instance of the kind
    pub fn new_object(&self) -> K {
        self.store.new_object()
    }

    /// The visibility rules applied to every verb
    pub fn filter(&self) -> &TenantFilter {
        &self.filter
    }

    /// Create an object owned by the caller's tenant
    ///
    /// A tenant-scoped caller always creates within its own tenant, whatever the payload says.
    #[instrument(skip_all, fields(resource = %self.resource(), user = ctx.username()))]
    pub async fn create(&self, ctx: &Context, mut obj: K, pp: &PostParams) -> Result<K> {
        if let Some(tenant) = self.filter.scope(ctx) {
            obj.set_tenant_id(tenant);
        }
        self.store.create(ctx, obj, pp).await
    }

    /// Get an object visible to the caller
    #[instrument(skip_all, fields(resource = %self.resource(), name = %name, user = ctx.username()))]
    pub async fn get(&self, ctx: &Context, name: &str, gp: &GetParams) -> Result<K> {
        authorize_and_fetch(self.store.as_ref(), &self.filter, ctx, name, gp).await
    }

    /// List the objects visible to the caller
    #[instrument(skip_all, fields(resource = %self.resource(), user = ctx.username()))]
    pub async fn list(&self, ctx: &Context, lp: &ListParams) -> Result<ObjectList<K>> {
        let lp = self.filter.restrict(ctx, lp);
        tracing::trace!(fields = ?lp.field_selector, required = %lp.required_fields, "listing");
        self.store.list(ctx, &lp).await
    }

    /// Watch the objects visible to the caller
    #[instrument(skip_all, fields(resource = %self.resource(), version = %version, user = ctx.username()))]
    pub async fn watch(&self, ctx: &Context, wp: &WatchParams, version: &str) -> Result<WatchStream<K>> {
        let wp = self.filter.restrict(ctx, wp);
        self.store.watch(ctx, &wp, version).await
    }

    /// Update an object visible to the caller
    ///
    /// Updates never create: a missing or foreign object is NotFound.
    /// Returns the stored object and whether it was created.
    #[instrument(skip_all, fields(resource = %self.resource(), name = %name, user = ctx.username()))]
    pub async fn update(
        &self,
        ctx: &Context,
        name: &str,
        obj: UpdatedObject<K>,
        pp: &PostParams,
    ) -> Result<(K, bool)> {
        authorize_and_fetch(self.store.as_ref(), &self.filter, ctx, name, &GetParams::default()).await?;
        self.store.update(ctx, name, obj, false, pp).await
    }

    /// Apply a patch to an object visible to the caller
    pub async fn patch<P: Serialize + Debug>(
        &self,
        ctx: &Context,
        name: &str,
        pp: &PatchParams,
        patch: &Patch<P>,
    ) -> Result<K>
    where
        K: Serialize + DeserializeOwned,
    {
        let update = UpdatedObject::from_patch(patch)?;
        let (obj, _) = self.update(ctx, name, update, &pp.as_post_params()).await?;
        Ok(obj)
    }

    /// Delete an object visible to the caller
    ///
    /// Returns the final state of the object and whether it is already gone.
    #[instrument(skip_all, fields(resource = %self.resource(), name = %name, user = ctx.username()))]
    pub async fn delete(&self, ctx: &Context, name: &str, dp: &DeleteParams) -> Result<(K, bool)> {
        authorize_and_fetch(self.store.as_ref(), &self.filter, ctx, name, &GetParams::default()).await?;
        self.store.delete(ctx, name, dp).await
    }

    /// Delete every object visible to the caller that matches `lp`
    #[instrument(skip_all, fields(resource = %self.resource(), user = ctx.username()))]
    pub async fn delete_collection(
        &self,
        ctx: &Context,
        dp: &DeleteParams,
        lp: &ListParams,
    ) -> Result<ObjectList<K>> {
        let lp = self.filter.restrict(ctx, lp);
        self.store.delete_collection(ctx, dp, &lp).await
    }
}

/// The status subresource of a tenant-scoped kind
///
/// Its store shares objects with the main resource but applies the status update strategy,
/// so only status changes persist through it.
pub struct StatusRest<K> {
    store: Arc<dyn Storage<K>>,
    filter: TenantFilter,
}

impl<K> Clone for StatusRest<K> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            filter: self.filter.clone(),
        }
    }
}

impl<K> StatusRest<K>
where
    K: Resource + HasTenant + Clone + Send + Sync + 'static,
{
    /// Serve `store`, exempting `privileged_username` from tenant scoping
    pub fn new(store: Arc<dyn Storage<K>>, privileged_username: &str) -> Self {
        Self {
            store,
            filter: TenantFilter::new(privileged_username),
        }
    }

    /// An empty instance of the kind
    pub fn new_object(&self) -> K {
        self.store.new_object()
    }

    /// Get an object visible to the caller
    #[instrument(skip_all, fields(resource = %self.store.resource(), name = %name, user = ctx.username()))]
    pub async fn get(&self, ctx: &Context, name: &str, gp: &GetParams) -> Result<K> {
        authorize_and_fetch(self.store.as_ref(), &self.filter, ctx, name, gp).await
    }

    /// Update the status of an object visible to the caller
    #[instrument(skip_all, fields(resource = %self.store.resource(), name = %name, user = ctx.username()))]
    pub async fn update(
        &self,
        ctx: &Context,
        name: &str,
        obj: UpdatedObject<K>,
        pp: &PostParams,
    ) -> Result<(K, bool)> {
        authorize_and_fetch(self.store.as_ref(), &self.filter, ctx, name, &GetParams::default()).await?;
        self.store.update(ctx, name, obj, false, pp).await
    }

    /// Apply a patch to the status of an object visible to the caller
    pub async fn patch<P: Serialize + Debug>(
        &self,
        ctx: &Context,
        name: &str,
        pp: &PatchParams,
        patch: &Patch<P>,
    ) -> Result<K>
    where
        K: Serialize + DeserializeOwned,
    {
        let update = UpdatedObject::from_patch(patch)?;
        let (obj, _) = self.update(ctx, name, update, &pp.as_post_params()).await?;
        Ok(obj)
    }
}

/// Everything served for one kind: the main resource and, if it has one, its status
pub struct ResourceStorage<K> {
    /// The main resource
    pub rest: TenantRest<K>,
    /// The status subresource
    pub status: Option<StatusRest<K>>,
}

impl<K> ResourceStorage<K>
where
    K: Resource + HasTenant + Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Serve a kind without a status subresource
    pub fn new(builder: StoreBuilder<K>, privileged_username: &str) -> Result<Self, BootstrapError> {
        let store = builder.build()?;
        tracing::info!(resource = %store.resource(), "serving resource");
        Ok(Self {
            rest: TenantRest::new(Arc::new(store), privileged_username),
            status: None,
        })
    }
}

impl<K> ResourceStorage<K>
where
    K: Resource
        + HasTenant
        + HasSpec
        + HasStatus
        + Clone
        + Default
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
    K::Spec: Clone,
{
    /// Serve a kind with a status subresource
    ///
    /// `strategy` governs the main resource. The status subresource shares its objects,
    /// with updates going through [`Strategy::for_status`] plus `validate_status`.
    pub fn with_status(
        builder: StoreBuilder<K>,
        strategy: Strategy<K>,
        validate_status: impl Fn(&Context, &K, &K) -> Vec<crate::core::response::StatusCause>
            + Send
            + Sync
            + 'static,
        privileged_username: &str,
    ) -> Result<Self, BootstrapError> {
        let status_strategy = strategy.for_status(validate_status);
        let store: MemoryStore<K> = builder.strategy(strategy).build()?;
        let status_store = store.with_update_strategy(status_strategy);
        tracing::info!(resource = %store.resource(), "serving resource with status");
        Ok(Self {
            rest: TenantRest::new(Arc::new(store), privileged_username),
            status: Some(StatusRest::new(Arc::new(status_store), privileged_username)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{metadata::ObjectMeta, ResourceExt, UserInfo};
    use futures::StreamExt;
    use serde::Deserialize;

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct Job {
        metadata: ObjectMeta,
        spec: JobSpec,
        status: Option<String>,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    struct JobSpec {
        #[serde(rename = "tenantID")]
        tenant_id: String,
        image: String,
    }

    impl Resource for Job {
        const GROUP: &'static str = "test.io";
        const KIND: &'static str = "Job";
        const NAMESPACED: bool = false;
        const PLURAL: &'static str = "jobs";
        const VERSION: &'static str = "v1";

        fn short_names() -> &'static [&'static str] {
            &["jb"]
        }

        fn meta(&self) -> &ObjectMeta {
            &self.metadata
        }

        fn meta_mut(&mut self) -> &mut ObjectMeta {
            &mut self.metadata
        }
    }

    impl HasSpec for Job {
        type Spec = JobSpec;

        fn spec(&self) -> &JobSpec {
            &self.spec
        }

        fn spec_mut(&mut self) -> &mut JobSpec {
            &mut self.spec
        }
    }

    impl HasStatus for Job {
        type Status = String;

        fn status(&self) -> Option<&String> {
            self.status.as_ref()
        }

        fn status_mut(&mut self) -> &mut Option<String> {
            &mut self.status
        }
    }

    impl HasTenant for Job {
        fn tenant_id(&self) -> &str {
            &self.spec.tenant_id
        }

        fn set_tenant_id(&mut self, tenant: &str) {
            self.spec.tenant_id = tenant.into();
        }
    }

    fn attrs(job: &Job) -> crate::strategy::Attrs {
        let mut attrs = crate::strategy::default_attrs(job);
        attrs.fields.insert("spec.tenantID".into(), job.spec.tenant_id.clone());
        attrs
    }

    fn storage() -> ResourceStorage<Job> {
        let strategy = Strategy::new(attrs).on_update_preserving_status(|_, _, _| {});
        ResourceStorage::with_status(StoreBuilder::new(), strategy, |_, _, _| vec![], "admin").unwrap()
    }

    fn tenant(t: &str) -> Context {
        Context::for_user(UserInfo::new("someone", t))
    }

    fn job(name: &str, image: &str) -> Job {
        Job {
            metadata: ObjectMeta {
                name: Some(name.into()),
                ..ObjectMeta::default()
            },
            spec: JobSpec {
                tenant_id: String::new(),
                image: image.into(),
            },
            status: None,
        }
    }

    #[tokio::test]
    async fn create_stamps_caller_tenant() {
        let storage = storage();
        let mut payload = job("a", "x");
        payload.spec.tenant_id = "t2".into();
        let created = storage.rest.create(&tenant("t1"), payload, &PostParams::default()).await.unwrap();
        assert_eq!(created.spec.tenant_id, "t1");
        assert_eq!(storage.rest.short_names(), ["jb"]);
        assert_eq!(storage.rest.new_object(), Job::default());
    }

    #[tokio::test]
    async fn foreign_objects_are_invisible_to_every_verb() {
        let storage = storage();
        let (t1, t2) = (tenant("t1"), tenant("t2"));
        let a = storage.rest.create(&t1, job("a", "x"), &PostParams::default()).await.unwrap();

        let gp = GetParams::default();
        assert!(storage.rest.get(&t2, "a", &gp).await.unwrap_err().is_not_found());
        let mut replaced = a.clone();
        replaced.spec.image = "y".into();
        let err = storage
            .rest
            .update(&t2, "a", UpdatedObject::Replace(replaced), &PostParams::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        let err = storage.rest.delete(&t2, "a", &DeleteParams::default()).await.unwrap_err();
        assert!(err.is_not_found());
        let status = storage.status.as_ref().unwrap();
        assert!(status.get(&t2, "a", &gp).await.unwrap_err().is_not_found());

        assert!(storage.rest.list(&t2, &ListParams::default()).await.unwrap().is_empty());
        let deleted = storage
            .rest
            .delete_collection(&t2, &DeleteParams::default(), &ListParams::default())
            .await
            .unwrap();
        assert!(deleted.is_empty());
        assert_eq!(storage.rest.get(&t1, "a", &gp).await.unwrap(), a);
    }

    #[tokio::test]
    async fn hostile_field_selectors_stay_within_the_tenant() {
        let storage = storage();
        let (t1, t2) = (tenant("t1"), tenant("t2"));
        let a = storage.rest.create(&t1, job("a", "x"), &PostParams::default()).await.unwrap();
        let hostile = ListParams::default().fields("metadata.name!=(");

        assert!(storage.rest.list(&t2, &hostile).await.unwrap().is_empty());
        let deleted = storage
            .rest
            .delete_collection(&t2, &DeleteParams::default(), &hostile)
            .await
            .unwrap();
        assert!(deleted.is_empty());
        for padded in ["t1,metadata.name!=zz", " t1"] {
            assert!(storage.rest.list(&tenant(padded), &hostile).await.unwrap().is_empty());
        }
        assert_eq!(storage.rest.get(&t1, "a", &GetParams::default()).await.unwrap(), a);
        assert_eq!(storage.rest.list(&t1, &hostile).await.unwrap().len(), 1);

        let wp = WatchParams::default().fields("metadata.name!=(");
        let mut events = storage.rest.watch(&t2, &wp, "0").await.unwrap();
        storage.rest.create(&t1, job("b", "x"), &PostParams::default()).await.unwrap();
        storage.rest.create(&t2, job("c", "x"), &PostParams::default()).await.unwrap();
        let event = tokio::time::timeout(std::time::Duration::from_secs(1), events.next())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.into_object().map(|o| o.name_any()).as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn privileged_and_platform_callers_see_all() {
        let storage = storage();
        storage.rest.create(&tenant("t1"), job("a", "x"), &PostParams::default()).await.unwrap();
        storage.rest.create(&tenant("t2"), job("b", "x"), &PostParams::default()).await.unwrap();

        let admin = Context::for_user(UserInfo::new("admin", "t9"));
        assert_eq!(storage.rest.list(&admin, &ListParams::default()).await.unwrap().len(), 2);
        let platform = Context::for_user(UserInfo::platform("ops"));
        assert_eq!(storage.rest.list(&platform, &ListParams::default()).await.unwrap().len(), 2);
        assert_eq!(storage.rest.list(&tenant("t1"), &ListParams::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn updates_never_create() {
        let storage = storage();
        let err = storage
            .rest
            .update(&Context::new(), "ghost", UpdatedObject::Replace(job("ghost", "x")), &PostParams::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn status_updates_keep_spec_and_main_updates_keep_status() {
        let storage = storage();
        let ctx = tenant("t1");
        let a = storage.rest.create(&ctx, job("a", "x"), &PostParams::default()).await.unwrap();
        let status = storage.status.as_ref().unwrap();

        let mut change = a.clone();
        change.spec.image = "ignored".into();
        change.status = Some("Running".into());
        let (updated, _) = status
            .update(&ctx, "a", UpdatedObject::Replace(change), &PostParams::default())
            .await
            .unwrap();
        assert_eq!(updated.spec.image, "x");
        assert_eq!(updated.status.as_deref(), Some("Running"));

        let mut change = updated.clone();
        change.spec.image = "y".into();
        change.status = Some("Failed".into());
        let (updated, _) = storage
            .rest
            .update(&ctx, "a", UpdatedObject::Replace(change), &PostParams::default())
            .await
            .unwrap();
        assert_eq!(updated.spec.image, "y");
        assert_eq!(updated.status.as_deref(), Some("Running"));
    }

    #[tokio::test]
    async fn patches_go_through_the_tenant_check() {
        let storage = storage();
        storage.rest.create(&tenant("t1"), job("a", "x"), &PostParams::default()).await.unwrap();
        let patch = Patch::Merge(serde_json::json!({"spec": {"image": "z"}}));
        let err = storage
            .rest
            .patch(&tenant("t2"), "a", &PatchParams::default(), &patch)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        let patched = storage
            .rest
            .patch(&tenant("t1"), "a", &PatchParams::default(), &patch)
            .await
            .unwrap();
        assert_eq!(patched.spec.image, "z");

        let status_patch = Patch::Merge(serde_json::json!({"status": "Checking"}));
        let status = storage.status.as_ref().unwrap();
        let patched = status
            .patch(&tenant("t1"), "a", &PatchParams::default(), &status_patch)
            .await
            .unwrap();
        assert_eq!(patched.status.as_deref(), Some("Checking"));
    }
}
