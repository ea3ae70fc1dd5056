//! Per-kind behaviour hooks consulted by a store on every mutation
//!
//! A [`Strategy`] is a plain value: the hooks are shared closures so a kind can
//! derive variants of its strategy (such as the one used by the status subresource)
//! without defining new types.
use crate::core::{
    fields::Fields, response::StatusCause, Context, HasSpec, HasStatus, Resource, ResourceExt,
};
use std::{collections::BTreeMap, fmt, sync::Arc};

/// The attributes a selection predicate is evaluated against
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Attrs {
    /// Labels of the object
    pub labels: BTreeMap<String, String>,
    /// Indexable fields of the object, keyed by their JSON path such as `spec.tenantID`
    pub fields: Fields,
}

type PrepareFn<K> = Arc<dyn Fn(&Context, &mut K) + Send + Sync>;
type PrepareUpdateFn<K> = Arc<dyn Fn(&Context, &mut K, &K) + Send + Sync>;
type ValidateFn<K> = Arc<dyn Fn(&Context, &K) -> Vec<StatusCause> + Send + Sync>;
type ValidateUpdateFn<K> = Arc<dyn Fn(&Context, &K, &K) -> Vec<StatusCause> + Send + Sync>;
type AttrsFn<K> = Arc<dyn Fn(&K) -> Attrs + Send + Sync>;

/// Create, update and selection behaviour of a kind
///
/// Update hooks always receive `(new, old)` with `old` being the currently stored object.
pub struct Strategy<K> {
    prepare_for_create: PrepareFn<K>,
    prepare_for_update: PrepareUpdateFn<K>,
    validate: ValidateFn<K>,
    validate_update: ValidateUpdateFn<K>,
    attrs: AttrsFn<K>,
    allow_create_on_update: bool,
    allow_unconditional_update: bool,
}

// Manual impls: the hooks are shared, so no bounds on `K` are needed
impl<K> Clone for Strategy<K> {
    fn clone(&self) -> Self {
        Self {
            prepare_for_create: self.prepare_for_create.clone(),
            prepare_for_update: self.prepare_for_update.clone(),
            validate: self.validate.clone(),
            validate_update: self.validate_update.clone(),
            attrs: self.attrs.clone(),
            allow_create_on_update: self.allow_create_on_update,
            allow_unconditional_update: self.allow_unconditional_update,
        }
    }
}

impl<K> fmt::Debug for Strategy<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy")
            .field("allow_create_on_update", &self.allow_create_on_update)
            .field("allow_unconditional_update", &self.allow_unconditional_update)
            .finish_non_exhaustive()
    }
}

impl<K: Resource + 'static> Default for Strategy<K> {
    fn default() -> Self {
        Self::new(default_attrs)
    }
}

/// `metadata.name` and `metadata.namespace` plus the object's labels
pub fn default_attrs<K: Resource>(obj: &K) -> Attrs {
    Attrs {
        labels: obj.labels().clone(),
        fields: Fields::from([
            ("metadata.name".to_string(), obj.name_any()),
            ("metadata.namespace".to_string(), obj.namespace().unwrap_or_default()),
        ]),
    }
}

impl<K: 'static> Strategy<K> {
    /// A strategy that accepts everything and exposes `attrs` for selection
    pub fn new(attrs: impl Fn(&K) -> Attrs + Send + Sync + 'static) -> Self {
        Self {
            prepare_for_create: Arc::new(|_: &Context, _: &mut K| {}),
            prepare_for_update: Arc::new(|_: &Context, _: &mut K, _: &K| {}),
            validate: Arc::new(|_: &Context, _: &K| vec![]),
            validate_update: Arc::new(|_: &Context, _: &K, _: &K| vec![]),
            attrs: Arc::new(attrs),
            allow_create_on_update: false,
            allow_unconditional_update: true,
        }
    }

    /// Normalize an object before it is validated for creation
    #[must_use]
    pub fn on_create(mut self, f: impl Fn(&Context, &mut K) + Send + Sync + 'static) -> Self {
        self.prepare_for_create = Arc::new(f);
        self
    }

    /// Normalize an incoming object against the stored one before it is validated for update
    #[must_use]
    pub fn on_update(mut self, f: impl Fn(&Context, &mut K, &K) + Send + Sync + 'static) -> Self {
        self.prepare_for_update = Arc::new(f);
        self
    }

    /// Validation run on creation
    #[must_use]
    pub fn validate_with(
        mut self,
        f: impl Fn(&Context, &K) -> Vec<StatusCause> + Send + Sync + 'static,
    ) -> Self {
        self.validate = Arc::new(f);
        self
    }

    /// Validation run on update, after the update has been prepared
    #[must_use]
    pub fn validate_update_with(
        mut self,
        f: impl Fn(&Context, &K, &K) -> Vec<StatusCause> + Send + Sync + 'static,
    ) -> Self {
        self.validate_update = Arc::new(f);
        self
    }

    /// Whether an update of a missing object may create it
    #[must_use]
    pub fn allow_create_on_update(mut self, allow: bool) -> Self {
        self.allow_create_on_update = allow;
        self
    }

    /// Whether an update that does not name a resource version is accepted
    #[must_use]
    pub fn allow_unconditional_update(mut self, allow: bool) -> Self {
        self.allow_unconditional_update = allow;
        self
    }

    /// Run the create hook on `obj`
    pub fn prepare_for_create(&self, ctx: &Context, obj: &mut K) {
        (self.prepare_for_create)(ctx, obj)
    }

    /// Run the update hook on `obj` against the stored `old`
    pub fn prepare_for_update(&self, ctx: &Context, obj: &mut K, old: &K) {
        (self.prepare_for_update)(ctx, obj, old)
    }

    /// Failures of `obj` for creation, empty when it is valid
    pub fn validate(&self, ctx: &Context, obj: &K) -> Vec<StatusCause> {
        (self.validate)(ctx, obj)
    }

    /// Failures of `obj` replacing `old`, empty when it is valid
    pub fn validate_update(&self, ctx: &Context, obj: &K, old: &K) -> Vec<StatusCause> {
        (self.validate_update)(ctx, obj, old)
    }

    /// The selectable attributes of `obj`
    pub fn attrs(&self, obj: &K) -> Attrs {
        (self.attrs)(obj)
    }

    pub(crate) fn creates_on_update(&self) -> bool {
        self.allow_create_on_update
    }

    pub(crate) fn unconditional_update(&self) -> bool {
        self.allow_unconditional_update
    }
}

impl<K> Strategy<K>
where
    K: Resource + HasSpec + HasStatus + 'static,
    K::Spec: Clone,
{
    /// The strategy of the status subresource of this kind
    ///
    /// Updates through it keep the stored spec, labels and annotations, so only status
    /// changes persist. Its update validation runs the main update validation first and
    /// then `validate_status`. Create behaviour and attributes are shared with `self`.
    pub fn for_status(
        &self,
        validate_status: impl Fn(&Context, &K, &K) -> Vec<StatusCause> + Send + Sync + 'static,
    ) -> Self {
        let main = self.validate_update.clone();
        Self {
            prepare_for_update: Arc::new(|_: &Context, obj: &mut K, old: &K| {
                obj.spec_mut().clone_from(old.spec());
                obj.labels_mut().clone_from(old.labels());
                obj.annotations_mut().clone_from(old.annotations());
            }),
            validate_update: Arc::new(move |ctx: &Context, obj: &K, old: &K| {
                let mut causes = main(ctx, obj, old);
                causes.extend(validate_status(ctx, obj, old));
                causes
            }),
            allow_create_on_update: false,
            ..self.clone()
        }
    }
}

impl<K> Strategy<K>
where
    K: HasStatus + 'static,
    K::Status: Clone,
{
    /// Chain a main-resource update hook that never lets the status change
    ///
    /// `f` runs after the stored status has been restored onto the incoming object.
    #[must_use]
    pub fn on_update_preserving_status(
        self,
        f: impl Fn(&Context, &mut K, &K) + Send + Sync + 'static,
    ) -> Self {
        self.on_update(move |ctx, obj: &mut K, old: &K| {
            obj.status_mut().clone_from(&old.status().cloned());
            f(ctx, obj, old)
        })
    }
}
