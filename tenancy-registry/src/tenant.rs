//! Tenant visibility rules shared by the main resource and its status subresource
use crate::core::{
    fields::FieldSelector, params::Selectors, Context, Error, HasTenant, Resource, ResourceExt, Result,
};

/// The indexable field every tenant-scoped kind exposes
pub const TENANT_FIELD: &str = "spec.tenantID";

/// Decides which objects a request context may see
///
/// A context carrying a tenant only sees objects whose `spec.tenantID` equals that tenant.
/// Contexts without a tenant, and the privileged user, see everything.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TenantFilter {
    privileged_username: Option<String>,
}

impl TenantFilter {
    /// A filter that exempts `privileged_username` from scoping
    ///
    /// An empty name exempts nobody.
    pub fn new(privileged_username: &str) -> Self {
        Self {
            privileged_username: Some(privileged_username)
                .filter(|u| !u.is_empty())
                .map(String::from),
        }
    }

    /// The username exempt from scoping, if any
    pub fn privileged_username(&self) -> Option<&str> {
        self.privileged_username.as_deref()
    }

    /// The tenant `ctx` is confined to, or `None` for a cluster-wide caller
    pub fn scope<'a>(&self, ctx: &'a Context) -> Option<&'a str> {
        if ctx.user().is_some() && self.privileged_username() == Some(ctx.username()) {
            return None;
        }
        ctx.tenant_id()
    }

    /// Fail with NotFound unless `obj` is visible to `ctx`
    ///
    /// A foreign object is reported exactly like a missing one.
    pub fn check<K: Resource + HasTenant>(&self, ctx: &Context, obj: &K) -> Result<()> {
        match self.scope(ctx) {
            Some(tenant) if obj.tenant_id() != tenant => {
                tracing::warn!(tenant, owner = obj.tenant_id(), "denied access to object of another tenant");
                Err(Error::not_found(&K::group_resource(), &obj.name_any()))
            }
            _ => Ok(()),
        }
    }

    /// `params` with a `spec.tenantID=<tenant>` requirement ANDed into its required fields
    ///
    /// Returned unchanged for cluster-wide callers. The requirement stays structured and is
    /// never rendered into the caller's selector text, so a request that names another tenant
    /// matches nothing and no selector or tenant ID can widen it.
    pub fn restrict<P: Selectors + Clone>(&self, ctx: &Context, params: &P) -> P {
        let mut params = params.clone();
        if let Some(tenant) = self.scope(ctx) {
            let required = params.required_fields_mut();
            *required = std::mem::take(required).and(FieldSelector::one_term_equal(TENANT_FIELD, tenant));
        }
        params
    }
}
