//! The spec, status and strategy shared by cluster addons
use serde::{Deserialize, Serialize};
use std::fmt;
use tenancy_registry::{
    core::{fields::Fields, response::StatusCause, Context, HasSpec, HasStatus, HasTenant, Resource},
    strategy::default_attrs,
    Attrs, Strategy,
};

/// Version installed when a new addon does not ask for one
pub const DEFAULT_VERSION: &str = "v1.0.0";

/// Desired state of an addon installed into one cluster
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonSpec {
    /// The owning tenant
    #[serde(rename = "tenantID", default)]
    pub tenant_id: String,
    /// The cluster the addon runs in; fixed once created
    #[serde(default)]
    pub cluster_name: String,
    /// The addon version to run
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
}

/// Observed state of an addon
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddonStatus {
    /// The version currently running
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub version: String,
    /// Where the addon is in its lifecycle
    #[serde(default)]
    pub phase: AddonPhase,
    /// Why the addon is in its phase; required for [`AddonPhase::Failed`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// How many times the current operation has been retried
    #[serde(default)]
    pub retry_count: i32,
}

/// Lifecycle phase of an addon
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AddonPhase {
    /// Being installed
    #[default]
    Initializing,
    /// Being installed again after a failure
    Reinitializing,
    /// Installed and being health checked
    Checking,
    /// Installed and healthy
    Running,
    /// Moving to a new version
    Upgrading,
    /// Gave up; see the reason
    Failed,
    /// Waiting for its cluster
    Pending,
    /// Installed but failing health checks
    Unhealthy,
    /// Not reported
    Unknown,
}

impl AddonPhase {
    /// The phase as written in `status.phase`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::Reinitializing => "Reinitializing",
            Self::Checking => "Checking",
            Self::Running => "Running",
            Self::Upgrading => "Upgrading",
            Self::Failed => "Failed",
            Self::Pending => "Pending",
            Self::Unhealthy => "Unhealthy",
            Self::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for AddonPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A kind whose spec and status are the shared addon ones
pub trait Addon:
    Resource + HasTenant + HasSpec<Spec = AddonSpec> + HasStatus<Status = AddonStatus> + 'static
{
}

impl<K> Addon for K where
    K: Resource + HasTenant + HasSpec<Spec = AddonSpec> + HasStatus<Status = AddonStatus> + 'static
{
}

/// Labels plus the name, tenant, cluster, versions and phase of an addon
pub fn attrs<K: Addon>(obj: &K) -> Attrs {
    let Attrs { labels, mut fields } = default_attrs(obj);
    let spec = obj.spec();
    let status = obj.status().cloned().unwrap_or_default();
    fields.extend(Fields::from([
        ("spec.tenantID".to_string(), spec.tenant_id.clone()),
        ("spec.clusterName".to_string(), spec.cluster_name.clone()),
        ("spec.version".to_string(), spec.version.clone()),
        ("status.phase".to_string(), status.phase.to_string()),
        ("status.version".to_string(), status.version),
    ]));
    Attrs { labels, fields }
}

/// The main strategy of an addon kind
///
/// New addons start `Initializing` at their requested version, or [`DEFAULT_VERSION`].
/// Updates keep the stored tenant and status, and may not move an addon to another cluster.
/// A spec change bumps `metadata.generation`.
pub fn strategy<K: Addon>() -> Strategy<K> {
    Strategy::new(attrs::<K>)
        .on_create(|_: &Context, obj: &mut K| {
            if obj.meta().name.is_none() && obj.meta().generate_name.is_none() {
                obj.meta_mut().generate_name = Some(format!("{}-", K::PLURAL.trim_end_matches('s')));
            }
            let spec = obj.spec_mut();
            if spec.version.is_empty() {
                spec.version = DEFAULT_VERSION.into();
            }
            let version = spec.version.clone();
            *obj.status_mut() = Some(AddonStatus {
                version,
                ..AddonStatus::default()
            });
        })
        .validate_with(|_: &Context, obj: &K| validate_spec(obj.spec()))
        .on_update_preserving_status(|_: &Context, obj: &mut K, old: &K| {
            let tenant = old.tenant_id().to_string();
            obj.set_tenant_id(&tenant);
            if obj.spec() != old.spec() {
                obj.meta_mut().generation = Some(old.meta().generation.unwrap_or_default() + 1);
            }
        })
        .validate_update_with(|_: &Context, obj: &K, old: &K| {
            let mut causes = validate_spec(obj.spec());
            if obj.spec().cluster_name != old.spec().cluster_name {
                causes.push(StatusCause::forbidden(
                    "spec.clusterName",
                    "field is immutable",
                ));
            }
            causes
        })
}

/// Status checks of an addon, on top of the main update validation
pub fn validate_status<K: Addon>(_: &Context, obj: &K, _: &K) -> Vec<StatusCause> {
    let mut causes = vec![];
    let Some(status) = obj.status() else {
        return causes;
    };
    if status.retry_count < 0 {
        causes.push(StatusCause::invalid(
            "status.retryCount",
            "must be greater than or equal to 0",
        ));
    }
    if status.phase == AddonPhase::Failed && status.reason.as_deref().unwrap_or_default().is_empty() {
        causes.push(StatusCause::required("status.reason"));
    }
    causes
}

fn validate_spec(spec: &AddonSpec) -> Vec<StatusCause> {
    let mut causes = vec![];
    if spec.cluster_name.is_empty() {
        causes.push(StatusCause::required("spec.clusterName"));
    }
    causes
}

/// Implements the accessor traits of a platform kind with `metadata`, `spec` and `status` fields
macro_rules! platform_kind {
    ($kind:ident, group = $group:literal, plural = $plural:literal, short = [$($short:literal),*], spec = $spec:ty $(, status = $status:ty)?) => {
        impl tenancy_registry::core::Resource for $kind {
            const GROUP: &'static str = $group;
            const KIND: &'static str = stringify!($kind);
            const NAMESPACED: bool = false;
            const PLURAL: &'static str = $plural;
            const VERSION: &'static str = "v1";

            fn short_names() -> &'static [&'static str] {
                &[$($short),*]
            }

            fn meta(&self) -> &tenancy_registry::core::metadata::ObjectMeta {
                &self.metadata
            }

            fn meta_mut(&mut self) -> &mut tenancy_registry::core::metadata::ObjectMeta {
                &mut self.metadata
            }
        }

        impl tenancy_registry::core::HasSpec for $kind {
            type Spec = $spec;

            fn spec(&self) -> &$spec {
                &self.spec
            }

            fn spec_mut(&mut self) -> &mut $spec {
                &mut self.spec
            }
        }

        impl tenancy_registry::core::HasTenant for $kind {
            fn tenant_id(&self) -> &str {
                &self.spec.tenant_id
            }

            fn set_tenant_id(&mut self, tenant: &str) {
                self.spec.tenant_id = tenant.to_string();
            }
        }

        $(
            impl tenancy_registry::core::HasStatus for $kind {
                type Status = $status;

                fn status(&self) -> Option<&$status> {
                    self.status.as_ref()
                }

                fn status_mut(&mut self) -> &mut Option<$status> {
                    &mut self.status
                }
            }
        )?
    };
}
pub(crate) use platform_kind;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CronHPA;
    use tenancy_registry::core::UserInfo;

    fn cronhpa(cluster: &str) -> CronHPA {
        CronHPA {
            spec: AddonSpec {
                cluster_name: cluster.into(),
                ..AddonSpec::default()
            },
            ..CronHPA::default()
        }
    }

    #[test]
    fn create_defaults_version_status_and_name() {
        let ctx = Context::for_user(UserInfo::new("alice", "t1"));
        let strategy = strategy::<CronHPA>();
        let mut obj = cronhpa("cls-1");
        strategy.prepare_for_create(&ctx, &mut obj);
        assert_eq!(obj.spec.version, DEFAULT_VERSION);
        assert_eq!(obj.meta().generate_name.as_deref(), Some("cronhpa-"));
        let status = obj.status.unwrap();
        assert_eq!(status.phase, AddonPhase::Initializing);
        assert_eq!(status.version, DEFAULT_VERSION);
    }

    #[test]
    fn cluster_name_is_required_and_immutable() {
        let ctx = Context::new();
        let strategy = strategy::<CronHPA>();
        let causes = strategy.validate(&ctx, &cronhpa(""));
        assert_eq!(causes, vec![StatusCause::required("spec.clusterName")]);

        let causes = strategy.validate_update(&ctx, &cronhpa("cls-2"), &cronhpa("cls-1"));
        assert_eq!(causes.len(), 1);
        assert_eq!(causes[0].field, "spec.clusterName");
    }

    #[test]
    fn update_keeps_tenant_and_status() {
        let ctx = Context::new();
        let strategy = strategy::<CronHPA>();
        let mut old = cronhpa("cls-1");
        old.spec.tenant_id = "t1".into();
        old.status = Some(AddonStatus {
            phase: AddonPhase::Running,
            ..AddonStatus::default()
        });
        let mut new = cronhpa("cls-1");
        new.spec.tenant_id = "t2".into();
        strategy.prepare_for_update(&ctx, &mut new, &old);
        assert_eq!(new.spec.tenant_id, "t1");
        assert_eq!(new.status, old.status);
    }

    #[test]
    fn failed_status_needs_a_reason() {
        let ctx = Context::new();
        let mut obj = cronhpa("cls-1");
        obj.status = Some(AddonStatus {
            phase: AddonPhase::Failed,
            retry_count: -1,
            ..AddonStatus::default()
        });
        let causes = validate_status(&ctx, &obj, &obj);
        let fields: Vec<_> = causes.iter().map(|c| c.field.as_str()).collect();
        assert_eq!(fields, ["status.retryCount", "status.reason"]);
    }

    #[test]
    fn attrs_expose_addon_fields() {
        let mut obj = cronhpa("cls-1");
        obj.metadata.name = Some("a".into());
        obj.spec.tenant_id = "t1".into();
        let attrs = attrs(&obj);
        assert_eq!(attrs.fields["metadata.name"], "a");
        assert_eq!(attrs.fields["spec.tenantID"], "t1");
        assert_eq!(attrs.fields["spec.clusterName"], "cls-1");
        assert_eq!(attrs.fields["status.phase"], "Initializing");
    }
}
