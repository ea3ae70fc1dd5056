//! Cron-driven horizontal pod autoscaling, installed per cluster
use crate::addon::{platform_kind, AddonSpec, AddonStatus};
use serde::{Deserialize, Serialize};
use tenancy_registry::core::metadata::ObjectMeta;

/// A CronHPA addon
///
/// ```
/// # use tenancy_platform::{AddonSpec, CronHPA};
/// # use tenancy_registry::core::Resource;
/// assert_eq!(CronHPA::short_names(), ["cronhpa"]);
/// assert_eq!(CronHPA::url_path(None), "/apis/platform.tkestack.io/v1/cronhpas");
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CronHPA {
    /// Standard object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// Desired state
    #[serde(default)]
    pub spec: AddonSpec,
    /// Observed state, written through the status subresource
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AddonStatus>,
}

platform_kind!(
    CronHPA,
    group = "platform.tkestack.io",
    plural = "cronhpas",
    short = ["cronhpa"],
    spec = AddonSpec,
    status = AddonStatus
);
