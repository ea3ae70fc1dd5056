//! The TApp workload controller, installed per cluster
use crate::addon::{platform_kind, AddonSpec, AddonStatus};
use serde::{Deserialize, Serialize};
use tenancy_registry::core::metadata::ObjectMeta;

/// A TappController addon
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TappController {
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
    TappController,
    group = "platform.tkestack.io",
    plural = "tappcontrollers",
    short = ["tc"],
    spec = AddonSpec,
    status = AddonStatus
);
