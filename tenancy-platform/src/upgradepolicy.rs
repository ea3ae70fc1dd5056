//! Batching rules for rolling application upgrades
use crate::addon::platform_kind;
use serde::{Deserialize, Serialize};
use tenancy_registry::{
    core::{fields::Fields, metadata::ObjectMeta, response::StatusCause, Context, HasTenant},
    strategy::default_attrs,
    Attrs, Strategy,
};

/// How an application upgrade is rolled out in batches
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct UpgradePolicy {
    /// Standard object metadata
    #[serde(default)]
    pub metadata: ObjectMeta,
    /// The batching rules
    #[serde(default)]
    pub spec: UpgradePolicySpec,
}

/// Batching rules of an [`UpgradePolicy`]
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpgradePolicySpec {
    /// The owning tenant
    #[serde(rename = "tenantID", default)]
    pub tenant_id: String,
    /// Number of batches to upgrade in, at least 1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_num: Option<i32>,
    /// Pause between batches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_interval_seconds: Option<i32>,
    /// Failed instances tolerated before the upgrade stops
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_failed: Option<i32>,
    /// Extra instances allowed above the desired count during a batch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_surge: Option<i32>,
}

platform_kind!(
    UpgradePolicy,
    group = "application.tkestack.io",
    plural = "upgradepolicies",
    short = ["upgp"],
    spec = UpgradePolicySpec
);

fn attrs(obj: &UpgradePolicy) -> Attrs {
    let Attrs { labels, mut fields } = default_attrs(obj);
    fields.extend(Fields::from([(
        "spec.tenantID".to_string(),
        obj.tenant_id().to_string(),
    )]));
    Attrs { labels, fields }
}

fn validate_spec(spec: &UpgradePolicySpec) -> Vec<StatusCause> {
    let mut causes = vec![];
    if let Some(n) = spec.batch_num.filter(|n| *n < 1) {
        causes.push(StatusCause::invalid(
            "spec.batchNum",
            format!("{n}: must be greater than or equal to 1"),
        ));
    }
    let non_negative = [
        ("spec.batchIntervalSeconds", spec.batch_interval_seconds),
        ("spec.maxFailed", spec.max_failed),
        ("spec.maxSurge", spec.max_surge),
    ];
    for (field, value) in non_negative {
        if let Some(v) = value.filter(|v| *v < 0) {
            causes.push(StatusCause::invalid(
                field,
                format!("{v}: must be greater than or equal to 0"),
            ));
        }
    }
    causes
}

/// The strategy of [`UpgradePolicy`]
///
/// Updates keep the stored tenant.
pub fn strategy() -> Strategy<UpgradePolicy> {
    Strategy::new(attrs)
        .validate_with(|_: &Context, obj: &UpgradePolicy| validate_spec(&obj.spec))
        .on_update(|_: &Context, obj: &mut UpgradePolicy, old: &UpgradePolicy| {
            obj.spec.tenant_id.clone_from(&old.spec.tenant_id);
        })
        .validate_update_with(|_: &Context, obj: &UpgradePolicy, _: &UpgradePolicy| {
            validate_spec(&obj.spec)
        })
}
