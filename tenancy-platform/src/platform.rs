//! Bootstrap of the storage of every platform kind
use crate::{addon, config::RegistryConfig, upgradepolicy, CronHPA, TappController, UpgradePolicy};
use std::sync::Arc;
use tenancy_registry::{
    core::{Context, GroupResource, Resource},
    Api, BootstrapError, ResourceStorage,
};

/// The storage of the CronHPA, TappController and UpgradePolicy kinds
///
/// Built once at startup; a failure here means the registry cannot serve and should abort.
#[derive(Clone)]
pub struct Platform {
    cronhpas: Arc<ResourceStorage<CronHPA>>,
    tapp_controllers: Arc<ResourceStorage<TappController>>,
    upgrade_policies: Arc<ResourceStorage<UpgradePolicy>>,
}

impl Platform {
    /// Build the storage of every kind with `config`
    pub fn new(config: &RegistryConfig) -> Result<Self, BootstrapError> {
        let privileged = config.privileged_username.as_str();
        let cronhpas = ResourceStorage::with_status(
            config.store_builder(),
            addon::strategy::<CronHPA>(),
            addon::validate_status::<CronHPA>,
            privileged,
        )?;
        let tapp_controllers = ResourceStorage::with_status(
            config.store_builder(),
            addon::strategy::<TappController>(),
            addon::validate_status::<TappController>,
            privileged,
        )?;
        let upgrade_policies = ResourceStorage::new(
            config
                .store_builder::<UpgradePolicy>()
                .strategy(upgradepolicy::strategy()),
            privileged,
        )?;
        tracing::info!(privileged, "platform storage ready");
        Ok(Self {
            cronhpas: Arc::new(cronhpas),
            tapp_controllers: Arc::new(tapp_controllers),
            upgrade_policies: Arc::new(upgrade_policies),
        })
    }

    /// CronHPAs as seen by `ctx`
    pub fn cronhpas(&self, ctx: &Context) -> Api<CronHPA> {
        Api::new(self.cronhpas.clone(), ctx.clone())
    }

    /// TappControllers as seen by `ctx`
    pub fn tapp_controllers(&self, ctx: &Context) -> Api<TappController> {
        Api::new(self.tapp_controllers.clone(), ctx.clone())
    }

    /// UpgradePolicies as seen by `ctx`
    pub fn upgrade_policies(&self, ctx: &Context) -> Api<UpgradePolicy> {
        Api::new(self.upgrade_policies.clone(), ctx.clone())
    }

    /// The storage of CronHPAs, for direct use of its adapters
    pub fn cronhpa_storage(&self) -> &Arc<ResourceStorage<CronHPA>> {
        &self.cronhpas
    }

    /// The storage of TappControllers, for direct use of its adapters
    pub fn tapp_controller_storage(&self) -> &Arc<ResourceStorage<TappController>> {
        &self.tapp_controllers
    }

    /// The storage of UpgradePolicies
    pub fn upgrade_policy_storage(&self) -> &Arc<ResourceStorage<UpgradePolicy>> {
        &self.upgrade_policies
    }

    /// The resource served under `name`, accepting plurals, kinds and short names
    ///
    /// A `/status` suffix resolves only for kinds with a status subresource.
    ///
    /// ```
    /// # use tenancy_platform::{Platform, RegistryConfig};
    /// let platform = Platform::new(&RegistryConfig::default()).unwrap();
    /// assert_eq!(platform.resolve("upgp").unwrap().to_string(), "upgradepolicies.application.tkestack.io");
    /// assert!(platform.resolve("upgradepolicies/status").is_none());
    /// ```
    pub fn resolve(&self, name: &str) -> Option<GroupResource> {
        let (name, status) = match name.strip_suffix("/status") {
            Some(base) => (base, true),
            None => (name, false),
        };
        let name = name.to_ascii_lowercase();
        self.served()
            .into_iter()
            .find(|(gr, kind, shorts, has_status)| {
                (!status || *has_status)
                    && (gr.resource == name
                        || kind.eq_ignore_ascii_case(&name)
                        || shorts.iter().any(|short| *short == name))
            })
            .map(|(gr, ..)| gr)
    }

    fn served(&self) -> [(GroupResource, &'static str, &'static [&'static str], bool); 3] {
        [
            entry::<CronHPA>(self.cronhpas.status.is_some()),
            entry::<TappController>(self.tapp_controllers.status.is_some()),
            entry::<UpgradePolicy>(self.upgrade_policies.status.is_some()),
        ]
    }
}

fn entry<K: Resource>(
    has_status: bool,
) -> (GroupResource, &'static str, &'static [&'static str], bool) {
    (K::group_resource(), K::KIND, K::short_names(), has_status)
}

impl std::fmt::Debug for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Platform")
            .field("cronhpas", self.cronhpas.rest.resource())
            .field("tapp_controllers", self.tapp_controllers.rest.resource())
            .field("upgrade_policies", self.upgrade_policies.rest.resource())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_short_names_and_subresources() {
        let platform = Platform::new(&RegistryConfig::default()).unwrap();
        let resolved = |name| platform.resolve(name).map(|gr| gr.to_string());
        assert_eq!(resolved("cronhpa").as_deref(), Some("cronhpas.platform.tkestack.io"));
        assert_eq!(resolved("tc").as_deref(), Some("tappcontrollers.platform.tkestack.io"));
        assert_eq!(resolved("tapp"), None);
        assert_eq!(resolved("TappController").as_deref(), Some("tappcontrollers.platform.tkestack.io"));
        assert_eq!(resolved("cronhpas/status").as_deref(), Some("cronhpas.platform.tkestack.io"));
        assert_eq!(resolved("upgp/status"), None);
        assert_eq!(resolved("pods"), None);
    }

    #[test]
    fn zero_settings_fail_bootstrap() {
        let config = RegistryConfig {
            watch_capacity: 0,
            ..RegistryConfig::default()
        };
        let err = Platform::new(&config).unwrap_err();
        assert!(err.to_string().contains("must be positive"), "{err}");
    }
}
