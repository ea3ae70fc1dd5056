//! Tenant-scoped storage for the platform addon and application kinds
//!
//! [`Platform`] builds the storage of every kind from a [`RegistryConfig`] and hands out
//! [`Api`](tenancy_registry::Api) handles bound to a caller:
//!
//! ```
//! # async fn doc() -> Result<(), Box<dyn std::error::Error>> {
//! use tenancy_platform::{AddonSpec, CronHPA, Platform, RegistryConfig};
//! use tenancy_registry::core::{params::PostParams, Context, UserInfo};
//!
//! let platform = Platform::new(&RegistryConfig::default())?;
//! let ctx = Context::for_user(UserInfo::new("alice", "t1"));
//! let cronhpas = platform.cronhpas(&ctx);
//! let mut obj = CronHPA::default();
//! obj.metadata.name = Some("a".into());
//! obj.spec = AddonSpec { cluster_name: "cls-1".into(), ..AddonSpec::default() };
//! let created = cronhpas.create(&PostParams::default(), &obj).await?;
//! assert_eq!(created.spec.tenant_id, "t1");
//! # Ok(())
//! # }
//! ```
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub mod addon;
pub use addon::{AddonPhase, AddonSpec, AddonStatus};

pub mod config;
pub use config::{ConfigError, RegistryConfig};

mod cronhpa;
pub use cronhpa::CronHPA;

mod tappcontroller;
pub use tappcontroller::TappController;

pub mod upgradepolicy;
pub use upgradepolicy::{UpgradePolicy, UpgradePolicySpec};

mod platform;
pub use platform::Platform;
