//! Tenant-scoped storage for platform resources
//!
//! A kind is served by a [`TenantRest`] for the main resource and a [`StatusRest`] for its
//! status subresource. Both delegate to a shared [`Storage`] and hide objects owned by
//! other tenants. [`MemoryStore`] is the in-process store, and [`Api`] is a typed handle
//! bound to one caller.
//!
//! The core types of [`tenancy_core`] are re-exported under `core`.
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![forbid(unsafe_code)]

pub use tenancy_core as core;

pub mod api;
pub use api::Api;

pub mod predicate;
pub use predicate::SelectionPredicate;

pub mod rest;
pub use rest::{authorize_and_fetch, ResourceStorage, StatusRest, TenantRest};

pub mod store;
pub use store::{BootstrapError, MemoryStore, Storage, StoreBuilder, UpdatedObject, WatchStream};

pub mod strategy;
pub use strategy::{Attrs, Strategy};

pub mod tenant;
pub use tenant::TenantFilter;
