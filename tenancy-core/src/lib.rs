//! Crate with types and traits necessary for serving tenant-scoped resources
//!
//! This crate holds everything that does not need a backing store: request contexts,
//! request parameters, selectors, watch events and the error taxonomy.
//! The same information here is always re-exported from `tenancy_registry` under `tenancy_registry::core`.
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod context;
pub use context::{Context, UserInfo};

pub mod fields;

pub mod labels;

pub mod metadata;

pub mod object;
pub use object::{HasSpec, HasStatus, HasTenant, ObjectList};

pub mod params;

mod resource;
pub use resource::{GroupResource, Resource, ResourceExt};

pub mod response;

pub mod watch;
pub use watch::WatchEvent;

mod error;
pub use error::{Error, ErrorResponse};

/// Convient alias for `Result<T, Error>`
pub type Result<T, E = Error> = std::result::Result<T, E>;
